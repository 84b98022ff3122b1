mod config;
mod ingest;
mod lookup;
mod search;
mod status;

pub use config::ConfigCommand;
pub use ingest::{BuildArgs, PublishArgs};
pub use lookup::LookupArgs;
pub use search::SearchArgs;

pub use config::handle_config;
pub use ingest::{handle_build, handle_ingest, handle_publish};
pub use lookup::handle_lookup;
pub use search::{handle_search, parse_filters};
pub use status::handle_status;
