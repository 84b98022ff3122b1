use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::Formatter;
use crate::context::AppContext;
use crate::models::VerseRange;
use crate::services::lookup_range;

#[derive(Debug, Args)]
pub struct LookupArgs {
    #[arg(required = true, help = "Citation such as \"john 3:16\" or \"genesis 1:30-2:3\"")]
    pub citation: String,

    #[arg(
        long = "bible-version",
        short = 'b',
        value_name = "VERSION",
        help = "Bible version (defaults to corpus.default_version)"
    )]
    pub bible_version: Option<String>,
}

pub async fn handle_lookup(args: LookupArgs, context: &AppContext, formatter: &dyn Formatter) -> Result<()> {
    let range: VerseRange = args.citation.parse()?;
    let library = context.library().await.context("failed to load corpus")?;
    let span = lookup_range(library, args.bible_version.as_deref(), &range)?;
    print!("{}", formatter.format_verses(&span));
    Ok(())
}
