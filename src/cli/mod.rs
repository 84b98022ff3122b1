//! Command-line interface for the Bible study bot.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Scripture retrieval: ingest Bible versions into a vector index and search them.
#[derive(Debug, Parser)]
#[command(name = "bsb")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        short = 'q',
        global = true,
        conflicts_with = "verbose",
        help = "Only log warnings and hide progress bars"
    )]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Chunk every configured version into a JSONL data file
    Build(commands::BuildArgs),

    /// Embed and upsert a JSONL data file into the collection
    Publish(commands::PublishArgs),

    /// Create the collection if needed, then chunk, embed and upsert directly
    Ingest,

    /// Search scripture chunks
    Search(commands::SearchArgs),

    /// Print the verses of a citation
    Lookup(commands::LookupArgs),

    /// Check the embedding endpoint and Qdrant collection
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "bsb", "search", "what is love", "-k", "3", "--filter", "book=john", "--rerank",
            "--threshold", "4", "-f", "json",
        ]);
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.query, "what is love");
                assert_eq!(args.top_k, Some(3));
                assert_eq!(args.filters, ["book=john"]);
                assert!(args.rerank);
                assert_eq!(args.threshold, Some(4.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_lookup() {
        let cli = Cli::try_parse_from(["bsb", "lookup", "john 3:16"]).unwrap();
        match cli.command {
            Commands::Lookup(args) => {
                assert_eq!(args.citation, "john 3:16");
                assert_eq!(args.bible_version, None);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["bsb", "lookup", "genesis 1:1-3", "-b", "kjv"]).unwrap();
        match cli.command {
            Commands::Lookup(args) => assert_eq!(args.bible_version.as_deref(), Some("kjv")),
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["bsb", "lookup", "ruth 1:1", "--bible-version", "cuvs"]).unwrap();
        assert!(matches!(cli.command, Commands::Lookup(args) if args.bible_version.as_deref() == Some("cuvs")));
    }

    #[test]
    fn test_parse_publish() {
        let cli = Cli::parse_from(["bsb", "publish", "out.jsonl", "--create-collection", "-q"]);
        assert!(cli.quiet);
        match cli.command {
            Commands::Publish(args) => {
                assert_eq!(args.input.as_deref(), Some(std::path::Path::new("out.jsonl")));
                assert!(args.create_collection);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
