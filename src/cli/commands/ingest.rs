//! `build`, `publish` and `ingest`.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::cli::output::Formatter;
use crate::context::AppContext;
use crate::services::{BuildIdGenerator, build_file, ensure_collection, ingest, publish};
use crate::services::ingest::count_records;

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[arg(help = "Output JSONL file (defaults to build.output)")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PublishArgs {
    #[arg(help = "Input JSONL file (defaults to build.output)")]
    pub input: Option<PathBuf>,

    #[arg(long, help = "Create the collection if it does not exist")]
    pub create_collection: bool,
}

fn progress_bar(len: u64, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

pub async fn handle_build(args: BuildArgs, context: &AppContext, formatter: &dyn Formatter) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| context.config().build.output.clone());
    let library = context.library().await.context("failed to load corpus")?;
    let chunker = context.chunker();

    let mut ids = BuildIdGenerator::new();
    let stats = build_file(library, chunker.as_ref(), &mut ids, &output)
        .await
        .with_context(|| format!("failed to build {}", output.display()))?;

    print!("{}", formatter.format_ingest_stats("Build Complete", &stats));
    print!(
        "{}",
        formatter.format_message(&format!("Wrote {}", output.display()))
    );
    Ok(())
}

pub async fn handle_publish(
    args: PublishArgs,
    context: &AppContext,
    formatter: &dyn Formatter,
    quiet: bool,
) -> Result<()> {
    let input = args
        .input
        .unwrap_or_else(|| context.config().build.output.clone());
    if !input.exists() {
        anyhow::bail!(
            "data file not found: {}\nRun `bsb build` first.",
            input.display()
        );
    }

    if args.create_collection {
        ensure_collection(context.store(), context.embedder())
            .await
            .context("failed to prepare collection")?;
    }

    let total = count_records(&input)?;
    let pb = progress_bar(total, quiet)?;
    let stats = publish(
        &input,
        context.embedder(),
        context.store(),
        context.config().embedding.batch_size as usize,
        &pb,
    )
    .await
    .context("publish failed")?;
    pb.finish_and_clear();

    print!("{}", formatter.format_ingest_stats("Publish Complete", &stats));
    Ok(())
}

pub async fn handle_ingest(context: &AppContext, formatter: &dyn Formatter, quiet: bool) -> Result<()> {
    let library = context.library().await.context("failed to load corpus")?;
    let books: usize = library.versions().map(|b| b.books().len()).sum();
    let chunker = context.chunker();

    let pb = progress_bar(books as u64, quiet)?;
    let stats = ingest(
        library,
        chunker.as_ref(),
        context.embedder(),
        context.store(),
        context.config().embedding.batch_size as usize,
        &pb,
    )
    .await
    .context("ingest failed")?;
    pb.finish_and_clear();

    print!("{}", formatter.format_ingest_stats("Ingest Complete", &stats));
    Ok(())
}
