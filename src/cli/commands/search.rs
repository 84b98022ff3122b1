use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::Formatter;
use crate::context::{AppContext, SearchOptions};
use crate::models::chunk::CATEGORY_KEY;
use crate::models::{Config, FilterValue, Filters};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long = "top-k", short = 'k', help = "Number of results to return")]
    pub top_k: Option<usize>,

    #[arg(
        long = "filter",
        value_name = "KEY=VALUE",
        help = "Metadata equality filter, repeatable (e.g. book=john). Quote a value to match it as text: year=\"2024\""
    )]
    pub filters: Vec<String>,

    #[arg(long, help = "Candidates fetched per result when reranking")]
    pub over_fetch: Option<usize>,

    #[arg(long, help = "Rerank candidates with the configured scorer")]
    pub rerank: bool,

    #[arg(long, help = "Minimum reranker score to keep a result")]
    pub threshold: Option<f32>,
}

/// Parse `key=value` pairs. Later pairs override earlier ones.
pub fn parse_filters(pairs: &[String]) -> Result<Filters> {
    let mut filters = Filters::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid filter '{pair}', expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("invalid filter '{pair}': empty key");
        }
        filters.insert(key.to_string(), FilterValue::parse_for_key(key, value.trim()));
    }
    Ok(filters)
}

pub async fn handle_search(
    args: SearchArgs,
    mut config: Config,
    formatter: &dyn Formatter,
    verbose: bool,
) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let mut filters = parse_filters(&args.filters)?;
    filters
        .entry(CATEGORY_KEY.to_string())
        .or_insert_with(|| FilterValue::Keyword(config.search.category.clone()));

    if args.rerank {
        config.rerank.enabled = true;
    }
    let mut options = SearchOptions::from_config(&config);
    options.top_k = args.top_k.unwrap_or(options.top_k);
    options.over_fetch = args.over_fetch.unwrap_or(options.over_fetch);
    options.filters = filters;
    options.threshold = args.threshold;

    let context = AppContext::from_config(config).context("failed to initialise services")?;

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Top k: {}", options.top_k);
        for (key, value) in &options.filters {
            eprintln!("  Filter: {key}={value}");
        }
        if let Some(reranker) = context.reranker().filter(|_| options.rerank) {
            eprintln!(
                "  Rerank: {} over {} candidates per result",
                reranker.scorer_name(),
                options.over_fetch
            );
        }
    }

    let results = context
        .search(query, &options)
        .await
        .context("search failed")?;

    if verbose {
        eprintln!("Total: {}ms\n", results.duration_ms);
    }

    print!("{}", formatter.format_search_results(&results));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filters() {
        let filters = parse_filters(&[
            "book=john".to_string(),
            "chapter=3".to_string(),
            "featured = true".to_string(),
        ])
        .unwrap();
        assert_eq!(filters["book"], FilterValue::from("john"));
        assert_eq!(filters["chapter"], FilterValue::Integer(3));
        assert_eq!(filters["featured"], FilterValue::Bool(true));

        let filters = parse_filters(&[
            "version=2024".to_string(),
            "tag='3'".to_string(),
        ])
        .unwrap();
        assert_eq!(filters["version"], FilterValue::from("2024"));
        assert_eq!(filters["tag"], FilterValue::from("3"));

        assert!(parse_filters(&["book".to_string()]).is_err());
        assert!(parse_filters(&["=john".to_string()]).is_err());
    }
}
