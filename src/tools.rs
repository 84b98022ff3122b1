//! Typed tool functions consumed by an agent layer.
//!
//! Bad arguments come back as `Err`. Failures of the services behind a tool
//! (embedding endpoint, index, scorer, missing verses) come back as
//! `ToolResponse::Error` so one failing call does not end the agent turn.

use crate::context::{AppContext, SearchOptions};
use crate::error::{CorpusError, SearchError};
use crate::models::chunk::CATEGORY_KEY;
use crate::models::{FilterValue, SearchRequest, ToolResponse, VerseRange};
use crate::services::lookup_range;

/// Search scripture chunks relevant to `request.query`.
///
/// Results are restricted to the configured category (`bible` by default)
/// unless the request filters on category itself.
pub async fn search_bible_chunks(
    ctx: &AppContext,
    request: SearchRequest,
) -> Result<ToolResponse, SearchError> {
    let top_k = usize::try_from(request.top_k)
        .ok()
        .filter(|k| *k > 0)
        .ok_or_else(|| {
            SearchError::InvalidArgument(format!("top_k must be positive, got {}", request.top_k))
        })?;

    let mut options = SearchOptions::from_config(ctx.config());
    options.top_k = top_k;
    options.rerank = options.rerank && ctx.reranker().is_some();
    options.filters = request.filters;
    options
        .filters
        .entry(CATEGORY_KEY.to_string())
        .or_insert_with(|| FilterValue::Keyword(ctx.config().search.category.clone()));

    match ctx.search(&request.query, &options).await {
        Ok(results) => Ok(ToolResponse::Passages(
            results.results.into_iter().map(|r| r.into_passage()).collect(),
        )),
        Err(SearchError::Upstream(reason)) => {
            tracing::warn!(query = %request.query, %reason, "search tool failed");
            Ok(ToolResponse::error(reason))
        }
        Err(e) => Err(e),
    }
}

/// Look up the verses of a citation such as `"john 3:16-18"`.
pub async fn lookup_verses(
    ctx: &AppContext,
    citation: &str,
    version: Option<&str>,
) -> Result<ToolResponse, CorpusError> {
    let range: VerseRange = citation.parse()?;
    let library = ctx.library().await?;

    match lookup_range(library, version, &range) {
        Ok(span) => Ok(ToolResponse::Passages(vec![span.to_passage()])),
        Err(CorpusError::NotFound(what)) => Ok(ToolResponse::error(format!("not found: {what}"))),
        Err(e) => Err(e),
    }
}
