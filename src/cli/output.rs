use serde::Serialize;
use std::fmt::Write as FmtWrite;

use crate::models::{OutputFormat, RetrievedChunk, SearchResults};
use crate::services::{IngestStats, VerseSpan};

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_verses(&self, span: &VerseSpan) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_ingest_stats(&self, title: &str, stats: &IngestStats) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_connected: bool,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    /// `None` when the collection does not exist yet.
    pub collection_health: Option<String>,
    pub points: u64,
    pub reranker: Option<String>,
}

const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{head}...")
    } else {
        head
    }
}

fn citation(result: &RetrievedChunk) -> &str {
    result.range().unwrap_or("(no citation)")
}

fn version_of(result: &RetrievedChunk) -> Option<&str> {
    result
        .metadata
        .get(crate::models::chunk::VERSION_KEY)
        .and_then(|v| v.as_str())
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms{}\n",
            results.len(),
            results.duration_ms,
            if results.reranked { " (reranked)" } else { "" }
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            let scores = match result.relevance {
                Some(relevance) => format!("Relevance: {relevance:.2}, Score: {:.3}", result.score),
                None => format!("Score: {:.3}", result.score),
            };
            writeln!(output, "{}. {} [{scores}]", i + 1, citation(result)).unwrap();
            if let Some(version) = version_of(result) {
                writeln!(output, "   Version: {version}").unwrap();
            }
            writeln!(output, "   ---").unwrap();
            for line in preview(&result.text).lines() {
                writeln!(output, "   {line}").unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_verses(&self, span: &VerseSpan) -> String {
        let mut output = String::new();
        writeln!(output, "{} ({})", span.citation(), span.version).unwrap();
        writeln!(output, "---").unwrap();
        for verse in &span.verses {
            writeln!(output, "{}:{} {}", verse.chapter, verse.verse, verse.text).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let embedding = if status.embedding_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(output, "Embedding:     {embedding}").unwrap();
        writeln!(output, "  URL:         {}", status.embedding_url).unwrap();
        writeln!(output, "  Model:       {}", status.embedding_model).unwrap();
        writeln!(output).unwrap();

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(output, "Vector Store:  qdrant ({vector_status})").unwrap();
        writeln!(output, "  URL:         {}", status.vector_store_url).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if status.vector_store_connected {
            match status.collection_health {
                Some(ref health) => {
                    writeln!(output, "  Health:      {health}").unwrap();
                    writeln!(output, "  Points:      {}", status.points).unwrap();
                }
                None => writeln!(output, "  Health:      (not created)").unwrap(),
            }
        }
        writeln!(output).unwrap();

        writeln!(
            output,
            "Reranker:      {}",
            status.reranker.as_deref().unwrap_or("disabled")
        )
        .unwrap();

        output
    }

    fn format_ingest_stats(&self, title: &str, stats: &IngestStats) -> String {
        let mut output = String::new();
        writeln!(output, "{title}").unwrap();
        writeln!(output, "{}", "-".repeat(title.chars().count())).unwrap();
        if stats.versions > 0 {
            writeln!(output, "Versions: {}", stats.versions).unwrap();
            writeln!(output, "Books:    {}", stats.books).unwrap();
        }
        writeln!(output, "Chunks:   {}", stats.chunks).unwrap();
        if stats.batches > 0 {
            writeln!(output, "Batches:  {}", stats.batches).unwrap();
        }
        writeln!(output, "Duration: {}ms", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{message}\n")
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {error}\n")
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut output = rendered.unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string());
        output.push('\n');
        output
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_verses(&self, span: &VerseSpan) -> String {
        self.render(&serde_json::json!({
            "citation": span.citation(),
            "version": span.version,
            "text": span.text(),
            "verses": span.verses,
        }))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_ingest_stats(&self, _title: &str, stats: &IngestStats) -> String {
        self.render(stats)
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", serde_json::json!({"message": message}))
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, result) in results.results.iter().enumerate() {
            write!(output, "### {}. {} (score {:.3}", i + 1, citation(result), result.score).unwrap();
            if let Some(relevance) = result.relevance {
                write!(output, ", relevance {relevance:.2}").unwrap();
            }
            writeln!(output, ")\n").unwrap();
            writeln!(output, "> {}\n", result.text).unwrap();
        }

        output
    }

    fn format_verses(&self, span: &VerseSpan) -> String {
        let mut output = String::new();
        writeln!(output, "## {} ({})\n", span.citation(), span.version).unwrap();
        for verse in &span.verses {
            writeln!(output, "**{}:{}** {}  ", verse.chapter, verse.verse, verse.text).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mark = |ok: bool| if ok { "✅" } else { "❌" };
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        writeln!(output, "### Embedding {}\n", mark(status.embedding_connected)).unwrap();
        writeln!(output, "- **URL:** `{}`", status.embedding_url).unwrap();
        writeln!(output, "- **Model:** {}\n", status.embedding_model).unwrap();

        writeln!(output, "### Vector Store {}\n", mark(status.vector_store_connected)).unwrap();
        writeln!(output, "- **URL:** `{}`", status.vector_store_url).unwrap();
        writeln!(output, "- **Collection:** {}", status.collection).unwrap();
        writeln!(
            output,
            "- **Health:** {}",
            status.collection_health.as_deref().unwrap_or("not created")
        )
        .unwrap();
        writeln!(output, "- **Points:** {}\n", status.points).unwrap();

        writeln!(
            output,
            "### Reranker\n\n- {}",
            status.reranker.as_deref().unwrap_or("disabled")
        )
        .unwrap();
        output
    }

    fn format_ingest_stats(&self, title: &str, stats: &IngestStats) -> String {
        let mut output = String::new();
        writeln!(output, "## {title}\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Versions | {} |", stats.versions).unwrap();
        writeln!(output, "| Books | {} |", stats.books).unwrap();
        writeln!(output, "| Chunks | {} |", stats.chunks).unwrap();
        writeln!(output, "| Batches | {} |", stats.batches).unwrap();
        writeln!(output, "| Duration | {}ms |", stats.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {message}\n")
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {error}\n")
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
