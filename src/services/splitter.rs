//! Text splitters over whole-book text, and a chunker that maps their pieces
//! back to verse citations.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

use super::chunker::{BookChunker, chunk_metadata};
use super::embedding::Embedder;
use crate::error::IndexError;
use crate::models::{Book, TextChunk, VerseRange};
use crate::utils::similarity::cosine_similarity;
use crate::utils::text::{char_len, sentence_spans};

/// Separators tried in order by [`LengthSplitter`]; `""` splits characters.
pub const DEFAULT_SEPARATORS: [&str; 9] = ["\n\n", "\n", "。", "？", "！", "；", "，", ",", ""];

#[async_trait]
pub trait Splitter: Send + Sync {
    /// Split `text` into pieces. Every piece is a substring of `text`.
    async fn split_text(&self, text: &str) -> Result<Vec<String>, IndexError>;
}

/// Recursive character splitter: split on the coarsest separator present,
/// recurse into pieces that are still too long, then merge neighbours back
/// up to `chunk_size` characters keeping about `overlap` characters of tail.
#[derive(Debug, Clone)]
pub struct LengthSplitter {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl LengthSplitter {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn split_recursive<'t>(&self, text: &'t str, separators: &[String]) -> Vec<&'t str> {
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()));
        let (pieces, remaining): (Vec<&'t str>, &[String]) = match position {
            Some(i) if separators[i].is_empty() => (split_chars(text), &[]),
            Some(i) => (
                text.split_inclusive(separators[i].as_str()).collect(),
                &separators[i + 1..],
            ),
            None => (vec![text], &[]),
        };

        let mut output = Vec::new();
        // (byte offset in `text`, piece); pieces tile `text` in order
        let mut short: Vec<(usize, &'t str)> = Vec::new();
        let mut offset = 0;

        for piece in pieces {
            let start = offset;
            offset += piece.len();
            if char_len(piece) <= self.chunk_size {
                short.push((start, piece));
                continue;
            }
            if !short.is_empty() {
                output.extend(self.merge(text, &short));
                short.clear();
            }
            if remaining.is_empty() {
                output.push(piece);
            } else {
                output.extend(self.split_recursive(piece, remaining));
            }
        }
        if !short.is_empty() {
            output.extend(self.merge(text, &short));
        }

        output
            .into_iter()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Merge adjacent pieces of `text` into windows of at most `chunk_size`.
    fn merge<'t>(&self, text: &'t str, pieces: &[(usize, &'t str)]) -> Vec<&'t str> {
        let mut merged = Vec::new();
        // (start byte, end byte, chars)
        let mut window: VecDeque<(usize, usize, usize)> = VecDeque::new();
        let mut total = 0;

        for &(start, piece) in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                merged.push(window_slice(text, &window));
                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, _, chars)) => total -= chars,
                        None => break,
                    }
                }
            }
            window.push_back((start, start + piece.len(), len));
            total += len;
        }
        if !window.is_empty() {
            merged.push(window_slice(text, &window));
        }
        merged
    }
}

fn window_slice<'t>(text: &'t str, window: &VecDeque<(usize, usize, usize)>) -> &'t str {
    match (window.front(), window.back()) {
        (Some(first), Some(last)) => &text[first.0..last.1],
        _ => "",
    }
}

fn split_chars(text: &str) -> Vec<&str> {
    text.char_indices()
        .map(|(i, c)| &text[i..i + c.len_utf8()])
        .collect()
}

#[async_trait]
impl Splitter for LengthSplitter {
    async fn split_text(&self, text: &str) -> Result<Vec<String>, IndexError> {
        Ok(self.split(text))
    }
}

/// Embedding-distance splitter: break between adjacent sentences whose cosine
/// distance is above the given percentile of all adjacent distances.
pub struct SemanticSplitter {
    embedder: Arc<dyn Embedder>,
    breakpoint_percentile: f64,
}

impl SemanticSplitter {
    pub fn new(embedder: Arc<dyn Embedder>, breakpoint_percentile: f64) -> Self {
        Self {
            embedder,
            breakpoint_percentile,
        }
    }
}

/// Linear-interpolated percentile of `values` (0..=100).
pub fn percentile(values: &[f32], p: f64) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let weight = (rank - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * weight
}

#[async_trait]
impl Splitter for SemanticSplitter {
    async fn split_text(&self, text: &str) -> Result<Vec<String>, IndexError> {
        let spans = sentence_spans(text);
        if spans.len() <= 1 {
            return Ok(spans.into_iter().map(|r| text[r].to_string()).collect());
        }

        let sentences: Vec<String> = spans.iter().map(|r| text[r.clone()].to_string()).collect();
        let embeddings = self.embedder.embed_documents(sentences).await?;
        if embeddings.len() != spans.len() {
            return Err(IndexError::ChunkError(format!(
                "expected {} sentence embeddings, got {}",
                spans.len(),
                embeddings.len()
            )));
        }

        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();
        let threshold = percentile(&distances, self.breakpoint_percentile);

        let mut pieces = Vec::new();
        let mut group_start = spans[0].start;
        for (i, distance) in distances.iter().enumerate() {
            if *distance > threshold {
                pieces.push(text[group_start..spans[i].end].to_string());
                group_start = spans[i + 1].start;
            }
        }
        let last = spans.len() - 1;
        pieces.push(text[group_start..spans[last].end].to_string());
        Ok(pieces)
    }
}

/// Chunks a book by splitting its joined text and citing the verses each
/// piece overlaps.
pub struct SplitterChunker {
    splitter: Box<dyn Splitter>,
}

impl SplitterChunker {
    pub fn new(splitter: Box<dyn Splitter>) -> Self {
        Self { splitter }
    }
}

/// Byte span of every verse inside `Book::text()`.
fn verse_spans(book: &Book) -> Vec<(usize, usize)> {
    let mut spans = Vec::with_capacity(book.verses().len());
    let mut offset = 0;
    for verse in book.verses() {
        spans.push((offset, offset + verse.text.len()));
        offset += verse.text.len() + 1;
    }
    spans
}

/// Citation for the verses touched by `text[start..end]`.
fn cite(book: &Book, spans: &[(usize, usize)], start: usize, end: usize) -> Option<VerseRange> {
    let first = spans.iter().position(|&(s, e)| e > start && s < end)?;
    let last = spans.iter().rposition(|&(s, e)| e > start && s < end)?;
    let verses = book.verses();
    Some(VerseRange::spanning(book.name(), &verses[first], &verses[last]))
}

#[async_trait]
impl BookChunker for SplitterChunker {
    async fn chunk_book(&self, book: &Book) -> Result<Vec<TextChunk>, IndexError> {
        if book.is_empty() {
            return Ok(Vec::new());
        }

        let text = book.text();
        let spans = verse_spans(book);
        let pieces = self.splitter.split_text(&text).await?;

        let mut chunks = Vec::with_capacity(pieces.len());
        let mut search_from = 0;
        for piece in pieces {
            // pieces come in order but may overlap the previous one
            let start = text
                .get(search_from..)
                .and_then(|rest| rest.find(&piece))
                .map(|i| i + search_from)
                .or_else(|| text.find(&piece))
                .ok_or_else(|| {
                    IndexError::ChunkError(format!(
                        "split piece not found in {} text",
                        book.name()
                    ))
                })?;
            let end = start + piece.len();
            search_from = start + piece.chars().next().map_or(1, char::len_utf8);

            let range = cite(book, &spans, start, end).ok_or_else(|| {
                IndexError::ChunkError(format!("split piece outside {} verses", book.name()))
            })?;
            chunks.push(TextChunk::new(piece, chunk_metadata(&range)));
        }
        Ok(chunks)
    }
}
