//! Sliding-window chunking over whole verses.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;

use super::embedding::Embedder;
use super::splitter::{LengthSplitter, SemanticSplitter, SplitterChunker};
use crate::error::IndexError;
use crate::models::chunk::{BOOK_KEY, CATEGORY_KEY, RANGE_KEY};
use crate::models::{
    BIBLE_CATEGORY, Book, ChunkStrategy, ChunkingConfig, Metadata, TextChunk, Verse, VerseRange,
};
use crate::utils::text::char_len;

/// Turns a book into retrieval-sized chunks tagged with citations.
#[async_trait]
pub trait BookChunker: Send + Sync {
    async fn chunk_book(&self, book: &Book) -> Result<Vec<TextChunk>, IndexError>;
}

/// Metadata every scripture chunk carries.
pub fn chunk_metadata(range: &VerseRange) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(CATEGORY_KEY.to_string(), BIBLE_CATEGORY.into());
    metadata.insert(RANGE_KEY.to_string(), range.encode().into());
    metadata.insert(BOOK_KEY.to_string(), range.book.clone().into());
    metadata
}

/// Greedy sliding window over verses.
///
/// Verses accumulate until adding the next one would push the joined text
/// past `chunk_size`; the window is then emitted and trimmed from the front
/// while its joined length exceeds `overlap`. Verses are never split, so a
/// single verse longer than `chunk_size` becomes a chunk of its own.
///
/// `overlap >= chunk_size` is accepted but makes consecutive chunks repeat
/// almost entirely; keeping the two sensible is up to the caller.
#[derive(Debug, Clone)]
pub struct VerseChunker {
    chunk_size: usize,
    overlap: usize,
}

/// Verses not yet flushed, with the character length of their joined text.
struct Window<'a> {
    verses: VecDeque<(&'a Verse, usize)>,
    chars: usize,
}

impl<'a> Window<'a> {
    fn new() -> Self {
        Self {
            verses: VecDeque::new(),
            chars: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    /// Length of the verses joined by single spaces.
    fn joined_len(&self) -> usize {
        self.chars + self.verses.len().saturating_sub(1)
    }

    fn push(&mut self, verse: &'a Verse) {
        let len = char_len(&verse.text);
        self.chars += len;
        self.verses.push_back((verse, len));
    }

    fn pop_front(&mut self) {
        if let Some((_, len)) = self.verses.pop_front() {
            self.chars -= len;
        }
    }

    fn to_chunk(&self, book: &str) -> Option<TextChunk> {
        let (first, _) = self.verses.front()?;
        let (last, _) = self.verses.back()?;
        let range = VerseRange::spanning(book, first, last);
        let text = self
            .verses
            .iter()
            .map(|(v, _)| v.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Some(TextChunk::new(text, chunk_metadata(&range)))
    }
}

impl VerseChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a book. Non-empty books always yield at least one chunk.
    pub fn chunk(&self, book: &Book) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let mut window = Window::new();

        for verse in book.verses() {
            let proposed = window.joined_len() + char_len(&verse.text);

            if proposed > self.chunk_size && !window.is_empty() {
                chunks.extend(window.to_chunk(book.name()));
                while !window.is_empty() && window.joined_len() > self.overlap {
                    window.pop_front();
                }
            }

            window.push(verse);
        }

        chunks.extend(window.to_chunk(book.name()));
        chunks
    }
}

#[async_trait]
impl BookChunker for VerseChunker {
    async fn chunk_book(&self, book: &Book) -> Result<Vec<TextChunk>, IndexError> {
        Ok(self.chunk(book))
    }
}

/// Build the chunker selected by `chunking.strategy`.
pub fn create_chunker(config: &ChunkingConfig, embedder: Arc<dyn Embedder>) -> Box<dyn BookChunker> {
    match config.strategy {
        ChunkStrategy::Verse => Box::new(VerseChunker::from_config(config)),
        ChunkStrategy::Length => Box::new(SplitterChunker::new(Box::new(LengthSplitter::new(
            config.chunk_size,
            config.overlap,
        )))),
        ChunkStrategy::Semantic => Box::new(SplitterChunker::new(Box::new(
            SemanticSplitter::new(embedder, config.breakpoint_percentile),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetadataValue, VersePosition};

    fn verse(chapter: u32, number: u32, fill: char, len: usize) -> Verse {
        Verse::new(chapter, number, fill.to_string().repeat(len))
    }

    fn fixture() -> Book {
        Book::new(
            "john",
            vec![
                verse(1, 1, 'a', 40),
                verse(1, 2, 'b', 40),
                verse(1, 3, 'c', 20),
                verse(1, 4, 'd', 50),
                verse(1, 5, 'e', 10),
                verse(2, 1, 'f', 30),
                verse(2, 2, 'g', 60),
            ],
        )
        .unwrap()
    }

    fn ranges(chunks: &[TextChunk]) -> Vec<VerseRange> {
        chunks
            .iter()
            .map(|c| c.range().unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_golden_sequence() {
        let chunks = VerseChunker::new(100, 30).chunk(&fixture());
        let citations: Vec<_> = chunks.iter().map(|c| c.range().unwrap()).collect();
        assert_eq!(
            citations,
            ["john 1:1-2", "john 1:3-5", "john 1:5-2:1", "john 2:1-2"]
        );

        assert_eq!(
            chunks[1].text,
            format!("{} {} {}", "c".repeat(20), "d".repeat(50), "e".repeat(10))
        );
        assert_eq!(chunks[2].text, format!("{} {}", "e".repeat(10), "f".repeat(30)));
        for chunk in &chunks {
            assert_eq!(chunk.category(), Some("bible"));
            assert_eq!(chunk.metadata["book"], MetadataValue::from("john"));
        }
    }

    #[tokio::test]
    async fn test_create_chunker_defaults_to_verse_window() {
        let embedder = Arc::new(crate::services::embedding::testing::FakeEmbedder::new(4));
        let config = ChunkingConfig {
            chunk_size: 100,
            overlap: 30,
            ..Default::default()
        };
        let chunker = create_chunker(&config, embedder);
        let chunks = chunker.chunk_book(&fixture()).await.unwrap();
        assert_eq!(chunks, VerseChunker::new(100, 30).chunk(&fixture()));
    }

    #[test]
    fn test_overlap_can_undershoot() {
        // every verse alone exceeds the overlap, so nothing is carried over
        let book = Book::new(
            "ruth",
            (1..=5).map(|v| verse(1, v, 'x', 40)).collect(),
        )
        .unwrap();
        let chunks = VerseChunker::new(100, 30).chunk(&book);
        let citations: Vec<_> = chunks.iter().map(|c| c.range().unwrap()).collect();
        assert_eq!(citations, ["ruth 1:1-2", "ruth 1:3-4", "ruth 1:5"]);
    }

    #[test]
    fn test_oversized_verse_is_never_split() {
        let book = Book::new(
            "jude",
            vec![verse(1, 1, 'a', 5), verse(1, 2, 'b', 30), verse(1, 3, 'c', 5)],
        )
        .unwrap();
        let chunks = VerseChunker::new(10, 3).chunk(&book);
        let citations: Vec<_> = chunks.iter().map(|c| c.range().unwrap()).collect();
        assert_eq!(citations, ["jude 1:1", "jude 1:2", "jude 1:3"]);
        assert_eq!(chunks[1].text, "b".repeat(30));
    }

    #[test]
    fn test_single_chunk_and_empty_book() {
        let book = Book::new("jude", vec![verse(1, 1, 'a', 5), verse(1, 2, 'b', 5)]).unwrap();
        let chunks = VerseChunker::new(400, 30).chunk(&book);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].range(), Some("jude 1:1-2"));

        let empty = Book::new("jude", vec![]).unwrap();
        assert!(VerseChunker::new(400, 30).chunk(&empty).is_empty());
    }

    #[test]
    fn test_lengths_count_characters_not_bytes() {
        // 3 chars each but 9 bytes each in UTF-8
        let book = Book::new(
            "john",
            vec![
                Verse::new(1, 1, "神爱世"),
                Verse::new(1, 2, "人甚至"),
                Verse::new(1, 3, "将他的"),
            ],
        )
        .unwrap();
        let chunks = VerseChunker::new(7, 1).chunk(&book);
        let citations: Vec<_> = chunks.iter().map(|c| c.range().unwrap()).collect();
        assert_eq!(citations, ["john 1:1-2", "john 1:3"]);
    }

    #[test]
    fn test_coverage_order_and_overlap_bound() {
        let lengths = [12, 7, 33, 5, 18, 41, 9, 9, 26, 3, 15, 22, 38, 6, 11];
        let verses: Vec<Verse> = lengths
            .iter()
            .enumerate()
            .map(|(i, len)| verse(1 + (i as u32) / 6, 1 + (i as u32) % 6, 'v', *len))
            .collect();
        let book = Book::new("mark", verses).unwrap();
        let positions: Vec<VersePosition> = book.verses().iter().map(Verse::position).collect();

        for (size, overlap) in [(40, 10), (60, 25), (25, 5), (100, 40)] {
            let chunks = VerseChunker::new(size, overlap).chunk(&book);
            let spans = ranges(&chunks);

            // every verse is inside some chunk
            for p in &positions {
                assert!(spans.iter().any(|r| r.contains(*p)), "{p:?} uncovered");
            }

            for pair in spans.windows(2) {
                let (prev, next) = (&pair[0], &pair[1]);
                // monotone and without gaps
                assert!(prev.from <= next.from);
                assert!(prev.to < next.to);
                let after_prev = positions.iter().position(|p| *p == prev.to).unwrap() + 1;
                let next_start = positions.iter().position(|p| *p == next.from).unwrap();
                assert!(next_start <= after_prev);

                // shared verses stay within overlap plus one verse
                let shared: Vec<&Verse> = book
                    .verses()
                    .iter()
                    .filter(|v| prev.contains(v.position()) && next.contains(v.position()))
                    .collect();
                if let Some(longest) = shared.iter().map(|v| char_len(&v.text)).max() {
                    let joined = crate::models::corpus::join_verses(shared.iter().copied());
                    assert!(char_len(&joined) <= overlap + longest);
                }
            }
        }
    }
}
