//! Ingestion: corpus → chunks → vectors → index.
//!
//! Two routes reach the index. `build` writes tagged chunks to a JSONL file
//! which `publish` later streams into the store; `ingest` does both in one
//! pass. Upstream failures abort the run; nothing is skipped silently.

use indicatif::ProgressBar;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use super::chunker::BookChunker;
use super::embedding::Embedder;
use super::vector_store::{EmbeddedChunk, VectorStore, ensure_collection};
use crate::error::{EmbeddingError, IndexError};
use crate::models::chunk::{DATA_BUILD_ID_KEY, VERSION_KEY};
use crate::models::{Library, TextChunk};

/// Issues `YYYYmmddHHMMSS-<n>` ids: one timestamp per run, `n` counting up
/// per chunk.
#[derive(Debug, Clone)]
pub struct BuildIdGenerator {
    timestamp: String,
    next: u64,
}

impl BuildIdGenerator {
    pub fn new() -> Self {
        Self::with_timestamp(chrono::Local::now().format("%Y%m%d%H%M%S").to_string())
    }

    pub fn with_timestamp(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            next: 0,
        }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.timestamp, self.next);
        self.next += 1;
        id
    }
}

impl Default for BuildIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    pub versions: usize,
    pub books: usize,
    pub chunks: usize,
    /// Upsert batches sent to the store.
    pub batches: usize,
    pub duration_ms: u64,
}

fn tag_chunk(chunk: TextChunk, version: &str, ids: &mut BuildIdGenerator) -> TextChunk {
    chunk
        .with_metadata(VERSION_KEY, version)
        .with_metadata(DATA_BUILD_ID_KEY, ids.next_id())
}

/// Embed and upsert `chunks`, leaving the vector empty.
pub async fn process_batch(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    chunks: &mut Vec<TextChunk>,
) -> Result<usize, IndexError> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let chunks = std::mem::take(chunks);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_documents(texts).await?;
    if vectors.len() != chunks.len() {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        ))
        .into());
    }

    let count = chunks.len();
    let points = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
        .collect();
    store.upsert(points).await?;

    tracing::debug!(collection = store.collection(), count, "upserted batch");
    Ok(count)
}

/// Accumulates chunks and flushes them in batches.
struct Batcher<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn VectorStore,
    batch_size: usize,
    pending: Vec<TextChunk>,
    batches: usize,
    chunks: usize,
}

impl<'a> Batcher<'a> {
    fn new(embedder: &'a dyn Embedder, store: &'a dyn VectorStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            embedder,
            store,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            batches: 0,
            chunks: 0,
        }
    }

    async fn push(&mut self, chunk: TextChunk) -> Result<(), IndexError> {
        self.pending.push(chunk);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), IndexError> {
        let count = process_batch(self.embedder, self.store, &mut self.pending).await?;
        if count > 0 {
            self.batches += 1;
            self.chunks += count;
        }
        Ok(())
    }
}

/// Chunk every book of every version and write one JSON line per chunk.
pub async fn build<W: Write>(
    library: &Library,
    chunker: &dyn BookChunker,
    ids: &mut BuildIdGenerator,
    mut out: W,
) -> Result<IngestStats, IndexError> {
    let start = Instant::now();
    let mut stats = IngestStats::default();

    for bible in library.versions() {
        tracing::info!(version = bible.version(), books = bible.books().len(), "building version");
        stats.versions += 1;

        for book in bible.books() {
            let chunks = chunker.chunk_book(book).await?;
            tracing::info!(book = book.name(), chunks = chunks.len(), "chunked book");
            stats.books += 1;

            for chunk in chunks {
                let chunk = tag_chunk(chunk, bible.version(), ids);
                serde_json::to_writer(&mut out, &chunk).map_err(std::io::Error::from)?;
                out.write_all(b"\n")?;
                stats.chunks += 1;
            }
        }
    }

    out.flush()?;
    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}

/// [`build`] into a file, creating parent directories.
pub async fn build_file(
    library: &Library,
    chunker: &dyn BookChunker,
    ids: &mut BuildIdGenerator,
    path: &Path,
) -> Result<IngestStats, IndexError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    build(library, chunker, ids, BufWriter::new(file)).await
}

/// Number of non-blank lines, for sizing a progress bar.
pub fn count_records(path: &Path) -> Result<u64, IndexError> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0;
    for line in reader.lines() {
        if !line?.trim().is_empty() {
            count += 1;
        }
    }
    Ok(count)
}

/// Stream a JSONL chunk file into the store. Blank lines are skipped; a
/// malformed line aborts with its 1-based line number.
pub async fn publish(
    path: &Path,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<IngestStats, IndexError> {
    let start = Instant::now();
    let reader = BufReader::new(File::open(path)?);
    let mut batcher = Batcher::new(embedder, store, batch_size);

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: TextChunk = serde_json::from_str(&line)
            .map_err(|source| IndexError::BatchRecord { line: i + 1, source })?;
        batcher.push(chunk).await?;
        progress.inc(1);
    }
    batcher.flush().await?;

    Ok(IngestStats {
        chunks: batcher.chunks,
        batches: batcher.batches,
        duration_ms: start.elapsed().as_millis() as u64,
        ..Default::default()
    })
}

/// Bootstrap the collection, then chunk, embed and upsert every book.
pub async fn ingest(
    library: &Library,
    chunker: &dyn BookChunker,
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<IngestStats, IndexError> {
    let start = Instant::now();
    ensure_collection(store, embedder).await?;

    let mut ids = BuildIdGenerator::new();
    let mut batcher = Batcher::new(embedder, store, batch_size);
    let mut stats = IngestStats::default();

    for bible in library.versions() {
        tracing::info!(version = bible.version(), books = bible.books().len(), "ingesting version");
        stats.versions += 1;

        for book in bible.books() {
            let chunks = chunker.chunk_book(book).await?;
            tracing::info!(book = book.name(), chunks = chunks.len(), "chunked book");
            for chunk in chunks {
                batcher.push(tag_chunk(chunk, bible.version(), &mut ids)).await?;
            }
            stats.books += 1;
            progress.inc(1);
        }
    }
    batcher.flush().await?;

    stats.chunks = batcher.chunks;
    stats.batches = batcher.batches;
    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bible, Book, FilterValue, Filters, MetadataValue, Verse};
    use crate::services::chunker::VerseChunker;
    use crate::services::embedding::testing::FakeEmbedder;
    use crate::services::vector_store::MemoryStore;
    use tempfile::TempDir;

    fn library() -> Library {
        let genesis = Book::new(
            "genesis",
            vec![
                Verse::new(1, 1, "起初神创造天地"),
                Verse::new(1, 2, "地是空虚混沌渊面黑暗"),
                Verse::new(1, 3, "神说要有光就有了光"),
            ],
        )
        .unwrap();
        let john = Book::new("john", vec![Verse::new(3, 16, "神爱世人")]).unwrap();
        let mut library = Library::new();
        library.insert(Bible::new("cuvs", vec![genesis, john]).unwrap());
        library
    }

    fn chunker() -> VerseChunker {
        VerseChunker::new(12, 2)
    }

    #[test]
    fn test_build_ids_count_up() {
        let mut ids = BuildIdGenerator::with_timestamp("20240101120000");
        assert_eq!(ids.next_id(), "20240101120000-0");
        assert_eq!(ids.next_id(), "20240101120000-1");

        let generated = BuildIdGenerator::new().next_id();
        let (stamp, n) = generated.split_once('-').unwrap();
        assert_eq!(stamp.len(), 14);
        assert_eq!(n, "0");
    }

    #[tokio::test]
    async fn test_build_writes_tagged_lines() {
        let mut out = Vec::new();
        let mut ids = BuildIdGenerator::with_timestamp("20240101120000");
        let stats = build(&library(), &chunker(), &mut ids, &mut out).await.unwrap();

        let lines: Vec<TextChunk> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(stats.versions, 1);
        assert_eq!(stats.books, 2);
        assert_eq!(stats.chunks, lines.len());

        for (i, chunk) in lines.iter().enumerate() {
            assert_eq!(chunk.metadata["version"], MetadataValue::from("cuvs"));
            assert_eq!(
                chunk.metadata["data_build_id"],
                MetadataValue::from(format!("20240101120000-{i}"))
            );
            assert_eq!(chunk.category(), Some("bible"));
        }
        assert_eq!(lines.last().unwrap().range(), Some("john 3:16"));
    }

    #[tokio::test]
    async fn test_publish_streams_file_in_batches() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("build").join("data.jsonl");
        let mut ids = BuildIdGenerator::new();
        let built = build_file(&library(), &chunker(), &mut ids, &path).await.unwrap();
        assert_eq!(count_records(&path).unwrap(), built.chunks as u64);

        let store = MemoryStore::new("bible");
        let embedder = FakeEmbedder::new(8);
        ensure_collection(&store, &embedder).await.unwrap();

        let stats = publish(&path, &embedder, &store, 2, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(stats.chunks, built.chunks);
        assert_eq!(stats.batches, built.chunks.div_ceil(2));
        assert_eq!(store.len().await, built.chunks);
    }

    #[tokio::test]
    async fn test_publish_reports_bad_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.jsonl");
        std::fs::write(
            &path,
            "{\"text\":\"a\",\"metadata\":{}}\n\n{\"metadata\":{}}\n",
        )
        .unwrap();

        let store = MemoryStore::new("bible");
        let embedder = FakeEmbedder::new(4);
        store.create_collection(4).await.unwrap();

        let err = publish(&path, &embedder, &store, 10, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::BatchRecord { line: 3, .. }));
        // the record before the bad line was still pending, nothing upserted
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ingest_bootstraps_and_upserts() {
        let store = MemoryStore::new("bible");
        let embedder = FakeEmbedder::new(8);
        let stats = ingest(&library(), &chunker(), &embedder, &store, 3, &ProgressBar::hidden())
            .await
            .unwrap();

        assert_eq!(store.created_count().await, 1);
        assert_eq!(stats.books, 2);
        assert_eq!(store.len().await, stats.chunks);

        let mut filters = Filters::new();
        filters.insert("book".to_string(), FilterValue::from("john"));
        let query = embedder.vector("神爱世人");
        let hits = store.search(query, 5, &filters).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].range(), Some("john 3:16"));
    }

    #[tokio::test]
    async fn test_ingest_aborts_on_embedding_failure() {
        let store = MemoryStore::new("bible");
        store.create_collection(4).await.unwrap();
        let embedder = FakeEmbedder::failing();

        let err = ingest(&library(), &chunker(), &embedder, &store, 1, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::EmbeddingError(_)));
        assert!(store.is_empty().await);
    }
}
