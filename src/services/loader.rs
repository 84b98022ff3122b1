//! Load Bible versions from directories of per-book JSON files.
//!
//! Each file holds one book:
//!
//! ```json
//! { "book": "john", "verses": [{ "chapter": 3, "verse": 16, "text": "..." }] }
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::error::CorpusError;
use crate::models::{Bible, Book, CorpusConfig, Library, Verse};

#[derive(Debug, Deserialize)]
struct BookFile {
    book: String,
    verses: Vec<Verse>,
}

/// Parse one book file. Verses are sorted; the book id must be canonical.
pub fn load_book_file(path: &Path) -> Result<Book, CorpusError> {
    let content = std::fs::read_to_string(path)?;
    let file: BookFile = serde_json::from_str(&content).map_err(|e| {
        CorpusError::Validation(format!("{}: {e}", path.display()))
    })?;

    if let Some(v) = file.verses.iter().find(|v| v.text.trim().is_empty()) {
        return Err(CorpusError::Validation(format!(
            "{}: {} {}:{} has no text",
            path.display(),
            file.book,
            v.chapter,
            v.verse
        )));
    }

    Book::new(file.book, file.verses)
        .map_err(|e| CorpusError::Validation(format!("{}: {e}", path.display())))
}

/// Load every `.json` file in `dir` as one version. Other files are skipped.
/// Any invalid file fails the whole version.
pub fn load_bible_dir(version: &str, dir: &Path) -> Result<Bible, CorpusError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let books = paths
        .iter()
        .map(|p| load_book_file(p))
        .collect::<Result<Vec<_>, _>>()?;

    let bible = Bible::new(version, books)?;
    tracing::debug!(version, books = bible.books().len(), dir = %dir.display(), "loaded version");
    Ok(bible)
}

/// Load all configured versions.
pub fn load_library(config: &CorpusConfig) -> Result<Library, CorpusError> {
    let mut library = Library::new();
    for source in &config.versions {
        library.insert(load_bible_dir(&source.version, &source.path)?);
    }
    if let Some(ref default) = config.default_version {
        library.set_default(default.clone())?;
    }
    Ok(library)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    pub fn write_book(dir: &Path, file: &str, book: &str, verses: &[(u32, u32, &str)]) {
        let verses: Vec<serde_json::Value> = verses
            .iter()
            .map(|(c, v, t)| serde_json::json!({"chapter": c, "verse": v, "text": t}))
            .collect();
        let body = serde_json::json!({"book": book, "verses": verses});
        std::fs::write(dir.join(file), body.to_string()).unwrap();
    }
}
