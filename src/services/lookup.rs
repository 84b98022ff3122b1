//! Direct verse access by citation, independent of the vector index.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CorpusError;
use crate::models::chunk::{BOOK_KEY, CATEGORY_KEY, RANGE_KEY, VERSION_KEY};
use crate::models::corpus::{canonical_index, join_verses};
use crate::models::{
    BIBLE_CATEGORY, Bible, Book, Library, Metadata, Passage, Verse, VersePosition, VerseRange,
};

/// Verses returned by a lookup, with the range they cover.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerseSpan {
    pub version: String,
    pub range: VerseRange,
    pub verses: Vec<Verse>,
}

impl VerseSpan {
    fn new(version: &str, book: &Book, verses: &[Verse]) -> Option<Self> {
        let (first, last) = (verses.first()?, verses.last()?);
        Some(Self {
            version: version.to_string(),
            range: VerseRange::spanning(book.name(), first, last),
            verses: verses.to_vec(),
        })
    }

    pub fn citation(&self) -> String {
        self.range.encode()
    }

    /// Verse texts joined by single spaces.
    pub fn text(&self) -> String {
        join_verses(&self.verses)
    }

    pub fn to_passage(&self) -> Passage {
        let mut metadata = Metadata::new();
        metadata.insert(CATEGORY_KEY.to_string(), BIBLE_CATEGORY.into());
        metadata.insert(RANGE_KEY.to_string(), self.citation().into());
        metadata.insert(BOOK_KEY.to_string(), self.range.book.clone().into());
        metadata.insert(VERSION_KEY.to_string(), self.version.clone().into());
        Passage {
            text: self.text(),
            metadata,
        }
    }
}

/// How far a verse context may reach from its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextScope {
    #[default]
    Book,
    Chapter,
    Verse,
}

impl fmt::Display for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextScope::Book => write!(f, "book"),
            ContextScope::Chapter => write!(f, "chapter"),
            ContextScope::Verse => write!(f, "verse"),
        }
    }
}

impl FromStr for ContextScope {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "book" => Ok(ContextScope::Book),
            "chapter" => Ok(ContextScope::Chapter),
            "verse" => Ok(ContextScope::Verse),
            _ => Err(CorpusError::InvalidArgument(format!(
                "invalid context scope '{s}', expected book, chapter or verse"
            ))),
        }
    }
}

fn check_position(book: &str, chapter: u32, verse: u32) -> Result<(), CorpusError> {
    if chapter == 0 || verse == 0 {
        return Err(CorpusError::InvalidArgument(format!(
            "{book} {chapter}:{verse} is out of range, numbering starts at 1"
        )));
    }
    Ok(())
}

fn find_book<'a>(bible: &'a Bible, book: &str) -> Result<&'a Book, CorpusError> {
    if canonical_index(book).is_none() {
        return Err(CorpusError::InvalidArgument(format!("unknown book '{book}'")));
    }
    bible.book(book).ok_or_else(|| {
        CorpusError::NotFound(format!("book '{book}' in version '{}'", bible.version()))
    })
}

fn locate(book: &Book, chapter: u32, verse: u32) -> Result<usize, CorpusError> {
    book.find(VersePosition::new(chapter, verse))
        .ok_or_else(|| CorpusError::verse_not_found(book.name(), chapter, verse))
}

/// One verse. `version` falls back to the library default.
pub fn lookup_verse(
    library: &Library,
    version: Option<&str>,
    book: &str,
    chapter: u32,
    verse: u32,
) -> Result<VerseSpan, CorpusError> {
    check_position(book, chapter, verse)?;
    let bible = library.get(version)?;
    let found = find_book(bible, book)?;
    let i = locate(found, chapter, verse)?;
    VerseSpan::new(bible.version(), found, &found.verses()[i..=i])
        .ok_or_else(|| CorpusError::verse_not_found(book, chapter, verse))
}

/// All verses between the two inclusive ends of `range`. Both ends must
/// exist in the loaded book.
pub fn lookup_range(
    library: &Library,
    version: Option<&str>,
    range: &VerseRange,
) -> Result<VerseSpan, CorpusError> {
    let bible = library.get(version)?;
    let book = find_book(bible, &range.book)?;
    let start = locate(book, range.from.chapter, range.from.verse)?;
    let end = locate(book, range.to.chapter, range.to.verse)?;
    VerseSpan::new(bible.version(), book, &book.verses()[start..=end])
        .ok_or_else(|| CorpusError::NotFound(format!("verses {range}")))
}

/// The target verse with up to `prev` verses before and `next` after,
/// narrowed by `scope`.
pub fn verse_context(
    version: &str,
    book: &Book,
    chapter: u32,
    verse: u32,
    scope: ContextScope,
    prev: usize,
    next: usize,
) -> Result<VerseSpan, CorpusError> {
    check_position(book.name(), chapter, verse)?;
    let target = locate(book, chapter, verse)?;
    let verses = book.verses();

    let (from, to) = match scope {
        ContextScope::Verse => (target, target),
        ContextScope::Book | ContextScope::Chapter => (
            target.saturating_sub(prev),
            target.saturating_add(next).min(verses.len() - 1),
        ),
    };

    let mut window = &verses[from..=to];
    if scope == ContextScope::Chapter {
        let lead = window.iter().take_while(|v| v.chapter != chapter).count();
        let len = window[lead..]
            .iter()
            .take_while(|v| v.chapter == chapter)
            .count();
        window = &window[lead..lead + len];
    }

    VerseSpan::new(version, book, window)
        .ok_or_else(|| CorpusError::verse_not_found(book.name(), chapter, verse))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> Library {
        let john = Book::new(
            "john",
            vec![
                Verse::new(2, 24, "a"),
                Verse::new(2, 25, "b"),
                Verse::new(3, 1, "c"),
                Verse::new(3, 2, "d"),
                Verse::new(3, 3, "e"),
            ],
        )
        .unwrap();
        let ruth = Book::new("ruth", vec![Verse::new(1, 1, "r")]).unwrap();

        let mut library = Library::new();
        library.insert(Bible::new("cuvs", vec![john, ruth]).unwrap());
        library.insert(
            Bible::new("kjv", vec![Book::new("john", vec![Verse::new(3, 1, "There was")]).unwrap()])
                .unwrap(),
        );
        library
    }

    #[test]
    fn test_lookup_verse_uses_default_version() {
        let library = library();
        let span = lookup_verse(&library, None, "john", 3, 1).unwrap();
        assert_eq!(span.text(), "c");
        assert_eq!(span.citation(), "john 3:1");
        assert_eq!(span.version, "cuvs");

        let kjv = lookup_verse(&library, Some("kjv"), "john", 3, 1).unwrap();
        assert_eq!(kjv.text(), "There was");
    }

    #[test]
    fn test_lookup_verse_errors() {
        let library = library();
        assert!(matches!(
            lookup_verse(&library, None, "john", 9, 9),
            Err(CorpusError::NotFound(msg)) if msg.contains("john 9:9")
        ));
        assert!(matches!(
            lookup_verse(&library, None, "john", 0, 1),
            Err(CorpusError::InvalidArgument(_))
        ));
        assert!(matches!(
            lookup_verse(&library, None, "enoch", 1, 1),
            Err(CorpusError::InvalidArgument(_))
        ));
        assert!(matches!(
            lookup_verse(&library, Some("kjv"), "ruth", 1, 1),
            Err(CorpusError::NotFound(_))
        ));
        assert!(matches!(
            lookup_verse(&library, Some("niv"), "john", 3, 1),
            Err(CorpusError::NotFound(_))
        ));
    }

    #[test]
    fn test_lookup_range_crosses_chapters() {
        let library = library();
        let range: VerseRange = "john 2:25-3:2".parse().unwrap();
        let span = lookup_range(&library, None, &range).unwrap();
        assert_eq!(span.text(), "b c d");
        assert_eq!(span.citation(), "john 2:25-3:2");

        let passage = span.to_passage();
        assert_eq!(passage.metadata["version"].as_str(), Some("cuvs"));
        assert_eq!(passage.metadata["range"].as_str(), Some("john 2:25-3:2"));
    }

    #[test]
    fn test_lookup_range_needs_both_ends() {
        let library = library();
        let range: VerseRange = "john 3:2-9".parse().unwrap();
        assert!(matches!(
            lookup_range(&library, None, &range),
            Err(CorpusError::NotFound(msg)) if msg.contains("3:9")
        ));
    }

    #[test]
    fn test_verse_context_scopes() {
        let library = library();
        let john = library.get(None).unwrap().book("john").unwrap();

        let book = verse_context("cuvs", john, 3, 1, ContextScope::Book, 2, 1).unwrap();
        assert_eq!(book.text(), "a b c d");
        assert_eq!(book.citation(), "john 2:24-3:2");

        let chapter = verse_context("cuvs", john, 3, 1, ContextScope::Chapter, 2, 1).unwrap();
        assert_eq!(chapter.text(), "c d");

        let verse = verse_context("cuvs", john, 3, 1, ContextScope::Verse, 2, 1).unwrap();
        assert_eq!(verse.text(), "c");

        // clamped at the end of the book
        let tail = verse_context("cuvs", john, 3, 3, ContextScope::Book, 0, 5).unwrap();
        assert_eq!(tail.text(), "e");

        let whole = verse_context("cuvs", john, 3, 2, ContextScope::Book, usize::MAX, usize::MAX).unwrap();
        assert_eq!(whole.citation(), "john 2:24-3:3");
        let chapter = verse_context("cuvs", john, 3, 2, ContextScope::Chapter, 0, usize::MAX).unwrap();
        assert_eq!(chapter.text(), "d e");

        assert!(verse_context("cuvs", john, 4, 1, ContextScope::Book, 1, 1).is_err());
    }

    #[test]
    fn test_context_scope_parse() {
        assert_eq!("Chapter".parse::<ContextScope>().unwrap(), ContextScope::Chapter);
        assert!("paragraph".parse::<ContextScope>().is_err());
    }
}
