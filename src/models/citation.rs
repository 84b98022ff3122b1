//! Verse-range citations: `"<book> C:V"`, `"<book> C:V1-V2"`,
//! `"<book> C1:V1-C2:V2"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::corpus::{Verse, VersePosition, canonical_index};
use crate::error::CorpusError;

/// An inclusive range of verses within one book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerseRange {
    pub book: String,
    pub from: VersePosition,
    pub to: VersePosition,
}

impl VerseRange {
    /// # Errors
    ///
    /// Returns `CorpusError::InvalidArgument` when `from` comes after `to`.
    pub fn new(
        book: impl Into<String>,
        from: VersePosition,
        to: VersePosition,
    ) -> Result<Self, CorpusError> {
        let book = book.into();
        if from > to {
            return Err(CorpusError::InvalidArgument(format!(
                "range start {}:{} is after end {}:{} in {book}",
                from.chapter, from.verse, to.chapter, to.verse
            )));
        }
        Ok(Self { book, from, to })
    }

    pub fn single(book: impl Into<String>, position: VersePosition) -> Self {
        Self {
            book: book.into(),
            from: position,
            to: position,
        }
    }

    /// Range spanning two verses of an already sorted book.
    ///
    /// # Panics
    ///
    /// Panics if `first` comes after `last`; callers pass the ends of a
    /// window taken from sorted verses.
    pub fn spanning(book: &str, first: &Verse, last: &Verse) -> Self {
        assert!(
            first.position() <= last.position(),
            "verse range out of order: {}:{} > {}:{}",
            first.chapter,
            first.verse,
            last.chapter,
            last.verse
        );
        Self {
            book: book.to_string(),
            from: first.position(),
            to: last.position(),
        }
    }

    pub fn is_single(&self) -> bool {
        self.from == self.to
    }

    pub fn contains(&self, position: VersePosition) -> bool {
        self.from <= position && position <= self.to
    }

    /// Encode to the canonical citation string.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VerseRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to) = (self.from, self.to);
        if self.is_single() {
            write!(f, "{} {}:{}", self.book, from.chapter, from.verse)
        } else if from.chapter == to.chapter {
            write!(f, "{} {}:{}-{}", self.book, from.chapter, from.verse, to.verse)
        } else {
            write!(
                f,
                "{} {}:{}-{}:{}",
                self.book, from.chapter, from.verse, to.chapter, to.verse
            )
        }
    }
}

fn parse_number(s: &str, what: &str, citation: &str) -> Result<u32, CorpusError> {
    match s.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CorpusError::InvalidArgument(format!(
            "invalid {what} '{s}' in citation '{citation}'"
        ))),
    }
}

fn parse_position(s: &str, citation: &str) -> Result<VersePosition, CorpusError> {
    let (chapter, verse) = s.split_once(':').ok_or_else(|| {
        CorpusError::InvalidArgument(format!(
            "expected 'chapter:verse' in citation '{citation}'"
        ))
    })?;
    Ok(VersePosition::new(
        parse_number(chapter, "chapter", citation)?,
        parse_number(verse, "verse", citation)?,
    ))
}

impl FromStr for VerseRange {
    type Err = CorpusError;

    /// Parse a citation. The book id must be canonical.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (book, span) = s.trim().rsplit_once(' ').ok_or_else(|| {
            CorpusError::InvalidArgument(format!("invalid citation '{s}', expected '<book> C:V'"))
        })?;
        let book = book.trim();
        if canonical_index(book).is_none() {
            return Err(CorpusError::InvalidArgument(format!(
                "unknown book '{book}' in citation '{s}'"
            )));
        }

        let (from, to) = match span.split_once('-') {
            None => {
                let pos = parse_position(span, s)?;
                (pos, pos)
            }
            Some((start, end)) => {
                let from = parse_position(start, s)?;
                let to = if end.contains(':') {
                    parse_position(end, s)?
                } else {
                    VersePosition::new(from.chapter, parse_number(end, "verse", s)?)
                };
                (from, to)
            }
        };

        VerseRange::new(book, from, to)
    }
}

/// Encode the range between two verses of `book`.
///
/// # Errors
///
/// Returns `CorpusError::InvalidArgument` when `from_verse` comes after
/// `to_verse`.
pub fn encode_verse_range(
    book: &str,
    from_verse: &Verse,
    to_verse: Option<&Verse>,
) -> Result<String, CorpusError> {
    let to_verse = to_verse.unwrap_or(from_verse);
    VerseRange::new(book, from_verse.position(), to_verse.position()).map(|r| r.encode())
}
