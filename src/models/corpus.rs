//! Corpus model: verses, books, versions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::chunk::Metadata;
use crate::error::CorpusError;

/// Canonical book ids, Old Testament then New Testament.
pub const CANONICAL_BOOKS: [&str; 66] = [
    "genesis",
    "exodus",
    "leviticus",
    "numbers",
    "deuteronomy",
    "joshua",
    "judges",
    "ruth",
    "1samuel",
    "2samuel",
    "1kings",
    "2kings",
    "1chronicles",
    "2chronicles",
    "ezra",
    "nehemiah",
    "esther",
    "job",
    "psalms",
    "proverbs",
    "ecclesiastes",
    "songs",
    "isaiah",
    "jeremiah",
    "lamentations",
    "ezekiel",
    "daniel",
    "hosea",
    "joel",
    "amos",
    "obadiah",
    "jonah",
    "micah",
    "nahum",
    "habakkuk",
    "zephaniah",
    "haggai",
    "zechariah",
    "malachi",
    "matthew",
    "mark",
    "luke",
    "john",
    "acts",
    "romans",
    "1corinthians",
    "2corinthians",
    "galatians",
    "ephesians",
    "philippians",
    "colossians",
    "1thessalonians",
    "2thessalonians",
    "1timothy",
    "2timothy",
    "titus",
    "philemon",
    "hebrews",
    "james",
    "1peter",
    "2peter",
    "1john",
    "2john",
    "3john",
    "jude",
    "revelation",
];

/// Number of Old Testament books at the front of [`CANONICAL_BOOKS`].
pub const OLD_TESTAMENT_LEN: usize = 39;

/// Display names used by the Chinese Union Version, in canonical order.
const CUVS_NAMES: [&str; 66] = [
    "创世纪",
    "出埃及记",
    "利未记",
    "民数记",
    "申命记",
    "约书亚记",
    "士师记",
    "路得记",
    "撒母耳记上",
    "撒母耳记下",
    "列王记上",
    "列王记下",
    "历代志上",
    "历代志下",
    "以斯拉记",
    "尼希米记",
    "以斯帖记",
    "约伯记",
    "诗篇",
    "箴言",
    "传道书",
    "雅歌",
    "以赛亚书",
    "耶利米书",
    "耶利米哀歌",
    "以西结书",
    "但以理书",
    "何西阿书",
    "约珥书",
    "阿摩司书",
    "俄巴底亚书",
    "约拿书",
    "弥迦书",
    "那鸿书",
    "哈巴谷书",
    "西番雅书",
    "哈该书",
    "撒迦利亚书",
    "玛拉基书",
    "马太福音",
    "马可福音",
    "路加福音",
    "约翰福音",
    "使徒行传",
    "罗马书",
    "哥林多前书",
    "哥林多后书",
    "加拉太书",
    "以弗所书",
    "腓立比书",
    "歌罗西书",
    "帖撒罗尼迦前书",
    "帖撒罗尼迦后书",
    "提摩太前书",
    "提摩太后书",
    "提多书",
    "腓利门书",
    "希伯来书",
    "雅各书",
    "彼得前书",
    "彼得后书",
    "约翰一书",
    "约翰二书",
    "约翰三书",
    "犹大书",
    "启示录",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Testament {
    Old,
    New,
}

/// Position of a book id in the canonical order.
pub fn canonical_index(book: &str) -> Option<usize> {
    CANONICAL_BOOKS.iter().position(|b| *b == book)
}

pub fn testament_of(book: &str) -> Option<Testament> {
    canonical_index(book).map(|i| {
        if i < OLD_TESTAMENT_LEN {
            Testament::Old
        } else {
            Testament::New
        }
    })
}

pub fn cuvs_name(book: &str) -> Option<&'static str> {
    canonical_index(book).map(|i| CUVS_NAMES[i])
}

/// A (chapter, verse) coordinate within a book. Ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersePosition {
    pub chapter: u32,
    pub verse: u32,
}

impl VersePosition {
    pub fn new(chapter: u32, verse: u32) -> Self {
        Self { chapter, verse }
    }
}

/// A single verse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verse {
    pub text: String,
    pub chapter: u32,
    pub verse: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Verse {
    pub fn new(chapter: u32, verse: u32, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chapter,
            verse,
            metadata: Metadata::new(),
        }
    }

    pub fn position(&self) -> VersePosition {
        VersePosition::new(self.chapter, self.verse)
    }
}

/// A book: canonical id plus its verses in (chapter, verse) order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    name: String,
    verses: Vec<Verse>,
}

impl Book {
    /// Build a book, validating the id and sorting the verses.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::Validation` for an unknown book id, a chapter or
    /// verse number of zero, or two verses at the same position.
    pub fn new(name: impl Into<String>, mut verses: Vec<Verse>) -> Result<Self, CorpusError> {
        let name = name.into();
        if canonical_index(&name).is_none() {
            return Err(CorpusError::Validation(format!("unknown book '{name}'")));
        }

        if let Some(v) = verses.iter().find(|v| v.chapter == 0 || v.verse == 0) {
            return Err(CorpusError::Validation(format!(
                "{name} {}:{} is not a valid position (numbering starts at 1)",
                v.chapter, v.verse
            )));
        }

        verses.sort_by_key(Verse::position);

        if let Some(pair) = verses.windows(2).find(|w| w[0].position() == w[1].position()) {
            return Err(CorpusError::Validation(format!(
                "duplicate verse {name} {}:{}",
                pair[1].chapter, pair[1].verse
            )));
        }

        Ok(Self { name, verses })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn verses(&self) -> &[Verse] {
        &self.verses
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    pub fn canonical_index(&self) -> usize {
        // validated in `new`
        canonical_index(&self.name).unwrap_or(usize::MAX)
    }

    /// All verse texts joined by a single space.
    pub fn text(&self) -> String {
        join_verses(&self.verses)
    }

    /// Index of the verse at `position`, if present.
    pub fn find(&self, position: VersePosition) -> Option<usize> {
        self.verses
            .binary_search_by_key(&position, Verse::position)
            .ok()
    }
}

/// Join verse texts with a single space.
pub fn join_verses<'a>(verses: impl IntoIterator<Item = &'a Verse>) -> String {
    verses
        .into_iter()
        .map(|v| v.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One version of the Bible: books in canonical order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bible {
    version: String,
    books: Vec<Book>,
}

impl Bible {
    /// # Errors
    ///
    /// Returns `CorpusError::Validation` if a book appears more than once.
    pub fn new(version: impl Into<String>, mut books: Vec<Book>) -> Result<Self, CorpusError> {
        let version = version.into();
        books.sort_by_key(Book::canonical_index);

        if let Some(pair) = books.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(CorpusError::Validation(format!(
                "book '{}' appears more than once in version '{version}'",
                pair[0].name
            )));
        }

        Ok(Self { version, books })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn book(&self, name: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.name == name)
    }
}

/// Several versions keyed by name, with a default for unqualified lookups.
#[derive(Debug, Clone, Default)]
pub struct Library {
    versions: BTreeMap<String, Bible>,
    default_version: Option<String>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a version. The first version inserted becomes the default unless
    /// one is set explicitly.
    pub fn insert(&mut self, bible: Bible) {
        if self.default_version.is_none() {
            self.default_version = Some(bible.version.clone());
        }
        self.versions.insert(bible.version.clone(), bible);
    }

    pub fn set_default(&mut self, version: impl Into<String>) -> Result<(), CorpusError> {
        let version = version.into();
        if !self.versions.contains_key(&version) {
            return Err(CorpusError::NotFound(format!("version '{version}'")));
        }
        self.default_version = Some(version);
        Ok(())
    }

    pub fn default_version(&self) -> Option<&str> {
        self.default_version.as_deref()
    }

    /// Resolve a version, falling back to the default when `version` is `None`.
    pub fn get(&self, version: Option<&str>) -> Result<&Bible, CorpusError> {
        let name = version
            .or(self.default_version.as_deref())
            .ok_or_else(|| CorpusError::NotFound("no Bible version loaded".to_string()))?;
        self.versions
            .get(name)
            .ok_or_else(|| CorpusError::NotFound(format!("version '{name}'")))
    }

    pub fn versions(&self) -> impl Iterator<Item = &Bible> {
        self.versions.values()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
