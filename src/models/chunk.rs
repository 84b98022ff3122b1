//! Text chunks and their metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Payload key holding the chunk text in the vector index.
pub const TEXT_KEY: &str = "text";
pub const CATEGORY_KEY: &str = "category";
pub const RANGE_KEY: &str = "range";
pub const BOOK_KEY: &str = "book";
pub const VERSION_KEY: &str = "version";
pub const DATA_BUILD_ID_KEY: &str = "data_build_id";

/// Metadata keys whose stored values are always text.
pub const TEXT_KEYS: [&str; 5] = [CATEGORY_KEY, RANGE_KEY, BOOK_KEY, VERSION_KEY, DATA_BUILD_ID_KEY];

/// Category tag carried by every chunk cut from scripture.
pub const BIBLE_CATEGORY: &str = "bible";

/// A metadata value: a scalar or a homogeneous list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    TextList(Vec<String>),
    IntegerList(Vec<i64>),
    FloatList(Vec<f64>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Text(s) => write!(f, "{s}"),
            MetadataValue::Integer(n) => write!(f, "{n}"),
            MetadataValue::Float(x) => write!(f, "{x}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::TextList(v) => write!(f, "[{}]", v.join(", ")),
            MetadataValue::IntegerList(v) => {
                let parts: Vec<String> = v.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            MetadataValue::FloatList(v) => {
                let parts: Vec<String> = v.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Integer(n)
    }
}

impl From<f64> for MetadataValue {
    fn from(x: f64) -> Self {
        MetadataValue::Float(x)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

/// Ordered metadata map, so serialized chunks are byte-stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A retrieval-sized piece of text with citation metadata.
///
/// Chunks hold no reference to the verses they were cut from; the only link
/// back is the `range` citation in `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TextChunk {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn range(&self) -> Option<&str> {
        self.metadata.get(RANGE_KEY).and_then(MetadataValue::as_str)
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata
            .get(CATEGORY_KEY)
            .and_then(MetadataValue::as_str)
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A value usable in an equality filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Keyword(String),
    Integer(i64),
    Bool(bool),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Keyword(s) => write!(f, "{s}"),
            FilterValue::Integer(n) => write!(f, "{n}"),
            FilterValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Keyword(s.to_string())
    }
}

impl FilterValue {
    /// Parse a command-line value: integers and booleans are recognised,
    /// anything else is a keyword. A value wrapped in single or double
    /// quotes is always a keyword, quotes removed.
    pub fn parse_loose(s: &str) -> Self {
        if let Some(quoted) = unquote(s) {
            FilterValue::Keyword(quoted.to_string())
        } else if let Ok(n) = s.parse::<i64>() {
            FilterValue::Integer(n)
        } else if let Ok(b) = s.parse::<bool>() {
            FilterValue::Bool(b)
        } else {
            FilterValue::Keyword(s.to_string())
        }
    }

    /// Parse a value for `key`. Keys in [`TEXT_KEYS`] always get a keyword.
    pub fn parse_for_key(key: &str, s: &str) -> Self {
        if TEXT_KEYS.iter().any(|k| *k == key) {
            FilterValue::Keyword(unquote(s).unwrap_or(s).to_string())
        } else {
            Self::parse_loose(s)
        }
    }

    /// Whether a stored metadata value satisfies this equality predicate.
    /// A list matches when any element is equal.
    pub fn matches(&self, value: &MetadataValue) -> bool {
        match (self, value) {
            (FilterValue::Keyword(a), MetadataValue::Text(b)) => a == b,
            (FilterValue::Keyword(a), MetadataValue::TextList(list)) => list.iter().any(|b| a == b),
            (FilterValue::Integer(a), MetadataValue::Integer(b)) => a == b,
            (FilterValue::Integer(a), MetadataValue::IntegerList(list)) => list.contains(a),
            (FilterValue::Bool(a), MetadataValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

fn unquote(s: &str) -> Option<&str> {
    ['"', '\'']
        .iter()
        .find_map(|q| s.strip_prefix(*q)?.strip_suffix(*q))
}

/// Conjunctive equality filters over chunk metadata.
pub type Filters = BTreeMap<String, FilterValue>;

/// Filters restricting results to scripture chunks.
pub fn bible_filters() -> Filters {
    let mut filters = Filters::new();
    filters.insert(CATEGORY_KEY.to_string(), BIBLE_CATEGORY.into());
    filters
}
