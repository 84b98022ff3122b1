//! Text helpers shared by chunking and embedding.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[。，、；：'?!（）\(\)〔〕]").expect("valid punctuation pattern"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Length in characters. Chunk sizes are measured this way so CJK text is
/// not penalised for its UTF-8 width.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Replace punctuation with spaces, collapse whitespace runs and trim.
/// Applied to both stored chunks and queries when enabled.
pub fn normalize_for_embedding(text: &str) -> String {
    let spaced = PUNCTUATION.replace_all(text, " ");
    WHITESPACE.replace_all(&spaced, " ").trim().to_string()
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '。' | '？' | '！' | '.' | '?' | '!' | '；')
}

/// Byte ranges of the sentences in `text`, each ending after its terminator
/// and trimmed of surrounding whitespace.
pub fn sentence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;

    let mut push = |from: usize, to: usize| {
        let piece = &text[from..to];
        let lead = piece.len() - piece.trim_start().len();
        let trail = piece.len() - piece.trim_end().len();
        if lead + trail < piece.len() {
            spans.push(from + lead..to - trail);
        }
    };

    for (i, c) in text.char_indices() {
        if is_sentence_end(c) {
            let end = i + c.len_utf8();
            push(start, end);
            start = end;
        }
    }
    push(start, text.len());
    spans
}

/// Sentences of `text` as slices, terminators kept.
pub fn split_sentences(text: &str) -> Vec<&str> {
    sentence_spans(text).into_iter().map(|r| &text[r]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_len_counts_cjk_as_one() {
        assert_eq!(char_len("神爱世人"), 4);
        assert_eq!(char_len("love"), 4);
        assert_eq!(char_len(""), 0);
    }

    #[test]
    fn test_normalize_for_embedding() {
        assert_eq!(
            normalize_for_embedding("起初，神创造天地。  地是空虚混沌（渊面黑暗）"),
            "起初 神创造天地 地是空虚混沌 渊面黑暗"
        );
        assert_eq!(normalize_for_embedding("  Jesus wept!\n\n"), "Jesus wept");
        assert_eq!(normalize_for_embedding("。，"), "");
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("起初神创造天地。地是空虚混沌！渊面黑暗"),
            vec!["起初神创造天地。", "地是空虚混沌！", "渊面黑暗"]
        );
        assert!(split_sentences("   ").is_empty());

        let text = "In the beginning.  God created! ";
        let spans = sentence_spans(text);
        assert_eq!(&text[spans[0].clone()], "In the beginning.");
        assert_eq!(&text[spans[1].clone()], "God created!");
    }
}
