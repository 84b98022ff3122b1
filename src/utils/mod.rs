//! Utility modules.

pub mod retry;
pub mod similarity;
pub mod text;

pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
pub use similarity::cosine_similarity;
pub use text::{char_len, normalize_for_embedding, sentence_spans, split_sentences};
