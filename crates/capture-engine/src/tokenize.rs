//! Keyword tokenization for topic extraction.
//!
//! Captures arrive in English and Vietnamese, so both stop-word lists are
//! applied. Vietnamese is written with space-separated syllables; Unicode
//! word segmentation yields one token per syllable, which is what the stop
//! list below is keyed on.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Common English stop words.
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
    "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
    "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down",
    "during", "each", "few", "for", "from", "further", "get", "had", "has", "have",
    "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how", "i",
    "if", "in", "into", "is", "it", "its", "itself", "just", "like", "me", "more", "most",
    "my", "myself", "new", "no", "nor", "not", "now", "of", "off", "on", "once", "one",
    "only", "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she",
    "should", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
    "themselves", "then", "there", "these", "they", "this", "those", "through", "to",
    "too", "under", "until", "up", "us", "use", "using", "very", "via", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "would", "you", "your", "yours", "yourself", "yourselves",
];

/// Common Vietnamese function syllables.
const VIETNAMESE_STOP_WORDS: &[&str] = &[
    "và", "của", "là", "các", "những", "một", "cho", "với", "trong", "được", "này",
    "có", "không", "để", "từ", "khi", "đã", "thì", "cũng", "như", "về", "ra", "vào",
    "nhưng", "theo", "nên", "mà", "rằng", "lại", "đến", "sẽ", "vì", "bị", "đó", "nào",
    "tôi", "bạn", "chúng", "họ", "rất", "nhiều", "hơn", "còn", "nữa", "làm", "thế",
    "đang", "hay", "hoặc", "nếu", "ở", "trên", "dưới", "sau", "trước", "cách", "việc",
    "điều", "nhất", "chỉ", "mỗi", "gì", "đây", "kia", "ấy", "vẫn", "đều",
];

/// Minimum token length in characters.
const MIN_TOKEN_LENGTH: usize = 2;

fn stop_words() -> &'static HashSet<&'static str> {
    static STOP_WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOP_WORDS.get_or_init(|| {
        ENGLISH_STOP_WORDS
            .iter()
            .chain(VIETNAMESE_STOP_WORDS)
            .copied()
            .collect()
    })
}

/// Returns true if `word` (already lowercased) is a stop word.
pub fn is_stop_word(word: &str) -> bool {
    stop_words().contains(word)
}

/// Tokenizes text into normalized content words.
///
/// Processing steps:
/// 1. Split on Unicode word boundaries
/// 2. Lowercase and strip anything that is not alphanumeric
/// 3. Drop tokens shorter than two characters and pure numbers
/// 4. Drop English and Vietnamese stop words
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(normalize_token)
        .filter(|token| {
            token.chars().count() >= MIN_TOKEN_LENGTH
                && !token.chars().all(|c| c.is_ascii_digit())
                && !is_stop_word(token)
        })
        .collect()
}

fn normalize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Returns up to `limit` keywords ranked by frequency.
///
/// Ties are broken by first occurrence, so the result is fully determined
/// by the input text.
pub fn top_keywords(text: &str, limit: usize) -> Vec<String> {
    let tokens = tokenize(text);

    // token -> (count, first position)
    let mut stats: HashMap<&str, (usize, usize)> = HashMap::new();
    for (pos, token) in tokens.iter().enumerate() {
        stats
            .entry(token.as_str())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, pos));
    }

    let mut ranked: Vec<(&str, usize, usize)> = stats
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(token, _, _)| token.to_string())
        .collect()
}
