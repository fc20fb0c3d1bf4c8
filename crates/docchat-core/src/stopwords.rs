/// English stop words skipped by keyword scoring, topic labelling and query
/// key-term extraction.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this", "these", "they", "them", "their", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could", "should", "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having", "about", "into", "also", "been", "were", "our", "you", "your", "she", "her", "his", "him", "all", "any", "some", "such", "only", "other", "more", "most", "very", "just", "over", "each", "both", "here",
];

pub fn is_stop_word(word: &str) -> bool { STOP_WORDS.contains(&word) }

/// Lowercased alphanumeric words of `text`, in order.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).map(str::to_lowercase)
}

/// Lowercased words longer than two characters that are not stop words.
pub fn content_terms(text: &str) -> Vec<String> {
    words(text).filter(|w| w.chars().count() > 2 && !is_stop_word(w)).collect()
}
