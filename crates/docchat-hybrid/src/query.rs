use regex::Regex;
use std::sync::OnceLock;

use docchat_core::stopwords::{content_terms, words};
use docchat_core::types::Modality;

const IMAGE_CUES: &[&str] = &["image", "images", "picture", "pictures", "photo", "photos", "diagram", "diagrams", "figure", "figures", "chart", "charts", "screenshot", "screenshots", "visual", "shown"];
const AUDIO_CUES: &[&str] = &["audio", "recording", "recordings", "said", "say", "says", "listen", "speaker", "speakers", "podcast", "transcript", "hear"];
const TEMPORAL_CUES: &[&str] = &["minute", "minutes", "timestamp", "timestamps"];

/// Deterministic reading of a query for the multimodal extension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryAnalysis {
    pub preferred_modalities: Vec<Modality>,
    pub temporal: bool,
    pub key_terms: Vec<String>,
}

impl QueryAnalysis {
    pub fn prefers(&self, modality: Modality) -> bool { self.preferred_modalities.contains(&modality) }
}

fn timestamp() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,2}:\d{2}(:\d{2})?\b").ok()).as_ref()
}

/// Ambiguous words ("second", "start", "end", "when") only count inside a
/// time phrase.
fn time_phrase() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(at|near|towards?|by|from) the (very )?(start|beginning|end) of the (recording|audio|video|clip|call|talk|podcast|interview)\b|\b\d+\s*(seconds?|secs?|minutes?|mins?)\b|\bwhen (did|does|do|was|is) .*\b(say|said|mention|mentioned|talk|talked|speak|spoke)\b|\b(later|earlier) (in|on) the (recording|audio|video|clip|call|talk|podcast|interview)\b")
            .ok()
    })
    .as_ref()
}

pub fn analyze(query: &str) -> QueryAnalysis {
    let tokens: Vec<String> = words(query).collect();
    let has = |cues: &[&str]| tokens.iter().any(|t| cues.contains(&t.as_str()));
    let mut preferred_modalities = Vec::new();
    if has(IMAGE_CUES) { preferred_modalities.push(Modality::Image); }
    if has(AUDIO_CUES) { preferred_modalities.push(Modality::Audio); }
    let temporal = has(TEMPORAL_CUES)
        || timestamp().is_some_and(|re| re.is_match(query))
        || time_phrase().is_some_and(|re| re.is_match(query));
    let mut key_terms: Vec<String> = Vec::new();
    for term in content_terms(query) {
        if !key_terms.contains(&term) { key_terms.push(term); }
    }
    QueryAnalysis { preferred_modalities, temporal, key_terms }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cues_timestamps_and_terms() {
        let a = analyze("What did the speaker say about the pump diagram at 12:30?");
        assert_eq!(a.preferred_modalities, vec![Modality::Image, Modality::Audio]);
        assert!(a.temporal);
        assert!(a.key_terms.contains(&"pump".to_string()));
        assert!(!a.key_terms.contains(&"the".to_string()));

        let plain = analyze("pump pressure limits");
        assert!(plain.preferred_modalities.is_empty());
        assert!(!plain.temporal);
        assert_eq!(plain.key_terms, vec!["pump", "pressure", "limits"]);
    }

    #[test]
    fn ordinary_words_are_not_time_references() {
        for q in ["What does the second paragraph say?", "How do I start the pump?", "What happens at the end of the chapter?", "When should the filter be replaced?"] {
            assert!(!analyze(q).temporal, "{}", q);
        }
        for q in ["What is said at the start of the recording?", "What happens 30 seconds in?", "When did the speaker mention the valve?", "Summarize the first minute", "What comes later in the audio?"] {
            assert!(analyze(q).temporal, "{}", q);
        }
    }
}
