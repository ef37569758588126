//! Narrative text processing for speech: normalization and segmentation.

pub mod chunker;
pub mod speech;
pub mod vocabulary;

pub use chunker::{process_narrative, DEFAULT_SEGMENT_BUDGET, MAX_SEGMENT_BUDGET};
pub use speech::normalize_for_speech;

/// A bounded piece of normalized narration sent to speech synthesis in one request.
#[derive(Debug, Clone)]
pub struct SynthesisSegment {
    /// Position in the narration, from zero
    pub index: usize,
    /// The text content
    pub text: String,
}

impl SynthesisSegment {
    pub fn new(index: usize, text: String) -> Self {
        Self { index, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrative_to_segments() {
        let narrative = "**(Introduction)**\nBienvenue. La CNIL veille.\n\n=== QCM 1 ===\nQUESTION: Qui?\nA) Elle\nB) Lui";
        let segments = process_narrative(&normalize_for_speech(narrative), 40);
        assert!(segments.len() > 1);
        assert!(segments[0].text.starts_with("Bienvenue."));
        let joined: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined.join(" "), normalize_for_speech(narrative));
    }
}
