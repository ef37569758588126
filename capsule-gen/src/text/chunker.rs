//! Splitting normalized narration into synthesis-sized segments.

use super::SynthesisSegment;
use once_cell::sync::Lazy;
use regex::Regex;

/// Default segment budget in characters.
pub const DEFAULT_SEGMENT_BUDGET: usize = 4000;

/// Hard per-request limit of the speech service; larger budgets are clamped.
pub const MAX_SEGMENT_BUDGET: usize = 5000;

/// Sentence end: terminal punctuation, an optional pause annotation, then whitespace.
static SENTENCE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?](?:<break[^>]*/>)?\s+").unwrap());

/// Split normalized text into segments of at most `budget` characters.
///
/// Text within budget comes back as a single segment (an empty string yields
/// one empty segment). Longer text is split at sentence boundaries and packed
/// greedily; a sentence over budget is split at word boundaries and its
/// pieces join the same packing stream. A single word longer than the budget
/// is emitted as is.
///
/// For single-spaced input, `segments.join(" ")` gives back the input.
pub fn split_for_synthesis(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.clamp(1, MAX_SEGMENT_BUDGET);

    if char_len(text) <= budget {
        return vec![text.to_string()];
    }

    let pieces = split_into_sentences(text)
        .into_iter()
        .flat_map(|sentence| {
            if char_len(sentence) > budget {
                split_on_words(sentence, budget)
            } else {
                vec![sentence.to_string()]
            }
        });

    pack(pieces, budget)
}

/// Split text after each sentence boundary, dropping the separating whitespace.
fn split_into_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_BOUNDARY.find_iter(text) {
        let body_end = m.start() + m.as_str().trim_end().len();
        sentences.push(&text[start..body_end]);
        start = m.end();
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

/// Greedy packing: append to the current segment while it stays within budget.
fn pack(pieces: impl IntoIterator<Item = String>, budget: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in pieces {
        let piece_len = char_len(&piece);
        if current.is_empty() {
            current = piece;
            current_len = piece_len;
        } else if current_len + 1 + piece_len <= budget {
            current.push(' ');
            current.push_str(&piece);
            current_len += 1 + piece_len;
        } else {
            segments.push(std::mem::take(&mut current));
            current = piece;
            current_len = piece_len;
        }
    }

    if !current.is_empty() {
        segments.push(current);
    }

    segments
}

/// Split text on word boundaries, same greedy rule.
fn split_on_words(text: &str, budget: usize) -> Vec<String> {
    pack(text.split_whitespace().map(str::to_string), budget)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Segment normalized narration and number the segments from zero.
pub fn process_narrative(normalized: &str, budget: usize) -> Vec<SynthesisSegment> {
    split_for_synthesis(normalized, budget)
        .into_iter()
        .enumerate()
        .map(|(index, text)| SynthesisSegment::new(index, text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_text_single_segment() {
        let segments = split_for_synthesis("Bonjour. Au revoir.", 4000);
        assert_eq!(segments, vec!["Bonjour. Au revoir."]);
    }

    #[test]
    fn test_empty_text_single_empty_segment() {
        assert_eq!(split_for_synthesis("", 4000), vec![String::new()]);
    }

    #[test]
    fn test_six_thousand_chars_two_segments() {
        let sentence = "Les données personnelles doivent être protégées avec soin.";
        let mut sentences = Vec::new();
        while sentences.iter().map(|s: &String| s.len() + 1).sum::<usize>() < 6000 {
            sentences.push(format!("{}<break time=\"0.5s\"/>", sentence));
        }
        let text = sentences.join(" ");

        let segments = split_for_synthesis(&text, 4000);
        assert_eq!(segments.len(), 2);
        for segment in &segments {
            assert!(segment.chars().count() <= 4000);
            assert!(segment.ends_with("/>"), "cut inside a sentence: {}", segment);
        }
        assert_eq!(segments.join(" "), text);
    }

    #[test]
    fn test_pause_stays_with_its_sentence() {
        let text = "Un.<break time=\"0.5s\"/> Deux.<break time=\"0.5s\"/> Trois.";
        let segments = split_for_synthesis(text, 30);
        assert_eq!(
            segments,
            vec![
                "Un.<break time=\"0.5s\"/>",
                "Deux.<break time=\"0.5s\"/>",
                "Trois."
            ]
        );
    }

    #[test]
    fn test_long_sentence_splits_on_words_in_order() {
        let text = "Court. un deux trois quatre cinq six sept huit neuf dix. Fin.";
        let segments = split_for_synthesis(text, 20);
        for segment in &segments {
            assert!(segment.chars().count() <= 20, "too long: {}", segment);
        }
        assert_eq!(segments.join(" "), text);
    }

    #[test]
    fn test_oversize_word_is_tolerated() {
        let word = "x".repeat(50);
        let text = format!("Avant. {} Apres.", word);
        let segments = split_for_synthesis(&text, 10);
        assert!(segments.contains(&word));
        assert_eq!(segments.join(" "), text);
    }

    #[test]
    fn test_budget_is_clamped_to_service_limit() {
        let text = "mot ".repeat(1500);
        let text = text.trim_end();
        let segments = split_for_synthesis(text, 10_000);
        assert!(segments.len() > 1);
        assert!(segments.iter().all(|s| s.chars().count() <= MAX_SEGMENT_BUDGET));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // 14 chars, 25 bytes
        let text = "éééé éééé. ééé";
        assert_eq!(split_for_synthesis(text, 14).len(), 1);
    }

    #[test]
    fn test_process_narrative_indexes() {
        let segments = process_narrative("Un. Deux. Trois.", 6);
        assert_eq!(segments.len(), 3);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i);
        }
        assert_eq!(segments[2].text, "Trois.");
    }

    fn normalized_text() -> impl Strategy<Value = String> {
        prop::collection::vec(
            (
                "[a-zé]{1,12}",
                prop::sample::select(vec!["", ".", ";", "!", ".<break time=\"0.5s\"/>"]),
            ),
            1..200,
        )
        .prop_map(|words| {
            words
                .into_iter()
                .map(|(w, p)| format!("{}{}", w, p))
                .collect::<Vec<_>>()
                .join(" ")
        })
    }

    proptest! {
        #[test]
        fn prop_segments_reconstruct_input(text in normalized_text(), budget in 20usize..400) {
            let segments = split_for_synthesis(&text, budget);
            prop_assert_eq!(segments.join(" "), text);
        }

        #[test]
        fn prop_segments_respect_budget(text in normalized_text(), budget in 40usize..400) {
            // Generated words are at most 33 chars, so no segment may exceed the budget.
            for segment in split_for_synthesis(&text, budget) {
                prop_assert!(segment.chars().count() <= budget, "{} > {}", segment.chars().count(), budget);
            }
        }
    }
}
