//! Narrative → formatted document body, LaTeX source and PDF.

pub mod latex;
pub mod layout;
pub mod scanner;
pub mod typeset;

pub use latex::DocumentMeta;
pub use layout::{BodyBlock, DocumentBody};
pub use typeset::{Typesetter, TypesetOutcome};

use crate::quiz::{order_quizzes, Quiz};

/// Extract the quiz blocks of a narrative, parsed and in numeric order.
///
/// Blocks with no recognisable field are dropped with a warning.
pub fn extract_quizzes(narrative: &str) -> Vec<Quiz> {
    parse_spans(&scanner::scan_narrative(narrative))
}

fn parse_spans(scanned: &scanner::ScannedNarrative) -> Vec<Quiz> {
    let mut quizzes: Vec<Quiz> = scanned
        .spans
        .iter()
        .filter_map(|span| Quiz::parse_block(span.number, &span.lines))
        .collect();
    order_quizzes(&mut quizzes);

    for issue in quizzes.iter().flat_map(Quiz::issues) {
        log::warn!("{}", issue);
    }
    quizzes
}

/// Build the document body: quizzes pulled out of the narrative and spread
/// evenly between the remaining paragraphs.
pub fn format_document(narrative: &str) -> DocumentBody {
    let scanned = scanner::scan_narrative(narrative);
    let quizzes = parse_spans(&scanned);
    layout::lay_out(&scanned.residual_text(), quizzes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SCENARIO: &str = "Intro text.\n\n=== QCM 1 ===\n\nSITUATION: S1\nQUESTION: Q1\nA) a\nB) b\nC) c\nD) d\n\nRÉPONSE CORRECTE: B\nEXPLICATION: E1\n\nConclusion text.";

    #[test]
    fn test_quiz_between_two_paragraphs() {
        let body = format_document(SCENARIO);
        assert_eq!(body.blocks.len(), 3);
        assert_eq!(body.blocks[0], BodyBlock::Paragraph("Intro text.".into()));
        assert_eq!(body.blocks[2], BodyBlock::Paragraph("Conclusion text.".into()));

        let BodyBlock::Quiz(quiz) = &body.blocks[1] else {
            panic!("expected a quiz, got {:?}", body.blocks[1]);
        };
        assert_eq!(quiz.situation, "S1");
        assert_eq!(quiz.question, "Q1");
        assert_eq!(quiz.options.keys().cloned().collect::<Vec<_>>(), vec!["A", "B", "C", "D"]);
        assert_eq!(quiz.correct_answer, "B");
        assert_eq!(quiz.explanation, "E1");
    }

    #[test]
    fn test_unaccented_label_parses_identically() {
        let plain = SCENARIO.replace("RÉPONSE", "REPONSE");
        assert_eq!(format_document(&plain), format_document(SCENARIO));
    }

    #[test]
    fn test_empty_narrative_gives_empty_body() {
        assert!(format_document("").is_empty());
        assert!(format_document("  \n\n \t\n").is_empty());
    }

    #[test]
    fn test_unparseable_block_dropped_narrative_kept() {
        let text = "Avant.\n\n=== QCM 1 ===\nrien d'exploitable\n\n**Point 2**\n\nAprès.";
        let body = format_document(text);
        assert_eq!(body.quizzes().count(), 0);
        assert!(body.blocks.contains(&BodyBlock::Heading("Point 2".into())));
        assert!(body.blocks.contains(&BodyBlock::Paragraph("Après.".into())));
    }

    #[test]
    fn test_out_of_order_markers_rendered_in_numeric_order() {
        let text = "P1.\n\n=== QCM 2 ===\nQUESTION: deux\nEXPLICATION: e\n\nP2.\n\n=== QCM 1 ===\nQUESTION: un\nEXPLICATION: e\n\nP3.";
        let numbers: Vec<u32> = format_document(text).quizzes().map(|q| q.number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_lettered_explanation_and_bare_hash() {
        let text = "Intro.\n\n=== QCM 1 ===\nQUESTION: Q\nA) bonne\nB) mauvaise\nC) c\nD) d\nRÉPONSE CORRECTE: A\nEXPLICATION: Deux raisons :\na) la loi\nb) l'éthique\n\nFin.\n\n#";
        let body = format_document(text);
        let quiz = body.quizzes().next().unwrap();
        assert_eq!(quiz.options["A"], "bonne");
        assert!(quiz.explanation.ends_with("b) l'éthique"));
        assert!(!body.blocks.iter().any(|b| matches!(b, BodyBlock::Heading(_))));
        assert!(body.blocks.contains(&BodyBlock::Paragraph("#".into())));
    }

    #[test]
    fn test_extract_quizzes() {
        let quizzes = extract_quizzes(SCENARIO);
        assert_eq!(quizzes.len(), 1);
        assert_eq!(quizzes[0].number, 1);
    }

    fn narrative_with_quizzes() -> impl Strategy<Value = (String, usize, usize)> {
        (0usize..8, 0usize..5).prop_map(|(paragraphs, quizzes)| {
            let mut parts = Vec::new();
            let mut next_quiz = 1;
            for p in 0..paragraphs.max(quizzes) {
                if p < paragraphs {
                    parts.push(format!("Paragraphe numéro {}.", p));
                }
                if next_quiz <= quizzes {
                    parts.push(format!(
                        "=== QCM {n} ===\nSITUATION: s{n}\nQUESTION: q{n}\nA) a\nB) b\nRÉPONSE CORRECTE: A\nEXPLICATION: e{n}",
                        n = next_quiz
                    ));
                    next_quiz += 1;
                }
            }
            (parts.join("\n\n"), paragraphs, quizzes)
        })
    }

    proptest! {
        #[test]
        fn prop_every_quiz_once_in_order((text, paragraphs, quizzes) in narrative_with_quizzes()) {
            let body = format_document(&text);

            let numbers: Vec<u32> = body.quizzes().map(|q| q.number).collect();
            let expected: Vec<u32> = (1..=quizzes as u32).collect();
            prop_assert_eq!(numbers, expected);

            let texts: Vec<&String> = body
                .blocks
                .iter()
                .filter_map(|b| match b {
                    BodyBlock::Paragraph(t) => Some(t),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(texts.len(), paragraphs);
            for p in 0..paragraphs {
                let wanted = format!("Paragraphe numéro {}.", p);
                prop_assert_eq!(texts.iter().filter(|t| ***t == wanted).count(), 1);
            }
        }
    }
}
