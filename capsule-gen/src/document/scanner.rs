//! Line scanner separating quiz blocks from the surrounding narrative.

use crate::text::vocabulary::{QuizLabel, MARKDOWN_HEADING, OPTION_LINE, QUIZ_MARKER};

/// The raw lines of one quiz block, marker line excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSpan {
    pub number: u32,
    pub lines: Vec<String>,
}

/// A narrative split into its quiz blocks and everything else.
#[derive(Debug, Clone, Default)]
pub struct ScannedNarrative {
    /// Narrative lines outside any quiz block, in original order
    pub residual: Vec<String>,
    pub spans: Vec<QuizSpan>,
}

impl ScannedNarrative {
    pub fn residual_text(&self) -> String {
        self.residual.join("\n")
    }
}

#[derive(Debug)]
enum ScanState {
    Narrative,
    QuizBlock {
        number: u32,
        lines: Vec<String>,
        explanation_seen: bool,
    },
}

/// Separate quiz blocks from narrative text.
///
/// A marker line opens a block. The block closes on the next marker, on a
/// structural title line, at end of input, or (once its explanation has been
/// read) on the first blank line after the explanation text. Closing a block
/// leaves a blank line in the residual so the paragraphs around it stay apart.
pub fn scan_narrative(narrative: &str) -> ScannedNarrative {
    let mut out = ScannedNarrative::default();
    let mut state = ScanState::Narrative;

    for line in narrative.lines() {
        let trimmed = line.trim();

        if let Some(number) = marker_number(trimmed) {
            close_block(state, &mut out);
            state = ScanState::QuizBlock {
                number,
                lines: Vec::new(),
                explanation_seen: false,
            };
            continue;
        }

        state = match state {
            ScanState::Narrative => {
                out.residual.push(line.to_string());
                ScanState::Narrative
            }
            ScanState::QuizBlock { .. } if is_structural_title(trimmed) => {
                close_block(state, &mut out);
                out.residual.push(line.to_string());
                ScanState::Narrative
            }
            ScanState::QuizBlock {
                explanation_seen: true,
                ..
            } if trimmed.is_empty() => {
                close_block(state, &mut out);
                ScanState::Narrative
            }
            ScanState::QuizBlock {
                number,
                mut lines,
                explanation_seen,
            } => {
                let explanation_seen = explanation_seen || is_explanation_line(trimmed);
                lines.push(line.to_string());
                ScanState::QuizBlock {
                    number,
                    lines,
                    explanation_seen,
                }
            }
        };
    }

    close_block(state, &mut out);
    out
}

fn close_block(state: ScanState, out: &mut ScannedNarrative) {
    if let ScanState::QuizBlock {
        number,
        lines,
        explanation_seen,
    } = state
    {
        if !explanation_seen {
            log::warn!("QCM {}: block ended without an explanation", number);
        }
        out.residual.push(String::new());
        out.spans.push(QuizSpan { number, lines });
    }
}

fn marker_number(line: &str) -> Option<u32> {
    QUIZ_MARKER
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
}

fn is_explanation_line(line: &str) -> bool {
    matches!(
        QuizLabel::match_line(&line.replace("**", "")),
        Some((QuizLabel::Explanation, _))
    )
}

/// A line that starts a new narrative section: a Markdown heading or a line
/// that is bold from end to end. Bold quiz labels and option prefixes are not
/// titles.
pub fn is_structural_title(line: &str) -> bool {
    if MARKDOWN_HEADING.is_match(line) {
        return true;
    }
    let Some(inner) = line
        .strip_prefix("**")
        .and_then(|rest| rest.strip_suffix("**"))
    else {
        return false;
    };
    let inner = inner.trim();
    !inner.is_empty()
        && QuizLabel::match_line(inner).is_none()
        && !OPTION_LINE.is_match(inner)
}
