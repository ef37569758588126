//! Residual narrative → ordered body blocks with quizzes interleaved.

use crate::quiz::Quiz;
use crate::text::vocabulary::{is_heading_title, MARKDOWN_HEADING};
use once_cell::sync::Lazy;
use regex::Regex;

/// `textbf{..}` left behind by earlier markup conversions.
static TEXTBF_ARTIFACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\?textbf\{[^}]*\}").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One unit of the formatted document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyBlock {
    /// Section sub-heading
    Heading(String),
    /// Bold line that is not a known section title
    Emphasis(String),
    /// Narrative paragraph; may still carry inline `**bold**` / `*italic*`
    Paragraph(String),
    Quiz(Quiz),
}

/// The narrative-plus-quiz content of a capsule document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBody {
    pub blocks: Vec<BodyBlock>,
}

impl DocumentBody {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn quizzes(&self) -> impl Iterator<Item = &Quiz> {
        self.blocks.iter().filter_map(|b| match b {
            BodyBlock::Quiz(q) => Some(q),
            _ => None,
        })
    }

    /// Plain-text rendering, used for previews and the text fallback document.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                BodyBlock::Heading(title) => {
                    out.push_str(&format!("{}\n{}\n\n", title, "-".repeat(title.chars().count())))
                }
                BodyBlock::Emphasis(text) | BodyBlock::Paragraph(text) => {
                    out.push_str(text);
                    out.push_str("\n\n");
                }
                BodyBlock::Quiz(quiz) => {
                    out.push_str(&quiz.to_marker_text());
                    out.push('\n');
                }
            }
        }
        out.trim_end().to_string()
    }
}

/// Split residual text into cleaned, blank-line-delimited paragraphs.
///
/// Lines of a paragraph are joined with single spaces; heading hashes and
/// `textbf{..}` artefacts are removed. Paragraphs left empty are dropped.
pub fn split_paragraphs(residual: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in residual.lines().chain(std::iter::once("")) {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                let joined = clean_paragraph(&current.join(" "));
                if !joined.is_empty() {
                    paragraphs.push(joined);
                }
                current.clear();
            }
            continue;
        }
        current.push(line.to_string());
    }

    paragraphs
}

fn clean_paragraph(text: &str) -> String {
    let text = TEXTBF_ARTIFACT.replace_all(text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Decide how a cleaned paragraph is rendered.
pub fn classify(paragraph: &str) -> BodyBlock {
    if let Some(caps) = MARKDOWN_HEADING.captures(paragraph) {
        return BodyBlock::Heading(caps[1].trim().to_string());
    }

    let bold_only = paragraph
        .strip_prefix("**")
        .and_then(|rest| rest.strip_suffix("**"))
        .filter(|inner| !inner.contains("**") && !inner.trim().is_empty());

    match bold_only {
        Some(inner) => {
            let title = strip_parentheses(inner.trim());
            if is_heading_title(title) {
                BodyBlock::Heading(title.to_string())
            } else {
                BodyBlock::Emphasis(title.to_string())
            }
        }
        None => BodyBlock::Paragraph(paragraph.to_string()),
    }
}

fn strip_parentheses(title: &str) -> &str {
    title
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .map(str::trim)
        .unwrap_or(title)
}

/// Paragraph index (1-based) after which each of `k` quizzes is placed.
///
/// Quiz `i` goes after paragraph `round(i * n / (k + 1))`, clamped to
/// `[1, n]`. With no paragraphs the result is empty and every quiz is
/// appended.
pub fn insertion_points(n: usize, k: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    (1..=k)
        .map(|i| ((2 * i * n + (k + 1)) / (2 * (k + 1))).clamp(1, n))
        .collect()
}

/// Lay out residual narrative and quizzes into a document body.
///
/// Quizzes must already be in numeric order; each appears exactly once.
pub fn lay_out(residual: &str, quizzes: Vec<Quiz>) -> DocumentBody {
    let units: Vec<BodyBlock> = split_paragraphs(residual)
        .iter()
        .map(|p| classify(p))
        .collect();
    let points = insertion_points(units.len(), quizzes.len());

    let mut blocks = Vec::with_capacity(units.len() + quizzes.len());
    let mut quizzes = quizzes.into_iter();
    let mut points = points.into_iter().peekable();

    for (idx, unit) in units.into_iter().enumerate() {
        blocks.push(unit);
        while points.next_if_eq(&(idx + 1)).is_some() {
            if let Some(quiz) = quizzes.next() {
                blocks.push(BodyBlock::Quiz(quiz));
            }
        }
    }

    // Whatever the points did not place (no paragraphs at all) goes last
    blocks.extend(quizzes.map(BodyBlock::Quiz));
    DocumentBody { blocks }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(number: u32) -> Quiz {
        Quiz {
            number,
            question: format!("Q{}", number),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_paragraphs() {
        let residual = "Ligne un\nligne deux\n\n\n\n# Titre\n\ntextbf{1} Texte  propre\n\n   \n";
        assert_eq!(
            split_paragraphs(residual),
            vec!["Ligne un ligne deux", "# Titre", "Texte propre"]
        );
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify("**Point 1 : Définitions**"),
            BodyBlock::Heading("Point 1 : Définitions".into())
        );
        assert_eq!(
            classify("**(Introduction)**"),
            BodyBlock::Heading("Introduction".into())
        );
        assert_eq!(classify("**À retenir**"), BodyBlock::Emphasis("À retenir".into()));
        assert_eq!(classify("## Pour aller plus loin"), BodyBlock::Heading("Pour aller plus loin".into()));
        assert_eq!(classify("#"), BodyBlock::Paragraph("#".into()));
        assert_eq!(classify("#RGPD en bref"), BodyBlock::Paragraph("#RGPD en bref".into()));
        assert_eq!(
            classify("**Un** mot et **un autre**"),
            BodyBlock::Paragraph("**Un** mot et **un autre**".into())
        );
    }

    #[test]
    fn test_insertion_points() {
        assert_eq!(insertion_points(2, 1), vec![1]);
        assert_eq!(insertion_points(9, 2), vec![3, 6]);
        assert_eq!(insertion_points(8, 3), vec![2, 4, 6]);
        assert_eq!(insertion_points(1, 3), vec![1, 1, 1]);
        assert_eq!(insertion_points(0, 2), Vec::<usize>::new());
    }

    #[test]
    fn test_quizzes_between_paragraphs() {
        let body = lay_out("A.\n\nB.\n\nC.\n\nD.", vec![quiz(1), quiz(2)]);
        let kinds: Vec<String> = body
            .blocks
            .iter()
            .map(|b| match b {
                BodyBlock::Paragraph(t) => t.clone(),
                BodyBlock::Quiz(q) => format!("Q{}", q.number),
                other => format!("{:?}", other),
            })
            .collect();
        assert_eq!(kinds, vec!["A.", "Q1", "B.", "C.", "Q2", "D."]);
    }

    #[test]
    fn test_quizzes_appended_without_paragraphs() {
        let body = lay_out("  \n\n", vec![quiz(1), quiz(2)]);
        let numbers: Vec<u32> = body.quizzes().map(|q| q.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(body.blocks.len(), 2);
    }

    #[test]
    fn test_empty_residual_no_quizzes() {
        assert!(lay_out("", Vec::new()).is_empty());
    }
}
