//! Structural vocabulary shared by the speech normalizer and the document parser.
//!
//! Everything language-specific lives here as data so the scanners stay generic.

use once_cell::sync::Lazy;
use regex::Regex;

/// Spoken transition that replaces a quiz start marker.
pub const QUIZ_TRANSITION: &str = "\n\nMaintenant, testons vos connaissances avec un Q.C.M.\n\n";

/// Pause annotation inserted before the answer reveal.
pub const ANSWER_PAUSE: &str = "<break time=\"2s\"/>";

/// Pause annotation inserted before the explanation.
pub const EXPLANATION_PAUSE: &str = "<break time=\"1s\"/>";

/// Pause annotation after sentence-ending punctuation.
pub const SENTENCE_PAUSE: &str = "<break time=\"0.5s\"/>";

/// Pause annotation after clause-ending punctuation.
pub const CLAUSE_PAUSE: &str = "<break time=\"0.3s\"/>";

/// Quiz start marker, e.g. `=== QCM 2 ===`.
pub static QUIZ_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^={3,}\s*QCM\s+(\d+)\s*={3,}$").unwrap());

/// The labelled fields of a quiz block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizLabel {
    Situation,
    Question,
    CorrectAnswer,
    Explanation,
}

impl QuizLabel {
    pub const ALL: [QuizLabel; 4] = [
        QuizLabel::Situation,
        QuizLabel::Question,
        QuizLabel::CorrectAnswer,
        QuizLabel::Explanation,
    ];

    /// Label keyword pattern, without the trailing colon.
    fn keyword(self) -> &'static str {
        match self {
            QuizLabel::Situation => r"SITUATION",
            QuizLabel::Question => r"QUESTION",
            QuizLabel::CorrectAnswer => r"R[ÉE]PONSE\s+CORRECTE",
            QuizLabel::Explanation => r"EXPLICATION",
        }
    }

    /// Canonical label as written in a narrative.
    pub fn canonical(self) -> &'static str {
        match self {
            QuizLabel::Situation => "SITUATION",
            QuizLabel::Question => "QUESTION",
            QuizLabel::CorrectAnswer => "RÉPONSE CORRECTE",
            QuizLabel::Explanation => "EXPLICATION",
        }
    }

    /// What the narrator says instead of the label.
    pub fn spoken(self) -> String {
        match self {
            QuizLabel::Situation => "Voici une situation pratique : ".to_string(),
            QuizLabel::Question => "Question : ".to_string(),
            QuizLabel::CorrectAnswer => format!("\n\n{}La bonne réponse est : ", ANSWER_PAUSE),
            QuizLabel::Explanation => format!("\n\n{}Explication : ", EXPLANATION_PAUSE),
        }
    }

    /// Title used in the typeset quiz box.
    pub fn display(self) -> &'static str {
        match self {
            QuizLabel::Situation => "Situation",
            QuizLabel::Question => "Question",
            QuizLabel::CorrectAnswer => "Réponse correcte",
            QuizLabel::Explanation => "Explication",
        }
    }

    /// Match a label at the start of a line; returns the label and the rest of the line.
    ///
    /// Case-insensitive and tolerant of the unaccented `REPONSE`.
    pub fn match_line(line: &str) -> Option<(QuizLabel, &str)> {
        LINE_LABELS.iter().find_map(|(label, re)| {
            re.captures(line)
                .and_then(|c| c.get(1))
                .map(|rest| (*label, rest.as_str().trim()))
        })
    }

    /// Matches the label anywhere in running text (upper case only, as the generator writes it).
    pub fn inline_regex(self) -> &'static Regex {
        &INLINE_LABELS[self as usize]
    }
}

static LINE_LABELS: Lazy<Vec<(QuizLabel, Regex)>> = Lazy::new(|| {
    QuizLabel::ALL
        .iter()
        .map(|label| {
            let re = Regex::new(&format!(r"(?i)^{}\s*:\s*(.*)$", label.keyword())).unwrap();
            (*label, re)
        })
        .collect()
});

static INLINE_LABELS: Lazy<Vec<Regex>> = Lazy::new(|| {
    QuizLabel::ALL
        .iter()
        .map(|label| Regex::new(&format!(r"{}\s*:\s*", label.keyword())).unwrap())
        .collect()
});

/// Quiz option prefix at the start of a line, e.g. `B) ...`. Upper case
/// only: `a) ...` is an ordinary enumeration.
pub static OPTION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-D])\)\s*(.*)$").unwrap());

/// Markdown heading with a title, e.g. `## Pour aller plus loin`.
pub static MARKDOWN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^#+\s+(\S.*)$").unwrap());

/// Labels accepted for quiz options.
pub const OPTION_LABELS: [&str; 4] = ["A", "B", "C", "D"];

/// How a parenthetical section title is spoken.
///
/// Checked in order; the first key contained in the title wins.
pub const TITLE_CUES: &[(&str, &str)] = &[
    ("Introduction", ""),
    ("Conclusion", "\n\nPour conclure,"),
    ("Point ", "\n\nPassons maintenant au point suivant."),
    ("Corps principal", ""),
    ("Transition", "\n\n"),
];

/// Spoken replacement for a parenthetical title; unknown titles are dropped.
pub fn title_cue(title: &str) -> &'static str {
    TITLE_CUES
        .iter()
        .find(|(key, _)| {
            if *key == "Point " {
                POINT_TITLE.is_match(title)
            } else {
                title.contains(key)
            }
        })
        .map(|(_, cue)| *cue)
        .unwrap_or("")
}

static POINT_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Point\s+\d+").unwrap());

/// Bold-only paragraphs starting with one of these become document headings.
pub const HEADING_PREFIXES: &[&str] = &[
    "Point ",
    "Transition",
    "Introduction",
    "Conclusion",
    "Corps principal",
    "En résumé",
    "Synthèse",
];

/// Whether a title belongs to the structural heading vocabulary.
pub fn is_heading_title(title: &str) -> bool {
    let title = title.trim();
    HEADING_PREFIXES
        .iter()
        .any(|prefix| starts_with_ignore_case(title, prefix))
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.to_lowercase() == prefix.to_lowercase())
}

/// Abbreviations and symbols respelled for the narrator, applied in order.
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("RGPD", "R.G.P.D."),
    ("CNIL", "C.N.I.L."),
    ("API", "A.P.I."),
    ("URL", "U.R.L."),
    ("QCM", "Q.C.M."),
    ("etc.", "et cetera"),
    ("ex.", "par exemple"),
    ("cf.", "voir"),
    ("&", "et"),
];
