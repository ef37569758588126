//! Narrative → narrator-ready text with pause annotations.

use super::vocabulary::{
    ABBREVIATIONS, CLAUSE_PAUSE, QUIZ_TRANSITION, QuizLabel, SENTENCE_PAUSE, title_cue,
};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static QUIZ_MARKER_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)={3,}\s*QCM\s+\d+\s*={3,}\s*\n*").unwrap());

static PAREN_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*\(([^)]*)\)\*\*").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());

static OPTION_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*([A-D])\)[ \t]*").unwrap());

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])(\s+)").unwrap());
static CLAUSE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r";(\s+)").unwrap());

/// Abbreviation patterns, anchored on word boundaries where the key starts or
/// ends with a word character so `API` does not fire inside `APIs` or `ex.`
/// inside `index.`.
static ABBREVIATION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    ABBREVIATIONS
        .iter()
        .map(|(key, spoken)| {
            let starts_word = key.chars().next().is_some_and(is_word_char);
            let ends_word = key.chars().last().is_some_and(is_word_char);
            let pattern = format!(
                "{}{}{}",
                if starts_word { r"\b" } else { "" },
                regex::escape(key),
                if ends_word { r"\b" } else { "" },
            );
            (Regex::new(&pattern).unwrap(), *spoken)
        })
        .collect()
});

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Convert a narrative into the annotated string sent to speech synthesis.
///
/// Never fails: markup it does not recognise is left as literal text. The
/// steps run in a fixed order because later ones match text produced by
/// earlier ones (the answer pause is attached to the spoken label, options
/// are only recognised once markup is gone, and so on).
pub fn normalize_for_speech(narrative: &str) -> String {
    let text = replace_quiz_markers(narrative);
    let text = replace_labels(&text);
    let text = strip_markup(&text);
    let text = speak_options(&text);
    let text = expand_abbreviations(&text);
    let text = insert_pauses(&text);
    collapse_whitespace(&text)
}

fn replace_quiz_markers(text: &str) -> String {
    QUIZ_MARKER_INLINE
        .replace_all(text, QUIZ_TRANSITION)
        .into_owned()
}

fn replace_labels(text: &str) -> String {
    QuizLabel::ALL.iter().fold(text.to_string(), |acc, label| {
        let spoken = label.spoken();
        label
            .inline_regex()
            .replace_all(&acc, regex::NoExpand(&spoken))
            .into_owned()
    })
}

fn strip_markup(text: &str) -> String {
    let text = PAREN_TITLE.replace_all(text, |caps: &Captures| title_cue(&caps[1]).to_string());
    let text = BOLD.replace_all(&text, "$1");
    ITALIC.replace_all(&text, "$1").into_owned()
}

fn speak_options(text: &str) -> String {
    OPTION_PREFIX
        .replace_all(text, "Option $1 : ")
        .into_owned()
}

fn expand_abbreviations(text: &str) -> String {
    ABBREVIATION_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (re, spoken)| {
            re.replace_all(&acc, regex::NoExpand(spoken)).into_owned()
        })
}

fn insert_pauses(text: &str) -> String {
    let text = SENTENCE_END.replace_all(text, |caps: &Captures| {
        format!("{}{}{}", &caps[1], SENTENCE_PAUSE, &caps[2])
    });
    CLAUSE_END
        .replace_all(&text, |caps: &Captures| {
            format!(";{}{}", CLAUSE_PAUSE, &caps[1])
        })
        .into_owned()
}

/// Collapse every whitespace run to one space and trim.
///
/// Paragraph breaks carry no meaning once pauses are annotated, so blank-line
/// runs collapse together with everything else.
fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            prev_was_space = false;
            result.push(c);
        }
    }

    result.trim().to_string()
}
