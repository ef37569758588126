//! Quiz blocks: the parsed model, its inline text form, and the generator JSON.

use crate::text::vocabulary::{QuizLabel, OPTION_LABELS, OPTION_LINE};
use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Leading bold wrapper, e.g. `**SITUATION:**` or `**A)**`.
static LEADING_BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*\*([^*]+)\*\*").unwrap());

/// First option letter in an answer value such as `B`, `B)` or `**b**`.
static ANSWER_LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^A-Za-z]*([A-Da-d])\b").unwrap());

/// One multiple-choice question with its scenario and explanation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "question_number", default)]
    pub number: u32,
    #[serde(default)]
    pub situation: String,
    #[serde(default)]
    pub question: String,
    /// Option label (`A`..`D`) → option text
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Label(QuizLabel),
    Option(char),
}

impl Field {
    /// Past the answer, option-shaped lines belong to the text being written.
    fn closes_options(self) -> bool {
        matches!(
            self,
            Field::Label(QuizLabel::CorrectAnswer | QuizLabel::Explanation)
        )
    }
}

impl Quiz {
    /// Parse the lines of a quiz block (marker excluded) into a quiz.
    ///
    /// Labels are matched case-insensitively and with or without accents; a
    /// bold wrapper around a label or option prefix is ignored. A line with
    /// no label continues the field above it. Returns `None` when no field
    /// was recognised at all.
    pub fn parse_block<S: AsRef<str>>(number: u32, lines: &[S]) -> Option<Quiz> {
        let mut quiz = Quiz {
            number,
            ..Default::default()
        };
        let mut current: Option<Field> = None;

        for raw in lines {
            let line = raw.as_ref().trim();
            if line.is_empty() {
                continue;
            }
            let line = LEADING_BOLD.replace(line, "$1");
            let line = line.trim();

            if let Some((label, rest)) = QuizLabel::match_line(line) {
                quiz.set_label(label, rest);
                current = Some(Field::Label(label));
            } else if let Some(caps) = OPTION_LINE
                .captures(line)
                .filter(|_| !current.is_some_and(Field::closes_options))
            {
                let letter = caps[1].to_string();
                quiz.options.insert(letter.clone(), caps[2].trim().to_string());
                current = letter.chars().next().map(Field::Option);
            } else if let Some(field) = current {
                quiz.extend_field(field, line);
            } else {
                log::debug!("QCM {}: ignoring stray line {:?}", number, line);
            }
        }

        if quiz.is_empty() {
            log::warn!("QCM {}: no recognisable field, block dropped", number);
            return None;
        }

        quiz.correct_answer = normalize_answer(&quiz.correct_answer);
        Some(quiz)
    }

    fn set_label(&mut self, label: QuizLabel, value: &str) {
        let field = self.label_field(label);
        *field = value.to_string();
    }

    fn label_field(&mut self, label: QuizLabel) -> &mut String {
        match label {
            QuizLabel::Situation => &mut self.situation,
            QuizLabel::Question => &mut self.question,
            QuizLabel::CorrectAnswer => &mut self.correct_answer,
            QuizLabel::Explanation => &mut self.explanation,
        }
    }

    fn extend_field(&mut self, field: Field, line: &str) {
        let target = match field {
            Field::Label(label) => self.label_field(label),
            Field::Option(letter) => self.options.entry(letter.to_string()).or_default(),
        };
        if !target.is_empty() {
            target.push(' ');
        }
        target.push_str(line);
    }

    /// True when no field carries any text.
    pub fn is_empty(&self) -> bool {
        self.situation.is_empty()
            && self.question.is_empty()
            && self.correct_answer.is_empty()
            && self.explanation.is_empty()
            && self.options.values().all(|o| o.is_empty())
    }

    /// Problems worth reporting; an empty list means the quiz is complete.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.question.is_empty() {
            issues.push(format!("QCM {}: missing question", self.number));
        }
        let missing: Vec<&str> = OPTION_LABELS
            .iter()
            .copied()
            .filter(|label| self.options.get(*label).map_or(true, |o| o.is_empty()))
            .collect();
        if !missing.is_empty() {
            issues.push(format!(
                "QCM {}: missing option(s) {}",
                self.number,
                missing.join(", ")
            ));
        }
        if self.correct_answer.is_empty() {
            issues.push(format!("QCM {}: missing correct answer", self.number));
        } else if !self.options.contains_key(&self.correct_answer) {
            issues.push(format!(
                "QCM {}: correct answer {} is not among the options",
                self.number, self.correct_answer
            ));
        }
        if self.explanation.is_empty() {
            issues.push(format!("QCM {}: missing explanation", self.number));
        }

        issues
    }

    /// Inline narrative form, starting with the `=== QCM n ===` marker.
    pub fn to_marker_text(&self) -> String {
        let mut text = format!("=== QCM {} ===\n\n", self.number);
        text.push_str(&format!(
            "{}: {}\n\n",
            QuizLabel::Situation.canonical(),
            self.situation
        ));
        text.push_str(&format!(
            "{}: {}\n\n",
            QuizLabel::Question.canonical(),
            self.question
        ));
        for (label, option) in &self.options {
            text.push_str(&format!("{}) {}\n", label, option));
        }
        text.push_str(&format!(
            "\n{}: {}\n",
            QuizLabel::CorrectAnswer.canonical(),
            self.correct_answer
        ));
        text.push_str(&format!(
            "{}: {}\n",
            QuizLabel::Explanation.canonical(),
            self.explanation
        ));
        text
    }
}

fn normalize_answer(raw: &str) -> String {
    match ANSWER_LETTER.captures(raw) {
        Some(caps) => caps[1].to_ascii_uppercase(),
        None => raw.trim().to_string(),
    }
}

/// Sort quizzes by number, keeping encounter order among equal numbers.
pub fn order_quizzes(quizzes: &mut [Quiz]) {
    quizzes.sort_by_key(|q| q.number);
}

#[derive(Deserialize)]
struct QuizEnvelope {
    qcm: Vec<Quiz>,
}

/// Parse the quiz JSON returned by the content generator.
///
/// Accepts `{"qcm": [...]}` or a bare array, optionally wrapped in a Markdown
/// code fence. Quizzes without a number are numbered by position.
pub fn parse_quiz_json(raw: &str) -> Result<Vec<Quiz>> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        bail!("empty quiz response");
    }

    let mut quizzes = if body.starts_with('[') {
        serde_json::from_str::<Vec<Quiz>>(body).context("Failed to parse quiz array")?
    } else {
        serde_json::from_str::<QuizEnvelope>(body)
            .context("Failed to parse quiz object")?
            .qcm
    };

    for (i, quiz) in quizzes.iter_mut().enumerate() {
        if quiz.number == 0 {
            quiz.number = i as u32 + 1;
        }
        quiz.correct_answer = normalize_answer(&quiz.correct_answer);
    }
    order_quizzes(&mut quizzes);

    Ok(quizzes)
}

fn strip_code_fence(raw: &str) -> &str {
    let text = raw.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`) on the opening fence line
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches("json"),
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Generic quiz used when the generated one cannot be parsed.
pub fn fallback_quiz(subject: &str) -> Quiz {
    let options = [
        ("A", "Consulter la réglementation en vigueur"),
        ("B", "Agir selon son intuition"),
        ("C", "Demander l'avis d'un collègue"),
        ("D", "Reporter la décision"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    Quiz {
        number: 1,
        situation: format!(
            "Dans le contexte de {}, vous devez prendre une décision importante.",
            subject
        ),
        question: "Quelle est la première étape à respecter ?".to_string(),
        options,
        correct_answer: "A".to_string(),
        explanation: "Il est essentiel de toujours consulter la réglementation en vigueur \
                      avant de prendre toute décision concernant les données de santé."
            .to_string(),
    }
}
