//! LaTeX rendering of the document body and the full capsule document.

use super::layout::{BodyBlock, DocumentBody};
use crate::quiz::Quiz;
use crate::text::vocabulary::QuizLabel;
use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s][^*]*?)\*").unwrap());
static TEXTBF_ARTIFACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\?textbf\{[^}]*\}").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

/// Escape text for a LaTeX body. Control characters are dropped.
pub fn latex_escape(text: &str) -> String {
    let text = TEXTBF_ARTIFACT.replace_all(text, "");
    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '{' | '}' | '$' | '&' | '%' | '#' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '^' => out.push_str(r"\textasciicircum{}"),
            '~' => out.push_str(r"\textasciitilde{}"),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }

    SPACES.replace_all(&out, " ").into_owned()
}

/// Escape, then turn `**bold**` and `*italic*` into LaTeX emphasis.
pub fn inline_markup(text: &str) -> String {
    let escaped = latex_escape(text);
    let bolded = BOLD.replace_all(&escaped, r"\textbf{$1}");
    ITALIC.replace_all(&bolded, r"\emph{$1}").into_owned()
}

/// One quiz inside a `qcmbox`; empty fields are left out.
pub fn render_quiz(quiz: &Quiz) -> String {
    let mut out = String::from("\\vspace{0.5cm}\n\\begin{qcmbox}\n");

    if !quiz.situation.is_empty() {
        out.push_str(&labelled(QuizLabel::Situation, &quiz.situation, "0.3cm"));
    }
    if !quiz.question.is_empty() {
        out.push_str(&labelled(QuizLabel::Question, &quiz.question, "0.3cm"));
    }

    let options: Vec<(&String, &String)> =
        quiz.options.iter().filter(|(_, text)| !text.is_empty()).collect();
    if !options.is_empty() {
        out.push_str("\\begin{itemize}[leftmargin=*, itemsep=3pt]\n");
        for (label, text) in options {
            out.push_str(&format!("\\item[{})] {}\n", label, inline_markup(text)));
        }
        out.push_str("\\end{itemize}\n\\vspace{0.3cm}\n\n");
    }

    if !quiz.correct_answer.is_empty() {
        out.push_str(&labelled(
            QuizLabel::CorrectAnswer,
            &quiz.correct_answer,
            "0.2cm",
        ));
    }
    if !quiz.explanation.is_empty() {
        out.push_str(&format!(
            "\\textbf{{{} :}} {}\\par\n",
            QuizLabel::Explanation.display(),
            inline_markup(&quiz.explanation)
        ));
    }

    out.push_str("\\end{qcmbox}\n\\vspace{0.5cm}\n\n");
    out
}

fn labelled(label: QuizLabel, value: &str, space: &str) -> String {
    format!(
        "\\textbf{{{} :}} {}\\par\n\\vspace{{{}}}\n\n",
        label.display(),
        inline_markup(value),
        space
    )
}

/// Render the body blocks in order.
pub fn render_body(body: &DocumentBody) -> String {
    if body.is_empty() {
        return "Contenu non disponible.".to_string();
    }

    let mut out = String::new();
    for block in &body.blocks {
        match block {
            BodyBlock::Heading(title) => {
                out.push_str(&format!("\\subsection*{{{}}}\n\n", latex_escape(title)))
            }
            BodyBlock::Emphasis(text) => {
                out.push_str(&format!("\\textbf{{{}}}\\par\n\n", latex_escape(text)))
            }
            BodyBlock::Paragraph(text) => {
                out.push_str(&inline_markup(text));
                out.push_str("\n\n");
            }
            BodyBlock::Quiz(quiz) => out.push_str(&render_quiz(quiz)),
        }
    }
    out.trim_end().to_string()
}

/// Title-page fields of a capsule document.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub title: String,
    pub competence: String,
    pub theme: String,
    /// Already formatted, e.g. `17/10/2026`
    pub date: String,
}

impl DocumentMeta {
    pub fn new(title: &str, competence: &str, theme: &str) -> Self {
        Self {
            title: title.to_string(),
            competence: competence.to_string(),
            theme: theme.to_string(),
            date: chrono::Local::now().format("%d/%m/%Y").to_string(),
        }
    }
}

const PREAMBLE: &str = r"\documentclass[11pt,a4paper]{article}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage[french]{babel}
\usepackage{geometry}
\usepackage{fancyhdr}
\usepackage{titlesec}
\usepackage{xcolor}
\usepackage{tcolorbox}
\usepackage{enumitem}
\usepackage{hyperref}
\usepackage{lmodern}

\geometry{margin=2.5cm}
\pagestyle{fancy}
\fancyhf{}
\fancyhead[L]{Capsule apprentissage - Sante Publique}
\fancyhead[R]{\thepage}
\fancyfoot[C]{Universite - Formation Medicale}

\definecolor{maincolor}{RGB}{0,102,153}
\definecolor{accentcolor}{RGB}{0,153,204}
\definecolor{qcmcolor}{RGB}{240,248,255}

\titleformat{\section}{\Large\bfseries\color{maincolor}}{\thesection}{1em}{}

\newtcolorbox{qcmbox}{
    colframe=maincolor,
    colback=qcmcolor,
    boxrule=1.5pt,
    arc=4pt,
    left=10pt,
    right=10pt,
    top=8pt,
    bottom=8pt,
    title=QCM - Question a choix multiple,
    fonttitle=\bfseries,
    coltitle=white,
    colbacktitle=maincolor
}
";

const CLOSING_SECTIONS: &str = r"\section{Synthese}

Cette capsule vous a presente les elements essentiels. La reglementation evolue constamment.

\section{Pour aller plus loin}

\begin{itemize}
    \item Consultez regulierement le site de la CNIL
    \item Referez-vous aux textes reglementaires
    \item Participez aux formations continues
\end{itemize}
";

/// Complete LaTeX source: preamble, title page, table of contents and body.
pub fn render_document(meta: &DocumentMeta, body: &DocumentBody) -> String {
    let mut doc = String::from(PREAMBLE);
    doc.push_str("\n\\begin{document}\n\n");

    doc.push_str("\\begin{titlepage}\n    \\centering\n    \\vspace*{2cm}\n\n");
    doc.push_str(
        "    {\\Huge\\bfseries\\color{maincolor} Capsule d'Apprentissage}\\\\[1cm]\n",
    );
    doc.push_str(&format!(
        "    {{\\Large\\color{{accentcolor}} {}}}\\\\[2cm]\n\n",
        latex_escape(&meta.title)
    ));
    doc.push_str("    \\begin{tcolorbox}[colframe=maincolor, colback=white, boxrule=1pt]\n");
    doc.push_str(&format!(
        "        \\textbf{{Competence :}} {}\\\\[0.5cm]\n",
        latex_escape(&meta.competence)
    ));
    doc.push_str(&format!(
        "        \\textbf{{Thematique :}} {}\\\\[0.5cm]\n",
        latex_escape(&meta.theme)
    ));
    doc.push_str(&format!(
        "        \\textbf{{Date :}} {}\n",
        latex_escape(&meta.date)
    ));
    doc.push_str("    \\end{tcolorbox}\n\n    \\vfill\n\n");
    doc.push_str("    {\\large Formation en Sante Publique}\\\\\n");
    doc.push_str("    {\\large Niveau Licence - Medecine}\n\\end{titlepage}\n\n");

    doc.push_str("\\tableofcontents\n\\newpage\n\n");
    doc.push_str("\\section{Objectifs d'apprentissage}\n\n");
    doc.push_str(
        "Cette capsule a pour objectif de vous permettre de maitriser les aspects \
         reglementaires lies au traitement des donnees de sante.\n\n",
    );
    doc.push_str("\\section{Contenu de la capsule}\n\n");
    doc.push_str(&render_body(body));
    doc.push_str("\n\n");
    doc.push_str(CLOSING_SECTIONS);
    doc.push_str("\n\\end{document}\n");
    doc
}
