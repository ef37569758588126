//! Script and quiz generation through the LLM provider.

use crate::manifest::CapsuleRow;
use crate::quiz::{fallback_quiz, parse_quiz_json, Quiz};
use crate::retry::{with_retry, RetryPolicy};
use crate::scrape::SourceDocument;
use anyhow::{bail, Result};
use llm_client::{LlmProvider, LlmRequest};
use serde::{Deserialize, Serialize};

/// Characters of each source quoted in the prompts.
const SOURCE_EXCERPT_CHARS: usize = 2000;

/// Narration speed used for the duration estimate.
const WORDS_PER_MINUTE: f64 = 150.0;

const SYSTEM_PROMPT: &str = "Tu es un expert en pédagogie médicale spécialisé dans la santé \
publique et la réglementation des données de santé.";

/// Output of one generation: the narrative with quizzes inlined.
#[derive(Debug, Clone)]
pub struct CapsuleScript {
    pub script: String,
    pub quizzes: Vec<Quiz>,
    pub duration_estimate: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// Contents of `metadata.json` beside each generated script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleMetadata {
    pub competence: String,
    #[serde(rename = "thematique")]
    pub theme: String,
    #[serde(rename = "sujet")]
    pub subject: String,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(rename = "qcm_count", default)]
    pub quiz_count: usize,
    #[serde(default = "default_duration")]
    pub duration_estimate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

fn default_duration() -> String {
    "5-10 minutes".to_string()
}

impl CapsuleMetadata {
    pub fn new(row: &CapsuleRow, script: &CapsuleScript) -> Self {
        Self {
            competence: row.competence.clone(),
            theme: row.theme.clone(),
            subject: row.subject.clone(),
            sources: script.sources.clone(),
            quiz_count: script.quizzes.len(),
            duration_estimate: script.duration_estimate.clone(),
            generated_at: Some(chrono::Local::now().to_rfc3339()),
        }
    }
}

pub struct ContentGenerator {
    provider: Box<dyn LlmProvider>,
    retry: RetryPolicy,
}

impl ContentGenerator {
    pub fn new(provider: Box<dyn LlmProvider>, retry: RetryPolicy) -> Self {
        Self { provider, retry }
    }

    /// Generate the narrative and its quizzes for one row.
    pub async fn generate(&self, row: &CapsuleRow, sources: &[SourceDocument]) -> Result<CapsuleScript> {
        log::info!("Generating script for: {}", row.subject);
        let context = sources_context(sources);

        let narrative = self.ask("script", script_prompt(row, &context)).await?;
        if narrative.trim().is_empty() {
            bail!("The model returned an empty script for '{}'", row.subject);
        }

        let raw_quizzes = self.ask("quiz", quiz_prompt(row, &context)).await?;
        let quizzes = match parse_quiz_json(&raw_quizzes) {
            Ok(q) if !q.is_empty() => q,
            Ok(_) => {
                log::warn!("Quiz response held no question, using the generic quiz");
                vec![fallback_quiz(&row.subject)]
            }
            Err(e) => {
                log::warn!("Quiz JSON could not be parsed ({:#}), using the generic quiz", e);
                vec![fallback_quiz(&row.subject)]
            }
        };
        for quiz in &quizzes {
            for issue in quiz.issues() {
                log::warn!("{}", issue);
            }
        }

        let script = assemble_narrative(narrative.trim(), &quizzes);
        let duration_estimate = estimate_duration(&script);
        log::info!(
            "Script generated: {} characters, {} QCM, ~{}",
            script.chars().count(),
            quizzes.len(),
            duration_estimate
        );

        Ok(CapsuleScript {
            script,
            quizzes,
            duration_estimate,
            sources: sources
                .iter()
                .map(|s| SourceRef {
                    title: s.title.clone(),
                    url: s.url.clone(),
                })
                .collect(),
        })
    }

    async fn ask(&self, what: &str, prompt: String) -> Result<String> {
        let label = format!("{} {} request", self.provider.name(), what);
        let response = with_retry(&self.retry, &label, || {
            self.provider
                .complete(LlmRequest::new(prompt.clone()).with_system_prompt(SYSTEM_PROMPT))
        })
        .await?;
        log::debug!("{} answered with model {}", label, response.model);
        Ok(response.content.trim().to_string())
    }
}

/// "SOURCES DOCUMENTAIRES" block quoted in both prompts.
pub fn sources_context(sources: &[SourceDocument]) -> String {
    let mut context = String::from("SOURCES DOCUMENTAIRES:\n\n");
    for (i, source) in sources.iter().enumerate() {
        let excerpt: String = source.content.chars().take(SOURCE_EXCERPT_CHARS).collect();
        context.push_str(&format!(
            "SOURCE {}: {}\nURL: {}\nCONTENU:\n{}...\n\n",
            i + 1,
            source.title,
            source.url,
            excerpt
        ));
    }
    context
}

fn script_prompt(row: &CapsuleRow, sources: &str) -> String {
    format!(
        "Tu dois créer un script de capsule éducative de 5-10 minutes pour des étudiants en médecine de niveau licence.

CONTEXTE DE LA CAPSULE:
- Compétence: {competence}
- Thématique: {theme}
- Sujet spécifique: {subject}

{sources}
CONSIGNES POUR LE SCRIPT:
1. Durée cible: 5-10 minutes de narration (environ 800-1200 mots)
2. Niveau: Licence en médecine (vulgarisé mais précis)
3. Ton: Pédagogique, engageant, professionnel
4. Structure obligatoire:
   - Introduction accrocheuse (30 secondes)
   - Corps principal avec 3-4 points clés
   - Conclusion avec synthèse et ouverture
5. Inclure des exemples concrets et cas pratiques
6. Utiliser un langage clair et accessible
7. Intégrer les informations des sources fournies
8. Marquer clairement les transitions

FORMAT DE SORTIE:
Écris le script sous forme de texte narratif continu, comme s'il était lu par un narrateur.
Sépare les paragraphes par une ligne vide.
Utilise des marqueurs de transition comme \"Passons maintenant à...\", \"Il est important de noter que...\", etc.

Ne pas inclure les QCM dans ce script - ils seront ajoutés séparément.
",
        competence = row.competence,
        theme = row.theme,
        subject = row.subject,
        sources = sources,
    )
}

fn quiz_prompt(row: &CapsuleRow, sources: &str) -> String {
    format!(
        r#"Tu dois créer 2 à 3 QCM (questions à choix multiples) pour tester la compréhension des étudiants.

CONTEXTE:
- Compétence: {competence}
- Thématique: {theme}
- Sujet: {subject}

{sources}
CONSIGNES POUR LES QCM:
1. Créer exactement 2 ou 3 questions
2. Chaque question doit être basée sur une MISE EN SITUATION concrète
3. 4 propositions de réponse par question (A, B, C, D)
4. UNE SEULE bonne réponse par question
5. Les mauvaises réponses doivent être plausibles
6. Niveau adapté aux étudiants en licence de médecine
7. Questions pratiques sur l'application de la réglementation

FORMAT DE SORTIE (JSON):
{{
  "qcm": [
    {{
      "question_number": 1,
      "situation": "Description de la mise en situation...",
      "question": "Quelle est la bonne réponse dans cette situation ?",
      "options": {{
        "A": "Proposition A",
        "B": "Proposition B",
        "C": "Proposition C",
        "D": "Proposition D"
      }},
      "correct_answer": "B",
      "explanation": "Explication détaillée de pourquoi B est correct et pourquoi les autres sont incorrectes"
    }}
  ]
}}

Retourne UNIQUEMENT le JSON, sans texte avant ou après.
"#,
        competence = row.competence,
        theme = row.theme,
        subject = row.subject,
        sources = sources,
    )
}

/// Inline the quizzes into the generated script.
///
/// With fewer than three paragraphs every quiz goes after the text.
/// Otherwise quiz `j` of `k` follows paragraph `j·n/(k+1)` (0-based), which
/// puts two quizzes at the thirds and three at the quarters. Quizzes left
/// over, when two positions coincide, are appended.
pub fn assemble_narrative(script: &str, quizzes: &[Quiz]) -> String {
    let paragraphs: Vec<&str> = script
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut out = String::new();
    let mut pending = quizzes.iter().peekable();

    if paragraphs.len() < 3 {
        out.push_str(script.trim_end());
        out.push_str("\n\n");
    } else {
        let n = paragraphs.len();
        let k = quizzes.len();
        let positions: Vec<usize> = (1..=k).map(|j| j * n / (k + 1)).collect();

        for (i, paragraph) in paragraphs.iter().enumerate() {
            out.push_str(paragraph);
            out.push_str("\n\n");
            if positions.contains(&i) {
                if let Some(quiz) = pending.next() {
                    out.push_str(&quiz.to_marker_text());
                    out.push('\n');
                }
            }
        }
    }

    for quiz in pending {
        out.push_str(&quiz.to_marker_text());
        out.push('\n');
    }

    out
}

/// Reading time at 150 words per minute, in French.
pub fn estimate_duration(text: &str) -> String {
    let words = text.split_whitespace().count() as f64;
    let minutes = words / WORDS_PER_MINUTE;
    if minutes < 1.0 {
        format!("{} secondes", (minutes * 60.0) as u64)
    } else {
        format!("{:.1} minutes", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::extract_quizzes;
    use llm_client::{LlmError, MockProvider};

    fn row() -> CapsuleRow {
        CapsuleRow {
            index: 1,
            sheet_row: 2,
            competence: "1.2 Caractériser la donnée de santé".into(),
            theme: "Données de Santé".into(),
            subject: "Donnée pseudonyme".into(),
            link_cells: vec!["https://www.cnil.fr".into()],
        }
    }

    fn quiz(number: u32) -> Quiz {
        let mut q = fallback_quiz("test");
        q.number = number;
        q
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 1,
            ..Default::default()
        }
    }

    const QUIZ_JSON: &str = r#"```json
{"qcm": [
  {"question_number": 1, "situation": "S1", "question": "Q1 ?",
   "options": {"A": "a", "B": "b", "C": "c", "D": "d"},
   "correct_answer": "B", "explanation": "E1"},
  {"question_number": 2, "situation": "S2", "question": "Q2 ?",
   "options": {"A": "a", "B": "b", "C": "c", "D": "d"},
   "correct_answer": "D", "explanation": "E2"}
]}
```"#;

    #[test]
    fn test_short_script_appends_quizzes() {
        let out = assemble_narrative("Un seul paragraphe.", &[quiz(1), quiz(2)]);
        assert!(out.starts_with("Un seul paragraphe.\n\n=== QCM 1 ==="));
        assert!(out.find("=== QCM 1").unwrap() < out.find("=== QCM 2").unwrap());
    }

    #[test]
    fn test_two_quizzes_at_thirds() {
        let script = (1..=6).map(|i| format!("P{}", i)).collect::<Vec<_>>().join("\n\n");
        let out = assemble_narrative(&script, &[quiz(1), quiz(2)]);

        // 6 paragraphs: after indices 2 and 4
        let p3 = out.find("P3").unwrap();
        let q1 = out.find("=== QCM 1").unwrap();
        let p4 = out.find("P4").unwrap();
        let p5 = out.find("P5").unwrap();
        let q2 = out.find("=== QCM 2").unwrap();
        let p6 = out.find("P6").unwrap();
        assert!(p3 < q1 && q1 < p4);
        assert!(p5 < q2 && q2 < p6);
    }

    #[test]
    fn test_three_quizzes_at_quarters() {
        let script = (1..=8).map(|i| format!("P{}", i)).collect::<Vec<_>>().join("\n\n");
        let out = assemble_narrative(&script, &[quiz(1), quiz(2), quiz(3)]);

        // 8 paragraphs: after indices 2, 4 and 6
        assert!(out.find("P3").unwrap() < out.find("=== QCM 1").unwrap());
        assert!(out.find("=== QCM 1").unwrap() < out.find("P4").unwrap());
        assert!(out.find("=== QCM 2").unwrap() < out.find("P6").unwrap());
        assert!(out.find("=== QCM 3").unwrap() < out.find("P8").unwrap());
        assert!(out.find("P7").unwrap() < out.find("=== QCM 3").unwrap());
    }

    #[test]
    fn test_assembled_narrative_round_trips_through_scanner() {
        let script = (1..=5).map(|i| format!("Paragraphe {}.", i)).collect::<Vec<_>>().join("\n\n");
        let quizzes = vec![quiz(1), quiz(2), quiz(3)];
        let out = assemble_narrative(&script, &quizzes);

        let extracted = extract_quizzes(&out);
        assert_eq!(extracted.len(), 3);
        assert_eq!(extracted[2].correct_answer, "A");
        assert_eq!(extracted[0].options.len(), 4);
    }

    #[test]
    fn test_estimate_duration() {
        assert_eq!(estimate_duration(&"mot ".repeat(75)), "30 secondes");
        assert_eq!(estimate_duration(&"mot ".repeat(300)), "2.0 minutes");
        assert_eq!(estimate_duration(""), "0 secondes");
    }

    #[test]
    fn test_sources_context_caps_excerpts() {
        let sources = vec![SourceDocument {
            title: "CNIL".into(),
            url: "https://www.cnil.fr".into(),
            content: "x".repeat(3000),
        }];
        let context = sources_context(&sources);
        assert!(context.starts_with("SOURCES DOCUMENTAIRES:"));
        assert!(context.contains("SOURCE 1: CNIL\nURL: https://www.cnil.fr\n"));
        assert!(context.contains(&format!("{}...", "x".repeat(2000))));
        assert!(!context.contains(&"x".repeat(2001)));
    }

    #[tokio::test]
    async fn test_generate_with_mock_provider() {
        let script = "Introduction.\n\nPremier point.\n\nDeuxième point.\n\nConclusion.";
        let provider = MockProvider::with_responses(vec![script.into(), QUIZ_JSON.into()]);
        let generator = ContentGenerator::new(Box::new(provider), fast_retry());

        let result = generator.generate(&row(), &[]).await.unwrap();

        assert_eq!(result.quizzes.len(), 2);
        assert_eq!(result.quizzes[1].correct_answer, "D");
        assert!(result.script.contains("=== QCM 1 ==="));
        assert!(result.script.contains("=== QCM 2 ==="));
        assert!(result.script.starts_with("Introduction."));
    }

    #[tokio::test]
    async fn test_unparseable_quiz_uses_fallback() {
        let provider = MockProvider::with_responses(vec![
            "Texte.".into(),
            "Voici vos questions !".into(),
        ]);
        let generator = ContentGenerator::new(Box::new(provider), fast_retry());

        let result = generator.generate(&row(), &[]).await.unwrap();
        assert_eq!(result.quizzes.len(), 1);
        assert!(result.quizzes[0].situation.contains("Donnée pseudonyme"));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = MockProvider::fails_then_succeeds(
            2,
            LlmError::ServerOverloaded {
                status: 503,
                message: "busy".into(),
            },
            "Texte.",
        );
        let generator = ContentGenerator::new(Box::new(provider), fast_retry());

        // The second call (quiz) also answers "Texte.", so the fallback kicks in
        let result = generator.generate(&row(), &[]).await.unwrap();
        assert!(result.script.starts_with("Texte."));
    }

    #[tokio::test]
    async fn test_permanent_error_fails() {
        let provider = MockProvider::always_fails(LlmError::ApiError {
            message: "bad request".into(),
            status_code: Some(400),
        });
        let generator = ContentGenerator::new(Box::new(provider), fast_retry());
        assert!(generator.generate(&row(), &[]).await.is_err());
    }
}
