//! Source gathering: spreadsheet link cells → fetched page text.

use crate::retry::{with_retry, RetryPolicy, Retryable};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Below this many characters a page is probably a shell or an error page.
const SHORT_CONTENT_CHARS: usize = 100;

const CNIL_BASE: &str = "https://www.cnil.fr";

/// Definitions the CNIL site publishes at stable paths.
const CNIL_KNOWN_PAGES: &[(&str, &str)] = &[
    ("donnée sensible", "/fr/definition/donnee-sensible"),
    ("données de santé", "/fr/definition/donnee-de-sante"),
    ("donnée à caractère personnel", "/fr/definition/donnee-caractere-personnel"),
    ("pseudonymisation", "/fr/definition/pseudonymisation"),
    ("anonymisation", "/fr/definition/anonymisation"),
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            FetchError::Http { status, .. } => policy.retries_status(*status),
            FetchError::Network(_) => true,
            FetchError::InvalidUrl(_) => false,
        }
    }
}

/// `[scrape]` section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeSettings {
    pub timeout_secs: u64,
    /// Page text is cut at this many characters
    pub max_chars: usize,
    pub user_agent: String,
    /// Wrap width handed to the HTML renderer
    pub render_width: usize,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_chars: 10_000,
            user_agent: BROWSER_USER_AGENT.to_string(),
            render_width: 1000,
        }
    }
}

/// Text of one fetched page, ready for the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Turn a link cell into a fetchable URL.
///
/// A cell holding an absolute http(s) URL is used as is. Anything else is
/// treated as a description and mapped to a site search: CNIL, Légifrance
/// and Service-Public get their own search pages, the rest goes to
/// DuckDuckGo. Text after a `|` is ignored for the query.
pub fn resolve_link(cell: &str) -> Option<String> {
    let text = cell.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(text) {
        if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
            return Some(url.into());
        }
    }

    let lower = text.to_lowercase();
    let query = text.split('|').next().unwrap_or(text).trim();

    if lower.contains("cnil") {
        if let Some((_, path)) = CNIL_KNOWN_PAGES.iter().find(|(p, _)| lower.contains(p)) {
            return Some(format!("{}{}", CNIL_BASE, path));
        }
        search_url(&format!("{}/fr/rechercher", CNIL_BASE), "search", query)
    } else if lower.contains("legifrance") {
        search_url(
            "https://www.legifrance.gouv.fr/search/all?tab=all&searchField=ALL",
            "query",
            query,
        )
    } else if lower.contains("service-public") {
        search_url("https://www.service-public.fr/recherche", "keyword", query)
    } else {
        search_url("https://duckduckgo.com/", "q", query)
    }
}

fn search_url(base: &str, param: &str, query: &str) -> Option<String> {
    let mut url = Url::parse(base).ok()?;
    url.query_pairs_mut().append_pair(param, query);
    Some(url.into())
}

static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

static MAIN_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:main|article)\b[^>]*>(.*)</(?:main|article)>").unwrap()
});

/// Page furniture dropped before rendering. The regex crate has no
/// backreferences, so one pattern per tag.
static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "nav", "footer", "aside", "header"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b.*?</{tag}\s*>")).unwrap())
        .collect()
});

static DISALLOWED_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\w\s.,;:!?()\-'"]"#).unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Extract `(title, text)` from an HTML page.
pub fn extract_text(html: &str, settings: &ScrapeSettings) -> (Option<String>, String) {
    let title = TITLE
        .captures(html)
        .map(|c| WHITESPACE.replace_all(c[1].trim(), " ").into_owned())
        .filter(|t| !t.is_empty());

    let mut page = html.to_string();
    for re in BOILERPLATE.iter() {
        page = re.replace_all(&page, " ").into_owned();
    }

    let main = MAIN_CONTENT
        .captures(&page)
        .map(|c| c[1].to_string())
        .unwrap_or(page);

    let rendered = html2text::from_read(main.as_bytes(), settings.render_width.max(20));
    (title, clean_text(&rendered, settings.max_chars))
}

/// Collapse whitespace, drop decorative characters and cap the length.
pub fn clean_text(text: &str, max_chars: usize) -> String {
    let filtered = DISALLOWED_CHARS.replace_all(text, " ");
    let collapsed = WHITESPACE.replace_all(&filtered, " ");
    let trimmed = collapsed.trim();

    if trimmed.chars().count() > max_chars {
        log::info!("Content truncated to {} characters", max_chars);
        let mut cut: String = trimmed.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    } else {
        trimmed.to_string()
    }
}

/// HTTP fetcher for the reference pages of a capsule.
pub struct Scraper {
    client: Client,
    settings: ScrapeSettings,
    retry: RetryPolicy,
}

impl Scraper {
    pub fn new(settings: ScrapeSettings, retry: RetryPolicy) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            settings,
            retry,
        })
    }

    /// Fetch one page and reduce it to text.
    pub async fn fetch(&self, url: &str) -> Result<SourceDocument, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        log::info!("Fetching {}", url);

        let what = format!("fetch {}", url);
        let html = with_retry(&self.retry, &what, || self.get_page(parsed.clone())).await?;

        let (title, content) = extract_text(&html, &self.settings);
        let chars = content.chars().count();
        if chars < SHORT_CONTENT_CHARS {
            log::warn!("Very short content from {}: {} characters", url, chars);
        } else {
            log::info!("Extracted {} characters from {}", chars, url);
        }

        Ok(SourceDocument {
            title: title.unwrap_or_else(|| url.to_string()),
            url: url.to_string(),
            content,
        })
    }

    async fn get_page(&self, url: Url) -> Result<String, FetchError> {
        let display = url.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: display,
            });
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))
    }

    /// Resolve and fetch every link cell; failures are logged and skipped.
    pub async fn gather(&self, link_cells: &[String]) -> Vec<SourceDocument> {
        let mut sources = Vec::new();

        for cell in link_cells {
            let Some(url) = resolve_link(cell) else {
                continue;
            };
            match self.fetch(&url).await {
                Ok(doc) if !doc.content.is_empty() => sources.push(doc),
                Ok(_) => log::warn!("No content extracted from {}", url),
                Err(e) => log::error!("Could not fetch {}: {}", url, e),
            }
        }

        sources
    }
}
