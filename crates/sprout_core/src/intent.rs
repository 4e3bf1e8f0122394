//! Request intent detection and slug derivation.

use serde::{Deserialize, Serialize};

/// Words of the prompt kept in a slug.
const SLUG_WORDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    Build,
    Edit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub action: IntentAction,
    pub slug: Option<String>,
    pub details: String,
}

/// Classify a request. Anything aimed at an existing slug is an edit;
/// without a slug it is a new build.
pub fn detect_intent(prompt: &str, slug: Option<&str>) -> Intent {
    let slug = slug.map(clean_slug).filter(|s| !s.is_empty());
    let action = match &slug {
        Some(_) => IntentAction::Edit,
        None => IntentAction::Build,
    };
    Intent {
        action,
        slug,
        details: prompt.to_string(),
    }
}

/// Strip surrounding whitespace and quotes from a user-supplied slug.
pub fn clean_slug(raw: &str) -> String {
    raw.trim().trim_matches(|c| c == '"' || c == '\'').to_string()
}

/// `<first six words, lower-cased, joined by _>-<unix seconds>`, keeping
/// only ASCII alphanumerics, `_` and `-`.
pub fn make_slug(prompt: &str, unix_seconds: i64) -> String {
    let base: String = prompt
        .to_lowercase()
        .split_whitespace()
        .take(SLUG_WORDS)
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let base = if base.trim_matches('_').is_empty() {
        "app".to_string()
    } else {
        base
    };
    format!("{}-{}", base, unix_seconds)
}
