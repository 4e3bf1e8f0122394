//! The generative collaborator behind the spec, plan, scaffold and fix stages.
//!
//! Stages only depend on the [`Generator`] trait. [`TemplateGenerator`]
//! answers deterministically from built-in defaults; [`ScriptedGenerator`]
//! replays queued outputs per role and records every request.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Which stage is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Spec,
    Plan,
    Scaffold,
    Fix,
}

/// A request to the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub role: Role,
    pub prompt: String,
    /// Structured inputs such as the spec, plan or last error
    pub context: Value,
}

impl ProposalRequest {
    pub fn new(role: Role, prompt: impl Into<String>) -> Self {
        Self {
            role,
            prompt: prompt.into(),
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

/// What the collaborator proposes. Stages consume `output` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub output: Value,
    #[serde(default)]
    pub tools: Map<String, Value>,
}

impl Proposal {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            tools: Map::new(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn propose(&self, request: &ProposalRequest) -> CoreResult<Proposal>;
}

/// Spec used when the collaborator gives nothing usable.
pub fn default_spec() -> Value {
    json!({"entities": [], "pages": ["/"], "features": [], "components": []})
}

/// Plan used when the collaborator gives nothing usable.
pub fn default_plan() -> Value {
    json!([{"id": "default_task", "description": "Default task", "files": ["pages/index.js"]}])
}

/// Minimal Next.js + Tailwind project written when scaffolding gets no files.
pub fn default_file_map() -> Value {
    json!({
        "pages/index.js": "import Head from 'next/head';\n\nexport default function Home() {\n  return (\n    <div className=\"min-h-screen bg-gray-100 p-6\">\n      <Head>\n        <title>Default Dashboard</title>\n      </Head>\n      <main>\n        <h1 className=\"text-2xl font-bold\">Default Content</h1>\n      </main>\n    </div>\n  );\n}",
        "package.json": "{\n  \"name\": \"sprout-app\",\n  \"version\": \"0.1.0\",\n  \"private\": true,\n  \"scripts\": {\n    \"dev\": \"next dev -p 3000\",\n    \"build\": \"next build\",\n    \"start\": \"next start -p 3000\"\n  },\n  \"dependencies\": {\n    \"next\": \"^15.5.3\",\n    \"react\": \"^19.1.1\",\n    \"react-dom\": \"^19.1.1\"\n  },\n  \"devDependencies\": {\n    \"tailwindcss\": \"^3.4.10\",\n    \"autoprefixer\": \"^10.4.20\",\n    \"postcss\": \"^8.4.41\"\n  }\n}",
        "tailwind.config.js": "module.exports = {\n  content: [\n    \"./pages/**/*.{js,ts,jsx,tsx}\",\n    \"./components/**/*.{js,ts,jsx,tsx}\",\n    \"./app/**/*.{js,ts,jsx,tsx}\"\n  ],\n  theme: {\n    extend: {}\n  },\n  plugins: [],\n};",
        "styles/globals.css": "@tailwind base;\n@tailwind components;\n@tailwind utilities;"
    })
}

/// Parse collaborator text as JSON, tolerating a surrounding markdown fence.
pub fn parse_json_output(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let body = trimmed.strip_prefix("```")?;
    let body = body.strip_suffix("```")?;
    // Drop an info string such as `json` on the opening fence line.
    let body = match body.find('\n') {
        Some(newline) if !body[..newline].trim_start().starts_with(['{', '[']) => &body[newline + 1..],
        _ => body,
    };
    serde_json::from_str(body.trim()).ok()
}

/// Deterministic generator answering every role from the built-in defaults.
///
/// Fix requests get an empty mapping, so a failing build is never patched.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    async fn propose(&self, request: &ProposalRequest) -> CoreResult<Proposal> {
        let output = match request.role {
            Role::Spec => default_spec(),
            Role::Plan => default_plan(),
            Role::Scaffold => default_file_map(),
            Role::Fix => json!({}),
        };
        Ok(Proposal::new(output))
    }
}

/// Scripted answer for one request.
#[derive(Debug, Clone)]
pub enum Scripted {
    Output(Value),
    Failure(String),
}

/// Generator that replays queued outputs per role and records requests.
///
/// A role with nothing queued answers like [`TemplateGenerator`].
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    queues: Arc<Mutex<HashMap<Role, VecDeque<Scripted>>>>,
    requests: Arc<Mutex<Vec<ProposalRequest>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an output for the next request with `role`.
    pub async fn push(&self, role: Role, output: Value) {
        self.queues
            .lock()
            .await
            .entry(role)
            .or_default()
            .push_back(Scripted::Output(output));
    }

    /// Queue a failure for the next request with `role`.
    pub async fn push_failure(&self, role: Role, message: impl Into<String>) {
        self.queues
            .lock()
            .await
            .entry(role)
            .or_default()
            .push_back(Scripted::Failure(message.into()));
    }

    /// All requests seen so far, in order.
    pub async fn requests(&self) -> Vec<ProposalRequest> {
        self.requests.lock().await.clone()
    }

    /// Requests seen for `role`.
    pub async fn requests_for(&self, role: Role) -> Vec<ProposalRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn propose(&self, request: &ProposalRequest) -> CoreResult<Proposal> {
        self.requests.lock().await.push(request.clone());

        let next = self
            .queues
            .lock()
            .await
            .get_mut(&request.role)
            .and_then(|queue| queue.pop_front());

        match next {
            Some(Scripted::Output(output)) => {
                debug!("Scripted {:?} output", request.role);
                Ok(Proposal::new(output))
            }
            Some(Scripted::Failure(message)) => Err(CoreError::Generator(message)),
            None => TemplateGenerator.propose(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_output() {
        assert_eq!(parse_json_output(" {\"a\": 1} "), Some(json!({"a": 1})));
        assert_eq!(parse_json_output("```json\n[1, 2]\n```"), Some(json!([1, 2])));
        assert_eq!(parse_json_output("```{\"b\": true}```"), Some(json!({"b": true})));
        assert_eq!(parse_json_output("not json"), None);
    }

    #[tokio::test]
    async fn test_template_generator_defaults() {
        let generator = TemplateGenerator::new();

        let spec = generator.propose(&ProposalRequest::new(Role::Spec, "x")).await.unwrap();
        assert_eq!(spec.output, default_spec());

        let files = generator.propose(&ProposalRequest::new(Role::Scaffold, "x")).await.unwrap();
        let files = files.output.as_object().unwrap();
        assert!(files.contains_key("package.json"));
        assert!(files.contains_key("styles/globals.css"));

        let fix = generator.propose(&ProposalRequest::new(Role::Fix, "x")).await.unwrap();
        assert_eq!(fix.output, json!({}));
    }

    #[tokio::test]
    async fn test_scripted_generator_replays_then_falls_back() {
        let generator = ScriptedGenerator::new();
        generator.push(Role::Fix, json!({"package.json": "{}"})).await;
        generator.push_failure(Role::Fix, "rate limited").await;

        let request = ProposalRequest::new(Role::Fix, "fix it");
        assert_eq!(
            generator.propose(&request).await.unwrap().output,
            json!({"package.json": "{}"})
        );
        assert!(matches!(
            generator.propose(&request).await,
            Err(CoreError::Generator(_))
        ));
        assert_eq!(generator.propose(&request).await.unwrap().output, json!({}));
        assert_eq!(generator.requests_for(Role::Fix).await.len(), 3);
    }
}
