//! OpenAI-compatible chat-completions client.
//!
//! Works with any provider speaking the same API standard (hosted or local);
//! the base URL, key, and model are configuration. The engine treats whatever
//! comes back as untrusted text; coercion into a usable shape happens in the
//! handlers via `talentforge_ai::parse`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use talentforge_ai::backend::{CandidateJob, LlmBackend, LlmError, LlmResponse};

/// Prompt size caps, in characters.
const MAX_RESUME_CHARS: usize = 20_000;
const MAX_RANK_RESUME_CHARS: usize = 10_000;
const MAX_JD_CHARS: usize = 5_000;
const MAX_CANDIDATE_DESC_CHARS: usize = 200;

/// Model backend configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// e.g. `https://api.openai.com/v1` or a local vLLM/Ollama endpoint.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl LlmConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            request_timeout: Duration::from_secs(90),
        }
    }
}

/// Chat-completions client over any OpenAI-compatible endpoint.
pub struct UniversalLlmBackend {
    http: reqwest::Client,
    config: LlmConfig,
}

impl UniversalLlmBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Unreachable(e.to_string()))?;
        Ok(Self { http, config })
    }

    #[instrument(skip_all, fields(model = %self.config.model), err)]
    async fn chat(&self, system: &str, user: &str) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.2
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Rejected(format!("{status}: {detail}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("no choices in completion".to_string()))?;

        let mut llm_response = LlmResponse::new(content);
        if let Some(usage) = completion.usage {
            llm_response = llm_response.with_usage(usage.total_tokens);
        }
        Ok(llm_response)
    }
}

#[async_trait]
impl LlmBackend for UniversalLlmBackend {
    async fn analyze(
        &self,
        resume_text: &str,
        job_description: &str,
    ) -> Result<LlmResponse, LlmError> {
        let prompt = analyze_prompt(resume_text, job_description);
        self.chat(
            "You are a helpful AI career assistant. Output strict JSON.",
            &prompt,
        )
        .await
    }

    async fn rank(
        &self,
        resume_text: &str,
        candidates: &[CandidateJob],
    ) -> Result<LlmResponse, LlmError> {
        let prompt = rank_prompt(resume_text, candidates);
        self.chat("Rank jobs for the candidate. JSON only.", &prompt)
            .await
    }

    fn provider(&self) -> &str {
        &self.config.model
    }
}

fn analyze_prompt(resume_text: &str, job_description: &str) -> String {
    format!(
        r#"You are an expert ATS (Applicant Tracking System) and Career Coach.
Analyze the following resume text and provide a structured assessment.

Resume Text:
{resume}

Target Job Description (Optional):
{jd}

Output properly formatted JSON matching this schema:
{{
    "ats_score": {{ "score": 0-100, "rationale": "..." }},
    "skills": ["..."],
    "missing_keywords": ["..."],
    "strengths": ["..."],
    "weaknesses": ["..."],
    "suggestions": ["..."],
    "summary": "..."
}}

Do not output markdown code blocks. Just the raw JSON string."#,
        resume = truncate_chars(resume_text, MAX_RESUME_CHARS),
        jd = truncate_chars(job_description, MAX_JD_CHARS),
    )
}

fn rank_prompt(resume_text: &str, candidates: &[CandidateJob]) -> String {
    let summaries: Vec<_> = candidates
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "title": c.title,
                "desc": truncate_chars(&c.description, MAX_CANDIDATE_DESC_CHARS),
            })
        })
        .collect();
    let jobs_summary = serde_json::Value::Array(summaries).to_string();

    format!(
        r#"Rank the following jobs for this candidate based on their resume.

Resume:
{resume}

Jobs:
{jobs}

Return JSON list:
[
    {{ "job_id": "...", "match_score": 0-100, "reason": "..." }}
]"#,
        resume = truncate_chars(resume_text, MAX_RANK_RESUME_CHARS),
        jobs = jobs_summary,
    )
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

// Wire types for the chat-completions response.

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Usage {
    total_tokens: i64,
}
