//! Claude-backed artifact analysis.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use cerberus_core::defaults::ANALYSIS_MAX_INPUT_CHARS;
use cerberus_core::text::truncate_chars;
use cerberus_core::{
    AnalysisBackend, AnalysisResponse, AnalysisResult, Error, Fact, Insight, Person,
    ProgramContext, Result, Summary, Topic,
};

use super::client::{ClaudeClient, ClaudeConfig};
use super::types::{ContentBlock, Message, MessagesRequest};
use crate::prompts::{analysis_user_prompt, ANALYSIS_SYSTEM_PROMPT};

/// Analysis backend calling the Anthropic Messages API.
///
/// The program context goes into a cached system block so repeated
/// analyses for one program are billed at the cached-read rate.
pub struct ClaudeAnalysisBackend {
    client: ClaudeClient,
}

impl ClaudeAnalysisBackend {
    pub fn new(config: ClaudeConfig) -> Result<Self> {
        Ok(Self {
            client: ClaudeClient::new(config)?,
        })
    }

    /// Create from environment variables. Fails if `ANTHROPIC_API_KEY` is unset.
    pub fn from_env() -> Result<Self> {
        Self::new(ClaudeConfig::from_env()?)
    }

    fn build_request(&self, text: &str, context: &ProgramContext) -> MessagesRequest {
        let config = self.client.config();
        let text = truncate_chars(text, ANALYSIS_MAX_INPUT_CHARS);
        MessagesRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system: vec![
                ContentBlock::text(ANALYSIS_SYSTEM_PROMPT),
                ContentBlock::cached_text(context.to_prompt_string()),
            ],
            messages: vec![Message::user(vec![ContentBlock::text(
                analysis_user_prompt(context, text),
            )])],
            temperature: Some(0.0),
        }
    }
}

#[async_trait]
impl AnalysisBackend for ClaudeAnalysisBackend {
    async fn analyze(&self, text: &str, context: &ProgramContext) -> Result<AnalysisResponse> {
        let request = self.build_request(text, context);
        let response = self.client.send(&request).await?;

        let raw = response.text();
        let json = strip_code_fences(&raw);
        let payload: AnalysisPayload = serde_json::from_str(json).map_err(|e| {
            debug!(response_chars = raw.len(), "Unparseable analysis response");
            Error::AiProvider(format!("failed to parse analysis response: {}", e))
        })?;

        let model = if response.model.is_empty() {
            self.client.config().model.clone()
        } else {
            response.model.clone()
        };

        Ok(AnalysisResponse {
            result: payload.into_result(),
            usage: response.usage.into(),
            model,
        })
    }

    fn model_name(&self) -> &str {
        &self.client.config().model
    }
}

/// Remove a surrounding markdown code fence, if any.
///
/// Also trims prose before the first `{` and after the last `}`.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string ("json") on the opening line.
        s = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
        s = s.trim_end();
        if let Some(inner) = s.strip_suffix("```") {
            s = inner;
        }
        s = s.trim();
    }
    match (s.find('{'), s.rfind('}')) {
        (Some(start), Some(end)) if start < end => &s[start..=end],
        _ => s,
    }
}

// =============================================================================
// RESPONSE SCHEMA
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalysisPayload {
    document_type: Option<String>,
    document_type_confidence: Option<f64>,
    summary: String,
    summary_confidence: Option<f64>,
    key_takeaways: Vec<String>,
    key_topics: Vec<TopicPayload>,
    persons_mentioned: Vec<PersonPayload>,
    facts: Vec<FactPayload>,
    insights: Vec<InsightPayload>,
    sentiment: Option<String>,
    priority: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TopicPayload {
    topic: String,
    confidence: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PersonPayload {
    name: String,
    role: Option<String>,
    organization: Option<String>,
    context: Option<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FactPayload {
    #[serde(rename = "type")]
    fact_type: String,
    key: String,
    value: serde_json::Value,
    numeric_value: Option<f64>,
    date_value: Option<String>,
    unit: Option<String>,
    confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InsightPayload {
    #[serde(rename = "type")]
    insight_type: String,
    title: String,
    description: String,
    severity: Option<String>,
    suggested_action: Option<String>,
    impacted_modules: Vec<String>,
    confidence: Option<f64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AnalysisPayload {
    fn into_result(self) -> AnalysisResult {
        AnalysisResult {
            summary: Summary {
                executive_summary: self.summary,
                key_takeaways: self.key_takeaways,
                sentiment: non_empty(self.sentiment),
                priority: self.priority.filter(|p| *p > 0),
                confidence: self.summary_confidence,
            },
            topics: self
                .key_topics
                .into_iter()
                .filter(|t| !t.topic.trim().is_empty())
                .map(|t| Topic {
                    name: t.topic,
                    confidence: t.confidence,
                })
                .collect(),
            persons: self
                .persons_mentioned
                .into_iter()
                .filter(|p| !p.name.trim().is_empty())
                .map(|p| Person {
                    name: p.name,
                    role: non_empty(p.role),
                    organization: non_empty(p.organization),
                    context: non_empty(p.context),
                    confidence: p.confidence,
                })
                .collect(),
            facts: self
                .facts
                .into_iter()
                .filter(|f| !f.key.trim().is_empty())
                .map(|f| Fact {
                    fact_type: f.fact_type,
                    key: f.key,
                    value: match f.value {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    },
                    numeric_value: f.numeric_value,
                    date_value: f
                        .date_value
                        .as_deref()
                        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok()),
                    unit: non_empty(f.unit),
                    confidence: f.confidence,
                })
                .collect(),
            insights: self
                .insights
                .into_iter()
                .filter(|i| !i.title.trim().is_empty())
                .map(|i| Insight {
                    insight_type: i.insight_type,
                    title: i.title,
                    description: i.description,
                    severity: non_empty(i.severity),
                    suggested_action: non_empty(i.suggested_action),
                    impacted_modules: i.impacted_modules,
                    confidence: i.confidence,
                })
                .collect(),
            document_type: non_empty(self.document_type),
            document_type_confidence: self.document_type_confidence,
        }
    }
}
