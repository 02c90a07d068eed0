//! Client for the hosted language model (Anthropic Messages API).
//!
//! Provides:
//! - Document analysis, which never fails: transport, provider and parse
//!   failures all come back as [`AnalysisOutcome::Degraded`]
//! - Conversational replies grounded in a caller-supplied context block

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::domain::{AnalysisResult, ChatMessage, ChatRole};
use crate::error::ApiError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const ANALYSIS_MAX_TOKENS: u32 = 2000;
const ANALYSIS_TEMPERATURE: f64 = 0.3;
const CHAT_MAX_TOKENS: u32 = 1500;
const CHAT_TEMPERATURE: f64 = 0.7;

/// Client for the hosted model.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// Result of [`AiClient::analyze_document`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The model produced a usable analysis.
    Complete(AnalysisResult),
    /// The model could not be consulted or understood; `fallback` is a
    /// displayable low-confidence placeholder.
    Degraded {
        fallback: AnalysisResult,
        reason: String,
    },
}

impl AnalysisOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn into_result(self) -> AnalysisResult {
        match self {
            Self::Complete(result) => result,
            Self::Degraded { fallback, .. } => fallback,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("model provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model provider returned {status}: {message}")]
    Provider { status: StatusCode, message: String },

    #[error("model reply contained no text")]
    NoText,
}

#[derive(Debug, Error)]
pub enum AnalysisParseError {
    #[error("reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("reply is not a JSON object")]
    NotAnObject,

    #[error("reply lacks a summary or confidence")]
    MissingFields,
}

/// One turn as the provider expects it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WireMessage {
    pub role: ChatRole,
    pub content: String,
}

impl WireMessage {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [WireMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Error body from the provider.
#[derive(Deserialize)]
struct ProviderErrorResponse {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

impl AiClient {
    /// Create a new client for the hosted model.
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(base_url = base_url, model = model, "AI client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Whether credentials are present. No request is made.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Send one Messages request and return the concatenated text blocks.
    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[WireMessage],
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/v1/messages", self.base_url);

        debug!(url = %url, turns = messages.len(), "Model request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&MessagesRequest {
                model: &self.model,
                max_tokens,
                temperature,
                system,
                messages,
            })
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<ProviderErrorResponse>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(CompletionError::Provider { status, message });
        }

        let body: MessagesResponse = response.json().await?;
        let text: String = body
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect();

        if text.trim().is_empty() {
            return Err(CompletionError::NoText);
        }

        Ok(text)
    }

    // =========================================================================
    // Document analysis
    // =========================================================================

    /// Analyse one document. Always yields a displayable result.
    #[instrument(skip(self, document_text), fields(text_len = document_text.len()))]
    pub async fn analyze_document(
        &self,
        document_text: &str,
        filename: &str,
        document_type: Option<&str>,
    ) -> AnalysisOutcome {
        let prompt = analysis_prompt(document_text, filename, document_type);
        let degrade = |reason: String| AnalysisOutcome::Degraded {
            fallback: AnalysisResult::fallback(document_type, document_text.chars().count()),
            reason,
        };

        let reply = match self
            .complete(
                None,
                &[WireMessage::user(prompt)],
                ANALYSIS_MAX_TOKENS,
                ANALYSIS_TEMPERATURE,
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, filename = filename, "Model call failed, using fallback analysis");
                return degrade(e.to_string());
            }
        };

        match parse_analysis_reply(&reply) {
            Ok(result) => AnalysisOutcome::Complete(result),
            Err(e) => {
                warn!(error = %e, filename = filename, "Model reply unusable, using fallback analysis");
                debug!(reply = %reply, "Unparseable model reply");
                degrade(e.to_string())
            }
        }
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Answer a chat turn. Provider failures surface as internal errors.
    #[instrument(skip(self, context, history), fields(context_len = context.len(), history_len = history.len()))]
    pub async fn chat(
        &self,
        message: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Result<String, ApiError> {
        let system = chat_system_prompt(context);
        let messages = conversation_messages(history, message);

        self.complete(Some(&system), &messages, CHAT_MAX_TOKENS, CHAT_TEMPERATURE)
            .await
            .map_err(|e| {
                error!(error = %e, "Chat completion failed");
                ApiError::Internal(anyhow::anyhow!("Chat completion failed: {}", e))
            })
    }
}

fn analysis_prompt(document_text: &str, filename: &str, document_type: Option<&str>) -> String {
    format!(
        r#"You are a senior commercial real estate underwriter with more than fifteen years of experience.
Analyze the document "{filename}" (type: {document_type}).

Document content:
{document_text}

Answer with a single JSON object using exactly this shape:

{{
  "summary": "Two or three sentences describing the document and what matters most in it",
  "key_metrics": {{
    "metric name": "value with units"
  }},
  "risks": ["Specific factors that could hurt the investment"],
  "recommendations": ["Concrete next steps for the underwriter"],
  "confidence": 0.0,
  "property_insights": {{
    "strengths": ["Strengths of the property or deal"],
    "concerns": ["Items needing attention or further diligence"]
  }},
  "financial_highlights": {{
    "revenue_items": ["Main revenue drivers"],
    "expense_items": ["Main expense categories"],
    "profitability_notes": ["Observations on profitability"]
  }}
}}

"confidence" is your confidence in the analysis, between 0 and 1.
Pay particular attention to financial performance and ratios, market position,
red flags, operating efficiency and return potential.

Return only the JSON object, with no Markdown formatting."#,
        filename = filename,
        document_type = document_type.unwrap_or("Unknown"),
        document_text = document_text,
    )
}

fn chat_system_prompt(context: &str) -> String {
    let mut system = String::from(
        "You are an experienced commercial real estate underwriting assistant. \
         Answer questions about deals, documents and their analyses clearly and concisely, \
         cite figures when they are available, and say so when the data needed to answer is missing.",
    );
    if !context.trim().is_empty() {
        system.push_str("\n\nDEAL CONTEXT:\n");
        system.push_str(context);
    }
    system
}

/// Build the provider conversation: drop empty turns and any leading
/// assistant turns, merge consecutive turns from the same speaker, and end
/// with the new user message.
pub fn conversation_messages(history: &[ChatMessage], message: &str) -> Vec<WireMessage> {
    let turns = history
        .iter()
        .map(|turn| (turn.role, turn.content.as_str()))
        .chain(std::iter::once((ChatRole::User, message)));

    let mut messages: Vec<WireMessage> = Vec::new();
    for (role, content) in turns {
        let content = content.trim();
        if content.is_empty() {
            continue;
        }
        match messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(content);
                continue;
            }
            None if role == ChatRole::Assistant => continue,
            _ => {}
        }
        messages.push(WireMessage {
            role,
            content: content.to_string(),
        });
    }
    messages
}

/// Remove a surrounding Markdown code fence (with optional language tag).
pub fn strip_code_fences(reply: &str) -> &str {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim_start();
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.trim_end();
    }
    text
}

/// Parse a model reply into an analysis. Tolerates code fences and prose
/// around the JSON object.
pub fn parse_analysis_reply(reply: &str) -> Result<AnalysisResult, AnalysisParseError> {
    let cleaned = strip_code_fences(reply);

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(err) => outermost_object(cleaned)
            .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
            .ok_or(err)?,
    };

    if !value.is_object() {
        return Err(AnalysisParseError::NotAnObject);
    }

    let result: AnalysisResult = serde_json::from_value(value)?;
    if !result.has_required_fields() {
        return Err(AnalysisParseError::MissingFields);
    }
    Ok(result)
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const GOOD_ANALYSIS: &str = r#"{
        "summary": "Twelve-unit rent roll, 92% occupied with below-market rents.",
        "key_metrics": {"Occupancy": "92%", "Average Rent": "$1,180/month"},
        "risks": ["Two leases expire within 60 days"],
        "recommendations": ["Confirm renewal probability with property manager"],
        "confidence": 0.82
    }"#;

    fn provider_reply(text: &str) -> String {
        json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-test",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        })
        .to_string()
    }

    fn client_for(server: &mockito::ServerGuard) -> AiClient {
        AiClient::new(&server.url(), "test-key", "claude-test", 5).expect("client")
    }

    #[test]
    fn strips_fences_with_and_without_language_tag() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn parses_reply_wrapped_in_prose() {
        let reply = format!("Here is the analysis you asked for:\n{}\nLet me know!", GOOD_ANALYSIS);
        let result = parse_analysis_reply(&reply).expect("parse");
        assert_eq!(result.confidence, Some(0.82));
        assert_eq!(result.risks.len(), 1);
    }

    #[test]
    fn rejects_replies_without_summary_or_confidence() {
        assert!(matches!(
            parse_analysis_reply(r#"{"risks": ["x"]}"#),
            Err(AnalysisParseError::MissingFields)
        ));
        assert!(matches!(
            parse_analysis_reply("[1, 2, 3]"),
            Err(AnalysisParseError::NotAnObject)
        ));
        assert!(matches!(
            parse_analysis_reply("I cannot analyse this document."),
            Err(AnalysisParseError::Json(_))
        ));
    }

    #[test]
    fn conversation_is_user_first_and_alternating() {
        let history = vec![
            ChatMessage::assistant("Hi! Ask me about your deals.".into(), None),
            ChatMessage {
                id: None,
                role: ChatRole::User,
                content: "What is the NOI?".into(),
                timestamp: None,
                deal_id: Some(5),
            },
            ChatMessage::assistant("".into(), None),
            ChatMessage::assistant("Roughly $410k.".into(), Some(5)),
            ChatMessage::assistant("Based on the T12.".into(), Some(5)),
        ];

        let messages = conversation_messages(&history, "And the cap rate?");

        assert_eq!(
            messages,
            vec![
                WireMessage::user("What is the NOI?"),
                WireMessage {
                    role: ChatRole::Assistant,
                    content: "Roughly $410k.\n\nBased on the T12.".into(),
                },
                WireMessage::user("And the cap rate?"),
            ]
        );
    }

    #[test]
    fn trailing_user_turn_is_merged_with_new_message() {
        let history = vec![ChatMessage {
            id: Some("1".into()),
            role: ChatRole::User,
            content: "Compare the deals.".into(),
            timestamp: None,
            deal_id: None,
        }];
        let messages = conversation_messages(&history, "Focus on risk.");
        assert_eq!(
            messages,
            vec![WireMessage::user("Compare the deals.\n\nFocus on risk.")]
        );
    }

    #[tokio::test]
    async fn analyze_document_returns_parsed_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "model": "claude-test",
                "max_tokens": 2000,
                "temperature": 0.3
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(provider_reply(&format!("```json\n{}\n```", GOOD_ANALYSIS)))
            .create_async()
            .await;

        let outcome = client_for(&server)
            .analyze_document("Unit 1A $1,150 ...", "2024_Rent_Roll.pdf", Some("rent roll"))
            .await;

        mock.assert_async().await;
        match outcome {
            AnalysisOutcome::Complete(result) => {
                assert_eq!(result.confidence, Some(0.82));
                assert_eq!(
                    result.key_metrics["Occupancy"],
                    serde_json::Value::from("92%")
                );
            }
            other => panic!("expected a complete analysis, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn provider_errors_degrade_to_fallback() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_header("content-type", "application/json")
            .with_body(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .create_async()
            .await;

        let outcome = client_for(&server)
            .analyze_document("", "empty.txt", Some("other"))
            .await;

        assert!(outcome.is_degraded());
        if let AnalysisOutcome::Degraded { reason, .. } = &outcome {
            assert!(reason.contains("Overloaded"), "reason was {}", reason);
        }
        let fallback = outcome.into_result();
        assert!(fallback.confidence.unwrap() <= 0.3);
        assert!(!fallback.risks.is_empty());
        assert!(!fallback.recommendations.is_empty());
        assert_eq!(fallback.key_metrics["Content Length"], json!("0 characters"));
    }

    #[tokio::test]
    async fn malformed_replies_degrade_to_fallback() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(provider_reply("Sorry, I can't help with that."))
            .create_async()
            .await;

        let outcome = client_for(&server)
            .analyze_document("garbage", "scan.pdf", None)
            .await;

        match outcome {
            AnalysisOutcome::Degraded { fallback, .. } => {
                assert_eq!(fallback.key_metrics["Document Type"], json!("Unknown"));
            }
            other => panic!("expected degradation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_provider_degrades_to_fallback() {
        // Nothing listens on port 9 of the loopback interface
        let client = AiClient::new("http://127.0.0.1:9", "test-key", "claude-test", 2).unwrap();
        let outcome = client.analyze_document("text", "lease.pdf", Some("lease agreement")).await;
        assert!(outcome.is_degraded());
    }

    #[tokio::test]
    async fn chat_sends_context_as_system_prompt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("DEAL CONTEXT:\\\\nDeal: Test Plaza".to_string()),
                Matcher::PartialJson(json!({
                    "messages": [{"role": "user", "content": "What is the occupancy?"}]
                })),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(provider_reply("Occupancy is 92%."))
            .create_async()
            .await;

        let reply = client_for(&server)
            .chat("What is the occupancy?", "Deal: Test Plaza (retail)", &[])
            .await
            .expect("chat reply");

        mock.assert_async().await;
        assert_eq!(reply, "Occupancy is 92%.");
    }

    #[tokio::test]
    async fn chat_failures_are_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(500)
            .create_async()
            .await;

        let err = client_for(&server)
            .chat("hello", "", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
