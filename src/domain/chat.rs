//! Chat DTOs. Conversations live in the browser; the full history comes
//! back with every request and nothing is persisted here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: ChatRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_id")]
    pub deal_id: Option<i32>,
}

impl ChatMessage {
    /// Assistant turn stamped by the server.
    pub fn assistant(content: String, deal_id: Option<i32>) -> Self {
        Self {
            id: Some(uuid::Uuid::new_v4().to_string()),
            role: ChatRole::Assistant,
            content,
            timestamp: Some(Utc::now()),
            deal_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub deal_id: Option<i32>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    pub is_deals_page: bool,
    #[serde(default)]
    pub is_analysis_page: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub message: ChatMessage,
}

/// Route params reach the browser as strings, so accept `5` and `"5"` alike.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Ok(n.as_i64().and_then(|v| i32::try_from(v).ok())),
        Some(Value::String(s)) => Ok(s.trim().parse().ok()),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_string_or_numeric_deal_id() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"message":"hi","dealId":"5","isAnalysisPage":true}"#).unwrap();
        assert_eq!(req.deal_id, Some(5));
        assert!(req.is_analysis_page);
        assert!(!req.is_deals_page);

        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi","dealId":7}"#).unwrap();
        assert_eq!(req.deal_id, Some(7));

        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi","dealId":null}"#).unwrap();
        assert_eq!(req.deal_id, None);
    }

    #[test]
    fn history_entries_only_need_role_and_content() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"message":"and the cap rate?","conversationHistory":[
                {"role":"user","content":"Summarise the deal"},
                {"role":"assistant","content":"It is a retail strip."}
            ]}"#,
        )
        .unwrap();
        assert_eq!(req.conversation_history.len(), 2);
        assert_eq!(req.conversation_history[1].role, ChatRole::Assistant);
    }
}
