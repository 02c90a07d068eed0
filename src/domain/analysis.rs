//! Structured output of a document analysis.
//!
//! Model replies are free-form JSON, so every field is optional on read and
//! tolerant of `null`. Consumers must not assume any list is populated.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Confidence attached to the fallback result produced when the model call fails.
pub const FALLBACK_CONFIDENCE: f64 = 0.2;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    #[serde(default)]
    pub summary: Option<String>,
    /// Label to string-or-number value.
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_metrics: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub risks: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommendations: Vec<String>,
    /// Probability-like score in [0, 1].
    #[serde(default, deserialize_with = "confidence_score")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub property_insights: Option<PropertyInsights>,
    #[serde(default)]
    pub financial_highlights: Option<FinancialHighlights>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PropertyInsights {
    #[serde(default, deserialize_with = "null_as_default")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub concerns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FinancialHighlights {
    #[serde(default, deserialize_with = "null_as_default")]
    pub revenue_items: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expense_items: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub profitability_notes: Vec<String>,
}

impl AnalysisResult {
    /// Whether the reply carries the minimum a displayable analysis needs.
    pub fn has_required_fields(&self) -> bool {
        self.summary
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
            && self.confidence.is_some()
    }

    /// Low-confidence placeholder returned when the model could not be consulted
    /// or its reply could not be understood.
    pub fn fallback(document_type: Option<&str>, content_len: usize) -> Self {
        let mut key_metrics = Map::new();
        key_metrics.insert(
            "Analysis Status".to_string(),
            Value::from("Partial - Technical Issue"),
        );
        key_metrics.insert(
            "Document Type".to_string(),
            Value::from(document_type.unwrap_or("Unknown")),
        );
        key_metrics.insert(
            "Content Length".to_string(),
            Value::from(format!("{} characters", content_len)),
        );

        Self {
            summary: Some(
                "Document analysis completed with technical limitations. Manual review recommended."
                    .to_string(),
            ),
            key_metrics,
            risks: vec![
                "Could not complete full AI analysis due to technical issues".to_string(),
                "Manual review of document is strongly recommended".to_string(),
            ],
            recommendations: vec![
                "Conduct manual review of this document".to_string(),
                "Verify all financial figures independently".to_string(),
                "Consider re-running analysis after technical issues are resolved".to_string(),
            ],
            confidence: Some(FALLBACK_CONFIDENCE),
            property_insights: Some(PropertyInsights {
                strengths: vec!["Document successfully uploaded and stored".to_string()],
                concerns: vec!["AI analysis incomplete due to technical limitations".to_string()],
            }),
            financial_highlights: Some(FinancialHighlights {
                revenue_items: vec!["Analysis incomplete".to_string()],
                expense_items: vec!["Analysis incomplete".to_string()],
                profitability_notes: vec!["Manual review required".to_string()],
            }),
        }
    }
}

/// Render a metric value without JSON quoting for strings.
pub fn metric_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "N/A".to_string(),
        other => other.to_string(),
    }
}

/// Map a raw model score into [0, 1]. Scores in (1, 100] are read as percentages.
pub fn normalize_confidence(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let scaled = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    Some(scaled.clamp(0.0, 1.0))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn confidence_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    // Models occasionally quote numbers ("0.85") or answer in percent ("85%").
    let raw = Option::<Value>::deserialize(deserializer)?;
    let score = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score.and_then(normalize_confidence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_reply() {
        let result: AnalysisResult = serde_json::from_str(
            r#"{
                "summary": "Stabilised retail centre with 94% occupancy.",
                "key_metrics": {"Occupancy": "94%", "Units": 42},
                "risks": ["Anchor tenant lease expires in 2026"],
                "recommendations": ["Obtain tenant estoppels"],
                "confidence": 0.85,
                "property_insights": {"strengths": ["Strong anchor"], "concerns": []},
                "financial_highlights": {
                    "revenue_items": ["Base rent"],
                    "expense_items": ["CAM"],
                    "profitability_notes": ["NOI margin 61%"]
                }
            }"#,
        )
        .unwrap();

        assert!(result.has_required_fields());
        assert_eq!(result.confidence, Some(0.85));
        assert_eq!(metric_display(&result.key_metrics["Units"]), "42");
        assert_eq!(metric_display(&result.key_metrics["Occupancy"]), "94%");
        assert_eq!(
            result.financial_highlights.unwrap().profitability_notes,
            vec!["NOI margin 61%".to_string()]
        );
    }

    #[test]
    fn tolerates_nulls_and_missing_sections() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"summary":"ok","risks":null,"key_metrics":null}"#).unwrap();
        assert!(result.risks.is_empty());
        assert!(result.key_metrics.is_empty());
        assert!(result.property_insights.is_none());
        assert!(!result.has_required_fields(), "confidence is missing");
    }

    #[test]
    fn confidence_is_normalised_into_unit_interval() {
        let pct: AnalysisResult = serde_json::from_str(r#"{"confidence": 85}"#).unwrap();
        assert_eq!(pct.confidence, Some(0.85));

        let quoted: AnalysisResult = serde_json::from_str(r#"{"confidence": "72%"}"#).unwrap();
        assert_eq!(quoted.confidence, Some(0.72));

        let wild: AnalysisResult = serde_json::from_str(r#"{"confidence": 4200}"#).unwrap();
        assert_eq!(wild.confidence, Some(1.0));

        let negative: AnalysisResult = serde_json::from_str(r#"{"confidence": -3}"#).unwrap();
        assert_eq!(negative.confidence, Some(0.0));
    }

    #[test]
    fn fallback_signals_degradation() {
        let fallback = AnalysisResult::fallback(Some("rent roll"), 1234);
        assert!(fallback.confidence.unwrap() <= 0.3);
        assert_eq!(fallback.risks.len(), 2);
        assert!(!fallback.recommendations.is_empty());
        assert_eq!(
            fallback.key_metrics["Content Length"],
            Value::from("1234 characters")
        );
        assert_eq!(fallback.key_metrics["Document Type"], Value::from("rent roll"));
    }
}
