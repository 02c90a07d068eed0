use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Deal lifecycle status.
///
/// Moves `draft → uploaded → analyzing → completed` as documents are
/// uploaded and analysed; `analyzing → uploaded` only on a failed run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    #[default]
    Draft,
    Uploaded,
    Analyzing,
    Completed,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Uploaded => "uploaded",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
        }
    }

    /// Unknown database values fall back to `draft`.
    pub fn parse(s: &str) -> Self {
        match s {
            "uploaded" => Self::Uploaded,
            "analyzing" => Self::Analyzing,
            "completed" => Self::Completed,
            _ => Self::Draft,
        }
    }
}

impl std::fmt::Display for DealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Property category of a deal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Multifamily,
    Retail,
    Office,
    Industrial,
    MixedUse,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Multifamily => "multifamily",
            Self::Retail => "retail",
            Self::Office => "office",
            Self::Industrial => "industrial",
            Self::MixedUse => "mixed_use",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "multifamily" => Some(Self::Multifamily),
            "retail" => Some(Self::Retail),
            "office" => Some(Self::Office),
            "industrial" => Some(Self::Industrial),
            "mixed_use" | "mixed use" => Some(Self::MixedUse),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deal entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deal {
    pub id: i32,
    pub name: String,
    pub property_type: Option<PropertyType>,
    pub address: Option<String>,
    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request DTO for creating a deal
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDealRequest {
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Request DTO for editing a deal.
///
/// `property_type` and `address` replace the stored values; a missing
/// `status` keeps the current one.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDealRequest {
    pub name: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub property_type: Option<PropertyType>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub status: Option<DealStatus>,
}

/// HTML forms send `""` for "no selection".
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<PropertyType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => PropertyType::parse(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown property type '{}'", value))),
    }
}
