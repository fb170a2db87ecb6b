use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bank account as reported by the provider's account listing.
///
/// Closed accounts stay in the registry so lookups keep working for
/// historical events, but they are excluded from processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_code: Option<String>,
    #[serde(default)]
    pub owners: Vec<Owner>,
}

impl Account {
    pub fn is_open(&self) -> bool {
        !self.closed
    }
}

/// Informational owner entry attached to an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub user_id: String,
    #[serde(default)]
    pub preferred_name: String,
    #[serde(default)]
    pub preferred_first_name: String,
}
