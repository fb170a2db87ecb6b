use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current balance figures for one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Balance {
    pub balance: i64,
    #[serde(default)]
    pub total_balance: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub spend_today: i64,
}

/// A savings pot attached to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pot {
    pub id: String,
    pub name: String,
    pub balance: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub style: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}
