use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single transaction, delivered by webhook push or fetched on backfill.
///
/// Immutable once received; the spend accumulator references it by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub account_id: String,
    /// Signed amount in minor currency units; negative = outgoing spend.
    pub amount: i64,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<Merchant>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub is_load: bool,
    #[serde(default)]
    pub settled: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
}

impl Transaction {
    pub fn new(
        id: impl Into<String>,
        account_id: impl Into<String>,
        amount: i64,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            account_id: account_id.into(),
            amount,
            created,
            currency: String::new(),
            description: String::new(),
            merchant: None,
            notes: String::new(),
            is_load: false,
            settled: String::new(),
            category: String::new(),
            decline_reason: None,
        }
    }

    pub fn with_merchant(mut self, merchant: Merchant) -> Self {
        self.merchant = Some(merchant);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Merchant details, present when the provider expands them on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub logo: String,
}

impl Merchant {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            category: String::new(),
            emoji: String::new(),
            logo: String::new(),
        }
    }
}
