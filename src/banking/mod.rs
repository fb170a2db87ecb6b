mod mock;
mod rest;

pub use mock::RecordingBankingClient;
pub use rest::RestBankingClient;

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Account, Balance, Credential, FeedItemParams, Pot, Transaction};

/// The provider API surface the core consumes.
///
/// Implemented by the HTTP-backed adapter for real use and by
/// [`RecordingBankingClient`] for tests.
#[async_trait::async_trait]
pub trait BankingClient: Send + Sync {
    async fn list_accounts(&self, access_token: &str) -> Result<Vec<Account>>;

    async fn balance(&self, account_id: &str, access_token: &str) -> Result<Balance>;

    async fn pots(&self, access_token: &str) -> Result<Vec<Pot>>;

    /// Transactions for one account, optionally restricted to those created
    /// at or after `since`. Merchant details are expanded.
    async fn transactions_since(
        &self,
        account_id: &str,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>>;

    async fn update_transaction_metadata(
        &self,
        transaction_id: &str,
        access_token: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Transaction>;

    async fn create_feed_item(
        &self,
        account_id: &str,
        access_token: &str,
        params: &FeedItemParams,
    ) -> Result<()>;

    async fn register_webhook(
        &self,
        account_id: &str,
        access_token: &str,
        callback_url: &str,
    ) -> Result<()>;

    async fn exchange_auth_code(&self, code: &str, redirect_uri: &str) -> Result<Credential>;

    async fn refresh_credential(&self, refresh_token: &str) -> Result<Credential>;
}
