use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::banking::BankingClient;
use crate::models::{Account, Credential};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no account registered with id {0}")]
    AccountNotFound(String),
    #[error("no user registered with id {0}")]
    UserNotFound(String),
}

/// An authenticated user and the accounts linked to their credential.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub credential: Credential,
    pub account_ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct AccountEntry {
    account: Account,
    /// Owning user, for credential lookup when dispatching side effects.
    user_id: String,
}

/// Outcome of one credential refresh pass over all known users.
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: Vec<(String, String)>,
}

/// Holds the set of authenticated users and their linked accounts.
///
/// Lock order is users before accounts, everywhere. Account listing for an
/// upsert happens outside both locks so resyncing one user never blocks
/// lookups or resyncs for another.
pub struct Registry {
    client: Arc<dyn BankingClient>,
    users: RwLock<HashMap<String, User>>,
    accounts: RwLock<HashMap<String, AccountEntry>>,
}

impl Registry {
    pub fn new(client: Arc<dyn BankingClient>) -> Self {
        Self {
            client,
            users: RwLock::new(HashMap::new()),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Store a freshly issued credential and resync the user's account set.
    ///
    /// The credential is recorded before the account listing is attempted,
    /// so a failed resync still leaves the newest tokens in place for the
    /// next cycle. Accounts are upserted by id; closed accounts are kept
    /// and flagged rather than dropped.
    pub async fn upsert_user_and_accounts(&self, credential: Credential) -> Result<()> {
        let user_id = credential.user_id.clone();
        let access_token = credential.access_token.clone();

        {
            let mut users = self.users.write().await;
            let account_ids = users
                .get(&user_id)
                .map(|user| user.account_ids.clone())
                .unwrap_or_default();
            users.insert(
                user_id.clone(),
                User {
                    id: user_id.clone(),
                    credential,
                    account_ids,
                },
            );
        }

        let accounts = self
            .client
            .list_accounts(&access_token)
            .await
            .with_context(|| format!("failed to list accounts for user {user_id}"))?;
        info!(
            user_id = %user_id,
            accounts = accounts.len(),
            "resynced account list"
        );

        let mut users = self.users.write().await;
        let mut entries = self.accounts.write().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.account_ids = accounts.iter().map(|a| a.id.clone()).collect();
        }
        for account in accounts {
            entries.insert(
                account.id.clone(),
                AccountEntry {
                    account,
                    user_id: user_id.clone(),
                },
            );
        }

        Ok(())
    }

    /// Exchange every user's refresh token for a new credential.
    ///
    /// One user's failure never prevents attempts for the rest; a failed
    /// refresh leaves that user's stale credential in place until the next
    /// cycle.
    pub async fn refresh_all_credentials(&self) -> RefreshSummary {
        let users: Vec<User> = self.users.read().await.values().cloned().collect();
        let mut summary = RefreshSummary::default();

        for user in users {
            match self
                .client
                .refresh_credential(&user.credential.refresh_token)
                .await
            {
                Ok(credential) => match self.upsert_user_and_accounts(credential).await {
                    Ok(()) => summary.refreshed += 1,
                    Err(err) => {
                        warn!(user_id = %user.id, error = %err, "account resync failed after refresh");
                        summary.failed.push((user.id, format!("{err:#}")));
                    }
                },
                Err(err) => {
                    warn!(
                        user_id = %user.id,
                        error = %err,
                        "credential refresh failed, keeping stale credential"
                    );
                    summary.failed.push((user.id, format!("{err:#}")));
                }
            }
        }

        summary
    }

    /// Read-only lookup of the user owning the given account.
    pub async fn find_owning_user(&self, account_id: &str) -> Result<User, RegistryError> {
        let users = self.users.read().await;
        let accounts = self.accounts.read().await;
        let entry = accounts
            .get(account_id)
            .ok_or_else(|| RegistryError::AccountNotFound(account_id.to_string()))?;
        users
            .get(&entry.user_id)
            .cloned()
            .ok_or_else(|| RegistryError::UserNotFound(entry.user_id.clone()))
    }

    pub async fn user(&self, user_id: &str) -> Option<User> {
        self.users.read().await.get(user_id).cloned()
    }

    pub async fn account(&self, account_id: &str) -> Option<Account> {
        self.accounts
            .read()
            .await
            .get(account_id)
            .map(|entry| entry.account.clone())
    }

    /// The user's accounts that are still open; closed accounts stay
    /// registered but are excluded from processing.
    pub async fn open_accounts_for_user(&self, user_id: &str) -> Vec<Account> {
        let users = self.users.read().await;
        let accounts = self.accounts.read().await;
        let Some(user) = users.get(user_id) else {
            return Vec::new();
        };
        user.account_ids
            .iter()
            .filter_map(|id| accounts.get(id))
            .map(|entry| &entry.account)
            .filter(|account| account.is_open())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banking::RecordingBankingClient;
    use chrono::{TimeZone, Utc};

    fn account(id: &str, closed: bool) -> Account {
        Account {
            id: id.to_string(),
            closed,
            description: String::new(),
            created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            account_type: "uk_retail".to_string(),
            account_number: None,
            sort_code: None,
            owners: Vec::new(),
        }
    }

    fn credential(user_id: &str, access_token: &str, refresh_token: &str) -> Credential {
        Credential {
            access_token: access_token.to_string(),
            client_id: "client-1".to_string(),
            expires_in: 21600,
            refresh_token: refresh_token.to_string(),
            token_type: "Bearer".to_string(),
            user_id: user_id.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_retains_closed_accounts_but_excludes_them_from_processing() {
        let client = Arc::new(
            RecordingBankingClient::new()
                .with_accounts(vec![account("acc_open", false), account("acc_closed", true)]),
        );
        let registry = Registry::new(client);

        registry
            .upsert_user_and_accounts(credential("user_1", "tok", "ref"))
            .await
            .unwrap();

        let closed = registry.account("acc_closed").await.unwrap();
        assert!(closed.closed);

        let open = registry.open_accounts_for_user("user_1").await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "acc_open");
    }

    #[tokio::test]
    async fn find_owning_user_resolves_and_misses_are_typed() {
        let client =
            Arc::new(RecordingBankingClient::new().with_accounts(vec![account("acc_1", false)]));
        let registry = Registry::new(client);
        registry
            .upsert_user_and_accounts(credential("user_1", "tok", "ref"))
            .await
            .unwrap();

        let user = registry.find_owning_user("acc_1").await.unwrap();
        assert_eq!(user.id, "user_1");
        assert_eq!(user.credential.access_token, "tok");

        let err = registry.find_owning_user("acc_missing").await.unwrap_err();
        assert_eq!(
            err,
            RegistryError::AccountNotFound("acc_missing".to_string())
        );
    }

    #[tokio::test]
    async fn refresh_continues_past_individual_failures() {
        let client = Arc::new(
            RecordingBankingClient::new()
                .with_accounts(vec![account("acc_1", false)])
                .with_credential("code-1", credential("user_1", "tok-1", "ref-1"))
                .with_credential("code-2", credential("user_2", "tok-2", "ref-2"))
                .with_credential_error("ref-1", "token revoked")
                .with_credential("ref-2", credential("user_2", "tok-2b", "ref-2b")),
        );
        let registry = Registry::new(client.clone());

        registry
            .upsert_user_and_accounts(
                client.exchange_auth_code("code-1", "unused").await.unwrap(),
            )
            .await
            .unwrap();
        registry
            .upsert_user_and_accounts(
                client.exchange_auth_code("code-2", "unused").await.unwrap(),
            )
            .await
            .unwrap();

        let summary = registry.refresh_all_credentials().await;
        assert_eq!(summary.refreshed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "user_1");

        // The failed user keeps the stale credential; the other is replaced.
        let stale = registry.user("user_1").await.unwrap();
        assert_eq!(stale.credential.access_token, "tok-1");
        let fresh = registry.user("user_2").await.unwrap();
        assert_eq!(fresh.credential.access_token, "tok-2b");
    }

    #[tokio::test]
    async fn failed_resync_reports_error_but_keeps_new_credential() {
        let client = Arc::new(RecordingBankingClient::new().with_failing_accounts());
        let registry = Registry::new(client);

        let err = registry
            .upsert_user_and_accounts(credential("user_1", "tok", "ref"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("user_1"));

        let user = registry.user("user_1").await.unwrap();
        assert_eq!(user.credential.access_token, "tok");
        assert!(user.account_ids.is_empty());
    }
}
