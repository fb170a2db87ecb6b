//! Canned-response banking client for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Account, Balance, Credential, FeedItemParams, Pot, Transaction};

use super::BankingClient;

/// Test double that serves canned data and records every side-effecting
/// call it receives.
#[derive(Default)]
pub struct RecordingBankingClient {
    accounts: Mutex<Vec<Account>>,
    pots: Mutex<Vec<Pot>>,
    transactions: Mutex<Vec<Transaction>>,
    /// Credentials handed out for an auth code or refresh token key.
    credentials: Mutex<HashMap<String, Result<Credential, String>>>,
    accounts_failing: AtomicBool,
    feed_items_failing: AtomicBool,
    metadata_updates_failing: AtomicBool,
    feed_items: Mutex<Vec<(String, FeedItemParams)>>,
    metadata_updates: Mutex<Vec<(String, HashMap<String, String>)>>,
    webhooks: Mutex<Vec<(String, String)>>,
    transaction_requests: Mutex<Vec<(String, Option<DateTime<Utc>>)>>,
}

impl RecordingBankingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(self, accounts: Vec<Account>) -> Self {
        *self.accounts.lock().expect("accounts lock poisoned") = accounts;
        self
    }

    pub fn with_pots(self, pots: Vec<Pot>) -> Self {
        *self.pots.lock().expect("pots lock poisoned") = pots;
        self
    }

    pub fn with_transactions(self, transactions: Vec<Transaction>) -> Self {
        *self
            .transactions
            .lock()
            .expect("transactions lock poisoned") = transactions;
        self
    }

    /// Serve `credential` for the given auth code or refresh token.
    pub fn with_credential(self, key: impl Into<String>, credential: Credential) -> Self {
        self.credentials
            .lock()
            .expect("credentials lock poisoned")
            .insert(key.into(), Ok(credential));
        self
    }

    /// Fail token exchange for the given auth code or refresh token.
    pub fn with_credential_error(self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.credentials
            .lock()
            .expect("credentials lock poisoned")
            .insert(key.into(), Err(message.into()));
        self
    }

    pub fn with_failing_accounts(self) -> Self {
        self.accounts_failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_feed_items(self) -> Self {
        self.feed_items_failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_metadata_updates(self) -> Self {
        self.metadata_updates_failing.store(true, Ordering::SeqCst);
        self
    }

    pub fn recorded_feed_items(&self) -> Vec<(String, FeedItemParams)> {
        self.feed_items.lock().expect("feed items lock poisoned").clone()
    }

    pub fn recorded_metadata_updates(&self) -> Vec<(String, HashMap<String, String>)> {
        self.metadata_updates
            .lock()
            .expect("metadata updates lock poisoned")
            .clone()
    }

    pub fn recorded_webhooks(&self) -> Vec<(String, String)> {
        self.webhooks.lock().expect("webhooks lock poisoned").clone()
    }

    pub fn recorded_transaction_requests(&self) -> Vec<(String, Option<DateTime<Utc>>)> {
        self.transaction_requests
            .lock()
            .expect("transaction requests lock poisoned")
            .clone()
    }

    fn credential_for(&self, key: &str) -> Result<Credential> {
        match self
            .credentials
            .lock()
            .expect("credentials lock poisoned")
            .get(key)
        {
            Some(Ok(credential)) => Ok(credential.clone()),
            Some(Err(message)) => anyhow::bail!("{message}"),
            None => anyhow::bail!("no credential configured for {key}"),
        }
    }
}

#[async_trait::async_trait]
impl BankingClient for RecordingBankingClient {
    async fn list_accounts(&self, _access_token: &str) -> Result<Vec<Account>> {
        if self.accounts_failing.load(Ordering::SeqCst) {
            anyhow::bail!("account listing unavailable");
        }
        Ok(self.accounts.lock().expect("accounts lock poisoned").clone())
    }

    async fn balance(&self, _account_id: &str, _access_token: &str) -> Result<Balance> {
        Ok(Balance::default())
    }

    async fn pots(&self, _access_token: &str) -> Result<Vec<Pot>> {
        Ok(self.pots.lock().expect("pots lock poisoned").clone())
    }

    async fn transactions_since(
        &self,
        account_id: &str,
        _access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>> {
        self.transaction_requests
            .lock()
            .expect("transaction requests lock poisoned")
            .push((account_id.to_string(), since));

        let transactions = self
            .transactions
            .lock()
            .expect("transactions lock poisoned")
            .iter()
            .filter(|t| t.account_id == account_id)
            .filter(|t| since.is_none_or(|since| t.created >= since))
            .cloned()
            .collect();
        Ok(transactions)
    }

    async fn update_transaction_metadata(
        &self,
        transaction_id: &str,
        _access_token: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Transaction> {
        if self.metadata_updates_failing.load(Ordering::SeqCst) {
            anyhow::bail!("metadata update unavailable");
        }
        self.metadata_updates
            .lock()
            .expect("metadata updates lock poisoned")
            .push((transaction_id.to_string(), metadata.clone()));

        let existing = self
            .transactions
            .lock()
            .expect("transactions lock poisoned")
            .iter()
            .find(|t| t.id == transaction_id)
            .cloned();
        let notes = metadata.get("notes").cloned().unwrap_or_default();
        Ok(existing
            .unwrap_or_else(|| Transaction::new(transaction_id, "", 0, Utc::now()))
            .with_notes(notes))
    }

    async fn create_feed_item(
        &self,
        account_id: &str,
        _access_token: &str,
        params: &FeedItemParams,
    ) -> Result<()> {
        if self.feed_items_failing.load(Ordering::SeqCst) {
            anyhow::bail!("feed item creation unavailable");
        }
        self.feed_items
            .lock()
            .expect("feed items lock poisoned")
            .push((account_id.to_string(), params.clone()));
        Ok(())
    }

    async fn register_webhook(
        &self,
        account_id: &str,
        _access_token: &str,
        callback_url: &str,
    ) -> Result<()> {
        self.webhooks
            .lock()
            .expect("webhooks lock poisoned")
            .push((account_id.to_string(), callback_url.to_string()));
        Ok(())
    }

    async fn exchange_auth_code(&self, code: &str, _redirect_uri: &str) -> Result<Credential> {
        self.credential_for(code)
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<Credential> {
        self.credential_for(refresh_token)
    }
}
