use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::models::{Account, Balance, Credential, FeedItemParams, Pot, Transaction};

use super::BankingClient;

const API_BASE: &str = "https://api.monzo.com";

/// Cap on any single outbound call; a slow provider response must not
/// stall unrelated webhook deliveries.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-backed banking API adapter.
///
/// Owns the OAuth client id/secret so token exchange and refresh need only
/// the per-call inputs.
pub struct RestBankingClient {
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    client: Client,
}

#[derive(Deserialize)]
struct AccountsResponse {
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct PotsResponse {
    pots: Vec<Pot>,
}

#[derive(Deserialize)]
struct TransactionsResponse {
    transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
struct TransactionResponse {
    transaction: Transaction,
}

impl RestBankingClient {
    pub fn new(client_id: String, client_secret: SecretString) -> Self {
        Self {
            base_url: API_BASE.to_string(),
            client_id,
            client_secret,
            client: Client::new(),
        }
    }

    /// Point the adapter at a different API base, for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        access_token: &str,
    ) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        Self::read_json(response).await
    }

    async fn read_json<T>(response: reqwest::Response) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read response body")?;
        if !status.is_success() {
            anyhow::bail!("request failed ({status}): {body}");
        }
        serde_json::from_str(&body).context("failed to parse response")
    }

    async fn check_status(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("request failed ({status}): {body}");
        }
        Ok(())
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Credential> {
        let response = self
            .client
            .post(format!("{}/oauth2/token", self.base_url))
            .form(form)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("token request failed")?;
        Self::read_json(response).await
    }
}

#[async_trait::async_trait]
impl BankingClient for RestBankingClient {
    async fn list_accounts(&self, access_token: &str) -> Result<Vec<Account>> {
        let response: AccountsResponse = self.get_json("/accounts", &[], access_token).await?;
        Ok(response.accounts)
    }

    async fn balance(&self, account_id: &str, access_token: &str) -> Result<Balance> {
        self.get_json("/balance", &[("account_id", account_id)], access_token)
            .await
    }

    async fn pots(&self, access_token: &str) -> Result<Vec<Pot>> {
        let response: PotsResponse = self.get_json("/pots", &[], access_token).await?;
        Ok(response.pots)
    }

    async fn transactions_since(
        &self,
        account_id: &str,
        access_token: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Transaction>> {
        let mut query = vec![
            ("expand[]".to_string(), "merchant".to_string()),
            ("account_id".to_string(), account_id.to_string()),
        ];
        if let Some(since) = since {
            query.push((
                "since".to_string(),
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        let response = self
            .client
            .get(format!("{}/transactions", self.base_url))
            .query(&query)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("GET /transactions failed")?;
        let response: TransactionsResponse = Self::read_json(response).await?;
        Ok(response.transactions)
    }

    async fn update_transaction_metadata(
        &self,
        transaction_id: &str,
        access_token: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<Transaction> {
        let form: Vec<(String, String)> = metadata
            .iter()
            .map(|(key, value)| (format!("metadata[{key}]"), value.clone()))
            .collect();

        let response = self
            .client
            .patch(format!("{}/transactions/{transaction_id}", self.base_url))
            .form(&form)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("PATCH /transactions/{transaction_id} failed"))?;
        let response: TransactionResponse = Self::read_json(response).await?;
        Ok(response.transaction)
    }

    async fn create_feed_item(
        &self,
        account_id: &str,
        access_token: &str,
        params: &FeedItemParams,
    ) -> Result<()> {
        let form = [
            ("account_id", account_id),
            ("type", "basic"),
            ("params[title]", &params.title),
            ("params[body]", &params.body),
            ("params[image_url]", &params.image_url),
        ];

        let response = self
            .client
            .post(format!("{}/feed", self.base_url))
            .form(&form)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("POST /feed failed")?;
        Self::check_status(response).await
    }

    async fn register_webhook(
        &self,
        account_id: &str,
        access_token: &str,
        callback_url: &str,
    ) -> Result<()> {
        let form = [("account_id", account_id), ("url", callback_url)];

        let response = self
            .client
            .post(format!("{}/webhooks", self.base_url))
            .form(&form)
            .bearer_auth(access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .context("POST /webhooks failed")?;
        Self::check_status(response).await
    }

    async fn exchange_auth_code(&self, code: &str, redirect_uri: &str) -> Result<Credential> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
        .context("auth code exchange failed")
    }

    async fn refresh_credential(&self, refresh_token: &str) -> Result<Credential> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", refresh_token),
        ])
        .await
        .context("credential refresh failed")
    }
}
