use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::banking::BankingClient;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::models::FeedItemParams;
use crate::processor::Processor;
use crate::registry::Registry;

const REFRESH_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

/// Background orchestration around the registry and processor: post-auth
/// backfill and inspection, and the periodic credential refresh.
///
/// Every entry point logs and swallows failures; these run unattended and
/// must never take the process down.
pub struct Service {
    client: Arc<dyn BankingClient>,
    registry: Arc<Registry>,
    processor: Arc<Processor>,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
}

impl Service {
    pub fn new(
        client: Arc<dyn BankingClient>,
        registry: Arc<Registry>,
        processor: Arc<Processor>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            client,
            registry,
            processor,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Pull everything created since UTC midnight for the user's open
    /// accounts and run it through the processor. Covers transactions
    /// missed while no webhook was registered or deliveries were dropped;
    /// dedup makes replays harmless.
    pub async fn backfill_today(&self, user_id: &str) {
        let Some(user) = self.registry.user(user_id).await else {
            warn!(user_id = %user_id, "cannot backfill unknown user");
            return;
        };
        let since = self.clock.start_of_today();

        for account in self.registry.open_accounts_for_user(user_id).await {
            match self
                .client
                .transactions_since(&account.id, &user.credential.access_token, Some(since))
                .await
            {
                Ok(transactions) => {
                    let count = transactions.len();
                    for transaction in transactions {
                        self.processor.handle(transaction).await;
                    }
                    match self.processor.daily_total(&account.id, since.date_naive()).await {
                        Some(total) => info!(
                            account_id = %account.id,
                            count,
                            total,
                            "backfilled today's transactions"
                        ),
                        None => info!(
                            account_id = %account.id,
                            count,
                            "backfilled today's transactions, none recorded"
                        ),
                    }
                }
                Err(err) => warn!(
                    account_id = %account.id,
                    error = %err,
                    "failed to backfill today's transactions"
                ),
            }
        }
    }

    /// Post-auth baseline pass: log pots and balances, post a welcome feed
    /// item, and register the webhook callback on every open account.
    pub async fn inspect_accounts(&self, user_id: &str) {
        let Some(user) = self.registry.user(user_id).await else {
            warn!(user_id = %user_id, "cannot inspect accounts of unknown user");
            return;
        };
        let access_token = &user.credential.access_token;

        match self.client.pots(access_token).await {
            Ok(pots) => {
                for pot in pots.iter().filter(|pot| !pot.deleted) {
                    info!(name = %pot.name, balance = pot.balance, "found pot");
                }
            }
            Err(err) => warn!(error = %err, "failed to list pots"),
        }

        for account in self.registry.open_accounts_for_user(user_id).await {
            match self.client.balance(&account.id, access_token).await {
                Ok(balance) => info!(
                    account_id = %account.id,
                    balance = balance.balance,
                    spend_today = balance.spend_today,
                    "account balance"
                ),
                Err(err) => warn!(account_id = %account.id, error = %err, "failed to get balance"),
            }

            let params = FeedItemParams {
                title: "spendwatch connected".to_string(),
                body: "Daily spend alerts are live for this account.".to_string(),
                image_url: self.config.feed_image_url.clone(),
            };
            if let Err(err) = self
                .client
                .create_feed_item(&account.id, access_token, &params)
                .await
            {
                warn!(account_id = %account.id, error = %err, "failed to post welcome feed item");
            }

            match self
                .client
                .register_webhook(&account.id, access_token, &self.config.webhook_uri)
                .await
            {
                Ok(()) => info!(account_id = %account.id, "registered webhook"),
                Err(err) => warn!(
                    account_id = %account.id,
                    error = %err,
                    "failed to register webhook"
                ),
            }
        }
    }

    /// Refresh every user's credential on a fixed cadence, for the life of
    /// the process.
    pub async fn run_refresh_loop(&self) {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        // interval fires immediately; the first refresh should wait a full
        // period after auth.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            info!("refreshing credentials");
            let summary = self.registry.refresh_all_credentials().await;
            if summary.failed.is_empty() {
                info!(refreshed = summary.refreshed, "credential refresh complete");
            } else {
                warn!(
                    refreshed = summary.refreshed,
                    failed = summary.failed.len(),
                    "credential refresh completed with failures"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banking::RecordingBankingClient;
    use crate::clock::FixedClock;
    use crate::models::{Account, Credential, Pot, Transaction};
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;

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

    fn credential(user_id: &str) -> Credential {
        Credential {
            access_token: "tok".to_string(),
            client_id: "client-1".to_string(),
            expires_in: 21600,
            refresh_token: "ref".to_string(),
            token_type: "Bearer".to_string(),
            user_id: user_id.to_string(),
        }
    }

    fn config() -> Arc<Config> {
        Arc::new(Config::new(
            "client-1".to_string(),
            SecretString::from("secret".to_string()),
            "https://example.test".to_string(),
        ))
    }

    async fn service_with(client: Arc<RecordingBankingClient>) -> Service {
        let registry = Arc::new(Registry::new(client.clone()));
        registry
            .upsert_user_and_accounts(credential("user_1"))
            .await
            .unwrap();
        let processor = Arc::new(Processor::new(registry.clone(), client.clone()));
        Service::new(client, registry, processor, config()).with_clock(Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap(),
        )))
    }

    #[tokio::test]
    async fn backfill_requests_since_utc_midnight_and_accumulates() {
        let midnight = Utc.with_ymd_and_hms(2026, 8, 5, 0, 0, 0).unwrap();
        let client = Arc::new(
            RecordingBankingClient::new()
                .with_accounts(vec![account("acc_1", false)])
                .with_transactions(vec![
                    Transaction::new(
                        "tx_old",
                        "acc_1",
                        -900,
                        Utc.with_ymd_and_hms(2026, 8, 4, 23, 0, 0).unwrap(),
                    ),
                    Transaction::new(
                        "tx_today",
                        "acc_1",
                        -500,
                        Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap(),
                    ),
                ]),
        );
        let service = service_with(client.clone()).await;

        service.backfill_today("user_1").await;

        let requests = client.recorded_transaction_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], ("acc_1".to_string(), Some(midnight)));

        assert_eq!(
            service
                .processor
                .daily_total("acc_1", midnight.date_naive())
                .await,
            Some(-500)
        );
    }

    #[tokio::test]
    async fn inspection_covers_open_accounts_only() {
        let client = Arc::new(
            RecordingBankingClient::new()
                .with_accounts(vec![account("acc_1", false), account("acc_closed", true)])
                .with_pots(vec![Pot {
                    id: "pot_1".to_string(),
                    name: "Rainy day".to_string(),
                    balance: 4200,
                    currency: "GBP".to_string(),
                    style: "beach_ball".to_string(),
                    created: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    updated: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                    deleted: false,
                }]),
        );
        let service = service_with(client.clone()).await;

        service.inspect_accounts("user_1").await;

        let webhooks = client.recorded_webhooks();
        assert_eq!(webhooks.len(), 1);
        assert_eq!(
            webhooks[0],
            (
                "acc_1".to_string(),
                "https://example.test/webhook".to_string()
            )
        );

        let feed_items = client.recorded_feed_items();
        assert_eq!(feed_items.len(), 1);
        assert_eq!(feed_items[0].0, "acc_1");
    }
}
