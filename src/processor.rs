use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::banking::BankingClient;
use crate::config::MerchantTag;
use crate::models::{FeedItemParams, Transaction};
use crate::registry::Registry;

/// Spend thresholds, in signed minor currency units.
#[derive(Debug, Clone)]
pub struct SpendPolicy {
    /// The daily-overspend notice fires whenever the running total drops
    /// below this.
    pub daily_spend_floor: i64,
    /// The large-purchase notice fires for a single transaction below
    /// this, at most once per account per day.
    pub single_transaction_floor: i64,
}

impl Default for SpendPolicy {
    fn default() -> Self {
        Self {
            daily_spend_floor: -5000,
            single_transaction_floor: -10_000,
        }
    }
}

#[derive(Debug, Default)]
struct DaySpend {
    total: i64,
    large_purchase_notified: bool,
}

/// Per-account processing state: which transaction ids have been handled,
/// and the running spend per UTC calendar day.
#[derive(Debug, Default)]
struct AccountSpendState {
    processed: HashSet<String>,
    days: HashMap<NaiveDate, DaySpend>,
}

/// The single authority on whether a transaction has been seen and which
/// side effects it triggers.
///
/// Handling is serialized per account (the dedup check-then-record and the
/// accumulator update must be atomic against concurrent deliveries of the
/// same transaction); distinct accounts proceed concurrently.
pub struct Processor {
    registry: Arc<Registry>,
    client: Arc<dyn BankingClient>,
    policy: SpendPolicy,
    merchant_tags: Vec<MerchantTag>,
    feed_image_url: String,
    state: RwLock<HashMap<String, Arc<Mutex<AccountSpendState>>>>,
}

impl Processor {
    pub fn new(registry: Arc<Registry>, client: Arc<dyn BankingClient>) -> Self {
        Self {
            registry,
            client,
            policy: SpendPolicy::default(),
            merchant_tags: Vec::new(),
            feed_image_url: String::new(),
            state: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: SpendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_merchant_tags(mut self, merchant_tags: Vec<MerchantTag>) -> Self {
        self.merchant_tags = merchant_tags;
        self
    }

    pub fn with_feed_image_url(mut self, feed_image_url: impl Into<String>) -> Self {
        self.feed_image_url = feed_image_url.into();
        self
    }

    /// Run one transaction through dedup, accumulation, and side effects.
    ///
    /// Used identically for webhook deliveries and backfilled catch-up
    /// batches, so a transaction seen on both paths still counts once.
    pub async fn handle(&self, transaction: Transaction) {
        let Some(account) = self.registry.account(&transaction.account_id).await else {
            warn!(
                account_id = %transaction.account_id,
                transaction_id = %transaction.id,
                "transaction for unknown account, dropping"
            );
            return;
        };
        if account.closed {
            debug!(
                account_id = %account.id,
                transaction_id = %transaction.id,
                "transaction for closed account, dropping"
            );
            return;
        }

        let state = self.account_state(&account.id).await;
        let mut state = state.lock().await;

        if !state.processed.insert(transaction.id.clone()) {
            debug!(transaction_id = %transaction.id, "duplicate delivery, ignoring");
            return;
        }

        let day = transaction.created.date_naive();
        let day_spend = state.days.entry(day).or_default();
        day_spend.total += transaction.amount;
        info!(
            transaction_id = %transaction.id,
            account_id = %account.id,
            amount = transaction.amount,
            day = %day,
            total = day_spend.total,
            "recorded transaction"
        );

        let notification = self.evaluate_thresholds(day_spend, &transaction);

        self.apply_merchant_tags(&transaction).await;

        if let Some(params) = notification {
            self.dispatch_feed_item(&transaction.account_id, params).await;
        }
    }

    /// Running spend total for one account on one UTC day, if any
    /// transaction has been recorded for it.
    pub async fn daily_total(&self, account_id: &str, day: NaiveDate) -> Option<i64> {
        let state = {
            let states = self.state.read().await;
            states.get(account_id)?.clone()
        };
        let state = state.lock().await;
        state.days.get(&day).map(|spend| spend.total)
    }

    async fn account_state(&self, account_id: &str) -> Arc<Mutex<AccountSpendState>> {
        {
            let states = self.state.read().await;
            if let Some(state) = states.get(account_id) {
                return state.clone();
            }
        }
        let mut states = self.state.write().await;
        states.entry(account_id.to_string()).or_default().clone()
    }

    /// First match wins: the daily-total notice shadows the large-purchase
    /// notice. The daily notice re-fires on every transaction past the
    /// floor; the large-purchase notice fires at most once per day.
    fn evaluate_thresholds(
        &self,
        day_spend: &mut DaySpend,
        transaction: &Transaction,
    ) -> Option<FeedItemParams> {
        if day_spend.total < self.policy.daily_spend_floor {
            let spent = -day_spend.total / 100;
            Some(FeedItemParams {
                title: "Spending a bit much today?".to_string(),
                body: format!("Daily spend is at £{spent}. Chill your spending!"),
                image_url: self.feed_image_url.clone(),
            })
        } else if transaction.amount < self.policy.single_transaction_floor
            && !day_spend.large_purchase_notified
        {
            day_spend.large_purchase_notified = true;
            let spent = -day_spend.total / 100;
            Some(FeedItemParams {
                title: "Big spender alert".to_string(),
                body: format!("That was a large one. Daily spend is at £{spent}."),
                image_url: self.feed_image_url.clone(),
            })
        } else {
            None
        }
    }

    /// Attach the configured note to transactions at a tagged merchant.
    /// Runs as a detached task so a slow or failing metadata call never
    /// stalls the delivery being handled.
    async fn apply_merchant_tags(&self, transaction: &Transaction) {
        let Some(merchant) = &transaction.merchant else {
            return;
        };
        let Some(rule) = self
            .merchant_tags
            .iter()
            .find(|rule| rule.merchant == merchant.name)
        else {
            return;
        };

        let user = match self.registry.find_owning_user(&transaction.account_id).await {
            Ok(user) => user,
            Err(err) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %err,
                    "cannot tag transaction without an owning user"
                );
                return;
            }
        };

        let client = self.client.clone();
        let transaction_id = transaction.id.clone();
        let merchant_name = merchant.name.clone();
        let access_token = user.credential.access_token;
        let metadata = HashMap::from([("notes".to_string(), rule.note.clone())]);

        tokio::spawn(async move {
            match client
                .update_transaction_metadata(&transaction_id, &access_token, &metadata)
                .await
            {
                Ok(_) => info!(
                    transaction_id = %transaction_id,
                    merchant = %merchant_name,
                    "tagged transaction"
                ),
                Err(err) => warn!(
                    transaction_id = %transaction_id,
                    error = %err,
                    "failed to tag transaction"
                ),
            }
        });
    }

    /// Post a feed item on the owning user's behalf. Failures are logged,
    /// never retried.
    async fn dispatch_feed_item(&self, account_id: &str, params: FeedItemParams) {
        let user = match self.registry.find_owning_user(account_id).await {
            Ok(user) => user,
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "cannot notify without an owning user");
                return;
            }
        };

        if let Err(err) = self
            .client
            .create_feed_item(account_id, &user.credential.access_token, &params)
            .await
        {
            warn!(account_id = %account_id, error = %err, "failed to create feed item");
        } else {
            info!(account_id = %account_id, title = %params.title, "created feed item");
        }
    }
}
