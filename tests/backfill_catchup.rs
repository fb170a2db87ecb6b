use std::sync::Arc;

use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use spendwatch::banking::RecordingBankingClient;
use spendwatch::clock::FixedClock;
use spendwatch::config::Config;
use spendwatch::models::{Account, Credential, Transaction};
use spendwatch::processor::Processor;
use spendwatch::registry::Registry;
use spendwatch::service::Service;

fn account(id: &str) -> Account {
    Account {
        id: id.to_string(),
        closed: false,
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

/// A transaction caught up by backfill and then redelivered by webhook
/// must count once; later deliveries keep accumulating on top.
#[tokio::test]
async fn backfill_and_webhook_delivery_accumulate_identically() {
    let noon = Utc.with_ymd_and_hms(2026, 8, 5, 12, 0, 0).unwrap();
    let morning_tx = Transaction::new(
        "tx_am",
        "acc_1",
        -1500,
        Utc.with_ymd_and_hms(2026, 8, 5, 8, 0, 0).unwrap(),
    );
    let yesterday_tx = Transaction::new(
        "tx_old",
        "acc_1",
        -900,
        Utc.with_ymd_and_hms(2026, 8, 4, 23, 0, 0).unwrap(),
    );

    let client = Arc::new(
        RecordingBankingClient::new()
            .with_accounts(vec![account("acc_1")])
            .with_transactions(vec![yesterday_tx, morning_tx.clone()]),
    );
    let registry = Arc::new(Registry::new(client.clone()));
    registry
        .upsert_user_and_accounts(credential("user_1"))
        .await
        .unwrap();
    let processor = Arc::new(Processor::new(registry.clone(), client.clone()));
    let config = Arc::new(Config::new(
        "client-1".to_string(),
        SecretString::from("secret".to_string()),
        "https://example.test".to_string(),
    ));
    let service = Service::new(client.clone(), registry, processor.clone(), config)
        .with_clock(Arc::new(FixedClock::new(noon)));

    service.backfill_today("user_1").await;

    let today = noon.date_naive();
    // Only the same-day transaction lands in the accumulator.
    assert_eq!(processor.daily_total("acc_1", today).await, Some(-1500));

    // The webhook redelivers what the backfill already processed.
    processor.handle(morning_tx).await;
    assert_eq!(processor.daily_total("acc_1", today).await, Some(-1500));

    // A genuinely new delivery still accumulates.
    processor
        .handle(Transaction::new("tx_new", "acc_1", -700, noon))
        .await;
    assert_eq!(processor.daily_total("acc_1", today).await, Some(-2200));
}
