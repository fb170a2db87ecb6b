use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use spendwatch::banking::{BankingClient, RestBankingClient};
use spendwatch::config::Config;
use spendwatch::processor::Processor;
use spendwatch::registry::Registry;
use spendwatch::server::{self, AppState};
use spendwatch::service::Service;

#[derive(Parser)]
#[command(name = "spendwatch")]
#[command(about = "Banking webhook notifier with daily spend alerts")]
struct Cli {
    /// OAuth client identifier issued by the banking provider
    client_id: String,

    /// OAuth client secret issued by the banking provider
    client_secret: String,

    /// Externally reachable base URI, used to derive the redirect and
    /// webhook callback URLs
    base_uri: String,

    /// Address to bind the webhook server on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::new(
        cli.client_id,
        SecretString::from(cli.client_secret),
        cli.base_uri,
    ));

    let client: Arc<dyn BankingClient> = Arc::new(RestBankingClient::new(
        config.client_id.clone(),
        config.client_secret.clone(),
    ));
    let registry = Arc::new(Registry::new(client.clone()));
    let processor = Arc::new(
        Processor::new(registry.clone(), client.clone())
            .with_merchant_tags(config.merchant_tags.clone())
            .with_feed_image_url(config.feed_image_url.clone()),
    );
    let service = Arc::new(Service::new(
        client.clone(),
        registry.clone(),
        processor.clone(),
        config.clone(),
    ));

    {
        let service = service.clone();
        tokio::spawn(async move {
            service.run_refresh_loop().await;
        });
    }

    let state = AppState {
        config,
        client,
        registry,
        processor,
        service,
        state_token: Arc::new(Uuid::new_v4().to_string()),
    };

    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    server::serve(state, listener).await
}
