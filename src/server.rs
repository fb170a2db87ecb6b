use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::banking::BankingClient;
use crate::config::Config;
use crate::models::Transaction;
use crate::processor::Processor;
use crate::registry::Registry;
use crate::service::Service;

/// Cap on request handling time; a stalled handler must not pin a connection.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Shared state injected into every handler; no ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: Arc<dyn BankingClient>,
    pub registry: Arc<Registry>,
    pub processor: Arc<Processor>,
    pub service: Arc<Service>,
    /// Per-process random token round-tripped through the OAuth flow.
    pub state_token: Arc<String>,
}

/// Envelope the provider wraps around webhook deliveries.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Transaction,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/auth_start", get(auth_start))
        .route("/auth_return", get(auth_return))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}

pub async fn serve(state: AppState, listener: TcpListener) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "webhook server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Acknowledge immediately and process on a separate task so a slow
/// provider call never delays the delivery response.
async fn webhook(
    State(state): State<AppState>,
    Json(envelope): Json<WebhookEnvelope>,
) -> StatusCode {
    info!(
        event_type = %envelope.event_type,
        transaction_id = %envelope.data.id,
        "webhook delivery received"
    );
    let processor = state.processor.clone();
    tokio::spawn(async move {
        processor.handle(envelope.data).await;
    });
    StatusCode::OK
}

async fn auth_start(State(state): State<AppState>) -> Redirect {
    Redirect::to(&state.config.authorize_redirect_url(&state.state_token))
}

#[derive(Debug, Deserialize)]
struct AuthReturnQuery {
    #[serde(default)]
    code: String,
    #[serde(default)]
    state: String,
}

async fn auth_return(
    State(app): State<AppState>,
    Query(query): Query<AuthReturnQuery>,
) -> Response {
    if query.state != *app.state_token {
        warn!("auth return with mismatched state token, rejecting");
        return (StatusCode::FORBIDDEN, "state token mismatch").into_response();
    }

    match app
        .client
        .exchange_auth_code(&query.code, &app.config.redirect_uri)
        .await
    {
        Ok(credential) => {
            let user_id = credential.user_id.clone();
            info!(user_id = %user_id, "authenticated");

            let service = app.service.clone();
            tokio::spawn(async move {
                if let Err(err) = service.registry().upsert_user_and_accounts(credential).await {
                    error!(user_id = %user_id, error = %err, "failed to register user after auth");
                    return;
                }
                service.backfill_today(&user_id).await;
                service.inspect_accounts(&user_id).await;
            });

            (StatusCode::OK, "Authenticated. You can close this tab.").into_response()
        }
        Err(err) => {
            error!(error = %err, "auth code exchange failed");
            (StatusCode::UNAUTHORIZED, "authentication failed").into_response()
        }
    }
}

async fn fallback() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
