use serde::{Deserialize, Serialize};

/// An issued OAuth credential.
///
/// Immutable once issued: a token refresh produces a new `Credential`
/// value that supersedes this one, nothing is mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub client_id: String,
    /// Lifetime of the access token in seconds, as reported by the provider.
    pub expires_in: i64,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    pub user_id: String,
}
