use secrecy::SecretString;

/// Authorize endpoint users are redirected to when starting the OAuth flow.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://auth.monzo.com/";

const DEFAULT_FEED_IMAGE_URL: &str =
    "https://em-content.zobj.net/source/twitter/408/money-with-wings_1f4b8.png";

/// Runtime configuration, assembled from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Externally reachable base URI of this process.
    pub base_uri: String,
    /// OAuth redirect URL, derived from `base_uri`.
    pub redirect_uri: String,
    /// Webhook callback URL registered with the provider, derived from `base_uri`.
    pub webhook_uri: String,
    pub authorize_url: String,
    /// Image attached to every feed item this process posts.
    pub feed_image_url: String,
    pub merchant_tags: Vec<MerchantTag>,
}

impl Config {
    pub fn new(client_id: String, client_secret: SecretString, base_uri: String) -> Self {
        let base_uri = base_uri.trim_end_matches('/').to_string();
        Self {
            redirect_uri: format!("{base_uri}/auth_return"),
            webhook_uri: format!("{base_uri}/webhook"),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            feed_image_url: DEFAULT_FEED_IMAGE_URL.to_string(),
            merchant_tags: MerchantTag::defaults(),
            client_id,
            client_secret,
            base_uri,
        }
    }

    /// Full provider authorize URL carrying the per-process state token.
    pub fn authorize_redirect_url(&self, state_token: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&state={}",
            self.authorize_url, self.client_id, self.redirect_uri, state_token
        )
    }
}

/// Auto-tagging rule: transactions at `merchant` get `note` attached.
#[derive(Debug, Clone)]
pub struct MerchantTag {
    pub merchant: String,
    pub note: String,
}

impl MerchantTag {
    pub fn new(merchant: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            merchant: merchant.into(),
            note: note.into(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("Tfl Cycle Hire", "#cycling"),
            Self::new("Amoret Coffee", "#coffee"),
        ]
    }
}
