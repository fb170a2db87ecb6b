use serde::{Deserialize, Serialize};

/// Contents of an in-app feed item notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItemParams {
    pub title: String,
    pub body: String,
    pub image_url: String,
}
