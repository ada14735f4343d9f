// HTTP handlers

pub mod convert;
pub mod health;
pub mod info;

use serde::Deserialize;

/// Body of both `/api/info` and `/api/convert`
#[derive(Debug, Clone, Deserialize)]
pub struct UrlRequest {
    pub url: String,
}
