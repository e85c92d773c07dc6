use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::error;
use url::form_urlencoded;

use crate::server::error::{AppResult, Error};

/// mints and reads proxy-relative references, `{base_path}?url={percent encoded upstream}`
#[derive(Debug, Clone)]
pub struct ProxyUrlBuilder {
    base_path: String,
}

impl ProxyUrlBuilder {
    pub fn new(base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        let base_path = base_path.trim_end_matches('/').to_string();
        Self { base_path }
    }

    pub fn wrap(&self, upstream: &str) -> String {
        format!("{}?url={}", self.base_path, urlencoding::encode(upstream))
    }

    /// if `reference` is one of our own relative references return the upstream url it carries so
    /// it never gets wrapped twice. absolute urls are always upstream, whatever their path
    pub fn unwrap(&self, reference: &str) -> Option<String> {
        let query = reference
            .strip_prefix(self.base_path.as_str())?
            .strip_prefix('?')?;

        let inner = form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned())?;

        decode_url(&inner).ok()
    }
}

/// the `url` query parameter arrives either as a plain absolute url (already percent decoded by
/// the query extractor) or as unpadded url-safe base64 from older clients
pub fn decode_url(url_param: &str) -> AppResult<String> {
    let decoded = if url_param.starts_with("http://") || url_param.starts_with("https://") {
        url_param.to_string()
    } else {
        let bytes = URL_SAFE_NO_PAD
            .decode(url_param.trim_end_matches('='))
            .map_err(|e| {
                error!("Failed to decode base64: {}", e);
                Error::BadRequest("Invalid URL encoding".to_string())
            })?;

        String::from_utf8(bytes).map_err(|e| {
            error!("Failed to parse UTF-8: {}", e);
            Error::BadRequest("Invalid URL encoding".to_string())
        })?
    };

    if !decoded.starts_with("http://") && !decoded.starts_with("https://") {
        return Err(Error::BadRequest("Invalid URL format".to_string()));
    }

    Ok(decoded)
}
