use url::Url;

use crate::error::ClientError;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000/";
pub const SERVER_URL_ENV: &str = "RACE_SERVER_URL";

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSettings {
    pub server_url: Url,
    pub garage_page_size: u32,
    pub winners_page_size: u32,
}

impl ClientSettings {
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            garage_page_size: 7,
            winners_page_size: 10,
        }
    }

    /// Defaults with `RACE_SERVER_URL` applied when set.
    pub fn from_env() -> Result<Self, ClientError> {
        let raw = std::env::var(SERVER_URL_ENV).unwrap_or_else(|_| DEFAULT_SERVER_URL.into());
        Ok(Self::new(parse_server_url(&raw)?))
    }
}

/// Parses an `http(s)` base url. The path always ends with `/` so endpoint
/// paths join below it.
pub fn parse_server_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    let invalid = |reason: String| ClientError::InvalidServerUrl {
        url: trimmed.to_string(),
        reason,
    };

    let mut url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
