use url::Url;

use crate::model::error::{Result, StoreError};

pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3-compatible endpoint. Immutable once a
/// client has been built from it.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub secure: bool,
    pub path_style: bool,
}

impl ConnectionConfig {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            region: DEFAULT_REGION.to_string(),
            secure: false,
            path_style: true,
        }
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    /// Returns the endpoint as an absolute URL. Bare `host:port` endpoints
    /// get a scheme from the `secure` flag.
    pub fn endpoint_url(&self) -> Result<String> {
        normalize_endpoint(&self.endpoint, self.secure)
    }
}

pub fn normalize_endpoint(endpoint: &str, secure: bool) -> Result<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(StoreError::InvalidArgument("empty endpoint".to_string()));
    }

    let candidate = if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{}", endpoint)
    } else {
        format!("http://{}", endpoint)
    };

    let url = Url::parse(&candidate).map_err(|err| {
        StoreError::InvalidArgument(format!("malformed endpoint: {}, {}", endpoint, err))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(StoreError::InvalidArgument(format!(
            "unsupported endpoint scheme: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, |host| host.is_empty()) {
        return Err(StoreError::InvalidArgument(format!(
            "endpoint has no host: {}",
            endpoint
        )));
    }

    Ok(candidate.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        let cases = vec![
            ("localhost:9000", false, Some("http://localhost:9000")),
            ("localhost:9000", true, Some("https://localhost:9000")),
            ("http://localhost:9000/", true, Some("http://localhost:9000")),
            ("https://s3.example.com", false, Some("https://s3.example.com")),
            ("  127.0.0.1:9000 ", false, Some("http://127.0.0.1:9000")),
            ("", false, None),
            ("ftp://localhost:21", false, None),
            ("http://", false, None),
            ("http://local host:9000", false, None),
        ];

        for (input, secure, expected) in cases {
            let result = normalize_endpoint(input, secure).ok();
            assert_eq!(result.as_deref(), expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("localhost:9000", "ak", "sk");

        assert_eq!(config.region, DEFAULT_REGION);
        assert!(!config.secure);
        assert!(config.path_style);
        assert_eq!(config.endpoint_url().unwrap(), "http://localhost:9000");
    }
}
