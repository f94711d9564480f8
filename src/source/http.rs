//! REST record store client.
//!
//! `GET {base_url}/{endpoint}?{query}&limit={limit}&offset={offset}` with an
//! optional bearer token. Status handling follows the store's conventions:
//! 401/403 are credential problems, 429 is a rate limit, everything else
//! non-2xx is an API error carrying the body.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::RecordSource;
use crate::error::SyncError;

pub struct HttpRecordSource {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl HttpRecordSource {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_ms: u64) -> Result<Self, SyncError> {
        // A trailing slash makes Url::join append instead of replacing the
        // last path segment.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url =
            Url::parse(&normalized).map_err(|e| SyncError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.map(str::to_string),
            timeout_ms,
        })
    }

    /// Resolve the page URL. `query` is the collection's fixed filter string
    /// (`a=1&b=2`), appended before paging parameters.
    pub fn page_url(
        &self,
        endpoint: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Url, SyncError> {
        let mut url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| SyncError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
                pairs.append_pair(&key, &value);
            }
            pairs.append_pair("limit", &limit.to_string());
            pairs.append_pair("offset", &offset.to_string());
        }
        Ok(url)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout_ms)
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_page(
        &self,
        endpoint: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Value, SyncError> {
        let url = self.page_url(endpoint, query, limit, offset)?;

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SyncError::Unauthorized);
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        match serde_json::from_str::<Value>(&body) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                log::debug!("{}: unparseable page at offset {}: {}", endpoint, offset, e);
                Ok(Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_appends_query_and_paging() {
        let source = HttpRecordSource::new("https://store.example.com/api/v2", None, 7_000).unwrap();
        let url = source
            .page_url("reports", "where=(ID_ASESOR,neq,0)&sort=FECHA", 500, 1_000)
            .unwrap();
        assert_eq!(url.path(), "/api/v2/reports");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("where".to_string(), "(ID_ASESOR,neq,0)".to_string()),
                ("sort".to_string(), "FECHA".to_string()),
                ("limit".to_string(), "500".to_string()),
                ("offset".to_string(), "1000".to_string()),
            ]
        );
    }

    #[test]
    fn test_page_url_without_query() {
        let source = HttpRecordSource::new("https://store.example.com/", None, 7_000).unwrap();
        let url = source.page_url("/advisors", "", 100, 0).unwrap();
        assert_eq!(url.as_str(), "https://store.example.com/advisors?limit=100&offset=0");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpRecordSource::new("not a url", None, 7_000),
            Err(SyncError::InvalidEndpoint(_))
        ));
    }
}
