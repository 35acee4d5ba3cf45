//! reqwest-backed transport for the live provider.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{ApiRequest, Transport};
use crate::config::ProviderConfig;
use crate::error::{ApiError, Result};

/// Plain HTTP transport: one request, one classified answer, no retries
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    email: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ApiError::bad_request(format!("invalid provider base URL '{}': {}", config.base_url, e))
        })?;

        let user_agent = match &config.email {
            Some(email) => format!(
                "{}/{} (mailto:{})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                email
            ),
            None => format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        };

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            base_url,
            email: config.email.clone(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, request.path()))
            .map_err(|e| ApiError::bad_request(format!("invalid request path '{}': {}", request.path(), e)))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in request.params() {
                query.append_pair(key, value);
            }
            if let Some(email) = &self.email {
                query.append_pair("mailto", email);
            }
        }
        Ok(url)
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &ApiRequest) -> Result<Value> {
        let url = self.url_for(request)?;
        tracing::debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let wait = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status.as_u16(), &body, wait);
            tracing::debug!("{} answered {}: {}", request.path(), status, error);
            return Err(error);
        }

        Ok(response.json::<Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mockito::Matcher;

    fn transport(server: &mockito::Server, email: Option<&str>) -> HttpTransport {
        HttpTransport::new(&ProviderConfig {
            base_url: server.url(),
            email: email.map(str::to_string),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_with_mailto() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/works")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("filter".into(), "publication_year:2024,is_oa:true".into()),
                Matcher::UrlEncoded("mailto".into(), "me@example.org".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"meta": {"count": 0}, "results": []}"#)
            .create_async()
            .await;

        let request = ApiRequest::new("/works").param("filter", "publication_year:2024,is_oa:true");
        let value = transport(&server, Some("me@example.org")).get(&request).await.unwrap();

        assert_eq!(value["meta"]["count"], 0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_classification() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/works/W1")
            .with_status(404)
            .with_body(r#"{"error": "Not found"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/works")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "2")
            .create_async()
            .await;

        let http = transport(&server, None);

        let err = http.get(&ApiRequest::new("/works/W1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = http
            .get(&ApiRequest::new("/works").param("search", "x"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_unreadable_body_is_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/authors/A1")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let err = transport(&server, None)
            .get(&ApiRequest::new("/authors/A1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError);
    }

    #[test]
    fn test_request_display() {
        let request = ApiRequest::new("/works").param("per-page", "5").param("page", "2");
        assert_eq!(request.to_string(), "GET /works?per-page=5&page=2");
    }
}
