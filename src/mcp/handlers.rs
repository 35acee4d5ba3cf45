//! Tool handlers: argument parsing and envelope shaping around the client.
//!
//! Handlers never fail at the protocol level. Every outcome, including bad
//! arguments, is returned as a JSON envelope with an `is_error` discriminant.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::tools::ToolHandler;
use crate::client::{field_reference, timeout_from_secs, OpenAlexClient, QueryParams, SearchParams};
use crate::error::{ApiError, Result};
use crate::models::{EntityKind, Success};

/// Shape a result into the caller-facing envelope
pub fn respond<T: Serialize>(result: Result<T>) -> Value {
    let envelope = match result {
        Ok(payload) => serde_json::to_value(Success::new(payload)).map_err(ApiError::from),
        Err(error) => Err(error),
    };
    match envelope {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!("Tool call failed: {}", error);
            serde_json::to_value(error.to_envelope()).unwrap_or(Value::Null)
        }
    }
}

fn optional<T>(
    args: &Value,
    name: &str,
    expected: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Option<T>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => convert(value)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("'{}' must be {}", name, expected))),
    }
}

fn string_arg(args: &Value, name: &str) -> Result<Option<String>> {
    optional(args, name, "a string", |v| v.as_str().map(str::to_string))
}

fn required_string(args: &Value, name: &str) -> Result<String> {
    string_arg(args, name)?.ok_or_else(|| ApiError::bad_request(format!("missing '{}' parameter", name)))
}

fn u32_arg(args: &Value, name: &str) -> Result<Option<u32>> {
    optional(args, name, "a non-negative integer", |v| {
        v.as_u64().and_then(|n| u32::try_from(n).ok())
    })
}

fn i32_arg(args: &Value, name: &str) -> Result<Option<i32>> {
    optional(args, name, "an integer", |v| v.as_i64().and_then(|n| i32::try_from(n).ok()))
}

fn bool_arg(args: &Value, name: &str) -> Result<Option<bool>> {
    optional(args, name, "a boolean", Value::as_bool)
}

fn f64_arg(args: &Value, name: &str) -> Result<Option<f64>> {
    optional(args, name, "a number", Value::as_f64)
}

fn kind_arg(args: &Value, default: EntityKind) -> Result<EntityKind> {
    match string_arg(args, "entity_type")? {
        Some(name) => name.parse(),
        None => Ok(default),
    }
}

fn identifiers_arg(args: &Value) -> Result<Vec<String>> {
    let items = args
        .get("identifiers")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::bad_request("'identifiers' must be an array of strings"))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| ApiError::bad_request("'identifiers' must be an array of strings"))
        })
        .collect()
}

/// Handler for `search_openalex`
#[derive(Debug)]
pub struct SearchHandler {
    pub client: Arc<OpenAlexClient>,
}

impl SearchHandler {
    fn params(args: &Value) -> Result<SearchParams> {
        let mut params = SearchParams::new(required_string(args, "query")?, kind_arg(args, EntityKind::Work)?);
        params.year_from = i32_arg(args, "year_from")?;
        params.year_to = i32_arg(args, "year_to")?;
        params.country = string_arg(args, "country")?;
        params.institution = string_arg(args, "institution")?;
        params.is_oa = bool_arg(args, "is_oa")?;
        params.sort = string_arg(args, "sort")?;
        params.limit = u32_arg(args, "limit")?;
        params.page = u32_arg(args, "page")?;
        params.cursor = string_arg(args, "cursor")?;
        params.timeout = timeout_from_secs(f64_arg(args, "timeout_secs")?)?;
        Ok(params)
    }
}

#[async_trait::async_trait]
impl ToolHandler for SearchHandler {
    async fn execute(&self, args: Value) -> std::result::Result<Value, String> {
        let result = match Self::params(&args) {
            Ok(params) => self.client.search(params).await,
            Err(error) => Err(error),
        };
        Ok(respond(result))
    }
}

/// Handler for `query_openalex`
#[derive(Debug)]
pub struct QueryHandler {
    pub client: Arc<OpenAlexClient>,
}

impl QueryHandler {
    fn params(args: &Value) -> Result<QueryParams> {
        let mut params = QueryParams::new(kind_arg(args, EntityKind::Work)?);
        params.filter = string_arg(args, "filter")?;
        params.search = string_arg(args, "search")?;
        params.sort = string_arg(args, "sort")?;
        params.select = string_arg(args, "select")?;
        params.group_by = string_arg(args, "group_by")?;
        params.limit = u32_arg(args, "limit")?;
        params.page = u32_arg(args, "page")?;
        params.cursor = string_arg(args, "cursor")?;
        params.max_records = u32_arg(args, "max_records")?.map(|n| n as usize);
        params.timeout = timeout_from_secs(f64_arg(args, "timeout_secs")?)?;
        Ok(params)
    }
}

#[async_trait::async_trait]
impl ToolHandler for QueryHandler {
    async fn execute(&self, args: Value) -> std::result::Result<Value, String> {
        let result = match Self::params(&args) {
            Ok(params) => self.client.query(params).await,
            Err(error) => Err(error),
        };
        Ok(respond(result))
    }
}

/// Handler for `fetch_openalex`
#[derive(Debug)]
pub struct FetchHandler {
    pub client: Arc<OpenAlexClient>,
}

#[async_trait::async_trait]
impl ToolHandler for FetchHandler {
    async fn execute(&self, args: Value) -> std::result::Result<Value, String> {
        let result = async {
            let identifier = required_string(&args, "identifier")?;
            let kind = kind_arg(&args, EntityKind::Work)?;
            let include_related = bool_arg(&args, "include_related")?.unwrap_or(false);
            let timeout = timeout_from_secs(f64_arg(&args, "timeout_secs")?)?;
            self.client.fetch(&identifier, kind, include_related, timeout).await
        }
        .await;
        Ok(respond(result))
    }
}

/// Handler for `batch_fetch_openalex`
#[derive(Debug)]
pub struct BatchFetchHandler {
    pub client: Arc<OpenAlexClient>,
}

#[async_trait::async_trait]
impl ToolHandler for BatchFetchHandler {
    async fn execute(&self, args: Value) -> std::result::Result<Value, String> {
        let result = async {
            let identifiers = identifiers_arg(&args)?;
            let kind = kind_arg(&args, EntityKind::Work)?;
            let timeout = timeout_from_secs(f64_arg(&args, "timeout_secs")?)?;
            self.client.batch(&identifiers, kind, timeout).await
        }
        .await;
        Ok(respond(result))
    }
}

/// Handler for `openalex_filter_fields`
#[derive(Debug)]
pub struct FilterFieldsHandler;

#[async_trait::async_trait]
impl ToolHandler for FilterFieldsHandler {
    async fn execute(&self, args: Value) -> std::result::Result<Value, String> {
        Ok(respond(kind_arg(&args, EntityKind::Work).map(field_reference)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::listing_page;
    use crate::transport::MockTransport;
    use serde_json::json;

    fn client(mock: &Arc<MockTransport>) -> Arc<OpenAlexClient> {
        Arc::new(OpenAlexClient::new(mock.clone()))
    }

    #[tokio::test]
    async fn test_missing_query_is_error_envelope() {
        let mock = Arc::new(MockTransport::new());
        let handler = SearchHandler { client: client(&mock) };
        let value = handler.execute(json!({})).await.unwrap();
        assert_eq!(value["is_error"], true);
        assert_eq!(value["error_kind"], "bad_request");
        assert!(value["suggestion"].is_string());
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_argument_type() {
        let mock = Arc::new(MockTransport::new());
        let handler = SearchHandler { client: client(&mock) };
        let value = handler
            .execute(json!({"query": "x", "limit": "ten"}))
            .await
            .unwrap();
        assert_eq!(value["error_kind"], "bad_request");
        assert!(value["message"].as_str().unwrap().contains("limit"));
    }

    #[tokio::test]
    async fn test_search_success_envelope() {
        let mock = Arc::new(MockTransport::new());
        mock.push_ok(listing_page(vec![json!({"id": "https://openalex.org/I1"})], 1, None));
        let handler = SearchHandler { client: client(&mock) };

        let value = handler
            .execute(json!({"query": "oxford", "entity_type": "institutions", "country": "gb"}))
            .await
            .unwrap();
        assert_eq!(value["is_error"], false);
        assert_eq!(value["results"][0]["entity_type"], "institution");
        assert_eq!(mock.requests()[0].get("filter"), Some("country_code:GB"));
    }

    #[tokio::test]
    async fn test_provider_404_envelope() {
        let mock = Arc::new(MockTransport::new());
        mock.push_err(ApiError::from_status(404, "", None));
        let handler = FetchHandler { client: client(&mock) };

        let value = handler.execute(json!({"identifier": "W1"})).await.unwrap();
        assert_eq!(value["is_error"], true);
        assert_eq!(value["error_kind"], "not_found");
        assert_eq!(value["http_status"], 404);
    }

    #[tokio::test]
    async fn test_batch_requires_array() {
        let mock = Arc::new(MockTransport::new());
        let handler = BatchFetchHandler { client: client(&mock) };
        let value = handler.execute(json!({"identifiers": "W1"})).await.unwrap();
        assert_eq!(value["error_kind"], "bad_request");
    }

    #[tokio::test]
    async fn test_filter_fields() {
        let value = FilterFieldsHandler
            .execute(json!({"entity_type": "authors"}))
            .await
            .unwrap();
        assert_eq!(value["is_error"], false);
        assert_eq!(value["entity_type"], "author");
        assert!(value["fields"].as_array().unwrap().len() > 1);

        let value = FilterFieldsHandler
            .execute(json!({"entity_type": "keywords"}))
            .await
            .unwrap();
        assert_eq!(value["error_kind"], "bad_request");
    }
}
