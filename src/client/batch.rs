//! Batch lookup by identifier list.
//!
//! Inputs are split into chunks of at most [`BATCH_CHUNK_SIZE`] slots. Each
//! chunk becomes one OR-filter request per identifier scheme present in it
//! (`openalex:W1|W2`, `doi:...`), issued sequentially through the shared
//! transport. Continents are looked up one by one, since their `Q` IDs are
//! not reachable through the `openalex` filter. Results are matched back to
//! their slots, so the output always has one slot per input, in input order.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{ApiError, ErrorKind, Result};
use crate::models::raw::RawListing;
use crate::models::{BatchResult, BatchSlot, EntityKind, NormalizedRecord};
use crate::query::identifier::{
    clean_native_id, doi_key, issn_key, orcid_key, pmcid_key, pmid_key, ror_key,
};
use crate::query::{FilterClause, FilterExpression, FilterOp, Identifier, SearchRequest};
use crate::transport::{ApiRequest, Transport};

use super::normalize::normalize_record;

/// Provider cap on values in one OR filter
pub const BATCH_CHUNK_SIZE: usize = 50;

/// Most identifiers accepted in one call
pub const MAX_BATCH_SIZE: usize = 500;

const RESERVED: [char; 3] = [',', '|', '+'];

#[derive(Debug)]
pub struct BatchFetcher<'a> {
    transport: &'a dyn Transport,
    chunk_size: usize,
}

/// A slot that still needs an answer
struct Pending {
    slot: usize,
    field: &'static str,
    value: String,
    key: String,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            transport,
            chunk_size: BATCH_CHUNK_SIZE,
        }
    }

    /// Use smaller chunks; never above the provider cap
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, BATCH_CHUNK_SIZE);
        self
    }

    /// Look up every identifier as `kind`
    ///
    /// A malformed identifier fails only its own slot. A provider `400` fails
    /// the slots of that request; any other failure fails the whole call.
    pub async fn fetch(&self, kind: EntityKind, identifiers: &[String]) -> Result<BatchResult> {
        if identifiers.len() > MAX_BATCH_SIZE {
            return Err(ApiError::bad_request(format!(
                "at most {} identifiers per batch, got {}",
                MAX_BATCH_SIZE,
                identifiers.len()
            )));
        }

        let mut slots: Vec<Option<BatchSlot>> = vec![None; identifiers.len()];
        let mut pending = Vec::new();
        for (slot, raw) in identifiers.iter().enumerate() {
            match prepare(kind, raw) {
                Ok((field, value, key)) => pending.push(Pending {
                    slot,
                    field,
                    value,
                    key,
                }),
                Err(error) => {
                    slots[slot] = Some(BatchSlot::Error {
                        identifier: raw.clone(),
                        error: error.to_envelope(),
                    })
                }
            }
        }

        let mut requests = 0;
        for chunk_start in (0..identifiers.len()).step_by(self.chunk_size) {
            let chunk_end = chunk_start + self.chunk_size;
            let chunk: Vec<&Pending> = pending
                .iter()
                .filter(|p| p.slot >= chunk_start && p.slot < chunk_end)
                .collect();

            let mut fields: Vec<&'static str> = Vec::new();
            for p in &chunk {
                if !fields.contains(&p.field) {
                    fields.push(p.field);
                }
            }

            for field in fields {
                let group: Vec<&Pending> = chunk.iter().copied().filter(|p| p.field == field).collect();
                let outcome = if looked_up_one_by_one(kind, field) {
                    requests += group.len();
                    self.fetch_each(kind, &group).await
                } else {
                    requests += 1;
                    self.fetch_group(kind, field, &group).await
                };
                match outcome {
                    Ok(found) => {
                        for p in group {
                            slots[p.slot] = Some(match found.get(&p.key) {
                                Some(record) => BatchSlot::Found {
                                    identifier: identifiers[p.slot].clone(),
                                    record: record.clone(),
                                },
                                None => BatchSlot::NotFound {
                                    identifier: identifiers[p.slot].clone(),
                                },
                            });
                        }
                    }
                    Err(error) if error.kind() == ErrorKind::BadRequest => {
                        tracing::warn!("Batch request for {} {} rejected: {}", kind, field, error);
                        let envelope = error.to_envelope();
                        for p in group {
                            slots[p.slot] = Some(BatchSlot::Error {
                                identifier: identifiers[p.slot].clone(),
                                error: envelope.clone(),
                            });
                        }
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        tracing::debug!(
            "Batch of {} {} identifiers took {} requests",
            identifiers.len(),
            kind,
            requests
        );

        let results = slots
            .into_iter()
            .zip(identifiers)
            .map(|(slot, raw)| {
                slot.unwrap_or_else(|| BatchSlot::NotFound {
                    identifier: raw.clone(),
                })
            })
            .collect();
        Ok(BatchResult::new(kind, results))
    }

    /// One OR-filter request; returns records keyed like [`Pending::key`]
    async fn fetch_group(
        &self,
        kind: EntityKind,
        field: &'static str,
        group: &[&Pending],
    ) -> Result<HashMap<String, NormalizedRecord>> {
        let mut values: Vec<&str> = Vec::new();
        for p in group {
            if !values.contains(&p.value.as_str()) {
                values.push(&p.value);
            }
        }

        let mut filter = FilterExpression::new();
        filter.push(FilterClause::new(kind, field, FilterOp::any_of(values.iter().copied()))?);
        let request = SearchRequest::new(kind)
            .filter(filter)
            .per_page(values.len() as u32)
            .to_api_request()?;

        let value = self.transport.get(&request).await?;
        let listing: RawListing = serde_json::from_value(value)?;

        let mut found = HashMap::new();
        for item in listing.results {
            let keys = record_keys(field, &item);
            if keys.is_empty() {
                continue;
            }
            let record = normalize_record(kind, item)?;
            for key in keys {
                found.insert(key, record.clone());
            }
        }
        Ok(found)
    }

    /// One direct lookup per distinct identifier; a `404` leaves its key absent
    async fn fetch_each(
        &self,
        kind: EntityKind,
        group: &[&Pending],
    ) -> Result<HashMap<String, NormalizedRecord>> {
        let mut found = HashMap::new();
        let mut seen: Vec<&str> = Vec::new();
        for p in group {
            if seen.contains(&p.key.as_str()) {
                continue;
            }
            seen.push(&p.key);

            let request = ApiRequest::new(format!("/{}/{}", kind.collection(), p.value));
            match self.transport.get(&request).await {
                Ok(value) => {
                    found.insert(p.key.clone(), normalize_record(kind, value)?);
                }
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(error),
            }
        }
        Ok(found)
    }
}

/// Continent IDs are Wikidata `Q` numbers the `openalex` filter does not match
fn looked_up_one_by_one(kind: EntityKind, field: &str) -> bool {
    kind == EntityKind::Continent && field == "openalex"
}

/// Classify one input into (filter field, filter value, match key)
fn prepare(kind: EntityKind, raw: &str) -> Result<(&'static str, String, String)> {
    let identifier = Identifier::classify(kind, raw);
    identifier.check_scheme(kind)?;

    let field = match (&identifier, identifier.filter_field(kind)) {
        (Identifier::FreeText(text), _) if text.is_empty() => {
            return Err(ApiError::bad_request("identifier is empty"));
        }
        (Identifier::FreeText(_), _) | (_, None) => {
            return Err(ApiError::bad_request(format!(
                "'{}' is not a {} identifier; batch lookups take IDs, not names",
                raw.trim(),
                kind
            )));
        }
        (_, Some(field)) => field,
    };

    let value = identifier.filter_value();
    if value.contains(RESERVED) {
        return Err(ApiError::bad_request(format!(
            "'{}' contains a character reserved by the filter syntax (, | +)",
            raw.trim()
        )));
    }
    Ok((field, value, identifier.match_key()))
}

/// Keys of a provider record, comparable with [`Identifier::match_key`]
///
/// A source answers to every ISSN it carries, so there can be several.
fn record_keys(field: &str, item: &Value) -> Vec<String> {
    let text = |name: &str| item.get(name).and_then(Value::as_str);
    let external = |name: &str| {
        item.get("ids")
            .and_then(|ids| ids.get(name))
            .and_then(Value::as_str)
    };
    let key = match field {
        "doi" => text("doi").map(doi_key),
        "orcid" => text("orcid").map(orcid_key),
        "ror" => text("ror").map(ror_key),
        "ids.pmid" => external("pmid").map(pmid_key),
        "ids.pmcid" => external("pmcid").map(pmcid_key),
        "issn" => {
            let mut keys: Vec<String> = item
                .get("issn")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .map(issn_key)
                .collect();
            if let Some(linking) = text("issn_l").map(issn_key) {
                if !keys.contains(&linking) {
                    keys.push(linking);
                }
            }
            return keys;
        }
        "country_code" => text("country_code")
            .or_else(|| text("id").map(clean_native_id))
            .map(str::to_ascii_uppercase),
        _ => text("id").map(|id| clean_native_id(id).to_ascii_uppercase()),
    };
    key.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::listing_page;
    use crate::transport::{ApiRequest, MockTransport};
    use serde_json::json;

    /// Answers OR-filters on `openalex` with every requested ID except `W404`
    fn echo_works() -> MockTransport {
        MockTransport::with_handler(|request: &ApiRequest| {
            let filter = request.get("filter").unwrap_or_default();
            let ids = filter.trim_start_matches("openalex:");
            let results: Vec<Value> = ids
                .split('|')
                .filter(|id| *id != "W404")
                .map(|id| json!({ "id": format!("https://openalex.org/{}", id) }))
                .collect();
            let count = results.len() as u64;
            Ok(listing_page(results, count, None))
        })
    }

    #[tokio::test]
    async fn test_120_ids_three_requests_in_order() {
        let mock = echo_works();
        let ids: Vec<String> = (1..=120).map(|n| format!("W{}", n)).collect();

        let result = BatchFetcher::new(&mock).fetch(EntityKind::Work, &ids).await.unwrap();

        assert_eq!(mock.request_count(), 3);
        assert_eq!(result.requested, 120);
        assert_eq!(result.found, 120);
        for (slot, id) in result.results.iter().zip(&ids) {
            assert_eq!(slot.identifier(), id);
            assert_eq!(slot.record().and_then(|r| r.id()), Some(id.as_str()));
        }
        let requests = mock.requests();
        assert_eq!(requests[2].get("per-page"), Some("20"));
    }

    #[tokio::test]
    async fn test_not_found_and_invalid_keep_their_slot() {
        let mock = echo_works();
        let ids: Vec<String> = ["W1", "W404", "not an id", "", "W1"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = BatchFetcher::new(&mock).fetch(EntityKind::Work, &ids).await.unwrap();

        assert_eq!(result.results.len(), 5);
        assert!(result.results[0].is_found());
        assert!(matches!(result.results[1], BatchSlot::NotFound { .. }));
        assert!(matches!(result.results[2], BatchSlot::Error { .. }));
        assert!(matches!(result.results[3], BatchSlot::Error { .. }));
        assert!(result.results[4].is_found());
        assert_eq!(mock.request_count(), 1);
        assert_eq!(mock.requests()[0].get("filter"), Some("openalex:W1|W404"));
    }

    #[tokio::test]
    async fn test_mixed_schemes_one_request_each() {
        let mock = MockTransport::new();
        mock.push_ok(listing_page(vec![json!({"id": "https://openalex.org/W1"})], 1, None))
            .push_ok(listing_page(
                vec![json!({"id": "https://openalex.org/W2", "doi": "https://doi.org/10.1038/NATURE12373"})],
                1,
                None,
            ));

        let ids = vec!["W1".to_string(), "10.1038/nature12373".to_string()];
        let result = BatchFetcher::new(&mock).fetch(EntityKind::Work, &ids).await.unwrap();

        assert_eq!(result.found, 2);
        let requests = mock.requests();
        assert_eq!(requests[0].get("filter"), Some("openalex:W1"));
        assert_eq!(requests[1].get("filter"), Some("doi:https://doi.org/10.1038/nature12373"));
    }

    #[tokio::test]
    async fn test_issn_matches_any_listed_issn() {
        let mock = MockTransport::new();
        mock.push_ok(listing_page(
            vec![json!({
                "id": "https://openalex.org/S137773608",
                "display_name": "Nature",
                "issn_l": "0028-0836",
                "issn": ["0028-0836", "1476-4687"]
            })],
            1,
            None,
        ));

        let ids = vec!["1476-4687".to_string(), "0378-5955".to_string()];
        let result = BatchFetcher::new(&mock).fetch(EntityKind::Source, &ids).await.unwrap();

        assert_eq!(result.found, 1);
        assert_eq!(result.results[0].record().and_then(|r| r.id()), Some("S137773608"));
        assert!(matches!(result.results[1], BatchSlot::NotFound { .. }));
        assert_eq!(mock.requests()[0].get("filter"), Some("issn:1476-4687|0378-5955"));
    }

    #[tokio::test]
    async fn test_pubmed_ids_match_provider_urls() {
        let mock = MockTransport::new();
        mock.push_ok(listing_page(
            vec![json!({
                "id": "https://openalex.org/W2",
                "ids": {"pmid": "https://pubmed.ncbi.nlm.nih.gov/14907713"}
            })],
            1,
            None,
        ))
        .push_ok(listing_page(
            vec![json!({
                "id": "https://openalex.org/W3",
                "ids": {"pmcid": "https://www.ncbi.nlm.nih.gov/pmc/articles/7839288"}
            })],
            1,
            None,
        ));

        let ids = vec!["pmid:14907713".to_string(), "PMC7839288".to_string()];
        let result = BatchFetcher::new(&mock).fetch(EntityKind::Work, &ids).await.unwrap();

        assert_eq!(result.found, 2);
        assert_eq!(result.results[0].record().and_then(|r| r.id()), Some("W2"));
        assert_eq!(result.results[1].record().and_then(|r| r.id()), Some("W3"));
        let requests = mock.requests();
        assert_eq!(requests[0].get("filter"), Some("ids.pmid:14907713"));
        assert_eq!(requests[1].get("filter"), Some("ids.pmcid:PMC7839288"));
    }

    #[tokio::test]
    async fn test_continents_fetched_one_by_one() {
        let mock = MockTransport::new();
        mock.push_ok(json!({"id": "https://openalex.org/continents/Q15", "display_name": "Africa"}))
            .push_err(ApiError::from_status(404, "", None));

        let ids: Vec<String> = ["Q15", "Q99999", "q15"].iter().map(|s| s.to_string()).collect();
        let result = BatchFetcher::new(&mock).fetch(EntityKind::Continent, &ids).await.unwrap();

        assert_eq!(result.found, 2);
        assert_eq!(result.results[0].record().and_then(|r| r.id()), Some("Q15"));
        assert!(matches!(result.results[1], BatchSlot::NotFound { .. }));
        assert!(result.results[2].is_found());

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path(), "/continents/Q15");
        assert_eq!(requests[1].path(), "/continents/Q99999");
        assert_eq!(requests[0].get("filter"), None);
    }

    #[tokio::test]
    async fn test_scheme_mismatch_is_slot_error() {
        let mock = MockTransport::new();
        let ids = vec!["0000-0002-1825-0097".to_string()];
        let result = BatchFetcher::new(&mock).fetch(EntityKind::Source, &ids).await.unwrap();

        let BatchSlot::Error { error, .. } = &result.results[0] else {
            panic!("expected an error slot");
        };
        assert_eq!(error.error_kind(), ErrorKind::BadRequest);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_400_fails_only_that_chunk() {
        let mock = MockTransport::new();
        mock.push_err(ApiError::from_status(400, "", None))
            .push_ok(listing_page(vec![json!({"id": "https://openalex.org/W3"})], 1, None));

        let ids: Vec<String> = ["W1", "W2", "W3"].iter().map(|s| s.to_string()).collect();
        let result = BatchFetcher::new(&mock)
            .with_chunk_size(2)
            .fetch(EntityKind::Work, &ids)
            .await
            .unwrap();

        assert!(matches!(result.results[0], BatchSlot::Error { .. }));
        assert!(matches!(result.results[1], BatchSlot::Error { .. }));
        assert!(result.results[2].is_found());
    }

    #[tokio::test]
    async fn test_server_error_fails_the_call() {
        let mock = MockTransport::new();
        mock.push_err(ApiError::server_error("503"));
        let ids = vec!["W1".to_string()];
        let err = BatchFetcher::new(&mock).fetch(EntityKind::Work, &ids).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError);
    }

    #[tokio::test]
    async fn test_too_many_identifiers() {
        let mock = MockTransport::new();
        let ids = vec!["W1".to_string(); MAX_BATCH_SIZE + 1];
        let err = BatchFetcher::new(&mock).fetch(EntityKind::Work, &ids).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let mock = MockTransport::new();
        let result = BatchFetcher::new(&mock).fetch(EntityKind::Work, &[]).await.unwrap();
        assert_eq!(result.requested, 0);
        assert_eq!(mock.request_count(), 0);
    }
}
