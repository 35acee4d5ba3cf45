//! Result envelopes for listings, group counts and batch lookups.

use serde::Serialize;

use super::entity::EntityKind;
use super::record::NormalizedRecord;
use crate::error::ErrorEnvelope;

/// Successful tool result; `is_error` lets callers branch without status codes
#[derive(Debug, Clone, Serialize)]
pub struct Success<T> {
    is_error: bool,
    #[serde(flatten)]
    payload: T,
}

impl<T> Success<T> {
    pub fn new(payload: T) -> Self {
        Self {
            is_error: false,
            payload,
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// One page (or a collected run of pages) of a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPage {
    pub entity_type: EntityKind,
    /// Total matches reported by the provider
    pub total_count: Option<u64>,
    /// Records in this page
    pub count: usize,
    /// Offset page number; `null` in cursor mode
    pub page: Option<u32>,
    /// Next cursor, or the exhausted marker; `null` in offset mode
    pub next_cursor: Option<String>,
    pub results: Vec<NormalizedRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub key: Option<serde_json::Value>,
    pub key_display_name: Option<serde_json::Value>,
    pub count: Option<u64>,
}

/// Counts grouped by one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupListing {
    pub entity_type: EntityKind,
    pub group_by: String,
    pub total_count: Option<u64>,
    pub groups: Vec<Group>,
}

/// Outcome of one input slot of a batch lookup
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchSlot {
    Found {
        identifier: String,
        record: NormalizedRecord,
    },
    NotFound {
        identifier: String,
    },
    Error {
        identifier: String,
        error: ErrorEnvelope,
    },
}

impl BatchSlot {
    pub fn identifier(&self) -> &str {
        match self {
            BatchSlot::Found { identifier, .. }
            | BatchSlot::NotFound { identifier }
            | BatchSlot::Error { identifier, .. } => identifier,
        }
    }

    pub fn record(&self) -> Option<&NormalizedRecord> {
        match self {
            BatchSlot::Found { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, BatchSlot::Found { .. })
    }
}

/// Batch lookup result, one slot per input in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub entity_type: EntityKind,
    pub requested: usize,
    pub found: usize,
    pub results: Vec<BatchSlot>,
}

impl BatchResult {
    pub fn new(entity_type: EntityKind, results: Vec<BatchSlot>) -> Self {
        Self {
            entity_type,
            requested: results.len(),
            found: results.iter().filter(|slot| slot.is_found()).count(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use serde_json::json;

    #[test]
    fn test_success_envelope_flattens() {
        let page = ListingPage {
            entity_type: EntityKind::Work,
            total_count: Some(0),
            count: 0,
            page: None,
            next_cursor: Some("__exhausted__".to_string()),
            results: vec![],
        };
        let json = serde_json::to_value(Success::new(page)).unwrap();
        assert_eq!(json["is_error"], false);
        assert_eq!(json["entity_type"], "work");
        assert!(json["page"].is_null());
        assert_eq!(json["next_cursor"], "__exhausted__");
    }

    #[test]
    fn test_batch_slots_tagged() {
        let record = NormalizedRecord::from_value(EntityKind::Work, json!({"id": "W1"})).unwrap();
        let result = BatchResult::new(
            EntityKind::Work,
            vec![
                BatchSlot::Found {
                    identifier: "W1".into(),
                    record,
                },
                BatchSlot::NotFound {
                    identifier: "W2".into(),
                },
                BatchSlot::Error {
                    identifier: "bad,id".into(),
                    error: ApiError::bad_request("reserved character").to_envelope(),
                },
            ],
        );
        assert_eq!(result.requested, 3);
        assert_eq!(result.found, 1);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["results"][0]["status"], "found");
        assert_eq!(json["results"][0]["record"]["entity_type"], "work");
        assert_eq!(json["results"][1]["status"], "not_found");
        assert_eq!(json["results"][2]["error"]["error_kind"], "bad_request");
        assert_eq!(json["results"][2]["error"]["is_error"], true);
    }
}
