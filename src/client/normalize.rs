//! Provider payloads to normalized records and listings.

use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::models::raw::{RawAuthor, RawListing, RawWork};
use crate::models::{
    AuthorSummary, EntityKind, Group, GroupListing, ListingPage, NormalizedRecord, Related,
    WorkSummary,
};
use crate::query::{Cursor, PageMode};

/// Normalize one entity payload of `kind`
pub fn normalize_record(kind: EntityKind, value: Value) -> Result<NormalizedRecord> {
    NormalizedRecord::from_value(kind, value)
        .map_err(|e| ApiError::from(e).context(format!("normalizing {}", kind)))
}

/// Normalize a listing answered for `mode`
///
/// In cursor mode `next_cursor` is the provider's token, or the exhausted
/// marker once it stops sending one. Offset mode reports the page instead.
pub fn normalize_listing(kind: EntityKind, value: Value, mode: &PageMode) -> Result<ListingPage> {
    let listing: RawListing = serde_json::from_value(value)?;
    let results = listing
        .results
        .into_iter()
        .map(|item| normalize_record(kind, item))
        .collect::<Result<Vec<_>>>()?;

    let (page, next_cursor) = match mode {
        PageMode::Offset { page } => (Some(listing.meta.page.unwrap_or(*page)), None),
        PageMode::Cursor(_) => {
            let next = Cursor::from_provider(listing.meta.next_cursor.as_deref());
            (None, Some(next.as_str().to_string()))
        }
    };

    Ok(ListingPage {
        entity_type: kind,
        total_count: listing.meta.count,
        count: results.len(),
        page,
        next_cursor,
        results,
    })
}

/// Normalize a `group_by` answer
pub fn normalize_groups(kind: EntityKind, group_by: &str, value: Value) -> Result<GroupListing> {
    let listing: RawListing = serde_json::from_value(value)?;
    Ok(GroupListing {
        entity_type: kind,
        group_by: group_by.to_string(),
        total_count: listing.meta.count,
        groups: listing
            .group_by
            .into_iter()
            .map(|g| Group {
                key: g.key,
                key_display_name: g.key_display_name,
                count: g.count,
            })
            .collect(),
    })
}

/// Summaries of a related-entity listing on `target`
pub fn normalize_related(target: EntityKind, value: Value) -> Result<Related> {
    let listing: RawListing = serde_json::from_value(value)?;
    match target {
        EntityKind::Author => {
            let authors = listing
                .results
                .into_iter()
                .map(|item| serde_json::from_value::<RawAuthor>(item).map(AuthorSummary::from))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Related::Authors(authors))
        }
        _ => {
            let works = listing
                .results
                .into_iter()
                .map(|item| serde_json::from_value::<RawWork>(item).map(WorkSummary::from))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Related::Works(works))
        }
    }
}
