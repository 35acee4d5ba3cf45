//! Cursor traversal over a listing.
//!
//! The paginator moves through three states: `Start`, `InProgress` while the
//! provider keeps handing out cursors, and `Exhausted` once it stops. Pages are
//! fetched one at a time through the shared transport. The sort order is fixed
//! by the request; changing it mid-traversal invalidates the cursor, and that
//! is left to the caller.

use std::collections::HashSet;

use crate::error::{ApiError, Result};
use crate::models::ListingPage;
use crate::query::{Cursor, PageMode, SearchRequest};
use crate::transport::Transport;

use super::normalize::normalize_listing;

/// Where a traversal stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginatorState {
    Start,
    InProgress(String),
    Exhausted,
}

#[derive(Debug)]
pub struct Paginator<'a> {
    transport: &'a dyn Transport,
    request: SearchRequest,
    cursor: Cursor,
    seen: HashSet<String>,
    pages_fetched: usize,
}

impl<'a> Paginator<'a> {
    /// Start from the request's cursor; offset requests start a new traversal
    pub fn new(transport: &'a dyn Transport, request: SearchRequest) -> Self {
        let cursor = match &request.page {
            PageMode::Cursor(cursor) => cursor.clone(),
            PageMode::Offset { .. } => Cursor::Start,
        };
        Self {
            transport,
            request,
            cursor,
            seen: HashSet::new(),
            pages_fetched: 0,
        }
    }

    pub fn state(&self) -> PaginatorState {
        match &self.cursor {
            Cursor::Start => PaginatorState::Start,
            Cursor::Token(token) => PaginatorState::InProgress(token.clone()),
            Cursor::Exhausted => PaginatorState::Exhausted,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page, or `None` once exhausted (without a request)
    pub async fn next_page(&mut self) -> Result<Option<ListingPage>> {
        if self.cursor.is_exhausted() {
            return Ok(None);
        }

        let mode = PageMode::Cursor(self.cursor.clone());
        let mut request = self.request.clone();
        request.page = mode.clone();
        let api_request = request.to_api_request()?;

        tracing::debug!("Fetching page {} of {}", self.pages_fetched + 1, api_request);
        let value = self.transport.get(&api_request).await?;
        let mut page = normalize_listing(request.kind, value, &mode)?;
        self.pages_fetched += 1;

        let next = match page.next_cursor.as_deref() {
            // an empty page ends the traversal whatever cursor came with it
            _ if page.results.is_empty() => Cursor::Exhausted,
            Some(raw) => Cursor::parse(raw),
            None => Cursor::Exhausted,
        };
        if let Cursor::Token(token) = &next {
            if !self.seen.insert(token.clone()) {
                return Err(ApiError::server_error(format!(
                    "provider returned cursor '{}' twice; traversal aborted",
                    token
                )));
            }
        }

        page.next_cursor = Some(next.as_str().to_string());
        self.cursor = next;
        Ok(Some(page))
    }

    /// Walk pages until exhausted or `max_records` are collected
    ///
    /// The page size shrinks on the last page so no record is skipped; the
    /// returned `next_cursor` resumes right after the last collected record.
    pub async fn collect(mut self, max_records: usize) -> Result<ListingPage> {
        let per_page = self.request.per_page;
        let mut results = Vec::new();
        let mut total_count = None;

        while results.len() < max_records {
            let remaining = (max_records - results.len()).min(per_page as usize);
            self.request.per_page = remaining as u32;

            let Some(page) = self.next_page().await? else {
                break;
            };
            total_count = total_count.or(page.total_count);
            results.extend(page.results);
        }

        tracing::debug!(
            "Collected {} records in {} pages",
            results.len(),
            self.pages_fetched
        );

        Ok(ListingPage {
            entity_type: self.request.kind,
            total_count,
            count: results.len(),
            page: None,
            next_cursor: Some(self.cursor.as_str().to_string()),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::EntityKind;
    use crate::query::CURSOR_EXHAUSTED;
    use crate::transport::mock::listing_page;
    use crate::transport::MockTransport;
    use serde_json::json;

    fn works(ids: &[&str]) -> Vec<serde_json::Value> {
        ids.iter().map(|id| json!({ "id": id })).collect()
    }

    fn cursor_request(per_page: u32) -> SearchRequest {
        SearchRequest::new(EntityKind::Work)
            .per_page(per_page)
            .page(PageMode::Cursor(Cursor::Start))
    }

    #[tokio::test]
    async fn test_walks_to_exhaustion() {
        let mock = MockTransport::new();
        mock.push_ok(listing_page(works(&["W1", "W2"]), 3, Some("c1")))
            .push_ok(listing_page(works(&["W3"]), 3, None));

        let mut paginator = Paginator::new(&mock, cursor_request(2));
        assert_eq!(paginator.state(), PaginatorState::Start);

        let first = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(first.next_cursor.as_deref(), Some("c1"));
        assert_eq!(paginator.state(), PaginatorState::InProgress("c1".into()));

        let second = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(second.next_cursor.as_deref(), Some(CURSOR_EXHAUSTED));
        assert_eq!(paginator.state(), PaginatorState::Exhausted);

        assert!(paginator.next_page().await.unwrap().is_none());
        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].get("cursor"), Some("*"));
        assert_eq!(requests[1].get("cursor"), Some("c1"));
    }

    #[tokio::test]
    async fn test_exhausted_cursor_never_sent() {
        let mock = MockTransport::new();
        let request = SearchRequest::new(EntityKind::Work)
            .page(PageMode::Cursor(Cursor::parse(CURSOR_EXHAUSTED)));
        let mut paginator = Paginator::new(&mock, request);

        assert!(paginator.next_page().await.unwrap().is_none());
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_cursor_aborts() {
        let mock = MockTransport::new();
        mock.push_ok(listing_page(works(&["W1"]), 9, Some("loop")))
            .push_ok(listing_page(works(&["W2"]), 9, Some("loop")));

        let mut paginator = Paginator::new(&mock, cursor_request(1));
        paginator.next_page().await.unwrap();
        let err = paginator.next_page().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError);
    }

    #[tokio::test]
    async fn test_empty_page_exhausts() {
        let mock = MockTransport::new();
        mock.push_ok(listing_page(vec![], 0, Some("c9")));

        let mut paginator = Paginator::new(&mock, cursor_request(25));
        let page = paginator.next_page().await.unwrap().unwrap();
        assert_eq!(page.next_cursor.as_deref(), Some(CURSOR_EXHAUSTED));
        assert_eq!(paginator.state(), PaginatorState::Exhausted);
    }

    #[tokio::test]
    async fn test_collect_stops_at_max_records() {
        let mock = MockTransport::new();
        mock.push_ok(listing_page(works(&["W1", "W2"]), 10, Some("c1")))
            .push_ok(listing_page(works(&["W3"]), 10, Some("c2")));

        let page = Paginator::new(&mock, cursor_request(2)).collect(3).await.unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(page.total_count, Some(10));
        assert_eq!(page.next_cursor.as_deref(), Some("c2"));

        let requests = mock.requests();
        assert_eq!(requests[0].get("per-page"), Some("2"));
        assert_eq!(requests[1].get("per-page"), Some("1"));
    }
}
