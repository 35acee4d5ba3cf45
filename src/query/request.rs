//! Search request descriptor: sort, pagination, limits and projection.

use serde::{Deserialize, Serialize};

use super::filter::FilterExpression;
use crate::error::{ApiError, Result};
use crate::models::EntityKind;
use crate::transport::ApiRequest;

/// Deepest result reachable with offset paging
pub const MAX_OFFSET_RESULTS: u32 = 10_000;

/// Provider's largest page
pub const MAX_PAGE_SIZE: u32 = 200;

/// Cursor value that starts a traversal
pub const CURSOR_START: &str = "*";

/// Marker handed to callers once a traversal is exhausted; never sent upstream
pub const CURSOR_EXHAUSTED: &str = "__exhausted__";

/// Default and maximum result count of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub default: u32,
    pub max: u32,
}

impl Limits {
    /// `search_openalex`
    pub const SEARCH: Limits = Limits {
        default: 15,
        max: 50,
    };

    /// `query_openalex`
    pub const QUERY: Limits = Limits {
        default: 25,
        max: MAX_PAGE_SIZE,
    };

    /// Apply the default, rejecting zero and anything above the maximum
    pub fn check(&self, limit: Option<u32>) -> Result<u32> {
        match limit {
            None => Ok(self.default),
            Some(0) => Err(ApiError::bad_request("limit must be at least 1")),
            Some(n) if n > self.max => Err(ApiError::bad_request(format!(
                "limit {} exceeds the maximum of {}",
                n, self.max
            ))),
            Some(n) => Ok(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort field and direction, validated for a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    field: &'static str,
    direction: SortDirection,
}

impl SortSpec {
    /// Parse `field` or `field:asc|desc` (direction defaults to descending)
    pub fn parse(kind: EntityKind, raw: &str) -> Result<Self> {
        let (field, direction) = split_direction(raw)?;

        let field = kind
            .sortable_fields()
            .iter()
            .find(|f| **f == field)
            .copied()
            .ok_or_else(|| {
                ApiError::bad_request(format!(
                    "cannot sort {} by '{}' (sortable: {})",
                    kind.collection(),
                    field,
                    kind.sortable_fields().join(", ")
                ))
            })?;

        Ok(Self {
            field,
            direction,
        })
    }

    /// Parse a comma-separated list of sort keys, most significant first
    pub fn parse_list(kind: EntityKind, raw: &str) -> Result<Vec<Self>> {
        let mut keys: Vec<Self> = Vec::new();
        for segment in raw.split(',') {
            if segment.trim().is_empty() {
                return Err(ApiError::bad_request(format!(
                    "sort '{}' contains an empty key",
                    raw.trim()
                )));
            }
            let key = Self::parse(kind, segment)?;
            if keys.iter().any(|k| k.field == key.field) {
                return Err(ApiError::bad_request(format!(
                    "sort key '{}' appears more than once",
                    key.field
                )));
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Resolve a sort shortcut of `search_openalex`
    ///
    /// Takes an optional `:asc`/`:desc` suffix. A shortcut the kind cannot
    /// honour is dropped, and `relevance` only applies when there is a search
    /// term.
    pub fn shortcut(kind: EntityKind, raw: &str, has_search: bool) -> Result<Option<Self>> {
        let (name, direction) = split_direction(raw)?;
        let field = match name {
            "cited_by_count" => "cited_by_count",
            "publication_date" => "publication_date",
            "works_count" => "works_count",
            "relevance" if has_search => "relevance_score",
            "relevance" => return Ok(None),
            other => {
                return Err(ApiError::bad_request(format!(
                    "unknown sort '{}' (expected cited_by_count, publication_date, relevance or works_count)",
                    other
                )))
            }
        };

        Ok(kind
            .sortable_fields()
            .iter()
            .find(|f| **f == field)
            .copied()
            .map(|field| Self { field, direction }))
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }
}

/// Split `name[:asc|:desc]`; a bare name sorts descending
fn split_direction(raw: &str) -> Result<(&str, SortDirection)> {
    let raw = raw.trim();
    match raw.split_once(':') {
        None => Ok((raw, SortDirection::Desc)),
        Some((name, direction)) => match direction.trim() {
            "asc" => Ok((name.trim(), SortDirection::Asc)),
            "desc" => Ok((name.trim(), SortDirection::Desc)),
            other => Err(ApiError::bad_request(format!(
                "sort direction must be asc or desc, got '{}'",
                other
            ))),
        },
    }
}

impl std::fmt::Display for SortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.field, self.direction.as_str())
    }
}

/// Pagination position
///
/// `Start` and `Exhausted` are distinct so a finished traversal can never be
/// mistaken for a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    Start,
    Token(String),
    Exhausted,
}

impl Cursor {
    /// Interpret a caller-supplied cursor string
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | CURSOR_START => Cursor::Start,
            CURSOR_EXHAUSTED => Cursor::Exhausted,
            token => Cursor::Token(token.to_string()),
        }
    }

    /// Map the provider's `next_cursor`; absence means no further pages
    pub fn from_provider(next: Option<&str>) -> Self {
        match next {
            Some(token) if !token.is_empty() => Cursor::Token(token.to_string()),
            _ => Cursor::Exhausted,
        }
    }

    /// Value for the `cursor` query parameter
    pub fn as_param(&self) -> Result<&str> {
        match self {
            Cursor::Start => Ok(CURSOR_START),
            Cursor::Token(token) => Ok(token.as_str()),
            Cursor::Exhausted => Err(ApiError::bad_request(
                "this traversal is already exhausted; start a new one without a cursor",
            )),
        }
    }

    /// Value handed back to the caller
    pub fn as_str(&self) -> &str {
        match self {
            Cursor::Start => CURSOR_START,
            Cursor::Token(token) => token.as_str(),
            Cursor::Exhausted => CURSOR_EXHAUSTED,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Cursor::Exhausted)
    }
}

/// Offset paging for short listings, cursor paging for traversals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMode {
    Offset { page: u32 },
    Cursor(Cursor),
}

impl PageMode {
    /// Pick the mode from the caller's `page` and `cursor`, which are exclusive
    pub fn from_caller(page: Option<u32>, cursor: Option<&str>) -> Result<Self> {
        match (page, cursor) {
            (Some(_), Some(_)) => Err(ApiError::bad_request(
                "page and cursor cannot be combined; use one pagination mode",
            )),
            (Some(0), None) => Err(ApiError::bad_request("page numbers start at 1")),
            (Some(page), None) => Ok(PageMode::Offset { page }),
            (None, Some(cursor)) => Ok(PageMode::Cursor(Cursor::parse(cursor))),
            (None, None) => Ok(PageMode::Offset { page: 1 }),
        }
    }
}

/// A fully validated listing request for one kind
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub kind: EntityKind,
    pub search: Option<String>,
    pub filter: FilterExpression,
    /// Sort keys, most significant first
    pub sort: Vec<SortSpec>,
    pub select: Option<Vec<String>>,
    pub group_by: Option<String>,
    pub page: PageMode,
    pub per_page: u32,
}

impl SearchRequest {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            search: None,
            filter: FilterExpression::new(),
            sort: Vec::new(),
            select: None,
            group_by: None,
            page: PageMode::Offset { page: 1 },
            per_page: Limits::QUERY.default,
        }
    }

    pub fn search(mut self, search: Option<String>) -> Self {
        self.search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn filter(mut self, filter: FilterExpression) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort: impl IntoIterator<Item = SortSpec>) -> Self {
        self.sort = sort.into_iter().collect();
        self
    }

    pub fn page(mut self, page: PageMode) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Restrict returned fields; names must be plain dotted identifiers
    pub fn select(mut self, select: Option<&str>) -> Result<Self> {
        self.select = match select.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => {
                let fields: Vec<String> = raw.split(',').map(|f| f.trim().to_string()).collect();
                if let Some(bad) = fields.iter().find(|f| !is_plain_field(f)) {
                    return Err(ApiError::bad_request(format!(
                        "'{}' is not a valid select field",
                        bad
                    )));
                }
                Some(fields)
            }
        };
        Ok(self)
    }

    /// Group counts by a field on the kind's allow-list
    pub fn group_by(mut self, group_by: Option<&str>) -> Result<Self> {
        self.group_by = match group_by.map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(field) => {
                if self.kind.field(field).is_none() {
                    return Err(ApiError::bad_request(format!(
                        "cannot group {} by '{}' (see openalex_filter_fields)",
                        self.kind.collection(),
                        field
                    )));
                }
                Some(field.to_string())
            }
        };
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.per_page == 0 || self.per_page > MAX_PAGE_SIZE {
            return Err(ApiError::bad_request(format!(
                "per-page must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        match &self.page {
            PageMode::Offset { page } => {
                let depth = u64::from(*page) * u64::from(self.per_page);
                if depth > u64::from(MAX_OFFSET_RESULTS) {
                    return Err(ApiError::bad_request(format!(
                        "offset paging stops at {} results; use cursor pagination to go deeper",
                        MAX_OFFSET_RESULTS
                    )));
                }
            }
            PageMode::Cursor(cursor) => {
                cursor.as_param()?;
            }
        }
        Ok(())
    }

    /// Build the outbound request
    pub fn to_api_request(&self) -> Result<ApiRequest> {
        self.validate()?;

        let mut request = ApiRequest::new(format!("/{}", self.kind.collection()));
        if let Some(filter) = self.filter.to_param() {
            request = request.param("filter", filter);
        }
        if let Some(search) = &self.search {
            request = request.param("search", search);
        }
        if !self.sort.is_empty() {
            let keys: Vec<String> = self.sort.iter().map(SortSpec::to_string).collect();
            request = request.param("sort", keys.join(","));
        }
        if let Some(select) = &self.select {
            request = request.param("select", select.join(","));
        }
        if let Some(group_by) = &self.group_by {
            request = request.param("group_by", group_by);
        }
        request = request.param("per-page", self.per_page.to_string());
        request = match &self.page {
            PageMode::Offset { page } => request.param("page", page.to_string()),
            PageMode::Cursor(cursor) => request.param("cursor", cursor.as_param()?),
        };
        Ok(request)
    }
}

fn is_plain_field(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_limit_rejects_out_of_range() {
        assert_eq!(Limits::SEARCH.check(None).unwrap(), 15);
        assert_eq!(Limits::SEARCH.check(Some(50)).unwrap(), 50);
        assert_eq!(Limits::SEARCH.check(Some(51)).unwrap_err().kind(), ErrorKind::BadRequest);
        assert!(Limits::QUERY.check(Some(0)).is_err());
        assert_eq!(Limits::QUERY.check(Some(200)).unwrap(), 200);
    }

    #[test]
    fn test_sort_parse() {
        let sort = SortSpec::parse(EntityKind::Work, "publication_date:asc").unwrap();
        assert_eq!(sort.to_string(), "publication_date:asc");
        assert_eq!(
            SortSpec::parse(EntityKind::Work, "cited_by_count").unwrap().to_string(),
            "cited_by_count:desc"
        );
        assert!(SortSpec::parse(EntityKind::Author, "publication_date:desc").is_err());
        assert!(SortSpec::parse(EntityKind::Work, "cited_by_count:up").is_err());
    }

    #[test]
    fn test_sort_shortcuts() {
        assert_eq!(
            SortSpec::shortcut(EntityKind::Author, "publication_date", false).unwrap(),
            None
        );
        assert_eq!(SortSpec::shortcut(EntityKind::Work, "relevance", false).unwrap(), None);
        assert_eq!(
            SortSpec::shortcut(EntityKind::Work, "relevance", true)
                .unwrap()
                .map(|s| s.to_string()),
            Some("relevance_score:desc".to_string())
        );
        assert!(SortSpec::shortcut(EntityKind::Work, "newest", false).is_err());
    }

    #[test]
    fn test_sort_shortcut_direction_suffix() {
        let sort = SortSpec::shortcut(EntityKind::Work, "cited_by_count:asc", true)
            .unwrap()
            .unwrap();
        assert_eq!(sort.direction(), SortDirection::Asc);
        assert_eq!(sort.to_string(), "cited_by_count:asc");
        assert_eq!(
            SortSpec::shortcut(EntityKind::Work, "publication_date:desc", false)
                .unwrap()
                .map(|s| s.to_string()),
            Some("publication_date:desc".to_string())
        );
        assert_eq!(
            SortSpec::shortcut(EntityKind::Work, "relevance:asc", true)
                .unwrap()
                .map(|s| s.to_string()),
            Some("relevance_score:asc".to_string())
        );
        assert!(SortSpec::shortcut(EntityKind::Work, "cited_by_count:up", true).is_err());
    }

    #[test]
    fn test_multi_key_sort() {
        let keys =
            SortSpec::parse_list(EntityKind::Work, "cited_by_count:desc, publication_year:asc")
                .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].field(), "publication_year");
        assert_eq!(keys[1].direction(), SortDirection::Asc);

        let request = SearchRequest::new(EntityKind::Work)
            .sort(keys)
            .to_api_request()
            .unwrap();
        assert_eq!(
            request.get("sort"),
            Some("cited_by_count:desc,publication_year:asc")
        );

        assert!(SortSpec::parse_list(EntityKind::Work, "cited_by_count,").is_err());
        assert!(SortSpec::parse_list(EntityKind::Work, "cited_by_count:asc,cited_by_count").is_err());
        assert!(SortSpec::parse_list(EntityKind::Work, "cited_by_count,made_up:asc").is_err());
    }

    #[test]
    fn test_cursor_states_are_distinct() {
        assert_eq!(Cursor::parse("*"), Cursor::Start);
        assert_eq!(Cursor::parse(""), Cursor::Start);
        assert_eq!(Cursor::parse(CURSOR_EXHAUSTED), Cursor::Exhausted);
        assert_eq!(Cursor::from_provider(None), Cursor::Exhausted);
        assert_eq!(Cursor::from_provider(Some("")), Cursor::Exhausted);
        assert_eq!(Cursor::from_provider(Some("abc")), Cursor::Token("abc".into()));
        assert_ne!(Cursor::Start.as_str(), Cursor::Exhausted.as_str());
    }

    #[test]
    fn test_exhausted_cursor_never_becomes_a_request() {
        let request = SearchRequest::new(EntityKind::Work).page(PageMode::Cursor(Cursor::Exhausted));
        let err = request.to_api_request().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_page_mode_exclusive() {
        assert!(PageMode::from_caller(Some(2), Some("*")).is_err());
        assert!(PageMode::from_caller(Some(0), None).is_err());
        assert_eq!(
            PageMode::from_caller(None, None).unwrap(),
            PageMode::Offset { page: 1 }
        );
    }

    #[test]
    fn test_offset_depth_limit() {
        let request = SearchRequest::new(EntityKind::Work)
            .per_page(200)
            .page(PageMode::Offset { page: 51 });
        assert!(request.validate().is_err());

        let request = SearchRequest::new(EntityKind::Work)
            .per_page(200)
            .page(PageMode::Offset { page: 50 });
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_api_request_params() {
        let filter = FilterExpression::parse(EntityKind::Work, "is_oa:true").unwrap();
        let request = SearchRequest::new(EntityKind::Work)
            .search(Some("  crispr ".into()))
            .filter(filter)
            .sort(Some(SortSpec::parse(EntityKind::Work, "cited_by_count:desc").unwrap()))
            .select(Some("id, display_name"))
            .unwrap()
            .per_page(10)
            .page(PageMode::Cursor(Cursor::Start))
            .to_api_request()
            .unwrap();

        assert_eq!(request.path(), "/works");
        assert_eq!(request.get("filter"), Some("is_oa:true"));
        assert_eq!(request.get("search"), Some("crispr"));
        assert_eq!(request.get("sort"), Some("cited_by_count:desc"));
        assert_eq!(request.get("select"), Some("id,display_name"));
        assert_eq!(request.get("per-page"), Some("10"));
        assert_eq!(request.get("cursor"), Some("*"));
        assert_eq!(request.get("page"), None);
    }

    #[test]
    fn test_group_by_validated() {
        assert!(SearchRequest::new(EntityKind::Work)
            .group_by(Some("oa_status"))
            .is_ok());
        assert!(SearchRequest::new(EntityKind::Work)
            .group_by(Some("made_up"))
            .is_err());
    }
}
