//! The query engine: search, query, fetch and batch over one shared transport.
//!
//! [`OpenAlexClient`] compiles caller intent into provider requests, runs them
//! through the transport (which owns throttling and retries) and normalizes the
//! answers. Every failure comes back as an [`ApiError`] of the closed taxonomy.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::models::{
    EntityKind, FieldType, GroupListing, ListingPage, NormalizedRecord, Related, RelatedRule,
};
use crate::query::identifier::clean_native_id;
use crate::query::{
    FilterClause, FilterCompiler, FilterExpression, FilterOp, FilterParams, Identifier, Limits,
    LookupTarget, Operator, PageMode, SearchRequest, SortSpec,
};
use crate::transport::{ApiRequest, HttpTransport, RateLimitedTransport, Transport};
use crate::utils::{CircuitBreaker, Clock, TokenBucket, TokioClock};

pub mod batch;
pub mod normalize;
pub mod paginator;

pub use batch::{BatchFetcher, BATCH_CHUNK_SIZE, MAX_BATCH_SIZE};
pub use paginator::{Paginator, PaginatorState};

use normalize::{normalize_groups, normalize_listing, normalize_record, normalize_related};

/// Related entities fetched per expansion
pub const RELATED_LIMIT: u32 = 5;

/// Most records one `max_records` traversal may collect
pub const MAX_COLLECT_RECORDS: usize = 10_000;

/// Parameters of a keyword search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub query: String,
    pub kind: EntityKind,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub country: Option<String>,
    /// Institution ID, ROR, or a name resolved with one institution search
    pub institution: Option<String>,
    pub is_oa: Option<bool>,
    /// `cited_by_count`, `publication_date`, `relevance` or `works_count`
    pub sort: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub cursor: Option<String>,
    pub timeout: Option<Duration>,
}

impl SearchParams {
    pub fn new(query: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            query: query.into(),
            kind,
            year_from: None,
            year_to: None,
            country: None,
            institution: None,
            is_oa: None,
            sort: None,
            limit: None,
            page: None,
            cursor: None,
            timeout: None,
        }
    }
}

/// Parameters of a raw-filter query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub kind: EntityKind,
    pub filter: Option<String>,
    pub search: Option<String>,
    /// `field[:asc|desc]`; defaults to `cited_by_count:desc`, empty means unsorted
    pub sort: Option<String>,
    pub select: Option<String>,
    pub group_by: Option<String>,
    pub limit: Option<u32>,
    pub page: Option<u32>,
    pub cursor: Option<String>,
    /// Walk cursor pages until this many records are collected
    pub max_records: Option<usize>,
    pub timeout: Option<Duration>,
}

impl QueryParams {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            filter: None,
            search: None,
            sort: None,
            select: None,
            group_by: None,
            limit: None,
            page: None,
            cursor: None,
            max_records: None,
            timeout: None,
        }
    }
}

/// Answer of [`OpenAlexClient::query`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Listing(ListingPage),
    Groups(GroupListing),
}

/// Filterable field as listed by [`field_reference`]
#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub operators: &'static [Operator],
}

/// Filter, sort and shortcut reference for one kind
#[derive(Debug, Clone, Serialize)]
pub struct FieldReference {
    pub entity_type: EntityKind,
    pub fields: Vec<FieldInfo>,
    pub sortable: &'static [&'static str],
    pub year_field: Option<&'static str>,
    pub country_field: Option<&'static str>,
    pub open_access_field: Option<&'static str>,
    pub grammar: &'static [(&'static str, &'static str)],
}

const GRAMMAR: &[(&str, &str)] = &[
    ("and", "publication_year:2024,is_oa:true"),
    ("or", "publication_year:2023|2024"),
    ("and_within_field", "authorships.countries:US+CN"),
    ("not", "type:!paratext"),
    ("greater_than", "cited_by_count:>100"),
    ("less_than", "cited_by_count:<10"),
    ("range", "publication_year:2020-2024"),
];

/// Describe what `kind` can be filtered and sorted by
pub fn field_reference(kind: EntityKind) -> FieldReference {
    FieldReference {
        entity_type: kind,
        fields: kind
            .fields()
            .iter()
            .map(|spec| FieldInfo {
                name: spec.name,
                field_type: spec.field_type,
                operators: Operator::supported_by(spec.field_type),
            })
            .collect(),
        sortable: kind.sortable_fields(),
        year_field: kind.year_field(),
        country_field: kind.country_field(),
        open_access_field: kind.open_access_field(),
        grammar: GRAMMAR,
    }
}

/// Convert a caller timeout in seconds; must be positive and finite
pub fn timeout_from_secs(secs: Option<f64>) -> Result<Option<Duration>> {
    match secs {
        None => Ok(None),
        Some(s) if s.is_finite() && s > 0.0 => Duration::try_from_secs_f64(s)
            .map(Some)
            .map_err(|e| ApiError::bad_request(format!("invalid timeout_secs: {}", e))),
        Some(s) => Err(ApiError::bad_request(format!(
            "timeout_secs must be a positive number, got {}",
            s
        ))),
    }
}

/// Run `call` under an optional deadline
///
/// On expiry the in-flight request and any pending retries are dropped, and
/// nothing collected so far is returned.
async fn with_deadline<T, F>(timeout: Option<Duration>, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        None => call.await,
        Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(ApiError::timeout(format!(
                "call did not finish within {:.1}s",
                limit.as_secs_f64()
            )))
        }),
    }
}

/// Query engine over a shared transport
#[derive(Debug, Clone)]
pub struct OpenAlexClient {
    transport: Arc<dyn Transport>,
    compiler: FilterCompiler,
}

impl OpenAlexClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            compiler: FilterCompiler::new(),
        }
    }

    /// Use a specific compiler (tests pin the current year this way)
    pub fn with_compiler(mut self, compiler: FilterCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Build the production stack: HTTP transport behind one process-wide
    /// token bucket and circuit breaker
    pub fn from_config(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let has_contact = config.provider.email.is_some();
        let bucket = match config.rate_limit.requests_per_second {
            Some(rate) => TokenBucket::new(rate, config.rate_limit.burst, clock.clone()),
            None => TokenBucket::for_tier(has_contact, clock.clone()),
        };
        tracing::info!(
            "Rate budget: {} requests/second ({} tier)",
            bucket.rate(),
            if has_contact { "contact" } else { "anonymous" }
        );

        let breaker = CircuitBreaker::new(config.circuit_breaker, clock.clone());
        let http = HttpTransport::new(&config.provider)?;
        let transport = RateLimitedTransport::new(
            http,
            Arc::new(bucket),
            Arc::new(breaker),
            config.retry,
            clock,
        );
        Ok(Self::new(Arc::new(transport)))
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Keyword search with field shortcuts
    pub async fn search(&self, params: SearchParams) -> Result<ListingPage> {
        let timeout = params.timeout;
        with_deadline(timeout, self.run_search(params)).await
    }

    async fn run_search(&self, params: SearchParams) -> Result<ListingPage> {
        let kind = params.kind;
        let query = params.query.trim();
        if query.is_empty() {
            return Err(ApiError::bad_request("query is required"));
        }
        let limit = Limits::SEARCH.check(params.limit)?;
        let mode = PageMode::from_caller(params.page, params.cursor.as_deref())?;
        let sort = SortSpec::shortcut(kind, params.sort.as_deref().unwrap_or("cited_by_count"), true)?;

        let institution = match (kind.institution_fields(), params.institution.as_deref()) {
            (Some(_), Some(raw)) => Some(self.resolve_institution(raw).await?),
            _ => None,
        };
        let filter = self.compiler.compile(
            kind,
            &FilterParams {
                year_from: params.year_from,
                year_to: params.year_to,
                country: params.country,
                institution,
                open_access: params.is_oa,
                raw: None,
            },
        )?;

        let request = SearchRequest::new(kind)
            .search(Some(query.to_string()))
            .filter(filter)
            .sort(sort)
            .per_page(limit)
            .page(mode);
        self.listing(&request).await
    }

    /// Raw-filter query, group counts, or a bounded cursor traversal
    pub async fn query(&self, params: QueryParams) -> Result<QueryResult> {
        let timeout = params.timeout;
        with_deadline(timeout, self.run_query(params)).await
    }

    async fn run_query(&self, params: QueryParams) -> Result<QueryResult> {
        let kind = params.kind;
        let limit = Limits::QUERY.check(params.limit)?;
        let filter = self.compiler.compile(
            kind,
            &FilterParams {
                raw: params.filter,
                ..Default::default()
            },
        )?;
        let sort = match params.sort.as_deref().map(str::trim) {
            None => vec![SortSpec::parse(kind, "cited_by_count:desc")?],
            Some("") => Vec::new(),
            Some(raw) => SortSpec::parse_list(kind, raw)?,
        };

        let mut request = SearchRequest::new(kind)
            .search(params.search)
            .filter(filter)
            .sort(sort)
            .per_page(limit)
            .select(params.select.as_deref())?
            .group_by(params.group_by.as_deref())?;

        if let Some(group_by) = request.group_by.clone() {
            if params.max_records.is_some() {
                return Err(ApiError::bad_request("max_records cannot be combined with group_by"));
            }
            request = request.page(PageMode::from_caller(params.page, params.cursor.as_deref())?);
            let value = self.transport.get(&request.to_api_request()?).await?;
            return normalize_groups(kind, &group_by, value).map(QueryResult::Groups);
        }

        match params.max_records {
            None => {
                request = request.page(PageMode::from_caller(params.page, params.cursor.as_deref())?);
                self.listing(&request).await.map(QueryResult::Listing)
            }
            Some(max_records) => {
                if max_records == 0 || max_records > MAX_COLLECT_RECORDS {
                    return Err(ApiError::bad_request(format!(
                        "max_records must be between 1 and {}",
                        MAX_COLLECT_RECORDS
                    )));
                }
                if params.page.is_some() {
                    return Err(ApiError::bad_request(
                        "max_records walks cursor pages and cannot start from a page number",
                    ));
                }
                request = request.page(PageMode::from_caller(None, Some(params.cursor.as_deref().unwrap_or("")))?);
                request.validate()?;
                Paginator::new(self.transport.as_ref(), request)
                    .collect(max_records)
                    .await
                    .map(QueryResult::Listing)
            }
        }
    }

    /// Look up one entity by any identifier the kind accepts
    ///
    /// Free text is resolved by taking the best search hit. With
    /// `include_related` the kind's related entities are fetched too; kinds
    /// without a related rule ignore the flag.
    pub async fn fetch(
        &self,
        raw: &str,
        kind: EntityKind,
        include_related: bool,
        timeout: Option<Duration>,
    ) -> Result<NormalizedRecord> {
        with_deadline(timeout, self.run_fetch(raw, kind, include_related)).await
    }

    async fn run_fetch(&self, raw: &str, kind: EntityKind, include_related: bool) -> Result<NormalizedRecord> {
        let (identifier, target) = Identifier::resolve(kind, raw)?;
        tracing::debug!("Resolved '{}' as {} for {}", raw.trim(), identifier.tag(), kind);

        let mut record = match target {
            LookupTarget::Path(path) => {
                let value = self.transport.get(&ApiRequest::new(path)).await?;
                normalize_record(kind, value)?
            }
            LookupTarget::Search(text) => self
                .search_first(kind, &text)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("no {} matches '{}'", kind, text)))?,
        };

        if include_related {
            if let Some(rule) = kind.related() {
                let related = match record.id() {
                    Some(id) => self.related(rule, clean_native_id(id)).await?,
                    None => empty_related(rule),
                };
                record.attach_related(related);
            }
        }
        Ok(record)
    }

    /// Look up many entities; see [`BatchFetcher`]
    pub async fn batch(
        &self,
        identifiers: &[String],
        kind: EntityKind,
        timeout: Option<Duration>,
    ) -> Result<crate::models::BatchResult> {
        let fetcher = BatchFetcher::new(self.transport.as_ref());
        with_deadline(timeout, fetcher.fetch(kind, identifiers)).await
    }

    async fn listing(&self, request: &SearchRequest) -> Result<ListingPage> {
        let value = self.transport.get(&request.to_api_request()?).await?;
        normalize_listing(request.kind, value, &request.page)
    }

    async fn search_first(&self, kind: EntityKind, text: &str) -> Result<Option<NormalizedRecord>> {
        let request = SearchRequest::new(kind)
            .search(Some(text.to_string()))
            .per_page(1);
        Ok(self.listing(&request).await?.results.into_iter().next())
    }

    async fn resolve_institution(&self, raw: &str) -> Result<Identifier> {
        let (identifier, target) = Identifier::resolve(EntityKind::Institution, raw)?;
        let LookupTarget::Search(name) = target else {
            return Ok(identifier);
        };

        let record = self
            .search_first(EntityKind::Institution, &name)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("no institution matches '{}'", name)))?;
        let id = record
            .id()
            .map(clean_native_id)
            .ok_or_else(|| ApiError::server_error("institution search hit has no id"))?;
        tracing::debug!("Resolved institution '{}' to {}", name, id);
        Ok(Identifier::NativeId {
            kind: EntityKind::Institution,
            id: EntityKind::Institution.canonical_id(id),
        })
    }

    async fn related(&self, rule: RelatedRule, id: &str) -> Result<Related> {
        let mut filter = FilterExpression::new();
        filter.push(FilterClause::new(
            rule.target,
            rule.filter_field,
            FilterOp::Equals(id.to_string()),
        )?);
        let request = SearchRequest::new(rule.target)
            .filter(filter)
            .sort(Some(SortSpec::parse(rule.target, "cited_by_count:desc")?))
            .per_page(RELATED_LIMIT);
        let value = self.transport.get(&request.to_api_request()?).await?;
        normalize_related(rule.target, value)
    }
}

fn empty_related(rule: RelatedRule) -> Related {
    match rule.target {
        EntityKind::Author => Related::Authors(Vec::new()),
        _ => Related::Works(Vec::new()),
    }
}
