//! Tool registry for MCP tools.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::handlers::{
    BatchFetchHandler, FetchHandler, FilterFieldsHandler, QueryHandler, SearchHandler,
};
use crate::client::{OpenAlexClient, MAX_BATCH_SIZE, MAX_COLLECT_RECORDS};
use crate::models::EntityKind;
use crate::query::Limits;

/// An MCP tool that can be called by the client
#[derive(Clone)]
pub struct Tool {
    /// Tool name (e.g., "search_openalex")
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// JSON Schema for input parameters
    pub input_schema: Value,

    /// Handler function to execute the tool
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Handler for executing a tool
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + std::fmt::Debug {
    /// Execute the tool with the given arguments
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Registry for all MCP tools
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

fn entity_schema(default: &str) -> Value {
    let names: Vec<&str> = EntityKind::ALL.iter().map(EntityKind::collection).collect();
    json!({
        "type": "string",
        "description": format!("Entity type, singular or plural ({})", names.join(", ")),
        "default": default
    })
}

fn timeout_schema() -> Value {
    json!({
        "type": "number",
        "description": "Give up after this many seconds; partial results are discarded"
    })
}

impl ToolRegistry {
    /// Create a registry holding every OpenAlex tool, all sharing `client`
    pub fn new(client: Arc<OpenAlexClient>) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };

        // 1. search_openalex - keyword search with shortcuts
        registry.register(Tool {
            name: "search_openalex".to_string(),
            description: "Keyword search over OpenAlex with year, country, institution and \
                          open-access shortcuts. Use query_openalex for full filter syntax."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Search text"
                    },
                    "entity_type": entity_schema("works"),
                    "year_from": {
                        "type": "integer",
                        "description": "Earliest publication year (inclusive)"
                    },
                    "year_to": {
                        "type": "integer",
                        "description": "Latest publication year (inclusive)"
                    },
                    "country": {
                        "type": "string",
                        "description": "ISO 3166-1 alpha-2 code(s), comma-separated for OR"
                    },
                    "institution": {
                        "type": "string",
                        "description": "Institution ROR, OpenAlex ID or name"
                    },
                    "is_oa": {
                        "type": "boolean",
                        "description": "Only open-access records"
                    },
                    "sort": {
                        "type": "string",
                        "description": "cited_by_count, publication_date, relevance or works_count; descending unless suffixed with ':asc'",
                        "default": "cited_by_count"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Results per page",
                        "default": Limits::SEARCH.default,
                        "minimum": 1,
                        "maximum": Limits::SEARCH.max
                    },
                    "page": {
                        "type": "integer",
                        "description": "Page number (offset paging)",
                        "minimum": 1
                    },
                    "cursor": {
                        "type": "string",
                        "description": "Cursor from a previous response; '*' starts a traversal"
                    },
                    "timeout_secs": timeout_schema()
                },
                "required": ["query"]
            }),
            handler: Arc::new(SearchHandler {
                client: client.clone(),
            }),
        });

        // 2. query_openalex - raw filter syntax, group-by and traversal
        registry.register(Tool {
            name: "query_openalex".to_string(),
            description: "Query OpenAlex with the native filter syntax. Supports grouping, \
                          field selection and cursor traversal up to max_records. See \
                          openalex_filter_fields for the fields of each entity type."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entity_type": entity_schema("works"),
                    "filter": {
                        "type": "string",
                        "description": "Filter expression, e.g. 'publication_year:2020-2024,is_oa:true'"
                    },
                    "search": {
                        "type": "string",
                        "description": "Optional full-text search"
                    },
                    "sort": {
                        "type": "string",
                        "description": "field[:asc|:desc][,...]; empty string disables sorting",
                        "default": "cited_by_count:desc"
                    },
                    "select": {
                        "type": "string",
                        "description": "Comma-separated top-level fields to return"
                    },
                    "group_by": {
                        "type": "string",
                        "description": "Return counts grouped by this field instead of records"
                    },
                    "limit": {
                        "type": "integer",
                        "description": "Results per page",
                        "default": Limits::QUERY.default,
                        "minimum": 1,
                        "maximum": Limits::QUERY.max
                    },
                    "page": {
                        "type": "integer",
                        "description": "Page number (offset paging)",
                        "minimum": 1
                    },
                    "cursor": {
                        "type": "string",
                        "description": "Cursor from a previous response; '*' starts a traversal"
                    },
                    "max_records": {
                        "type": "integer",
                        "description": "Follow cursors until this many records are collected",
                        "minimum": 1,
                        "maximum": MAX_COLLECT_RECORDS
                    },
                    "timeout_secs": timeout_schema()
                }
            }),
            handler: Arc::new(QueryHandler {
                client: client.clone(),
            }),
        });

        // 3. fetch_openalex - single lookup by any identifier
        registry.register(Tool {
            name: "fetch_openalex".to_string(),
            description: "Fetch one OpenAlex entity by OpenAlex ID, URL, DOI, ORCID, ROR, \
                          ISSN, PMID, PMCID, country code or name."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "identifier": {
                        "type": "string",
                        "description": "Any identifier the entity type accepts"
                    },
                    "entity_type": entity_schema("work"),
                    "include_related": {
                        "type": "boolean",
                        "description": "Attach top related works or authors",
                        "default": false
                    },
                    "timeout_secs": timeout_schema()
                },
                "required": ["identifier"]
            }),
            handler: Arc::new(FetchHandler {
                client: client.clone(),
            }),
        });

        // 4. batch_fetch_openalex - many lookups, one result slot per input
        registry.register(Tool {
            name: "batch_fetch_openalex".to_string(),
            description: format!(
                "Fetch up to {} OpenAlex entities in as few requests as possible. \
                 Results keep input order; misses and invalid inputs get their own slot.",
                MAX_BATCH_SIZE
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "identifiers": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "OpenAlex IDs, DOIs, ORCIDs, RORs, ISSNs, PMIDs or PMCIDs",
                        "maxItems": MAX_BATCH_SIZE
                    },
                    "entity_type": entity_schema("work"),
                    "timeout_secs": timeout_schema()
                },
                "required": ["identifiers"]
            }),
            handler: Arc::new(BatchFetchHandler { client }),
        });

        // 5. openalex_filter_fields - static reference
        registry.register(Tool {
            name: "openalex_filter_fields".to_string(),
            description: "List the filterable and sortable fields of an entity type, with \
                          filter syntax examples."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entity_type": entity_schema("works")
                }
            }),
            handler: Arc::new(FilterFieldsHandler),
        });

        registry
    }

    /// Register a tool
    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Get all registered tools
    pub fn all(&self) -> Vec<&Tool> {
        self.tools.values().collect()
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let tool = self
            .get(name)
            .ok_or_else(|| format!("Tool '{}' not found", name))?;

        tool.handler.execute(args).await
    }
}
