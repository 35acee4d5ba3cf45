use anyhow::Result;
use clap::{Parser, Subcommand};
use openalex_mcp::client::OpenAlexClient;
use openalex_mcp::config::Config;
use openalex_mcp::mcp::{McpServer, ToolRegistry};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// OpenAlex MCP - Query the OpenAlex bibliographic database from MCP clients or the shell
#[derive(Parser, Debug)]
#[command(name = "openalex-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "hongkongkiwi")]
#[command(about = "MCP server and CLI for the OpenAlex bibliographic database", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Contact address sent to OpenAlex (overrides OPENALEX_EMAIL and the config file)
    #[arg(long, global = true)]
    email: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server (stdio unless --http is given)
    Serve {
        /// Serve over streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,

        /// Host to bind to in HTTP mode [default: from config]
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to in HTTP mode [default: from config]
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Keyword search with shortcuts
    Search {
        query: String,

        /// Entity type
        #[arg(long, short = 't', default_value = "works")]
        entity_type: String,

        #[arg(long)]
        year_from: Option<i32>,

        #[arg(long)]
        year_to: Option<i32>,

        /// ISO country code(s), comma-separated
        #[arg(long)]
        country: Option<String>,

        /// Institution ROR, OpenAlex ID or name
        #[arg(long)]
        institution: Option<String>,

        /// Only open-access records
        #[arg(long)]
        oa: bool,

        #[arg(long)]
        sort: Option<String>,

        #[arg(long, short)]
        limit: Option<u32>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        cursor: Option<String>,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Query with the native filter syntax
    Query {
        /// Entity type
        #[arg(long, short = 't', default_value = "works")]
        entity_type: String,

        /// Filter expression, e.g. "publication_year:2024,is_oa:true"
        #[arg(long, short)]
        filter: Option<String>,

        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        sort: Option<String>,

        #[arg(long)]
        select: Option<String>,

        #[arg(long)]
        group_by: Option<String>,

        #[arg(long, short)]
        limit: Option<u32>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        cursor: Option<String>,

        /// Follow cursors until this many records are collected
        #[arg(long)]
        max_records: Option<u32>,

        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Fetch one entity by any identifier
    Fetch {
        identifier: String,

        #[arg(long, short = 't', default_value = "work")]
        entity_type: String,

        /// Attach top related works or authors
        #[arg(long)]
        related: bool,

        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Fetch many entities at once
    Batch {
        #[arg(required = true)]
        identifiers: Vec<String>,

        #[arg(long, short = 't', default_value = "work")]
        entity_type: String,

        #[arg(long)]
        timeout: Option<f64>,
    },

    /// List filterable and sortable fields of an entity type
    Fields {
        #[arg(default_value = "works")]
        entity_type: String,
    },
}

/// Insert the `Some` values of `pairs` into a tool argument object
fn tool_args(pairs: Vec<(&str, Option<Value>)>) -> Value {
    let map: Map<String, Value> = pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v)))
        .collect();
    Value::Object(map)
}

impl Commands {
    /// Tool name and arguments for the one-shot subcommands
    fn tool_call(&self) -> Option<(&'static str, Value)> {
        let call = match self {
            Commands::Serve { .. } => return None,
            Commands::Search {
                query,
                entity_type,
                year_from,
                year_to,
                country,
                institution,
                oa,
                sort,
                limit,
                page,
                cursor,
                timeout,
            } => (
                "search_openalex",
                tool_args(vec![
                    ("query", Some(json!(query))),
                    ("entity_type", Some(json!(entity_type))),
                    ("year_from", year_from.map(|v| json!(v))),
                    ("year_to", year_to.map(|v| json!(v))),
                    ("country", country.as_ref().map(|v| json!(v))),
                    ("institution", institution.as_ref().map(|v| json!(v))),
                    ("is_oa", oa.then(|| json!(true))),
                    ("sort", sort.as_ref().map(|v| json!(v))),
                    ("limit", limit.map(|v| json!(v))),
                    ("page", page.map(|v| json!(v))),
                    ("cursor", cursor.as_ref().map(|v| json!(v))),
                    ("timeout_secs", timeout.map(|v| json!(v))),
                ]),
            ),
            Commands::Query {
                entity_type,
                filter,
                search,
                sort,
                select,
                group_by,
                limit,
                page,
                cursor,
                max_records,
                timeout,
            } => (
                "query_openalex",
                tool_args(vec![
                    ("entity_type", Some(json!(entity_type))),
                    ("filter", filter.as_ref().map(|v| json!(v))),
                    ("search", search.as_ref().map(|v| json!(v))),
                    ("sort", sort.as_ref().map(|v| json!(v))),
                    ("select", select.as_ref().map(|v| json!(v))),
                    ("group_by", group_by.as_ref().map(|v| json!(v))),
                    ("limit", limit.map(|v| json!(v))),
                    ("page", page.map(|v| json!(v))),
                    ("cursor", cursor.as_ref().map(|v| json!(v))),
                    ("max_records", max_records.map(|v| json!(v))),
                    ("timeout_secs", timeout.map(|v| json!(v))),
                ]),
            ),
            Commands::Fetch {
                identifier,
                entity_type,
                related,
                timeout,
            } => (
                "fetch_openalex",
                tool_args(vec![
                    ("identifier", Some(json!(identifier))),
                    ("entity_type", Some(json!(entity_type))),
                    ("include_related", Some(json!(related))),
                    ("timeout_secs", timeout.map(|v| json!(v))),
                ]),
            ),
            Commands::Batch {
                identifiers,
                entity_type,
                timeout,
            } => (
                "batch_fetch_openalex",
                tool_args(vec![
                    ("identifiers", Some(json!(identifiers))),
                    ("entity_type", Some(json!(entity_type))),
                    ("timeout_secs", timeout.map(|v| json!(v))),
                ]),
            ),
            Commands::Fields { entity_type } => (
                "openalex_filter_fields",
                json!({ "entity_type": entity_type }),
            ),
        };
        Some(call)
    }
}

fn init_logging(cli: &Cli) {
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let level = if cli.quiet { "error" } else { level };

    // stdout carries MCP frames and command output, so logs go to stderr
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("openalex_mcp={}", level)),
    );
    let json_layer = cli
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!cli.log_json)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.email.is_some() {
        config.provider.email = cli.email.clone();
    }
    if config.provider.email.is_none() {
        tracing::debug!("No contact email configured; using the anonymous rate tier");
    }

    let client = Arc::new(OpenAlexClient::from_config(&config)?);

    let command = cli.command.unwrap_or(Commands::Serve {
        http: false,
        host: None,
        port: None,
    });

    if let Some((tool, args)) = command.tool_call() {
        let registry = ToolRegistry::new(client);
        let value = registry
            .execute(tool, args)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        if value["is_error"] == json!(true) {
            std::process::exit(1);
        }
        return Ok(());
    }

    let Commands::Serve { http, host, port } = command else {
        return Ok(());
    };
    let server = McpServer::new(client)?;

    if http {
        let host = host.unwrap_or(config.server.host);
        let port = port.unwrap_or(config.server.port);
        let addr = format!("{}:{}", host, port);
        let (bound_addr, handle) = server.run_http(&addr).await?;
        tracing::info!("MCP server listening on {}", bound_addr);

        tokio::select! {
            result = handle => {
                result.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
            }
        }
    } else {
        server.run().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["openalex-mcp"]);
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        assert!(!cli.log_json);
        assert!(cli.config.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::parse_from(["openalex-mcp", "-vv"]);
        assert_eq!(cli.verbose, 2);

        let cli = Cli::parse_from(["openalex-mcp", "fields", "--verbose"]);
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_serve_command() {
        let cli = Cli::parse_from(["openalex-mcp", "serve", "--http", "--port", "9000"]);
        match cli.command {
            Some(Commands::Serve { http, host, port }) => {
                assert!(http);
                assert!(host.is_none());
                assert_eq!(port, Some(9000));
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_search_tool_call() {
        let cli = Cli::parse_from([
            "openalex-mcp",
            "search",
            "graph neural networks",
            "--year-from",
            "2020",
            "--country",
            "us",
            "--oa",
        ]);
        let (tool, args) = cli.command.unwrap().tool_call().unwrap();
        assert_eq!(tool, "search_openalex");
        assert_eq!(args["query"], "graph neural networks");
        assert_eq!(args["entity_type"], "works");
        assert_eq!(args["year_from"], 2020);
        assert_eq!(args["is_oa"], true);
        assert!(args.get("year_to").is_none());
        assert!(args.get("limit").is_none());
    }

    #[test]
    fn test_batch_tool_call() {
        let cli = Cli::parse_from(["openalex-mcp", "batch", "W1", "10.1000/x", "-t", "works"]);
        let (tool, args) = cli.command.unwrap().tool_call().unwrap();
        assert_eq!(tool, "batch_fetch_openalex");
        assert_eq!(args["identifiers"], json!(["W1", "10.1000/x"]));
    }

    #[test]
    fn test_batch_requires_identifiers() {
        assert!(Cli::try_parse_from(["openalex-mcp", "batch"]).is_err());
    }

    #[test]
    fn test_query_tool_call() {
        let cli = Cli::parse_from([
            "openalex-mcp",
            "query",
            "-f",
            "publication_year:2024",
            "--group-by",
            "type",
        ]);
        let (tool, args) = cli.command.unwrap().tool_call().unwrap();
        assert_eq!(tool, "query_openalex");
        assert_eq!(args["filter"], "publication_year:2024");
        assert_eq!(args["group_by"], "type");
    }

    #[test]
    fn test_serve_has_no_tool_call() {
        let cli = Cli::parse_from(["openalex-mcp", "serve"]);
        assert!(cli.command.unwrap().tool_call().is_none());
    }
}
