//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(author, version, about = "Authenticated requests over a persistent session", long_about = None)]
pub struct Cli {
    /// Config file (falls back to CONFIG_PATH, then session-cli.toml)
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_path: Option<String>,

    /// Print the metrics recorded by this invocation to stderr on exit
    #[arg(long = "metrics", global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in (password from SESSION_PASSWORD or password_file)
    Login {
        /// Account name; defaults to [login] account
        account: Option<String>,
    },

    /// End the session and clear stored credentials
    Logout,

    /// Show the stored identity and session lifetime
    Whoami,

    /// GET a resource
    Get {
        path: String,
        /// Query parameters as key=value
        #[arg(value_parser = parse_pair)]
        query: Vec<(String, String)>,
    },

    /// POST a JSON body
    Post {
        path: String,
        #[arg(value_parser = parse_json)]
        body: Value,
    },

    /// DELETE a resource, with an optional JSON body
    Delete {
        path: String,
        #[arg(value_parser = parse_json)]
        body: Option<Value>,
    },

    /// Upload a file as multipart/form-data
    Upload {
        path: String,
        file: PathBuf,
        /// Form field holding the file
        #[arg(long, default_value = "file")]
        field: String,
        /// Content type of the file part
        #[arg(long)]
        content_type: Option<String>,
    },
}

fn parse_pair(pair: &str) -> Result<(String, String), String> {
    let (key, value) = pair
        .split_once('=')
        .ok_or_else(|| format!("query parameter must be key=value, got: {pair}"))?;
    if key.is_empty() {
        return Err(format!("query parameter has an empty key: {pair}"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_json(body: &str) -> Result<Value, String> {
    serde_json::from_str(body).map_err(|e| format!("body is not valid JSON: {e}"))
}
