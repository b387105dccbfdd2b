//! Error types for the query compiler and its connection

use std::fmt;

/// Maximum number of bulk item failures carried in a [`Error::BulkWriteFailed`]
pub const BULK_ERROR_LIMIT: usize = 10;

pub type Result<T> = std::result::Result<T, Error>;

/// Quarry errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot use both filter and query contexts within a {context} context")]
    ConflictingQueryContext { context: String },

    #[error("{value} is an invalid {option} option, valid options are: {}", .allowed.join(", "))]
    InvalidOption {
        option: &'static str,
        value: String,
        allowed: Vec<&'static str>,
    },

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Bulk write errors (showing {} of {total}):\n{}", .failures.len(), format_failures(.failures))]
    BulkWriteFailed {
        total: usize,
        failures: Vec<BulkItemFailure>,
    },

    #[error("Transport error{}: {body}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transport { status: Option<u16>, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single failed item of a bulk or index write
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemFailure {
    pub id: String,
    pub reason: String,
    pub caused_by: Option<String>,
}

impl fmt::Display for BulkItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.reason)?;
        if let Some(cause) = &self.caused_by {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

fn format_failures(failures: &[BulkItemFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl Error {
    /// Build a `BulkWriteFailed` from a write response reporting `errors: true`.
    ///
    /// Only the first [`BULK_ERROR_LIMIT`] failing items are kept; `total`
    /// still counts every failure in the response.
    pub fn from_bulk_response(response: &serde_json::Value) -> Self {
        let failed: Vec<BulkItemFailure> = response
            .get("items")
            .and_then(|items| items.as_array())
            .into_iter()
            .flatten()
            .filter_map(|item| {
                // Each item is keyed by its action: index, create, update or delete
                let result = item.as_object()?.values().next()?;
                let error = result.get("error")?;
                if error.is_null() {
                    return None;
                }
                Some(BulkItemFailure {
                    id: result
                        .get("_id")
                        .map(json_to_plain_string)
                        .unwrap_or_default(),
                    reason: error
                        .get("reason")
                        .map(json_to_plain_string)
                        .unwrap_or_else(|| error.to_string()),
                    caused_by: error
                        .get("caused_by")
                        .and_then(|c| c.get("reason"))
                        .map(json_to_plain_string),
                })
            })
            .collect();

        let total = failed.len();
        let failures = failed.into_iter().take(BULK_ERROR_LIMIT).collect();

        Error::BulkWriteFailed { total, failures }
    }
}

fn json_to_plain_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
