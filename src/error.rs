use thiserror::Error;

/// Failures callers may need to tell apart. Everything else travels as
/// `anyhow::Error` with context attached at the boundary.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("plugin entry #{index} in snapshot has no name")]
    MissingPluginName { index: usize },

    #[error("snapshot is not a JSON document: {0}")]
    InvalidSnapshot(#[source] serde_json::Error),

    #[error("conflict data for {plugin} is malformed: {source}")]
    MalformedResponse {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
