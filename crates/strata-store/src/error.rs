//! Store error types.

/// Errors raised while loading or serializing a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key changed shape between layers while strict merging was enabled.
    #[error("merge conflict at key '{key}': cannot merge {incoming} over {existing}")]
    MergeConflict {
        /// Dotted path of the offending key.
        key: String,
        /// Shape already present in the store.
        existing: &'static str,
        /// Shape the later layer tried to introduce.
        incoming: &'static str,
    },

    /// Source bytes failed to parse.
    #[error("{format} parse error: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    /// The parsed source was not a table at the top level.
    #[error("top-level value must be a table, got {kind}")]
    NotATable { kind: &'static str },

    /// The tree could not be serialized back out.
    #[error("serialization error: {0}")]
    Serialize(String),
}
