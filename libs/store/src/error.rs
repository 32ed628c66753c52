use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing cache could not be reached or rejected the command. Transient.
    #[error("ttl store unavailable during {op}")]
    Unavailable {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },
    /// A key held something the operation cannot interpret (e.g. a non-integer counter).
    #[error("value at {key} is not usable: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl StoreError {
    pub fn unavailable(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        StoreError::Unavailable {
            op,
            source: source.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}
