use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised while compiling a filter.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Filter '{filter_id}' is not supported by entity '{entity_type}'")]
    Unsupported {
        filter_id: SmolStr,
        entity_type: SmolStr,
    },

    #[error("Invalid parameter '{param}' of filter '{filter_id}': {reason}")]
    InvalidParameter {
        filter_id: SmolStr,
        param: SmolStr,
        reason: String,
    },

    #[error("Lookup for filter '{filter_id}' failed: {source:#}")]
    Lookup {
        filter_id: SmolStr,
        source: anyhow::Error,
    },
}

impl FilterError {
    pub fn invalid(
        filter_id: impl Into<SmolStr>,
        param: impl Into<SmolStr>,
        reason: impl Into<String>,
    ) -> Self {
        FilterError::InvalidParameter {
            filter_id: filter_id.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Query compilation failed: {0}")]
    QueryCompilation(FilterError),

    #[error("Store execution failed: {0:#}")]
    StoreExecution(anyhow::Error),

    #[error("View '{0}' not found")]
    ViewNotFound(String),

    #[error("Selection '{0}' not found")]
    SelectionNotFound(String),

    #[error("Unknown row kind '{kind}' for record '{record}'")]
    UnknownRowKind { record: String, kind: String },

    #[error("Record '{0}' not found")]
    RecordNotFound(String),

    #[error("Unknown entity type '{0}'")]
    UnknownEntityType(String),

    #[error("Attribute '{0}' not found")]
    UnknownAttribute(String),

    #[error("Attribute '{attribute}' of row '{row}' is readonly")]
    AttributeReadonly { row: String, attribute: String },

    #[error("Invalid row id: {0}")]
    InvalidRowId(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Lock error: {0}")]
    Lock(String),
}

impl EngineError {
    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        EngineError::StoreExecution(err.into())
    }

    /// True for errors caused by caller input rather than engine or backend state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::QueryCompilation(FilterError::Unsupported { .. })
                | EngineError::QueryCompilation(FilterError::InvalidParameter { .. })
                | EngineError::UnknownAttribute(_)
                | EngineError::AttributeReadonly { .. }
                | EngineError::InvalidRowId(_)
                | EngineError::UnknownEntityType(_)
        )
    }

    /// True for stale or unknown handles.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::ViewNotFound(_)
                | EngineError::SelectionNotFound(_)
                | EngineError::RecordNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl<T> From<std::sync::PoisonError<T>> for EngineError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

/// Lookup failures come from the backend, not from the filter's input.
impl From<FilterError> for EngineError {
    fn from(err: FilterError) -> Self {
        match err {
            FilterError::Lookup { filter_id, source } => {
                Self::StoreExecution(source.context(format!("lookup for filter '{filter_id}'")))
            }
            other => Self::QueryCompilation(other),
        }
    }
}

impl From<crate::engine::types::RowIdParseError> for EngineError {
    fn from(err: crate::engine::types::RowIdParseError) -> Self {
        Self::InvalidRowId(err.0)
    }
}
