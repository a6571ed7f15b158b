use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThesisError {
    #[error("missing required element: {0}")]
    MissingElement(String),

    #[error("expected exactly one {selector}, found {count}")]
    AmbiguousElement { selector: String, count: usize },

    #[error("endnote reference #{0} does not resolve to an endnote body")]
    UnresolvedEndnote(String),

    #[error("diagram cannot be rescaled: {0}")]
    InvalidDiagram(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("footnote content cannot be decoded: {0}")]
    FootnoteContent(String),

    #[error("math engine did not signal completion within {0:?}")]
    MathTimeout(std::time::Duration),

    #[error("math engine dropped its completion hook without firing it")]
    MathEngineAborted,

    #[error("math engine error: {0}")]
    MathEngine(String),

    #[error("pagination error: {0}")]
    Pagination(String),

    #[error("sequencer cannot {action} from stage {stage}")]
    OutOfOrder { action: &'static str, stage: String },

    #[error("pagination did not settle within {0:?}")]
    PaginationTimeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ThesisError>;
