#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("time parse error: {0}")]
    TimeParse(#[from] chrono::ParseError),
    #[error("invalid inflight status: {0}")]
    InvalidStatus(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
