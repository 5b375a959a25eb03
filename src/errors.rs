use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("processing failure: {0}")]
    ProcessingFailure(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient credits: required {required}, current {current}")]
    InsufficientCredits { required: u64, current: u64 },
    #[error("amount must be greater than zero")]
    InvalidAmount,
    #[error("reference already applied: {0}")]
    DuplicateReference(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Storage(format!("serialization: {e}"))
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingCredentials,
    #[error("invalid authorization format")]
    InvalidFormat,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token generation failed: {0}")]
    Issue(String),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider unavailable")]
    Unavailable,
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected provider response: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("invalid PDF: {0}")]
    Invalid(String),
    #[error("no selectable text")]
    NoText,
}
