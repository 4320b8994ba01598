use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("graph store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("graph store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("graph store rejected request: {0}")]
    Rejected(String),

    #[error("failed to decode graph store response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transaction already finished")]
    Finished,
}
