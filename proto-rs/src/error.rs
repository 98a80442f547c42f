use thiserror::Error;

/// Errors raised while validating payloads or decoding snapshots
#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Sync tag must not be empty")]
    EmptySyncTag,

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
