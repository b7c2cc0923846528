use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpoilerError {
    #[error("Catalog transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Catalog returned {status}: {body}")]
    CatalogStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Catalog payload could not be parsed: {0}")]
    CatalogParse(#[source] serde_json::Error),

    #[error("Could not read seen-card record {}: {source}", .path.display())]
    StoreRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Seen-card record {} is corrupt: {source}", .path.display())]
    StoreParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not write seen-card record {}: {source}", .path.display())]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Delivery to {destination} failed: {reason}")]
    Delivery { destination: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SpoilerError>;
