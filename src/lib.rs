use thiserror::Error;

pub type Result<T, E = VidsearchError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum VidsearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod catalog;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod maintenance;
pub mod query;
pub mod retrieve;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
