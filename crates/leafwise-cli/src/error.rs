use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] leafwise_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Comment text cannot be empty")]
    EmptyComment,
    #[error("Question cannot be empty")]
    EmptyQuestion,
    #[error("Assistant unavailable: {0}")]
    AdviceFailed(String),
    #[error("Nothing to update; pass --title, --content, or --category")]
    NothingToUpdate,
    #[error(
        "Backend is not configured. Run `leafwise config init` or set SUPABASE_URL and SUPABASE_ANON_KEY."
    )]
    BackendNotConfigured,
    #[error("Not signed in. Run `leafwise auth login --email <email> --password <password>`.")]
    NotSignedIn,
}
