pub mod ask;
pub mod auth_cmd;
pub mod comments;
pub mod common;
pub mod completions;
pub mod config;
pub mod library;
pub mod posts;
pub mod scans;
