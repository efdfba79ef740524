use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "leafwise")]
#[command(about = "Scan plants, browse the disease library, and talk with other growers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name holding backend and model endpoints
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Sign up, sign in, or sign out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Community forum posts
    Posts {
        #[command(subcommand)]
        command: PostCommands,
    },
    /// Comments on a forum post
    Comments {
        #[command(subcommand)]
        command: CommentCommands,
    },
    /// Your scan history
    Scans {
        #[command(subcommand)]
        command: ScanCommands,
    },
    /// Diagnose a plant image and save it to your scan history
    Scan {
        /// Image path or URL
        image: String,
    },
    /// Browse the disease library grouped by plant
    Library {
        #[command(flatten)]
        filter: ListArgs,
    },
    /// Ask the crop-care assistant
    Ask {
        /// Question text
        question: Vec<String>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Filters shared by list commands
#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    /// Case-insensitive text to look for
    #[arg(short, long, default_value = "")]
    pub search: String,
    /// Category to show ("all" for every category)
    #[arg(short, long, default_value = "all")]
    pub category: String,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Disease classification endpoint
        #[arg(long, value_name = "URL")]
        predict_url: Option<String>,
        /// Crop-care assistant endpoint
        #[arg(long, value_name = "URL")]
        chat_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the resolved configuration for the profile
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account
    Signup {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Login with email/password and store session in keychain
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show auth status for profile
    Status,
    /// Logout profile and clear stored session
    Logout,
}

#[derive(Subcommand)]
pub enum PostCommands {
    /// List forum posts, newest first
    List {
        #[command(flatten)]
        filter: ListArgs,
    },
    /// Write a new post
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// Post category
        #[arg(long)]
        category: Option<String>,
    },
    /// Edit one of your posts
    Edit {
        /// Post ID
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete one of your posts
    Delete {
        /// Post ID
        id: String,
    },
}

#[derive(Subcommand)]
pub enum CommentCommands {
    /// List the comments on a post
    List {
        /// Post ID
        post: String,
        #[command(flatten)]
        filter: ListArgs,
    },
    /// Comment on a post
    Add {
        /// Post ID
        post: String,
        /// Comment text
        content: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ScanCommands {
    /// List your past scans
    List {
        #[command(flatten)]
        filter: ListArgs,
    },
    /// Delete a scan from your history
    Delete {
        /// Scan ID
        id: String,
    },
}
