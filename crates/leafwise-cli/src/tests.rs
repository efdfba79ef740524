use clap::{CommandFactory, Parser};
use leafwise_core::auth::AuthUser;
use leafwise_core::models::{Disease, Post};
use leafwise_core::{ClientConfig, EntityId};
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, CompletionShell, ListArgs, PostCommands};
use crate::commands::common::{
    display_id, format_post_lines, format_relative_time, join_text, preview,
};
use crate::commands::completions::render_completions;
use crate::commands::config::{describe_config, merge_profile, missing_fields, ProfileInput};
use crate::commands::library::format_library_lines;

fn post(id: &str, owner: &str, title: &str) -> Post {
    Post {
        id: EntityId::new(id),
        owner_id: Some(owner.to_string()),
        title: title.to_string(),
        content: "body".to_string(),
        category: "Plant Diseases".to_string(),
        created_at: 0,
        pending: false,
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn list_flags_parse_into_filter_state() {
    let cli = Cli::try_parse_from([
        "leafwise",
        "posts",
        "list",
        "--search",
        " blight ",
        "--category",
        "Farming Tips",
        "--json",
    ])
    .unwrap();
    let Commands::Posts {
        command: PostCommands::List { filter },
    } = cli.command
    else {
        panic!("expected posts list");
    };
    assert!(filter.json);
    let state = filter.filter_state();
    assert_eq!(state.search, "blight");
    assert_eq!(state.category, "Farming Tips");
}

#[test]
fn list_flags_default_to_every_category() {
    let state = ListArgs {
        search: String::new(),
        category: "all".to_string(),
        json: false,
    }
    .filter_state();
    assert_eq!(state, leafwise_core::FilterState::default());
}

#[test]
fn global_profile_is_accepted_after_subcommand() {
    let cli = Cli::try_parse_from(["leafwise", "library", "--profile", "field"]).unwrap();
    assert_eq!(cli.profile.as_deref(), Some("field"));
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
}

#[test]
fn preview_collapses_and_truncates() {
    assert_eq!(preview("  Yellow   leaves\nsecond line", 40), "Yellow leaves");
    assert_eq!(preview("abcdefghij", 8), "abcde...");
}

#[test]
fn join_text_rejects_blank_input() {
    assert_eq!(join_text(&["  ".to_string()]), None);
    assert_eq!(
        join_text(&["why".to_string(), "yellow?".to_string()]).as_deref(),
        Some("why yellow?")
    );
}

#[test]
fn pending_ids_are_labelled() {
    assert_eq!(display_id(&EntityId::temporary()), "pending");
    assert_eq!(display_id(&EntityId::from(42)), "42");
}

#[test]
fn post_lines_mark_own_posts() {
    let viewer = AuthUser {
        id: "U1".to_string(),
        email: None,
    };
    let lines = format_post_lines(
        &[post("1", "U1", "Mine"), post("2", "U2", "Theirs")],
        Some(&viewer),
    );
    assert!(lines[0].starts_with("*1"));
    assert!(lines[1].starts_with(" 2"));
}

#[test]
fn merge_profile_prefers_explicit_then_env_then_existing() {
    let env = ClientConfig {
        supabase_url: Some("https://env.supabase.co".to_string()),
        predict_url: Some("http://127.0.0.1:8000/predict".to_string()),
        ..ClientConfig::default()
    };
    let existing = ClientConfig {
        supabase_url: Some("https://old.supabase.co".to_string()),
        supabase_anon_key: Some("old-key".to_string()),
        chat_url: Some("https://models.example.com/chat/".to_string()),
        ..ClientConfig::default()
    };
    let merged = merge_profile(
        ProfileInput {
            predict_url: Some(" https://models.example.com/predict ".to_string()),
            ..ProfileInput::default()
        },
        &env,
        &existing,
    );

    assert_eq!(merged.supabase_url.as_deref(), Some("https://env.supabase.co"));
    assert_eq!(merged.supabase_anon_key.as_deref(), Some("old-key"));
    assert_eq!(
        merged.predict_url.as_deref(),
        Some("https://models.example.com/predict")
    );
    assert_eq!(
        merged.chat_url.as_deref(),
        Some("https://models.example.com/chat/")
    );
}

#[test]
fn missing_fields_lists_unset_endpoints() {
    let profile = ClientConfig {
        supabase_url: Some("https://demo.supabase.co".to_string()),
        supabase_anon_key: Some("anon".to_string()),
        ..ClientConfig::default()
    };
    assert_eq!(missing_fields(&profile), vec!["predict_url", "chat_url"]);
}

#[test]
fn describe_config_hides_most_of_the_anon_key() {
    let lines = describe_config(&ClientConfig {
        supabase_url: Some("https://demo.supabase.co".to_string()),
        supabase_anon_key: Some("eyJhbGciOiJIUzI1NiJ9.secret".to_string()),
        ..ClientConfig::default()
    });
    let rendered = lines.join("\n");
    assert!(rendered.contains("eyJhbG..."));
    assert!(!rendered.contains("secret"));
    assert!(rendered.contains("chat_url           (not set)"));
}

#[test]
fn library_lines_group_under_plant_type() {
    let mut groups = std::collections::BTreeMap::new();
    groups.insert(
        "Wheat".to_string(),
        vec![Disease {
            id: EntityId::from(2),
            name: "Wheat Rust".to_string(),
            plant_type: "Wheat".to_string(),
            symptoms: "Reddish-orange pustules on leaves".to_string(),
        }],
    );
    let lines = format_library_lines(&groups);
    assert_eq!(lines[0], "Wheat:");
    assert!(lines[1].trim_start().starts_with("Wheat Rust"));
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("leafwise"));
}
