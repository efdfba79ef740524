use leafwise_core::util::normalize_text_option;
use leafwise_core::ClientConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::resolve_client_config;
use crate::config_profiles::ProfileFile;
use crate::error::CliError;

/// Values given on the command line for `config init`
#[derive(Debug, Clone, Default)]
pub struct ProfileInput {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub predict_url: Option<String>,
    pub chat_url: Option<String>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            predict_url,
            chat_url,
            no_activate,
        } => run_config_init(
            global_profile,
            ProfileInput {
                supabase_url,
                supabase_anon_key,
                predict_url,
                chat_url,
            },
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

pub fn run_config_init(
    profile_name: Option<&str>,
    input: ProfileInput,
    no_activate: bool,
) -> Result<(), CliError> {
    let file = ProfileFile::locate()?;
    let mut profiles = file.read()?;
    let profile_name = profiles.resolve_profile_name(profile_name);
    let existing = profiles.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(input, &ClientConfig::from_env(), &existing);
    merged.validate()?;
    profiles.put_profile(&profile_name, merged.clone(), !no_activate);
    file.write(&profiles)?;
    println!(
        "Profile '{profile_name}' saved to {}",
        file.path().display()
    );

    let missing_fields = missing_fields(&merged);
    if missing_fields.is_empty() {
        println!(
            "Profile '{profile_name}' is ready. Run `leafwise auth login --email <email> --password <password>`."
        );
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let (profile_name, config) = resolve_client_config(profile_name)?;
    println!("Profile: {profile_name}");
    for line in describe_config(&config) {
        println!("  {line}");
    }
    Ok(())
}

/// Explicit values win over the environment, which wins over what the profile already holds.
pub fn merge_profile(
    input: ProfileInput,
    env: &ClientConfig,
    existing: &ClientConfig,
) -> ClientConfig {
    let pick = |explicit: Option<String>, from_env: &Option<String>, stored: &Option<String>| {
        normalize_text_option(explicit)
            .or_else(|| normalize_text_option(from_env.clone()))
            .or_else(|| normalize_text_option(stored.clone()))
    };

    ClientConfig {
        supabase_url: pick(input.supabase_url, &env.supabase_url, &existing.supabase_url),
        supabase_anon_key: pick(
            input.supabase_anon_key,
            &env.supabase_anon_key,
            &existing.supabase_anon_key,
        ),
        predict_url: pick(input.predict_url, &env.predict_url, &existing.predict_url),
        chat_url: pick(input.chat_url, &env.chat_url, &existing.chat_url),
    }
}

pub fn missing_fields(profile: &ClientConfig) -> Vec<&'static str> {
    [
        ("supabase_url", &profile.supabase_url),
        ("supabase_anon_key", &profile.supabase_anon_key),
        ("predict_url", &profile.predict_url),
        ("chat_url", &profile.chat_url),
    ]
    .into_iter()
    .filter(|(_, value)| value.is_none())
    .map(|(field, _)| field)
    .collect()
}

/// One line per field; the anon key is shortened.
pub fn describe_config(config: &ClientConfig) -> Vec<String> {
    let unset = || "(not set)".to_string();
    let anon_key = config.supabase_anon_key.as_deref().map_or_else(unset, mask_key);
    vec![
        format!(
            "supabase_url       {}",
            config.supabase_url.clone().unwrap_or_else(unset)
        ),
        format!("supabase_anon_key  {anon_key}"),
        format!(
            "predict_url        {}",
            config.predict_url.clone().unwrap_or_else(unset)
        ),
        format!(
            "chat_url           {}",
            config.chat_url.clone().unwrap_or_else(unset)
        ),
    ]
}

fn mask_key(key: &str) -> String {
    let visible = key.chars().take(6).collect::<String>();
    if key.chars().count() <= 6 {
        "******".to_string()
    } else {
        format!("{visible}...")
    }
}
