use leafwise_core::auth::{AuthSession, SessionVault, SignUpOutcome};

use crate::auth::{profile_identity, KeychainVault, ProfileIdentity};
use crate::cli::AuthCommands;
use crate::commands::common::resolve_client_config;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let (profile_name, config) = resolve_client_config(global_profile)?;
    let identity = profile_identity(&profile_name, &config)?;

    match command {
        AuthCommands::Signup { email, password } => {
            match require(identity.as_ref(), &profile_name)?.sign_up(&email, &password).await? {
                SignUpOutcome::SignedIn(session) => {
                    println!("Signed up and signed in profile '{profile_name}' as {}", email_label(&session));
                }
                SignUpOutcome::ConfirmationRequired => {
                    println!(
                        "Check {} for a confirmation link, then run `leafwise auth login`.",
                        email.trim()
                    );
                }
            }
        }
        AuthCommands::Login { email, password } => {
            let session = require(identity.as_ref(), &profile_name)?.sign_in(&email, &password).await?;
            println!("Signed in profile '{profile_name}' as {}", email_label(&session));
        }
        AuthCommands::Status => {
            let session = match &identity {
                Some(identity) => identity.restore().await?,
                None => KeychainVault::for_profile(&profile_name).load()?,
            };
            match session {
                Some(session) => println!(
                    "Profile '{profile_name}' is signed in as {} (expires_at={})",
                    email_label(&session),
                    session.expires_at
                ),
                None => println!("Profile '{profile_name}' is not signed in."),
            }
        }
        AuthCommands::Logout => {
            match &identity {
                Some(identity) => identity.sign_out().await?,
                None => KeychainVault::for_profile(&profile_name).erase()?,
            }
            println!("Signed out profile '{profile_name}'");
        }
    }
    Ok(())
}

fn email_label(session: &AuthSession) -> &str {
    session.user.email.as_deref().unwrap_or("(no email)")
}

fn require<'a>(
    identity: Option<&'a ProfileIdentity>,
    profile_name: &str,
) -> Result<&'a ProfileIdentity, CliError> {
    identity.ok_or_else(|| {
        CliError::Config(format!(
            "Profile '{profile_name}' has no Supabase project. Set it with `leafwise config init --supabase-url <url> --supabase-anon-key <key>`."
        ))
    })
}
