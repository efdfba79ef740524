use leafwise_core::inference::record_scan;
use leafwise_core::models::{typed, Scan};
use leafwise_core::{CollectionKey, CollectionKind, MutationRequest};

use crate::cli::ScanCommands;
use crate::commands::common::{
    display_id, format_scan_lines, open_collection, parse_id, settle, AppContext,
};
use crate::error::CliError;

pub async fn run_scans(command: ScanCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let context = AppContext::load(global_profile).await?;
    context.require_user()?;
    let registry = context.registry()?;
    let scans = open_collection(&registry, &CollectionKey::new(CollectionKind::Scans)).await?;

    match command {
        ScanCommands::List { filter } => {
            let records: Vec<Scan> = typed(&scans.view(&filter.filter_state()))?;
            if filter.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No scans yet. Try `leafwise scan <image>`.");
            } else {
                for line in format_scan_lines(&records) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        ScanCommands::Delete { id } => {
            let id = parse_id(&id)?;
            let handle = scans.mutate(MutationRequest::Delete(id.clone()))?;
            settle(handle).await?;
            println!("Deleted scan {id}");
            Ok(())
        }
    }
}

/// Classify `image` and save the result to the scan history.
pub async fn run_scan(image: &str, global_profile: Option<&str>) -> Result<(), CliError> {
    let context = AppContext::load(global_profile).await?;
    context.require_user()?;
    let classifier = context.config.inference_client()?;
    let registry = context.registry()?;
    let scans = open_collection(&registry, &CollectionKey::new(CollectionKind::Scans)).await?;

    let handle = record_scan(&scans, &classifier, image).await?;
    let saved = settle(handle).await?;
    let scan = saved.as_ref().map(Scan::try_from).transpose()?;
    match scan {
        Some(scan) => println!(
            "{}  {}",
            display_id(&scan.id),
            scan.diagnosis.as_deref().unwrap_or("(no diagnosis)")
        ),
        None => println!("Scan saved"),
    }
    Ok(())
}
