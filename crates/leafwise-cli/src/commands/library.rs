use std::collections::BTreeMap;
use std::sync::Arc;

use leafwise_core::auth::SessionHandle;
use leafwise_core::library::{grouped_diseases, open_library};
use leafwise_core::models::Disease;

use crate::cli::ListArgs;
use crate::commands::common::preview;
use crate::error::CliError;

pub async fn run_library(filter: &ListArgs) -> Result<(), CliError> {
    let library = open_library(Arc::new(SessionHandle::new()));
    library.refresh().await?;
    let groups = grouped_diseases(&library, &filter.filter_state())?;

    if filter.json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
    } else if groups.is_empty() {
        println!("No diseases match.");
    } else {
        for line in format_library_lines(&groups) {
            println!("{line}");
        }
    }

    Ok(())
}

pub fn format_library_lines(groups: &BTreeMap<String, Vec<Disease>>) -> Vec<String> {
    let mut lines = Vec::new();
    for (plant_type, diseases) in groups {
        lines.push(format!("{plant_type}:"));
        for disease in diseases {
            let name = &disease.name;
            let symptoms = preview(&disease.symptoms, 50);
            lines.push(format!("  {name:<20}  {symptoms}"));
        }
    }
    lines
}
