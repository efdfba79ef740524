use leafwise_core::inference::{AdviceAnswer, AdviceLog};

use crate::commands::common::{join_text, resolve_client_config};
use crate::error::CliError;

pub async fn run_ask(question: &[String], global_profile: Option<&str>) -> Result<(), CliError> {
    let question = join_text(question).ok_or(CliError::EmptyQuestion)?;
    let (_, config) = resolve_client_config(global_profile)?;
    let advisor = config.inference_client()?;

    let mut log = AdviceLog::new();
    let entry = log.ask(&advisor, &question).await?;
    match &entry.answer {
        AdviceAnswer::Answered(text) => {
            println!("{text}");
            Ok(())
        }
        AdviceAnswer::Failed(reason) => Err(CliError::AdviceFailed(reason.to_string())),
    }
}
