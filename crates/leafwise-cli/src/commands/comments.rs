use leafwise_core::models::{typed, Comment, NewComment};
use leafwise_core::{CollectionKey, MutationRequest};

use crate::cli::CommentCommands;
use crate::commands::common::{
    display_id, format_comment_lines, join_text, open_collection, parse_id, settle, AppContext,
};
use crate::error::CliError;

pub async fn run_comments(
    command: CommentCommands,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let context = AppContext::load(global_profile).await?;
    let registry = context.registry()?;

    match command {
        CommentCommands::List { post, filter } => {
            let post_id = parse_id(&post)?;
            let comments = open_collection(&registry, &CollectionKey::comments_of(post_id)).await?;
            let records: Vec<Comment> = typed(&comments.view(&filter.filter_state()))?;

            if filter.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No comments yet.");
            } else {
                let viewer = context.require_user().ok();
                for line in format_comment_lines(&records, viewer.as_ref()) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        CommentCommands::Add { post, content } => {
            let content = join_text(&content).ok_or(CliError::EmptyComment)?;
            context.require_user()?;
            let post_id = parse_id(&post)?;
            let comments =
                open_collection(&registry, &CollectionKey::comments_of(post_id.clone())).await?;
            let handle = comments.mutate(MutationRequest::Create(
                NewComment { post_id, content }.into_payload(),
            ))?;
            match settle(handle).await? {
                Some(entity) => println!("Commented {}", display_id(&entity.id)),
                None => println!("Commented"),
            }
            Ok(())
        }
    }
}
