use leafwise_core::models::{typed, NewPost, Post, PostChanges};
use leafwise_core::{CollectionKey, CollectionKind, MutationRequest, SyncController};

use crate::cli::{ListArgs, PostCommands};
use crate::commands::common::{
    display_id, format_post_lines, open_collection, parse_id, settle, AppContext,
};
use crate::error::CliError;

pub async fn run_posts(command: PostCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let context = AppContext::load(global_profile).await?;
    let registry = context.registry()?;
    let posts = open_collection(&registry, &CollectionKey::new(CollectionKind::Posts)).await?;

    match command {
        PostCommands::List { filter } => list_posts(&context, &posts, &filter),
        PostCommands::Add {
            title,
            content,
            category,
        } => {
            context.require_user()?;
            let handle = posts.mutate(MutationRequest::Create(
                NewPost {
                    title,
                    content,
                    category,
                }
                .into_payload(),
            ))?;
            let created = settle(handle).await?;
            match created {
                Some(entity) => println!("Posted {}", display_id(&entity.id)),
                None => println!("Posted"),
            }
            Ok(())
        }
        PostCommands::Edit {
            id,
            title,
            content,
            category,
        } => {
            let changes = PostChanges {
                title,
                content,
                category,
            };
            if changes == PostChanges::default() {
                return Err(CliError::NothingToUpdate);
            }
            let id = parse_id(&id)?;
            let handle = posts.mutate(MutationRequest::Update {
                id: id.clone(),
                changes: changes.into_payload(),
            })?;
            settle(handle).await?;
            println!("Updated post {id}");
            Ok(())
        }
        PostCommands::Delete { id } => {
            let id = parse_id(&id)?;
            let handle = posts.mutate(MutationRequest::Delete(id.clone()))?;
            settle(handle).await?;
            println!("Deleted post {id}");
            Ok(())
        }
    }
}

fn list_posts(
    context: &AppContext,
    posts: &SyncController,
    filter: &ListArgs,
) -> Result<(), CliError> {
    let records: Vec<Post> = typed(&posts.view(&filter.filter_state()))?;

    if filter.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        let viewer = context.require_user().ok();
        for line in format_post_lines(&records, viewer.as_ref()) {
            println!("{line}");
        }
    }

    Ok(())
}
