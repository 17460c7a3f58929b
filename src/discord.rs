//! Discord adapter: slash-command registration and interaction routing.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::builder::{
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
};
use serenity::gateway::ActivityData;
use serenity::http::Http;
use serenity::model::application::{
    Command, CommandInteraction, CommandOptionType, Interaction, ResolvedValue,
};
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::prelude::{Context, EventHandler};
use serenity::Client;
use tracing::{debug, error, info, warn};

use crate::archive::storage::format_limit;
use crate::archive::{AttachmentDescriptor, Invocation};
use crate::command::{ping_message, Reply, UploadCommand};

const FILE_OPTION_PREFIX: &str = "file";
const METADATA_OPTION: &str = "metadata";
/// Discord caps a command at 25 options; one is reserved for `metadata`.
pub const MAX_FILE_OPTIONS: usize = 24;

/// Replies through the interaction's deferred response and follow-ups.
struct InteractionReply<'a> {
    http: &'a Http,
    command: &'a CommandInteraction,
}

#[async_trait]
impl Reply for InteractionReply<'_> {
    async fn acknowledge(&self) -> Result<()> {
        self.command.defer(self.http).await?;
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.command
            .create_followup(self.http, CreateInteractionResponseFollowup::new().content(text))
            .await?;
        Ok(())
    }
}

/// `file7` -> 7; anything else sorts last.
fn file_slot(option_name: &str) -> usize {
    option_name
        .strip_prefix(FILE_OPTION_PREFIX)
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX)
}

/// Order attachments by their `fileN` option, keeping arrival order on ties.
fn order_attachments(mut slotted: Vec<(usize, AttachmentDescriptor)>) -> Vec<AttachmentDescriptor> {
    slotted.sort_by_key(|(slot, _)| *slot);
    slotted.into_iter().map(|(_, a)| a).collect()
}

fn invocation_from(command: &CommandInteraction) -> Invocation {
    let mut slotted = Vec::new();
    let mut custom_metadata = None;
    for option in command.data.options() {
        match option.value {
            ResolvedValue::Attachment(attachment) => slotted.push((
                file_slot(option.name),
                AttachmentDescriptor::new(
                    attachment.filename.clone(),
                    u64::from(attachment.size),
                    attachment.url.clone(),
                ),
            )),
            ResolvedValue::String(text) if option.name == METADATA_OPTION => {
                custom_metadata = Some(text.to_string());
            }
            _ => {}
        }
    }
    Invocation {
        attachments: order_attachments(slotted),
        user_name: command.user.name.clone(),
        custom_metadata,
    }
}

fn upload_definition(max_files: usize, max_bytes: u64) -> CreateCommand {
    let limit = format_limit(max_bytes);
    let max_files = max_files.clamp(1, MAX_FILE_OPTIONS);
    let mut command = CreateCommand::new("upload")
        .description(format!("Upload up to {max_files} files to Archive.org"));
    for slot in 1..=max_files {
        let (description, required) = if slot == 1 {
            (format!("Required file (up to {limit})"), true)
        } else {
            (format!("Optional file (up to {limit})"), false)
        };
        command = command.add_option(
            CreateCommandOption::new(
                CommandOptionType::Attachment,
                format!("{FILE_OPTION_PREFIX}{slot}"),
                description,
            )
            .required(required),
        );
    }
    command.add_option(
        CreateCommandOption::new(
            CommandOptionType::String,
            METADATA_OPTION,
            "Custom metadata as key=value pairs, separated by commas",
        )
        .required(false),
    )
}

/// Gateway event handler. Each event runs on its own task.
pub struct Handler {
    upload: Arc<UploadCommand>,
    activity: Option<String>,
}

impl Handler {
    pub fn new(upload: Arc<UploadCommand>, activity: &str) -> Self {
        let activity = Some(activity.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        Self { upload, activity }
    }

    async fn handle_upload(&self, ctx: &Context, command: &CommandInteraction) {
        let invocation = invocation_from(command);
        let reply = InteractionReply {
            http: ctx.http.as_ref(),
            command,
        };
        if let Ok(identifier) = self.upload.run(&invocation, &reply).await {
            debug!(identifier = %identifier, user = %invocation.user_name, "upload finished");
        }
    }

    async fn handle_ping(&self, ctx: &Context, command: &CommandInteraction) {
        let started = Instant::now();
        if let Err(e) = ctx.http.get_current_user().await {
            warn!(error = %e, "latency probe failed");
        }
        let latency = started.elapsed();

        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(ping_message(latency)),
        );
        if let Err(e) = command.create_response(ctx, response).await {
            warn!(error = %e, "failed to answer ping");
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);

        if let Some(activity) = &self.activity {
            ctx.set_activity(Some(ActivityData::playing(activity.as_str())));
        }

        let limits = self.upload.limits();
        let commands = vec![
            upload_definition(limits.max_attachments, limits.max_attachment_bytes),
            CreateCommand::new("ping").description("Test the bot's reflexes"),
        ];
        if let Err(e) = Command::set_global_commands(&ctx.http, commands).await {
            error!("Failed to register slash commands: {}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        match command.data.name.as_str() {
            "upload" => self.handle_upload(&ctx, &command).await,
            "ping" => self.handle_ping(&ctx, &command).await,
            other => debug!(command = other, "ignoring unknown command"),
        }
    }
}

/// Connect to the gateway and serve until Ctrl-C or a fatal gateway error.
pub async fn run(token: &str, handler: Handler) -> Result<()> {
    let mut client = Client::builder(token, GatewayIntents::GUILDS)
        .event_handler(handler)
        .await
        .context("Failed to create Discord client")?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.context("Discord client stopped")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_slots_parse_numeric_suffix() {
        assert_eq!(file_slot("file1"), 1);
        assert_eq!(file_slot("file10"), 10);
        assert_eq!(file_slot("metadata"), usize::MAX);
        assert_eq!(file_slot("filex"), usize::MAX);
    }

    #[test]
    fn attachments_follow_option_order() {
        let a = |name: &str| AttachmentDescriptor::new(name, 1, "u");
        let ordered = order_attachments(vec![(10, a("ten")), (2, a("two")), (1, a("one"))]);
        let names: Vec<&str> = ordered.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "ten"]);
    }

    #[test]
    fn upload_definition_lists_file_slots() {
        let json = serde_json::to_value(upload_definition(10, 100 * 1024 * 1024)).unwrap();
        let options = json["options"].as_array().unwrap();
        assert_eq!(options.len(), 11);
        assert_eq!(options[0]["name"], "file1");
        assert_eq!(options[0]["required"], true);
        assert_eq!(options[0]["description"], "Required file (up to 100MB)");
        assert_eq!(options[9]["name"], "file10");
        assert_eq!(options[10]["name"], "metadata");
    }
}
