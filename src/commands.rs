//! Slash commands and pagination interactions.

use std::sync::Arc;

use serenity::all::{
    ButtonStyle, Command, CommandInteraction, CommandOptionType, ComponentInteraction, Context,
    CreateActionRow, CreateButton, CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse, ReactionType,
};
use tracing::{error, info};

use crate::config::Config;
use crate::db::{ContentRow, Database};
use crate::pagination::{self, PaginationStore};

pub struct CommandHandler {
    db: Database,
    pages: Arc<PaginationStore>,
    config: Arc<Config>,
}

#[derive(Debug, PartialEq)]
enum ArchiveLink {
    Set(String),
    Collection(String),
}

impl CommandHandler {
    pub fn new(db: Database, pages: Arc<PaginationStore>, config: Arc<Config>) -> Self {
        Self { db, pages, config }
    }

    pub async fn register_commands(ctx: &Context) {
        match Command::create_global_command(
            &ctx.http,
            CreateCommand::new("revive")
                .description("Retrieve the archived file behind a mirror link")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "mirror_link",
                        "The mirror link (e.g. 'https://i.imgur.com/abc123.mp4')",
                    )
                    .required(true),
                ),
        )
        .await
        {
            Ok(command) => info!("Registered /revive command with ID: {}", command.id),
            Err(e) => error!("Failed to register /revive command: {}", e),
        }

        match Command::create_global_command(
            &ctx.http,
            CreateCommand::new("unwrap")
                .description("Unwrap an archive set link with interactive pagination")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "set_link",
                        "A link like 'https://kpoparchive.net/set/yv5dzbdxz04lap5'",
                    )
                    .required(true),
                )
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::Boolean,
                        "raw",
                        "Return raw archived files instead of mirror links",
                    )
                    .required(false),
                )
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "perpage",
                        "How many links to show per page (1-5, default 1)",
                    )
                    .required(false)
                    .min_int_value(1)
                    .max_int_value(5),
                )
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::Boolean,
                        "show_metadata",
                        "Prefix the first page with set metadata",
                    )
                    .required(false),
                ),
        )
        .await
        {
            Ok(command) => info!("Registered /unwrap command with ID: {}", command.id),
            Err(e) => error!("Failed to register /unwrap command: {}", e),
        }

        match Command::create_global_command(
            &ctx.http,
            CreateCommand::new("source")
                .description("Get the recorded video source behind a mirror link")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "mirror_link",
                        "The mirror link (e.g. 'https://i.imgur.com/abc123.mp4')",
                    )
                    .required(true),
                ),
        )
        .await
        {
            Ok(command) => info!("Registered /source command with ID: {}", command.id),
            Err(e) => error!("Failed to register /source command: {}", e),
        }
    }

    pub async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) {
        match command.data.name.as_str() {
            "revive" => self.handle_revive(ctx, command).await,
            "unwrap" => self.handle_unwrap(ctx, command).await,
            "source" => self.handle_source(ctx, command).await,
            other => error!("Unknown slash command: {}", other),
        }
    }

    async fn handle_revive(&self, ctx: &Context, command: &CommandInteraction) {
        let Some(mirror_link) = option_str(command, "mirror_link") else {
            respond_plain(ctx, command, "Missing mirror link.").await;
            return;
        };
        let mirror_link = normalize_mirror_arg(mirror_link);

        let row = match self.db.find_content_by_mirror(&mirror_link).await {
            Ok(row) => row,
            Err(e) => {
                error!("revive lookup failed: {}", e);
                respond_plain(ctx, command, "Could not query the archive.").await;
                return;
            }
        };

        let Some(row) = row else {
            respond_ephemeral(ctx, command, "No matching record found for that mirror link.")
                .await;
            return;
        };

        let content = if !row.file_name.is_empty() {
            format!(
                "Found archived copy: {}",
                file_url(&self.config.file_url_base, &row.id, &row.file_name)
            )
        } else if !row.hq_mirror.is_empty() {
            format!("Found archived copy: {}", row.hq_mirror)
        } else {
            "No stored file or HQ mirror was available for that record.".to_string()
        };

        respond_plain(ctx, command, &content).await;
    }

    async fn handle_source(&self, ctx: &Context, command: &CommandInteraction) {
        let Some(mirror_link) = option_str(command, "mirror_link") else {
            respond_plain(ctx, command, "Missing mirror link.").await;
            return;
        };
        let mirror_link = normalize_mirror_arg(mirror_link);

        let row = match self.db.find_content_by_mirror(&mirror_link).await {
            Ok(row) => row,
            Err(e) => {
                error!("source lookup failed: {}", e);
                respond_plain(ctx, command, "Could not query the archive.").await;
                return;
            }
        };

        let content = match row {
            Some(row) if !row.source.is_empty() => {
                format!("🔗 Found source: {}", row.source)
            }
            Some(_) => "No source was available for that record.".to_string(),
            None => "No matching record found for that mirror link.".to_string(),
        };

        respond_plain(ctx, command, &content).await;
    }

    async fn handle_unwrap(&self, ctx: &Context, command: &CommandInteraction) {
        let mut set_link = None;
        let mut raw = false;
        let mut per_page: i64 = 1;
        let mut show_metadata = false;

        for opt in &command.data.options {
            match opt.name.as_str() {
                "set_link" => set_link = opt.value.as_str().map(str::to_string),
                "raw" => raw = opt.value.as_bool().unwrap_or(false),
                "perpage" => per_page = opt.value.as_i64().unwrap_or(1),
                "show_metadata" => show_metadata = opt.value.as_bool().unwrap_or(false),
                _ => {}
            }
        }

        let Some(set_link) = set_link else {
            respond_plain(ctx, command, "Missing set link.").await;
            return;
        };

        let Some(link) = parse_archive_link(&set_link) else {
            respond_plain(
                ctx,
                command,
                "Link must contain either /set/ or /collection/ in the path.",
            )
            .await;
            return;
        };

        let rows = match &link {
            ArchiveLink::Set(id) => self.db.find_set_contents(id).await,
            ArchiveLink::Collection(id) => self.db.find_collection_contents(id).await,
        };
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!("unwrap query failed: {}", e);
                respond_plain(ctx, command, "Could not query the archive.").await;
                return;
            }
        };

        if rows.is_empty() {
            respond_plain(ctx, command, "No items found for that set.").await;
            return;
        }

        let header = if show_metadata {
            match self.metadata_header(&rows[0]).await {
                Ok(header) => Some(header),
                Err(e) => {
                    error!("unwrap header lookup failed: {}", e);
                    respond_plain(ctx, command, "Could not query the archive.").await;
                    return;
                }
            }
        } else {
            None
        };

        let links: Vec<String> = rows
            .iter()
            .filter_map(|row| {
                let mut link = row.mirror.clone();
                if raw || link.is_empty() {
                    link = row.hq_mirror.clone();
                    if link.is_empty() && !row.file_name.is_empty() {
                        link = file_url(&self.config.file_url_base, &row.id, &row.file_name);
                    }
                }
                (!link.is_empty()).then_some(link)
            })
            .collect();

        if links.is_empty() {
            respond_plain(ctx, command, "No usable links found.").await;
            return;
        }

        let pages = pagination::build_pages(
            &links,
            pagination::clamp_per_page(per_page),
            header.as_deref(),
        );

        // Acknowledge first, then edit the deferred reply in.
        if let Err(e) = command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await
        {
            error!("unwrap defer failed: {}", e);
            return;
        }

        let mut edit = EditInteractionResponse::new().content(pagination::render_page(&pages, 0));
        if pages.len() > 1 {
            edit = edit.components(vec![navigation_row()]);
        }

        match command.edit_response(&ctx.http, edit).await {
            Ok(message) => {
                if pages.len() > 1 {
                    self.pages
                        .insert(command.user.id.get(), message.id.get(), pages)
                        .await;
                }
            }
            Err(e) => error!("unwrap response edit failed: {}", e),
        }
    }

    pub async fn handle_pagination(&self, ctx: &Context, component: &ComponentInteraction) {
        let user_id = component.user.id.get();
        let message_id = component.message.id.get();
        let action = component.data.custom_id.as_str();

        match self.pages.navigate(user_id, message_id, action).await {
            Some((_, content)) => {
                let response = CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .content(content)
                        .components(vec![navigation_row()]),
                );
                if let Err(e) = component.create_response(&ctx.http, response).await {
                    error!("Failed to update pagination message: {}", e);
                }
            }
            None => {
                let response = CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("No pagination state found for this message.")
                        .ephemeral(true),
                );
                if let Err(e) = component.create_response(&ctx.http, response).await {
                    error!("Failed to respond to pagination interaction: {}", e);
                }
            }
        }
    }

    /// Builds the page-one metadata header from the newest item of the set,
    /// resolving stored ID arrays back to display names.
    async fn metadata_header(&self, row: &ContentRow) -> crate::error::Result<String> {
        let idol_ids: Vec<String> = serde_json::from_str(&row.idol_ids).unwrap_or_default();
        let group_ids: Vec<String> = serde_json::from_str(&row.group_ids).unwrap_or_default();
        let uploader_ids: Vec<String> =
            serde_json::from_str(&row.uploader_ids).unwrap_or_default();

        let idols = self.db.idol_names(&idol_ids).await?;
        let groups = self.db.group_names(&group_ids).await?;
        let uploaders = self.db.uploader_names(&uploader_ids).await?;

        Ok(format!(
            "**Title**: {}\n**Created**: {}\n**Groups**: {}\n**Idols**: {}\n**Uploader**: {}\n\n**Links**:",
            row.title,
            row.created.to_rfc3339(),
            groups.join(", "),
            idols.join(", "),
            uploaders.join(", "),
        ))
    }
}

fn navigation_row() -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new("first")
            .emoji(ReactionType::Unicode("⏮️".to_string()))
            .style(ButtonStyle::Primary),
        CreateButton::new("prev")
            .emoji(ReactionType::Unicode("⬅️".to_string()))
            .style(ButtonStyle::Primary),
        CreateButton::new("next")
            .emoji(ReactionType::Unicode("➡️".to_string()))
            .style(ButtonStyle::Primary),
        CreateButton::new("last")
            .emoji(ReactionType::Unicode("⏭️".to_string()))
            .style(ButtonStyle::Primary),
    ])
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Rewrites gallery-form imgur links to the direct `.mp4` form used by the
/// mirror column.
fn normalize_mirror_arg(mirror_link: &str) -> String {
    if let Some(id) = mirror_link.strip_prefix("https://imgur.com/") {
        format!("https://i.imgur.com/{}.mp4", id)
    } else {
        mirror_link.to_string()
    }
}

/// Extracts the archive ID from the trailing path segment of a set or
/// collection link.
fn parse_archive_link(link: &str) -> Option<ArchiveLink> {
    let trimmed = link.trim_end_matches('/');
    let id = trimmed.rsplit('/').next().unwrap_or_default();
    if id.is_empty() {
        return None;
    }

    if link.contains("/set/") {
        Some(ArchiveLink::Set(id.to_string()))
    } else if link.contains("/collection/") {
        Some(ArchiveLink::Collection(id.to_string()))
    } else {
        None
    }
}

fn file_url(base: &str, record_id: &str, file_name: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), record_id, file_name)
}

async fn respond_plain(ctx: &Context, command: &CommandInteraction, content: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new().content(content),
    );
    if let Err(e) = command.create_response(&ctx.http, response).await {
        error!("Failed to respond to /{}: {}", command.data.name, e);
    }
}

async fn respond_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    );
    if let Err(e) = command.create_response(&ctx.http, response).await {
        error!("Failed to respond to /{}: {}", command.data.name, e);
    }
}
