//! Message-driven ingestion: gate, extract, resolve, persist.

use std::sync::Arc;

use serenity::all::{Context, GuildId, Message, RoleId};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::correlation::SetTracker;
use crate::db::{Database, NewContent};
use crate::directory::DirectoryCache;
use crate::error::{ArchiveError, Result};
use crate::ids;
use crate::metadata::{self, Extractor, Metadata};
use crate::storage::{self, MediaStore};

const RECORD_ORIGIN: &str = "discord";

pub struct Ingestor {
    db: Database,
    directory: Arc<DirectoryCache>,
    sets: Arc<SetTracker>,
    store: MediaStore,
    http: reqwest::Client,
    extractor: Extractor,
    config: Arc<Config>,
}

impl Ingestor {
    pub fn new(
        db: Database,
        directory: Arc<DirectoryCache>,
        sets: Arc<SetTracker>,
        store: MediaStore,
        http: reqwest::Client,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            directory,
            sets,
            store,
            http,
            extractor: Extractor::new(),
            config,
        }
    }

    /// Entry point per inbound message. Three triggers, gated independently:
    /// a direct bot mention (any channel), role pings in an allow-listed
    /// channel, or a reply continuing an open set. Everything else returns
    /// without side effects.
    pub async fn handle_message(&self, ctx: &Context, msg: &Message) {
        let bot_id = ctx.cache.current_user().id.get();
        let channel_allowed = self
            .config
            .allowed_channels
            .contains(&msg.channel_id.get());
        let referenced = msg
            .message_reference
            .as_ref()
            .and_then(|reference| reference.message_id);

        let media_links: Vec<String>;
        let mut data: Metadata;
        let mut is_reply = false;

        if mentions_bot(&msg.content, bot_id) {
            media_links = self.extractor.media_links(&msg.content);
            if media_links.is_empty() && msg.attachments.is_empty() {
                return;
            }

            data = Metadata::default();
            if let Err(e) = self.extractor.extract(&msg.content, &mut data) {
                error!("failed to extract metadata: {}", e);
                return;
            }
        } else if !msg.mention_roles.is_empty() && channel_allowed {
            media_links = self.extractor.media_links(&msg.content);
            if media_links.is_empty() && msg.attachments.is_empty() {
                return;
            }

            let Some(guild_id) = msg.guild_id else {
                return;
            };
            let role_names = match self.role_names(ctx, guild_id, &msg.mention_roles).await {
                Ok(names) => names,
                Err(e) => {
                    error!("unable to get role names: {}", e);
                    return;
                }
            };

            data = self.extractor.seed_from_roles(&role_names);
            if let Err(e) = self.extractor.extract(&msg.content, &mut data) {
                error!("failed to extract metadata: {}", e);
                return;
            }
        } else if let (Some(reference_id), true) = (referenced, channel_allowed) {
            let Some(stored) = self
                .sets
                .try_continue(msg.author.id.get(), reference_id.get())
                .await
            else {
                return;
            };

            media_links = self.extractor.media_links(&msg.content);
            if media_links.is_empty() && msg.attachments.is_empty() {
                return;
            }

            is_reply = true;
            data = stored;
        } else {
            return;
        }

        data.uploader = msg.author.name.clone();
        data.discord_link = message_permalink(
            msg.guild_id.map(|id| id.get()),
            msg.channel_id.get(),
            msg.id.get(),
        );

        let total_items = msg.attachments.len() + media_links.len();
        if total_items > 1 && !is_reply {
            data.set_id = ids::generate_id(15);

            if let Err(e) = self.create_set_record(&data).await {
                error!("failed to create set record: {}", e);
                return;
            }

            self.sets
                .begin(msg.author.id.get(), msg.id.get(), data.clone())
                .await;
        }

        for attachment in &msg.attachments {
            if let Some(kind) = attachment_filetype(attachment.content_type.as_deref()) {
                data.filetype = kind.to_string();
            }

            match self
                .process_item(&attachment.url, &attachment.filename, &data)
                .await
            {
                Ok(record_id) => {
                    info!(record_id = %record_id, file = %attachment.filename, "archived attachment")
                }
                Err(e) => {
                    warn!("unable to process media item (attachment): {}", e);
                    continue;
                }
            }
        }

        for link in &media_links {
            data.filetype = "video".to_string();
            data.mirror = link.clone();
            let filename = link_basename(link);

            match self.process_item(link, &filename, &data).await {
                Ok(record_id) => info!(record_id = %record_id, link = %link, "archived mirror link"),
                Err(e) => {
                    warn!("unable to process media item (link): {}", e);
                    continue;
                }
            }
        }
    }

    /// Persists the parent set record: date-stamped title plus resolved
    /// idol/group/uploader ID arrays.
    async fn create_set_record(&self, data: &Metadata) -> Result<()> {
        let title = format!("{} {}", metadata::date_stamp(&data.date), data.title);

        let resolved = self
            .directory
            .resolve_identities(&data.idol, &data.group, &data.uploader, &self.db)
            .await?;

        self.db
            .create_set(
                &data.set_id,
                &title,
                &resolved.idol_ids,
                &resolved.group_ids,
                &resolved.uploader_ids,
            )
            .await
    }

    /// Archives one media item: resolve identities, download the bytes,
    /// store the blob, insert the content row. Returns the new record ID.
    async fn process_item(&self, url: &str, filename: &str, data: &Metadata) -> Result<String> {
        let resolved = self
            .directory
            .resolve_identities(&data.idol, &data.group, &data.uploader, &self.db)
            .await?;

        let bytes = storage::download(&self.http, url).await?;

        let record_id = ids::generate_id(15);
        let stored_name = self.store.save(&record_id, filename, &bytes).await?;

        let content = NewContent {
            id: record_id.clone(),
            title: data.title.clone(),
            filetype: data.filetype.clone(),
            date: metadata::normalize_date(&data.date),
            source: data.source.clone(),
            discord_link: data.discord_link.clone(),
            mirror: data.mirror.clone(),
            hq_mirror: data.hq_mirror.clone(),
            set_id: data.set_id.clone(),
            origin: RECORD_ORIGIN.to_string(),
            is_quality: false,
            tags: metadata::split_tags(&data.tags),
            idol_ids: resolved.idol_ids,
            group_ids: resolved.group_ids,
            uploader_ids: resolved.uploader_ids,
            file_name: stored_name,
        };

        self.db.create_content(&content).await?;
        Ok(record_id)
    }

    /// Maps pinged role IDs to names via the guild's role table. Any pinged
    /// role missing from the guild aborts the message.
    async fn role_names(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        role_ids: &[RoleId],
    ) -> Result<Vec<String>> {
        let guild_roles = guild_id
            .roles(&ctx.http)
            .await
            .map_err(|e| ArchiveError::NotFound(format!("guild roles: {}", e)))?;

        let mut names = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            let role = guild_roles
                .get(role_id)
                .ok_or_else(|| ArchiveError::NotFound(format!("role {} not found", role_id)))?;
            names.push(role.name.clone());
        }

        Ok(names)
    }
}

pub fn mentions_bot(content: &str, bot_id: u64) -> bool {
    content.contains(&format!("<@{}>", bot_id)) || content.contains(&format!("<@!{}>", bot_id))
}

/// Classifies an attachment by its content-type prefix. Other types leave
/// the previously set filetype untouched.
pub fn attachment_filetype(content_type: Option<&str>) -> Option<&'static str> {
    match content_type {
        Some(ct) if ct.starts_with("image/") => Some("image"),
        Some(ct) if ct.starts_with("video/") => Some("video"),
        _ => None,
    }
}

pub fn message_permalink(guild_id: Option<u64>, channel_id: u64, message_id: u64) -> String {
    let guild = guild_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "@me".to_string());
    format!(
        "https://discord.com/channels/{}/{}/{}",
        guild, channel_id, message_id
    )
}

fn link_basename(link: &str) -> String {
    link.rsplit('/').next().unwrap_or(link).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_plain_and_nick_mentions() {
        assert!(mentions_bot("hey <@42> archive this", 42));
        assert!(mentions_bot("hey <@!42> archive this", 42));
        assert!(!mentions_bot("hey <@43>", 42));
        assert!(!mentions_bot("no mention at all", 42));
    }

    #[test]
    fn classifies_attachments_by_content_type() {
        assert_eq!(attachment_filetype(Some("image/png")), Some("image"));
        assert_eq!(attachment_filetype(Some("video/mp4")), Some("video"));
        assert_eq!(attachment_filetype(Some("application/pdf")), None);
        assert_eq!(attachment_filetype(None), None);
    }

    #[test]
    fn builds_guild_and_dm_permalinks() {
        assert_eq!(
            message_permalink(Some(1), 2, 3),
            "https://discord.com/channels/1/2/3"
        );
        assert_eq!(
            message_permalink(None, 2, 3),
            "https://discord.com/channels/@me/2/3"
        );
    }

    #[test]
    fn basename_takes_trailing_segment() {
        assert_eq!(link_basename("https://i.imgur.com/abc123.mp4"), "abc123.mp4");
        assert_eq!(link_basename("abc123.mp4"), "abc123.mp4");
    }
}
