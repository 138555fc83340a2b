use std::sync::Arc;

use anyhow::Result;
use serenity::all::{
    Context, EventHandler, GatewayIntents, Interaction, Message, Ready,
};
use serenity::async_trait;
use serenity::client::Client;
use tracing::{error, info};

mod commands;
mod config;
mod correlation;
mod db;
mod directory;
mod error;
mod ids;
mod ingest;
mod jobs;
mod metadata;
mod pagination;
mod storage;

use commands::CommandHandler;
use config::Config;
use correlation::SetTracker;
use db::Database;
use directory::DirectoryCache;
use ingest::Ingestor;
use pagination::PaginationStore;
use storage::MediaStore;

struct Handler {
    db: Database,
    directory: Arc<DirectoryCache>,
    ingestor: Ingestor,
    command_handler: CommandHandler,
}

impl Handler {
    fn new(db: Database, store: MediaStore, config: Arc<Config>) -> Self {
        let directory = Arc::new(DirectoryCache::new());
        let sets = Arc::new(SetTracker::new());
        let pages = Arc::new(PaginationStore::new());
        let http = storage::build_client();

        let ingestor = Ingestor::new(
            db.clone(),
            directory.clone(),
            sets,
            store,
            http,
            config.clone(),
        );
        let command_handler = CommandHandler::new(db.clone(), pages, config);

        Self {
            db,
            directory,
            ingestor,
            command_handler,
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        self.ingestor.handle_message(&ctx, &msg).await;
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        info!("Registering slash commands...");
        CommandHandler::register_commands(&ctx).await;

        if let Err(e) =
            jobs::start_background_jobs(self.db.clone(), self.directory.clone()).await
        {
            error!("Failed to start background jobs: {}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                self.command_handler.handle_command(&ctx, &command).await;
            }
            Interaction::Component(component) => {
                if matches!(
                    component.data.custom_id.as_str(),
                    "first" | "prev" | "next" | "last"
                ) {
                    self.command_handler
                        .handle_pagination(&ctx, &component)
                        .await;
                }
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    // Set up file logging with daily rotation
    let file_appender = tracing_appender::rolling::daily("logs", "curator.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Create a layer for file output (JSON format)
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .json()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true);

    // Create a layer for console output
    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .pretty();

    // Combine layers
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("curator=info".parse()?)
                .add_directive("serenity=warn".parse()?),
        )
        .with(file_layer)
        .with(console_layer)
        .init();

    let config = Arc::new(Config::from_env()?);

    info!("Connecting to database...");
    let db = Database::new(&config.database_url).await?;

    info!("Running database migrations...");
    db.run_migrations().await?;

    info!("Setting up media store...");
    let media_store = MediaStore::new(&config.media_root);
    media_store.ensure_root().await?;

    let handler = Handler::new(db.clone(), media_store, config.clone());

    info!("Loading directory cache...");
    jobs::resync_directory(&db, &handler.directory).await?;

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::DIRECT_MESSAGES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .expect("Error creating client");

    info!("Starting Discord bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
