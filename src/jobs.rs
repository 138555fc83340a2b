use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::db::Database;
use crate::directory::DirectoryCache;

/// Rebuilds the directory cache from the database. Run at startup and
/// periodically so groups/idols added out-of-band become resolvable without
/// a restart.
pub async fn resync_directory(db: &Database, directory: &DirectoryCache) -> Result<()> {
    let groups = db.load_groups().await?;
    let uploaders = db.load_uploaders().await?;
    let idols = db.load_idols().await?;

    directory.replace(groups, uploaders, idols).await;
    Ok(())
}

pub async fn start_background_jobs(db: Database, directory: Arc<DirectoryCache>) -> Result<()> {
    let scheduler = JobScheduler::new().await?;

    let directory_job = Job::new_async("0 0 */12 * * *", move |_uuid, _l| {
        let db = db.clone();
        let directory = directory.clone();
        Box::pin(async move {
            tokio::spawn(async move {
                info!("Starting directory resync job");
                if let Err(e) = resync_directory(&db, &directory).await {
                    tracing::error!("Failed to resync directory cache: {}", e);
                } else {
                    info!("Directory resync job completed");
                }
            });
        })
    })?;

    scheduler.add(directory_job).await?;
    scheduler.start().await?;

    info!("Background jobs started");

    // Keep the scheduler alive
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(60)).await;
        }
    });

    Ok(())
}
