use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};

use crate::directory::UploaderStore;
use crate::error::Result;
use crate::ids;

/// Records returned per set/collection query, newest first.
const QUERY_LIMIT: i64 = 12;

const CONTENT_COLUMNS: &str =
    "id, title, file_name, mirror, hq_mirror, source, idol_ids, group_ids, uploader_ids, created";

#[derive(Clone)]
pub struct Database {
    pub pool: Pool<MySql>,
}

/// One archived content row. Relation-ID arrays are stored JSON-encoded.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ContentRow {
    pub id: String,
    pub title: String,
    pub file_name: String,
    pub mirror: String,
    pub hq_mirror: String,
    pub source: String,
    pub idol_ids: String,
    pub group_ids: String,
    pub uploader_ids: String,
    pub created: DateTime<Utc>,
}

/// Fields of a content record staged for insertion.
#[derive(Debug, Clone, Default)]
pub struct NewContent {
    pub id: String,
    pub title: String,
    pub filetype: String,
    pub date: String,
    pub source: String,
    pub discord_link: String,
    pub mirror: String,
    pub hq_mirror: String,
    pub set_id: String,
    pub origin: String,
    pub is_quality: bool,
    pub tags: Vec<String>,
    pub idol_ids: Vec<String>,
    pub group_ids: Vec<String>,
    pub uploader_ids: Vec<String>,
    pub file_name: String,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = sqlx::mysql::MySqlPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS idol_groups (
                id VARCHAR(32) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                code VARCHAR(32) NOT NULL DEFAULT '',
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_group_name (name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS idols (
                id VARCHAR(32) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                code VARCHAR(32) NOT NULL DEFAULT '',
                group_id VARCHAR(32) NOT NULL,
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_idol_name (name),
                INDEX idx_idol_group (group_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS uploaders (
                id VARCHAR(32) PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                is_featured BOOLEAN NOT NULL DEFAULT FALSE,
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_uploader_name (name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_sets (
                id VARCHAR(32) PRIMARY KEY,
                title VARCHAR(512) NOT NULL,
                idol_ids TEXT NOT NULL,
                group_ids TEXT NOT NULL,
                uploader_ids TEXT NOT NULL,
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS contents (
                id VARCHAR(32) PRIMARY KEY,
                title VARCHAR(512) NOT NULL DEFAULT '',
                filetype VARCHAR(32) NOT NULL DEFAULT '',
                date VARCHAR(64) NOT NULL DEFAULT '',
                source VARCHAR(512) NOT NULL DEFAULT '',
                discord_link VARCHAR(512) NOT NULL DEFAULT '',
                mirror VARCHAR(512) NOT NULL DEFAULT '',
                hq_mirror VARCHAR(512) NOT NULL DEFAULT '',
                set_id VARCHAR(32) NOT NULL DEFAULT '',
                collection_ids TEXT NOT NULL,
                origin VARCHAR(64) NOT NULL DEFAULT '',
                is_quality BOOLEAN NOT NULL DEFAULT FALSE,
                tags TEXT NOT NULL,
                idol_ids TEXT NOT NULL,
                group_ids TEXT NOT NULL,
                uploader_ids TEXT NOT NULL,
                file_name VARCHAR(255) NOT NULL DEFAULT '',
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_content_mirror (mirror),
                INDEX idx_content_set (set_id),
                INDEX idx_content_created (created)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_groups(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT id, name FROM idol_groups")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn load_uploaders(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT id, name FROM uploaders")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn load_idols(&self) -> Result<Vec<(String, String, String)>> {
        let rows =
            sqlx::query_as::<_, (String, String, String)>("SELECT id, name, group_id FROM idols")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn create_set(
        &self,
        set_id: &str,
        title: &str,
        idol_ids: &[String],
        group_ids: &[String],
        uploader_ids: &[String],
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO content_sets (id, title, idol_ids, group_ids, uploader_ids) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(set_id)
        .bind(title)
        .bind(serde_json::to_string(idol_ids)?)
        .bind(serde_json::to_string(group_ids)?)
        .bind(serde_json::to_string(uploader_ids)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn create_content(&self, content: &NewContent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contents
                (id, title, filetype, date, source, discord_link, mirror, hq_mirror,
                 set_id, collection_ids, origin, is_quality, tags, idol_ids, group_ids,
                 uploader_ids, file_name)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&content.id)
        .bind(&content.title)
        .bind(&content.filetype)
        .bind(&content.date)
        .bind(&content.source)
        .bind(&content.discord_link)
        .bind(&content.mirror)
        .bind(&content.hq_mirror)
        .bind(&content.set_id)
        .bind("[]")
        .bind(&content.origin)
        .bind(content.is_quality)
        .bind(serde_json::to_string(&content.tags)?)
        .bind(serde_json::to_string(&content.idol_ids)?)
        .bind(serde_json::to_string(&content.group_ids)?)
        .bind(serde_json::to_string(&content.uploader_ids)?)
        .bind(&content.file_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_content_by_mirror(&self, mirror: &str) -> Result<Option<ContentRow>> {
        let row = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE mirror = ? LIMIT 1"
        ))
        .bind(mirror)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_set_contents(&self, set_id: &str) -> Result<Vec<ContentRow>> {
        let rows = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE set_id = ? ORDER BY created DESC LIMIT ?"
        ))
        .bind(set_id)
        .bind(QUERY_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_collection_contents(&self, collection_id: &str) -> Result<Vec<ContentRow>> {
        // collection_ids holds a JSON array of quoted IDs
        let rows = sqlx::query_as::<_, ContentRow>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM contents WHERE collection_ids LIKE ? ORDER BY created DESC LIMIT ?"
        ))
        .bind(format!("%\"{}\"%", collection_id))
        .bind(QUERY_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn idol_names(&self, ids: &[String]) -> Result<Vec<String>> {
        self.names("SELECT name FROM idols WHERE id = ?", ids).await
    }

    pub async fn group_names(&self, ids: &[String]) -> Result<Vec<String>> {
        self.names("SELECT name FROM idol_groups WHERE id = ?", ids)
            .await
    }

    pub async fn uploader_names(&self, ids: &[String]) -> Result<Vec<String>> {
        self.names("SELECT name FROM uploaders WHERE id = ?", ids)
            .await
    }

    async fn names(&self, sql: &str, ids: &[String]) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(name) = sqlx::query_scalar::<_, String>(sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            {
                names.push(name);
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl UploaderStore for Database {
    async fn create_uploader(&self, name: &str) -> Result<String> {
        let id = ids::generate_id(15);

        sqlx::query("INSERT INTO uploaders (id, name) VALUES (?, ?)")
            .bind(&id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }
}
