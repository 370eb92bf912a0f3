// SQLite persistence for the transition store and the job queue.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseConfig, SchedulerConfig};
use crate::error::StorageError;
use crate::queue::{ItemId, JobPayload, JobQueue, QueueItem, QUEUE_NAME};
use crate::store::TransitionStore;
use crate::transition::{
    EntityRef, NewTransition, RevisionId, ScheduledTransition, TransitionId, TransitionOptions,
    UserId,
};

/// Database manager owning the connection pool
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (creating if needed) the database and optionally run migrations
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        if !sqlx::Sqlite::database_exists(&config.url).await? {
            info!("Creating database at {}", config.url);
            sqlx::Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.url)
            .await?;

        if config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn transition_store(&self) -> Arc<SqliteTransitionStore> {
        Arc::new(SqliteTransitionStore::new(self.pool.clone()))
    }

    pub fn job_queue(&self) -> Arc<SqliteJobQueue> {
        Arc::new(SqliteJobQueue::new(self.pool.clone()))
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

/// Open the configured database, or `None` when no database is configured.
pub async fn init_database(config: &SchedulerConfig) -> Result<Option<DatabaseManager>> {
    let Some(db_config) = &config.database else {
        info!("Database not configured, skipping initialization");
        return Ok(None);
    };

    info!("Initializing database at {}", db_config.url);
    let manager = DatabaseManager::new(db_config).await?;
    info!("Database manager initialized successfully");
    Ok(Some(manager))
}

fn to_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

fn from_timestamp(secs: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StorageError::Backend(format!("timestamp out of range: {secs}")))
}

fn transition_from_row(row: &SqliteRow) -> Result<ScheduledTransition, StorageError> {
    let options: String = row.try_get("options")?;
    let new = NewTransition {
        entity: EntityRef::new(
            row.try_get::<String, _>("entity_type")?,
            row.try_get::<String, _>("entity_id")?,
        ),
        entity_revision_id: row
            .try_get::<Option<i64>, _>("entity_revision_id")?
            .map(|id| RevisionId(id as u64)),
        entity_revision_langcode: row.try_get("entity_revision_langcode")?,
        author: row
            .try_get::<Option<i64>, _>("author")?
            .map(|id| UserId(id as u64)),
        workflow: row.try_get("workflow")?,
        state: row.try_get("state")?,
        created_at: from_timestamp(row.try_get("created_at")?)?,
        transition_at: from_timestamp(row.try_get("transition_at")?)?,
        options: serde_json::from_str::<TransitionOptions>(&options)?,
    };

    let id: i64 = row.try_get("id")?;
    let mut transition = ScheduledTransition::from_new(TransitionId(id as u64), new);
    if let Some(locked_at) = row.try_get::<Option<i64>, _>("locked_at")? {
        transition.set_locked_at(from_timestamp(locked_at)?);
    }
    if let Some(processed_at) = row.try_get::<Option<i64>, _>("processed_at")? {
        let revision_ids: Vec<RevisionId> = row
            .try_get::<Option<String>, _>("processed_revision_ids")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?
            .unwrap_or_default();
        transition.set_processed(from_timestamp(processed_at)?, revision_ids);
    }
    Ok(transition)
}

/// Transition store backed by the `scheduled_transitions` table.
#[derive(Debug, Clone)]
pub struct SqliteTransitionStore {
    pool: SqlitePool,
}

impl SqliteTransitionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransitionStore for SqliteTransitionStore {
    async fn insert(&self, new: NewTransition) -> Result<ScheduledTransition, StorageError> {
        let options = serde_json::to_string(&new.options)?;
        let result = sqlx::query(
            r#"
            INSERT INTO scheduled_transitions (
                entity_type, entity_id, entity_revision_id, entity_revision_langcode,
                author, workflow, state, created_at, transition_at, options
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&new.entity.entity_type)
        .bind(&new.entity.entity_id)
        .bind(new.entity_revision_id.map(|id| id.0 as i64))
        .bind(&new.entity_revision_langcode)
        .bind(new.author.map(|id| id.0 as i64))
        .bind(&new.workflow)
        .bind(&new.state)
        .bind(to_timestamp(new.created_at))
        .bind(to_timestamp(new.transition_at))
        .bind(options)
        .execute(&self.pool)
        .await?;

        let id = TransitionId(result.last_insert_rowid() as u64);
        Ok(ScheduledTransition::from_new(id, new))
    }

    async fn load(&self, id: TransitionId) -> Result<Option<ScheduledTransition>, StorageError> {
        let row = sqlx::query("SELECT * FROM scheduled_transitions WHERE id = ?1")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transition_from_row).transpose()
    }

    async fn save(&self, transition: &ScheduledTransition) -> Result<(), StorageError> {
        let processed_revision_ids = if transition.is_processed() {
            Some(serde_json::to_string(transition.processed_revision_ids())?)
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO scheduled_transitions (
                id, entity_type, entity_id, entity_revision_id, entity_revision_langcode,
                author, workflow, state, created_at, transition_at, locked_at,
                processed_at, processed_revision_ids, options
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(transition.id.0 as i64)
        .bind(&transition.entity.entity_type)
        .bind(&transition.entity.entity_id)
        .bind(transition.entity_revision_id.map(|id| id.0 as i64))
        .bind(&transition.entity_revision_langcode)
        .bind(transition.author.map(|id| id.0 as i64))
        .bind(&transition.workflow)
        .bind(&transition.state)
        .bind(to_timestamp(transition.created_at))
        .bind(to_timestamp(transition.transition_at))
        .bind(transition.locked_at().map(to_timestamp))
        .bind(transition.processed_at().map(to_timestamp))
        .bind(processed_revision_ids)
        .bind(serde_json::to_string(&transition.options)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, transition: &ScheduledTransition) -> Result<bool, StorageError> {
        let processed_revision_ids = if transition.is_processed() {
            Some(serde_json::to_string(transition.processed_revision_ids())?)
        } else {
            None
        };

        let result = sqlx::query(
            r#"
            UPDATE scheduled_transitions
            SET entity_type = ?2, entity_id = ?3, entity_revision_id = ?4,
                entity_revision_langcode = ?5, author = ?6, workflow = ?7, state = ?8,
                created_at = ?9, transition_at = ?10, locked_at = ?11, processed_at = ?12,
                processed_revision_ids = ?13, options = ?14
            WHERE id = ?1
            "#,
        )
        .bind(transition.id.0 as i64)
        .bind(&transition.entity.entity_type)
        .bind(&transition.entity.entity_id)
        .bind(transition.entity_revision_id.map(|id| id.0 as i64))
        .bind(&transition.entity_revision_langcode)
        .bind(transition.author.map(|id| id.0 as i64))
        .bind(&transition.workflow)
        .bind(&transition.state)
        .bind(to_timestamp(transition.created_at))
        .bind(to_timestamp(transition.transition_at))
        .bind(transition.locked_at().map(to_timestamp))
        .bind(transition.processed_at().map(to_timestamp))
        .bind(processed_revision_ids)
        .bind(serde_json::to_string(&transition.options)?)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: TransitionId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM scheduled_transitions WHERE id = ?1")
            .bind(id.0 as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_lockable(
        &self,
        now: DateTime<Utc>,
        lock_duration: Duration,
    ) -> Result<Vec<TransitionId>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM scheduled_transitions
            WHERE processed_at IS NULL
              AND transition_at <= ?1
              AND (locked_at IS NULL OR locked_at <= ?2)
            ORDER BY id
            "#,
        )
        .bind(to_timestamp(now))
        .bind(to_timestamp(now - lock_duration))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<TransitionId, StorageError> {
                Ok(TransitionId(row.try_get::<i64, _>("id")? as u64))
            })
            .collect()
    }

    async fn try_lock(
        &self,
        id: TransitionId,
        now: DateTime<Utc>,
        lock_duration: Duration,
    ) -> Result<bool, StorageError> {
        // The lockable predicate is re-evaluated by the UPDATE itself, so only
        // one concurrent claimer can match the row.
        let result = sqlx::query(
            r#"
            UPDATE scheduled_transitions
            SET locked_at = ?1
            WHERE id = ?2
              AND processed_at IS NULL
              AND transition_at <= ?1
              AND (locked_at IS NULL OR locked_at <= ?3)
            "#,
        )
        .bind(to_timestamp(now))
        .bind(id.0 as i64)
        .bind(to_timestamp(now - lock_duration))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TransitionId>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM scheduled_transitions
            WHERE processed_at IS NOT NULL AND processed_at <= ?1
            ORDER BY id
            "#,
        )
        .bind(to_timestamp(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<TransitionId, StorageError> {
                Ok(TransitionId(row.try_get::<i64, _>("id")? as u64))
            })
            .collect()
    }

    async fn list_for_entity(
        &self,
        entity: &EntityRef,
    ) -> Result<Vec<ScheduledTransition>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM scheduled_transitions
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY id
            "#,
        )
        .bind(&entity.entity_type)
        .bind(&entity.entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transition_from_row).collect()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM scheduled_transitions")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as usize)
    }
}

/// Job queue backed by the `queue_items` table.
#[derive(Debug, Clone)]
pub struct SqliteJobQueue {
    pool: SqlitePool,
    name: String,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self::named(pool, QUEUE_NAME)
    }

    pub fn named(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn create_item(
        &self,
        payload: JobPayload,
        now: DateTime<Utc>,
    ) -> Result<Option<ItemId>, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO queue_items (queue_name, transition_id, payload, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&self.name)
        .bind(payload.scheduled_transition_id.0 as i64)
        .bind(payload.to_json()?)
        .bind(to_timestamp(now))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(ItemId(result.last_insert_rowid() as u64)))
    }

    async fn claim_item(
        &self,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<QueueItem>, StorageError> {
        let lease_expires_at = now
            .checked_add_signed(lease)
            .ok_or_else(|| StorageError::Backend(format!("lease of {lease} is out of range")))?;
        let row = sqlx::query(
            r#"
            UPDATE queue_items
            SET leased_until = ?1
            WHERE item_id = (
                SELECT item_id FROM queue_items
                WHERE queue_name = ?2 AND (leased_until IS NULL OR leased_until <= ?3)
                ORDER BY item_id
                LIMIT 1
            )
            RETURNING item_id, payload, created_at, leased_until
            "#,
        )
        .bind(to_timestamp(lease_expires_at))
        .bind(&self.name)
        .bind(to_timestamp(now))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row.try_get("payload")?;
        Ok(Some(QueueItem {
            item_id: ItemId(row.try_get::<i64, _>("item_id")? as u64),
            payload: JobPayload::from_json(&payload)?,
            created_at: from_timestamp(row.try_get("created_at")?)?,
            lease_expires_at: from_timestamp(row.try_get("leased_until")?)?,
        }))
    }

    async fn delete_item(&self, item_id: ItemId) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM queue_items WHERE item_id = ?1")
            .bind(item_id.0 as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_item(&self, item_id: ItemId) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE queue_items SET leased_until = NULL WHERE item_id = ?1")
            .bind(item_id.0 as i64)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("queue item {item_id}")));
        }
        Ok(())
    }

    async fn number_of_items(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM queue_items WHERE queue_name = ?1")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::LOCK_DURATION;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    async fn open(dir: &TempDir) -> DatabaseManager {
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        DatabaseManager::new(&DatabaseConfig {
            url,
            max_connections: 4,
            auto_migrate: true,
        })
        .await
        .unwrap()
    }

    fn new_transition(due: i64) -> NewTransition {
        NewTransition {
            entity: EntityRef::new("node", "1"),
            entity_revision_id: Some(RevisionId(3)),
            entity_revision_langcode: Some("en".into()),
            author: Some(UserId(9)),
            workflow: "editorial".into(),
            state: "published".into(),
            created_at: at(0),
            transition_at: at(due),
            options: TransitionOptions::recreate_non_default_head(),
        }
    }

    #[tokio::test]
    async fn transitions_persist_every_field() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let store = db.transition_store();

        let mut t = store.insert(new_transition(100)).await.unwrap();
        assert_eq!(store.load(t.id).await.unwrap(), Some(t.clone()));

        t.set_locked_at(at(150));
        t.set_processed(at(200), vec![RevisionId(4), RevisionId(5)]);
        store.save(&t).await.unwrap();
        assert_eq!(store.load(t.id).await.unwrap(), Some(t.clone()));

        assert_eq!(store.list_for_entity(&t.entity).await.unwrap().len(), 1);
        assert!(store.delete(t.id).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);

        // Updating a deleted record does not.
        assert!(!store.update(&t).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);

        // Saving a deleted record recreates it.
        store.save(&t).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sub_second_instants_load_back_unchanged() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let store = db.transition_store();
        let precise = at(100) + Duration::milliseconds(250);

        let mut t = store
            .insert(NewTransition {
                created_at: precise,
                transition_at: precise,
                ..new_transition(0)
            })
            .await
            .unwrap();
        t.set_locked_at(precise);
        t.set_processed(precise, vec![]);
        store.save(&t).await.unwrap();

        assert_eq!(store.load(t.id).await.unwrap(), Some(t));
    }

    #[tokio::test]
    async fn lock_claim_is_conditional() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let store = db.transition_store();
        let t = store.insert(new_transition(100)).await.unwrap();
        let future = store.insert(new_transition(10_000)).await.unwrap();

        assert_eq!(store.find_lockable(at(1000), LOCK_DURATION).await.unwrap(), vec![t.id]);
        assert!(store.try_lock(t.id, at(1000), LOCK_DURATION).await.unwrap());
        assert!(!store.try_lock(t.id, at(1001), LOCK_DURATION).await.unwrap());
        assert!(!store.try_lock(future.id, at(1000), LOCK_DURATION).await.unwrap());
        assert!(store.find_lockable(at(2799), LOCK_DURATION).await.unwrap().is_empty());
        assert!(store.try_lock(t.id, at(2800), LOCK_DURATION).await.unwrap());
    }

    #[tokio::test]
    async fn expired_query_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let store = db.transition_store();
        let mut t = store.insert(new_transition(0)).await.unwrap();
        store.insert(new_transition(0)).await.unwrap();
        t.set_processed(at(500), vec![]);
        store.save(&t).await.unwrap();

        assert_eq!(store.find_expired(at(500)).await.unwrap(), vec![t.id]);
        assert!(store.find_expired(at(499)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queue_dedups_and_leases() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir).await;
        let queue = db.job_queue();
        let payload = JobPayload::new(TransitionId(1));

        assert!(queue.create_item(payload, at(0)).await.unwrap().is_some());
        assert!(queue.create_item(payload, at(0)).await.unwrap().is_none());
        queue.create_item(JobPayload::new(TransitionId(2)), at(1)).await.unwrap();

        let first = queue.claim_item(at(10), Duration::seconds(60)).await.unwrap().unwrap();
        assert_eq!(first.payload, payload);
        assert_eq!(first.lease_expires_at, at(70));

        let second = queue.claim_item(at(10), Duration::seconds(60)).await.unwrap().unwrap();
        assert_eq!(second.payload, JobPayload::new(TransitionId(2)));
        assert!(queue.claim_item(at(10), Duration::seconds(60)).await.unwrap().is_none());

        let redelivered = queue.claim_item(at(70), Duration::seconds(60)).await.unwrap().unwrap();
        assert_eq!(redelivered.item_id, first.item_id);

        queue.release_item(second.item_id).await.unwrap();
        queue.delete_item(first.item_id).await.unwrap();
        assert_eq!(queue.number_of_items().await.unwrap(), 1);
        assert!(queue.create_item(payload, at(80)).await.unwrap().is_some());
    }
}
