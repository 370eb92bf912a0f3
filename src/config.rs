use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::content::Revision;
use crate::transition::{EntityRef, ScheduledTransition};

pub const CONFIG_FILE: &str = "scheduled-transitions.toml";
pub const ENV_PREFIX: &str = "SCHEDULED_TRANSITIONS";

/// Retention duration meaning "keep processed transitions forever".
pub const RETAIN_FOREVER: i64 = -1;

/// Scheduler settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub automation: AutomationConfig,
    pub retain_processed: RetentionConfig,
    /// Revision log templates
    pub messages: MessageConfig,
    pub queue: QueueConfig,
    pub daemon: DaemonConfig,
    pub observability: ObservabilityConfig,
    /// SQLite persistence (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Enqueue due transitions from the periodic cron hook
    pub cron_create_queue_items: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            cron_create_queue_items: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Keep transitions after processing instead of deleting them
    pub enabled: bool,
    /// Seconds to keep processed transitions, -1 for forever
    pub duration: i64,
    /// Link shown next to retained transitions
    pub link_template: Option<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: RETAIN_FOREVER,
            link_template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MessageConfig {
    pub transition_latest: String,
    pub transition_historical: String,
    pub transition_copy_latest_draft: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            transition_latest: "Scheduled transition: transitioning latest revision from [scheduled-transitions:from-state] to [scheduled-transitions:to-state]".to_string(),
            transition_historical: "Scheduled transition: copied revision #[scheduled-transitions:from-revision-id] and changed from [scheduled-transitions:from-state] to [scheduled-transitions:to-state]".to_string(),
            transition_copy_latest_draft: "Reverted [scheduled-transitions:latest-state] revision #[scheduled-transitions:latest-revision-id] back to top".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Visibility timeout of a claimed queue item
    pub lease_seconds: i64,
    /// Time a single drain of the queue may take
    pub cron_time_budget_seconds: u64,
    /// Parallel queue workers per drain
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_seconds: 3600,
            cron_time_budget_seconds: 900,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub tick_interval_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Emit JSON lines instead of human readable logs
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://scheduled-transitions.db`
    pub url: String,
    pub max_connections: u32,
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://scheduled-transitions.db".to_string(),
            max_connections: 5,
            auto_migrate: true,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. `scheduled-transitions.toml` in the working directory
    /// 3. Environment variables (`SCHEDULED_TRANSITIONS_RETAIN_PROCESSED__ENABLED=true`)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE), Self::environment())
    }

    pub fn load_from(path: &Path, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(environment);

        let config: SchedulerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Environment source for the `SCHEDULED_TRANSITIONS` prefix.
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retain_processed.duration < RETAIN_FOREVER {
            bail!(
                "retain_processed.duration must be -1 or a number of seconds, got {}",
                self.retain_processed.duration
            );
        }
        if self.queue.workers == 0 {
            bail!("queue.workers must be at least 1");
        }
        if self.queue.lease_seconds <= 0 {
            bail!("queue.lease_seconds must be positive");
        }
        if chrono::Duration::try_seconds(self.queue.lease_seconds).is_none() {
            bail!(
                "queue.lease_seconds is out of range, got {}",
                self.queue.lease_seconds
            );
        }
        Ok(())
    }

    pub fn lease_duration(&self) -> chrono::Duration {
        chrono::Duration::try_seconds(self.queue.lease_seconds).unwrap_or(chrono::Duration::MAX)
    }

    pub fn cron_time_budget(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.queue.cron_time_budget_seconds)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.daemon.tick_interval_seconds.max(1))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Read-only policy consulted by the job services and the runner.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ConfigProvider: Send + Sync {
    fn is_creating_queue_items_in_hook_cron(&self) -> bool;

    fn is_retaining_after_processing(&self, transition: &ScheduledTransition) -> bool;

    fn is_retention_duration_forever(&self) -> bool;

    /// Seconds, or -1 for forever.
    fn get_retention_duration(&self) -> i64;

    fn get_processed_link_template(&self, entity: &EntityRef) -> Option<String>;

    fn get_message_transition_latest(&self, revision: &Revision) -> String;

    fn get_message_transition_historical(&self, revision: &Revision) -> String;

    fn get_message_transition_copy_latest_draft(&self, revision: &Revision) -> String;
}

impl ConfigProvider for SchedulerConfig {
    fn is_creating_queue_items_in_hook_cron(&self) -> bool {
        self.automation.cron_create_queue_items
    }

    fn is_retaining_after_processing(&self, _transition: &ScheduledTransition) -> bool {
        self.retain_processed.enabled
    }

    fn is_retention_duration_forever(&self) -> bool {
        self.get_retention_duration() == RETAIN_FOREVER
    }

    fn get_retention_duration(&self) -> i64 {
        self.retain_processed.duration
    }

    fn get_processed_link_template(&self, _entity: &EntityRef) -> Option<String> {
        self.retain_processed
            .link_template
            .clone()
            .filter(|template| !template.is_empty())
    }

    fn get_message_transition_latest(&self, _revision: &Revision) -> String {
        self.messages.transition_latest.clone()
    }

    fn get_message_transition_historical(&self, _revision: &Revision) -> String {
        self.messages.transition_historical.clone()
    }

    fn get_message_transition_copy_latest_draft(&self, _revision: &Revision) -> String {
        self.messages.transition_copy_latest_draft.clone()
    }
}
