use serde::{Deserialize, Serialize};

use crate::errors::{Result, ShortenerError};

/// Environment variable prefix for overrides, e.g. `SHORTENER__STORAGE__BACKEND=file`.
pub const ENV_PREFIX: &str = "SHORTENER";

/// Default configuration file, read when present.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// 静态配置（从 TOML 加载，启动时使用）
///
/// - storage: 存储后端选择与连接参数
/// - identity: 访客身份令牌
/// - deletion: 批量软删除管道
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > TOML > 默认值
    /// ENV 前缀：SHORTENER，分隔符：__
    pub fn load(path: Option<&str>) -> Result<Self> {
        use config::{Config, Environment, File};

        // An explicitly named file must exist; the default one is optional.
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (DEFAULT_CONFIG_PATH, false),
        };

        let settings = Config::builder()
            .add_source(File::with_name(path).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: StaticConfig = settings.try_deserialize()?;
        config.storage.apply_legacy_env();
        Ok(config)
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// Which [`crate::storage::Store`] implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    File,
    Database,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
            Self::Database => write!(f, "database"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ShortenerError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            "database" | "db" | "postgres" | "sqlite" | "mysql" => Ok(Self::Database),
            _ => Err(ShortenerError::config(format!(
                "Invalid storage backend: '{}'. Valid: memory, file, database",
                s
            ))),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Explicit backend. When absent the backend is inferred from
    /// `database_url` / `file_path`.
    #[serde(default)]
    pub backend: Option<BackendKind>,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Deadline applied to every individual database operation.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Prepend the fixture record to in-memory and file backends.
    #[serde(default = "default_true")]
    pub seed: bool,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: Some(BackendKind::Memory),
            ..Self::default()
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            backend: Some(BackendKind::File),
            file_path: path.into(),
            ..Self::default()
        }
    }

    pub fn database(url: impl Into<String>) -> Self {
        Self {
            backend: Some(BackendKind::Database),
            database_url: url.into(),
            ..Self::default()
        }
    }

    /// Explicit `backend` wins; otherwise a DSN selects the database, a
    /// file path selects the file log, and nothing selects memory.
    pub fn resolve_backend(&self) -> BackendKind {
        if let Some(kind) = self.backend {
            return kind;
        }
        if !self.database_url.is_empty() {
            BackendKind::Database
        } else if !self.file_path.is_empty() {
            BackendKind::File
        } else {
            BackendKind::Memory
        }
    }

    /// `DATABASE_DSN` and `FILE_STORAGE_PATH` fill in unset fields.
    fn apply_legacy_env(&mut self) {
        if self.database_url.is_empty()
            && let Ok(dsn) = std::env::var("DATABASE_DSN")
        {
            self.database_url = dsn;
        }
        if self.file_path.is_empty()
            && let Ok(path) = std::env::var("FILE_STORAGE_PATH")
        {
            self.file_path = path;
        }
    }
}

/// 访客身份配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// HMAC secret. Empty means a random secret per process.
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_registry_capacity")]
    pub registry_capacity: u64,
}

/// What `submit` does when the deletion queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    #[default]
    Block,
    Drop,
}

/// 软删除管道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_true")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions
// ============================================================

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_token_ttl_secs() -> u64 {
    3 * 60 * 60
}

fn default_cookie_name() -> String {
    "ClientID".to_string()
}

fn default_registry_capacity() -> u64 {
    100_000
}

fn default_queue_capacity() -> usize {
    1
}

fn default_chunk_size() -> usize {
    2
}

fn default_workers() -> usize {
    1
}

fn default_batch_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

// ============================================================
// Default implementations
// ============================================================

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: None,
            file_path: String::new(),
            database_url: String::new(),
            pool_size: default_pool_size(),
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            seed: true,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            cookie_name: default_cookie_name(),
            registry_capacity: default_registry_capacity(),
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            chunk_size: default_chunk_size(),
            workers: default_workers(),
            overflow: OverflowPolicy::default(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_backend_explicit_wins() {
        let mut cfg = StorageConfig::database("postgres://localhost/db");
        cfg.backend = Some(BackendKind::Memory);
        assert_eq!(cfg.resolve_backend(), BackendKind::Memory);
    }

    #[test]
    fn test_resolve_backend_inferred() {
        let mut cfg = StorageConfig::default();
        assert_eq!(cfg.resolve_backend(), BackendKind::Memory);

        cfg.file_path = "/tmp/links.json".to_string();
        assert_eq!(cfg.resolve_backend(), BackendKind::File);

        cfg.database_url = "sqlite::memory:".to_string();
        assert_eq!(cfg.resolve_backend(), BackendKind::Database);
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("FILE".parse::<BackendKind>().unwrap(), BackendKind::File);
        assert_eq!(
            "postgres".parse::<BackendKind>().unwrap(),
            BackendKind::Database
        );
        assert!("redis".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_defaults_match_pipeline_expectations() {
        let cfg = StaticConfig::default();
        assert_eq!(cfg.deletion.queue_capacity, 1);
        assert_eq!(cfg.deletion.chunk_size, 2);
        assert_eq!(cfg.deletion.overflow, OverflowPolicy::Block);
        assert_eq!(cfg.identity.cookie_name, "ClientID");
        assert!(cfg.storage.seed);
    }

    #[test]
    fn test_sample_config_round_trips() {
        let sample = StaticConfig::generate_sample_config();
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.deletion.chunk_size, 2);
        assert_eq!(parsed.logging.level, "info");
    }
}
