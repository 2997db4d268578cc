//! 服务配置
//!
//! 从 TOML 文件加载，敏感信息和后端地址可以用环境变量覆盖。

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 服务配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 后端服务配置
    pub backend: BackendConfig,
    /// 对象存储配置
    pub storage: StorageConfig,
    /// 访问控制配置
    pub auth: AuthConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 绑定地址
    pub bind_address: String,
    /// HTTP 服务端口
    pub port: u16,
    /// 请求超时时间（秒）
    pub timeout_seconds: u64,
    /// 上传请求体上限（字节）
    pub max_upload_bytes: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志文件路径
    pub log_path: PathBuf,
    /// 日志文件名前缀
    pub file_prefix: String,
    /// 是否启用控制台输出
    pub console_output: bool,
    /// 日志级别 (trace, debug, info, warn, error)
    pub level: String,
}

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 行、存储、认证全部走托管服务的 REST 接口
    Supabase,
    /// 行直连 Postgres，存储和认证仍走 REST
    Postgres,
    /// 进程内存实现，仅用于本地开发
    Memory,
}

/// 后端服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// 托管服务根地址
    pub url: String,
    pub anon_key: String,
    /// 服务端密钥，未配置时使用 anon_key
    pub service_key: Option<String>,
    /// kind = postgres 时使用
    pub database_url: Option<String>,
}

/// 对象存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 相对路径默认所在的桶
    pub default_bucket: String,
    /// 新图片上传的桶
    pub upload_bucket: String,
    /// 新图片在上传桶内的路径前缀
    pub upload_prefix: String,
    /// 可由路径前缀识别的其他桶
    pub alternate_buckets: Vec<String>,
    /// 签名 URL 有效期（秒）
    pub signed_url_ttl_seconds: u64,
    /// 占位图
    pub placeholder_url: String,
}

/// 访问控制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// 会话 cookie 名称
    pub cookie_name: String,
    pub login_path: String,
    /// 管理后台路径前缀
    pub admin_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            timeout_seconds: 30,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("./logs"),
            file_prefix: "catalog-admin".to_string(),
            console_output: true,
            level: "info".to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Supabase,
            url: "http://localhost:54321".to_string(),
            anon_key: String::new(),
            service_key: None,
            database_url: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_bucket: "products".to_string(),
            upload_bucket: "bucket1".to_string(),
            upload_prefix: "products".to_string(),
            alternate_buckets: vec!["bucket1".to_string()],
            signed_url_ttl_seconds: 3600,
            placeholder_url: "https://placehold.co/600x400?text=No+Image".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sb-access-token".to_string(),
            login_path: "/login".to_string(),
            admin_prefix: "/dashboard".to_string(),
        }
    }
}

impl BackendConfig {
    /// 调用托管服务时使用的密钥
    pub fn api_key(&self) -> &str {
        self.service_key.as_deref().unwrap_or(&self.anon_key)
    }
}

impl Config {
    /// 从配置文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::FileWrite(e.to_string()))?;
        }

        fs::write(path.as_ref(), content).map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// 用环境变量覆盖后端地址和密钥
    pub fn apply_env(&mut self) {
        if let Ok(url) = env::var("SUPABASE_URL") {
            self.backend.url = url;
        }
        if let Ok(key) = env::var("SUPABASE_ANON_KEY") {
            self.backend.anon_key = key;
        }
        if let Ok(key) = env::var("SUPABASE_SERVICE_KEY") {
            self.backend.service_key = Some(key);
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.backend.database_url = Some(url);
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("HTTP端口必须大于0".to_string()));
        }
        if self.server.bind_address.is_empty() {
            return Err(ConfigError::Validation("绑定地址不能为空".to_string()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "无效的日志级别: {}，有效值: {:?}",
                self.logging.level, valid_levels
            )));
        }

        match self.backend.kind {
            BackendKind::Memory => {}
            BackendKind::Supabase | BackendKind::Postgres => {
                url::Url::parse(&self.backend.url).map_err(|e| {
                    ConfigError::Validation(format!("无效的后端地址 {}: {}", self.backend.url, e))
                })?;
                if self.backend.api_key().is_empty() {
                    return Err(ConfigError::Validation("后端密钥不能为空".to_string()));
                }
            }
        }
        if self.backend.kind == BackendKind::Postgres && self.backend.database_url.is_none() {
            return Err(ConfigError::Validation(
                "kind = postgres 时必须配置 database_url".to_string(),
            ));
        }

        if self.storage.default_bucket.is_empty() || self.storage.upload_bucket.is_empty() {
            return Err(ConfigError::Validation("存储桶名称不能为空".to_string()));
        }
        if self.storage.signed_url_ttl_seconds == 0 {
            return Err(ConfigError::Validation("签名 URL 有效期必须大于0".to_string()));
        }

        if !self.auth.admin_prefix.starts_with('/') || !self.auth.login_path.starts_with('/') {
            return Err(ConfigError::Validation("路由路径必须以 / 开头".to_string()));
        }

        Ok(())
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("文件读取错误: {0}")]
    FileRead(String),
    #[error("文件写入错误: {0}")]
    FileWrite(String),
    #[error("配置解析错误: {0}")]
    Parse(String),
    #[error("配置序列化错误: {0}")]
    Serialize(String),
    #[error("配置验证错误: {0}")]
    Validation(String),
}

/// 从文件或默认值加载配置，然后应用环境变量并验证
pub fn load_config() -> Result<Config, ConfigError> {
    let mut config = match env::var("CATALOG_CONFIG") {
        Ok(path) => {
            info!("从配置文件加载: {}", path);
            Config::load_from_file(&path)?
        }
        Err(_) => {
            let config_paths = ["config.toml", "./config/config.toml"];
            match config_paths.iter().find(|p| Path::new(p).exists()) {
                Some(path) => {
                    info!("从配置文件加载: {}", path);
                    Config::load_from_file(path)?
                }
                None => {
                    warn!("未找到配置文件，使用默认配置");
                    Config::default()
                }
            }
        }
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.default_bucket, "products");
        assert_eq!(config.storage.upload_bucket, "bucket1");
        assert_eq!(config.auth.admin_prefix, "/dashboard");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.backend.kind = BackendKind::Memory;
        assert!(config.validate().is_ok());

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_backend_requires_key() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.backend.anon_key = "anon".to_string();
        assert!(config.validate().is_ok());

        config.backend.kind = BackendKind::Postgres;
        assert!(config.validate().is_err());
        config.backend.database_url = Some("postgres://localhost/catalog".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config").join("config.toml");

        let mut config = Config::default();
        config.server.port = 9090;
        config.backend.kind = BackendKind::Memory;
        config.save_to_file(&config_path).unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.server.port, 9090);
        assert_eq!(loaded.backend.kind, BackendKind::Memory);
        assert_eq!(loaded.storage.placeholder_url, config.storage.placeholder_url);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 3000

            [backend]
            kind = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.storage.signed_url_ttl_seconds, 3600);
    }
}
