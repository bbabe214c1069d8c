use crate::constants::{backup, config, store};
use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub backup: BackupConfig,
    pub drive: DriveConfig,
}

/// 文档存储相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub db_file: String,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupConfig {
    pub storage_dir: String,
    pub interval_minutes: u64,
}

/// 云端镜像相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DriveConfig {
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    /// 定时备份自动镜像到云端时使用的 owner 身份，空字符串表示不镜像
    pub mirror_owner: String,
    /// 覆盖默认的 token 刷新端点（主要用于测试）
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// 覆盖默认的 Drive API 基地址（主要用于测试）
    #[serde(default)]
    pub api_base: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                db_file: store::get_database_path().to_string_lossy().to_string(),
            },
            backup: BackupConfig {
                storage_dir: backup::get_default_storage_dir()
                    .to_string_lossy()
                    .to_string(),
                interval_minutes: backup::DEFAULT_INTERVAL_MINUTES,
            },
            drive: DriveConfig {
                enabled: false,
                client_id: String::new(),
                client_secret: String::new(),
                mirror_owner: String::new(),
                token_endpoint: None,
                api_base: None,
            },
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> shopvault.toml -> .shopvault.toml
    ///
    /// 一个候选文件都不存在时返回 [`VaultError::ConfigNotFound`]，
    /// 提示用户先执行 `shopvault init`。
    pub fn find_and_load_config() -> Result<Self> {
        Self::load_from_dir(Path::new("."))
    }

    /// 在指定目录中按候选文件名查找并加载配置
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        for config_file in config::CONFIG_FILE_CANDIDATES {
            let path = dir.join(config_file);
            if path.exists() {
                tracing::info!("找到配置文件: {}", path.display());
                return Self::load_from_file(path);
            }
        }

        Err(VaultError::ConfigNotFound)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{db_file}", &self.store.db_file)
            .replace("{storage_dir}", &self.backup.storage_dir)
            .replace(
                "{interval_minutes}",
                &self.backup.interval_minutes.to_string(),
            )
            .replace("{drive_enabled}", &self.drive.enabled.to_string())
            .replace("{drive_client_id}", &self.drive.client_id)
            .replace("{drive_client_secret}", &self.drive.client_secret)
            .replace("{mirror_owner}", &self.drive.mirror_owner)
    }

    /// 获取备份目录路径
    pub fn get_backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.backup.storage_dir)
    }

    /// 获取数据库文件路径
    pub fn get_database_path(&self) -> PathBuf {
        PathBuf::from(&self.store.db_file)
    }

    /// 备份间隔
    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup.interval_minutes * 60)
    }

    /// 定时备份是否需要镜像到云端
    pub fn mirror_owner(&self) -> Option<&str> {
        if self.drive.enabled && !self.drive.mirror_owner.is_empty() {
            Some(&self.drive.mirror_owner)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = AppConfig::default();
        config.backup.interval_minutes = 15;
        config.drive.enabled = true;
        config.drive.mirror_owner = "owner-1".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.backup.interval_minutes, 15);
        assert_eq!(loaded.mirror_owner(), Some("owner-1"));
    }

    #[test]
    fn test_missing_config_is_config_not_found() {
        let temp_dir = tempdir().unwrap();

        let err = AppConfig::load_from_dir(temp_dir.path()).unwrap_err();
        assert!(matches!(err, VaultError::ConfigNotFound));
    }

    #[test]
    fn test_load_from_dir_picks_up_candidate() {
        let temp_dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.backup.interval_minutes = 45;
        config.save_to_file(temp_dir.path().join("shopvault.toml")).unwrap();

        let loaded = AppConfig::load_from_dir(temp_dir.path()).unwrap();
        assert_eq!(loaded.backup.interval_minutes, 45);
    }

    #[test]
    fn test_mirror_owner_requires_enabled() {
        let mut config = AppConfig::default();
        config.drive.mirror_owner = "owner-1".to_string();
        assert_eq!(config.mirror_owner(), None);

        config.drive.enabled = true;
        assert_eq!(config.mirror_owner(), Some("owner-1"));
    }
}
