/// 文档存储相关常量
pub mod store {
    use std::path::{Path, PathBuf};

    /// 数据库文件名
    pub const DB_FILE_NAME: &str = "vault.db";

    /// 无归属文档的保留 owner 作用域
    ///
    /// 没有 owner 字段的文档统一归入这个作用域，
    /// 只有针对该作用域发起的恢复才会覆盖它们。
    pub const UNOWNED_SCOPE: &str = "__global__";

    /// 参与备份的固定集合清单（顺序即导出顺序）
    pub const BACKUP_COLLECTIONS: &[&str] = &["invoices", "store_settings", "user_credentials"];

    /// 获取默认数据库文件路径
    pub fn get_database_path() -> PathBuf {
        Path::new(".").join(DB_FILE_NAME)
    }
}

/// 备份相关常量
pub mod backup {
    use std::path::{Path, PathBuf};

    /// 备份目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// 备份文件前缀
    pub const BACKUP_PREFIX: &str = "snapshot_";

    /// 备份文件扩展名
    pub const BACKUP_EXTENSION: &str = ".json.gz";

    /// 默认备份间隔（分钟）
    pub const DEFAULT_INTERVAL_MINUTES: u64 = 30;

    /// 调度器定时检查周期（秒）
    pub const TICK_SECONDS: u64 = 60;

    /// 列表查询的默认条数上限
    pub const DEFAULT_LIST_LIMIT: usize = 20;

    /// 获取默认备份存储目录（用于配置）
    pub fn get_default_storage_dir() -> PathBuf {
        Path::new(".").join(BACKUP_DIR_NAME)
    }
}

/// 云端镜像（Drive）相关常量
pub mod drive {
    /// OAuth token 刷新端点
    pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

    /// Drive 文件 API 基地址
    pub const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";

    /// Drive 分段上传端点
    pub const UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";

    /// 备份负载的 MIME 类型
    pub const PAYLOAD_MIME: &str = "application/gzip";

    /// 用于在远端识别本应用备份文件的 appProperties 标记
    pub const APP_MARKER_KEY: &str = "app";
    pub const APP_MARKER_VALUE: &str = "shopvault";

    /// HTTP相关常量
    pub mod http {
        /// 连接超时时间（秒）
        pub const CONNECT_TIMEOUT: u64 = 10;

        /// 单次请求超时时间（秒）
        pub const REQUEST_TIMEOUT: u64 = 120;

        /// User-Agent头
        pub const USER_AGENT: &str = "shopvault/0.1";
    }
}

/// 配置文件相关常量
pub mod config {
    use std::path::{Path, PathBuf};

    /// 按优先级排列的配置文件候选名
    pub const CONFIG_FILE_CANDIDATES: &[&str] =
        &["config.toml", "shopvault.toml", ".shopvault.toml"];

    /// 默认配置文件名
    pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

    /// 获取默认配置文件路径
    pub fn get_config_file_path() -> PathBuf {
        Path::new(".").join(DEFAULT_CONFIG_FILE)
    }
}
