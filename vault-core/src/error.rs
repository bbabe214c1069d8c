use thiserror::Error;

pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("HTTP 请求错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("URL 解析错误: {0}")]
    Url(#[from] url::ParseError),

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("云端存储未授权: {0}")]
    Unauthorized(String),

    #[error("云端存储暂时不可用: {0}")]
    TransientProvider(String),

    #[error("备份数据损坏: {0}")]
    CorruptPayload(String),

    #[error("操作冲突: {0}")]
    Busy(String),

    #[error("备份操作失败: {0}")]
    Backup(String),

    #[error("恢复操作失败: {0}")]
    Restore(String),

    #[error("配置文件未找到")]
    ConfigNotFound,

    #[error("自定义错误: {0}")]
    Custom(String),
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for VaultError {
    fn from(err: duckdb::Error) -> Self {
        VaultError::DuckDb(err.to_string())
    }
}

impl VaultError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientProvider(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptPayload(msg.into())
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    pub fn restore(msg: impl Into<String>) -> Self {
        Self::Restore(msg.into())
    }

    /// 给用户的操作建议，用于区分"稍后重试"、"需要重新授权"和"数据问题"
    pub fn advice(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized(_) => Some("云端存储授权已失效，请重新连接账号"),
            Self::TransientProvider(_) => Some("云端服务暂时不可用，请稍后重试"),
            Self::CorruptPayload(_) => Some("备份数据已损坏，请选择其他备份"),
            Self::Busy(_) => Some("已有备份或恢复任务在执行中，请等待其完成"),
            _ => None,
        }
    }
}
