use crate::Result;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::models::{BackupRow, DocumentRow, DriveCredentialRow};

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum StoreMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 文档集合操作 ==========
    /// 批量插入（或覆盖）文档
    UpsertDocuments {
        collection: String,
        documents: Vec<DocumentRow>,
        respond_to: oneshot::Sender<Result<u64>>,
    },
    /// 查询文档，owner 为 None 时返回整个集合
    FindDocuments {
        collection: String,
        owner: Option<String>,
        respond_to: oneshot::Sender<Result<Vec<DocumentRow>>>,
    },
    /// 统计文档数
    CountDocuments {
        collection: String,
        owner: Option<String>,
        respond_to: oneshot::Sender<Result<i64>>,
    },
    /// 在一个事务内删除指定 owner 的全部文档并写入新文档（恢复用的原子换入）
    ReplaceOwnerDocuments {
        collection: String,
        owner: String,
        documents: Vec<DocumentRow>,
        respond_to: oneshot::Sender<Result<u64>>,
    },

    // ========== 备份元数据操作 ==========
    /// 创建备份记录
    CreateBackupRecord {
        id: String,
        file_name: String,
        status: String,
        collections: String,
        created_at: DateTime<Utc>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 更新备份记录状态（完成时写入文档数和校验和，失败时写入错误信息）
    UpdateBackupStatus {
        id: String,
        status: String,
        total_documents: Option<i64>,
        checksum: Option<String>,
        error_message: Option<String>,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 记录备份的远端文件ID
    SetBackupRemoteId {
        id: String,
        remote_file_id: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 按创建时间倒序获取备份记录
    ListBackups {
        limit: usize,
        respond_to: oneshot::Sender<Result<Vec<BackupRow>>>,
    },
    /// 根据ID获取备份记录
    GetBackupById {
        id: String,
        respond_to: oneshot::Sender<Result<Option<BackupRow>>>,
    },
    /// 获取最近一次完成的备份记录
    GetLatestCompletedBackup {
        respond_to: oneshot::Sender<Result<Option<BackupRow>>>,
    },
    /// 删除备份记录
    DeleteBackupRecord {
        id: String,
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 云端授权凭据操作 ==========
    /// 写入（或覆盖）授权凭据
    UpsertDriveCredential {
        credential: DriveCredentialRow,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 获取指定 owner 的授权凭据
    GetDriveCredential {
        owner: String,
        respond_to: oneshot::Sender<Result<Option<DriveCredentialRow>>>,
    },
    /// 将凭据标记为已断开
    MarkCredentialDisconnected {
        owner: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 删除授权凭据
    DeleteDriveCredential {
        owner: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
}
