use crate::{Result, VaultError};
use chrono::{DateTime, Utc};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::StoreActor;
use super::messages::StoreMessage;
use super::models::{BackupRow, DocumentRow, DriveCredentialRow};

/// DuckDB文档存储管理器
///
/// 所有数据库操作都通过消息发给独占连接的 Actor 执行，
/// 管理器本身可以随意 Clone 并在任务之间共享。
#[derive(Debug, Clone)]
pub struct StoreManager {
    sender: mpsc::Sender<StoreMessage>,
}

impl StoreManager {
    /// 创建新的存储管理器
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (sender, receiver) = mpsc::channel(100);

        // 启动存储 Actor
        let actor = StoreActor::new(db_path)?;
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };

        // 初始化数据库表
        manager.init_tables().await?;

        Ok(manager)
    }

    /// 创建内存数据库管理器（主要用于测试）
    pub async fn new_memory() -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);

        let actor = StoreActor::new_memory()?;
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };
        manager.init_tables().await?;

        Ok(manager)
    }

    /// 发送消息并等待 Actor 的响应
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> StoreMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| VaultError::custom("文档存储Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| VaultError::custom("等待文档存储响应失败"))?
    }

    /// 初始化数据库表
    async fn init_tables(&self) -> Result<()> {
        self.request(|respond_to| StoreMessage::InitTables { respond_to })
            .await
    }

    /// 批量插入（或覆盖）文档
    pub async fn upsert_documents(
        &self,
        collection: &str,
        documents: Vec<DocumentRow>,
    ) -> Result<u64> {
        let collection = collection.to_string();
        self.request(|respond_to| StoreMessage::UpsertDocuments {
            collection,
            documents,
            respond_to,
        })
        .await
    }

    /// 查询文档，owner 为 None 时返回整个集合
    pub async fn find_documents(
        &self,
        collection: &str,
        owner: Option<&str>,
    ) -> Result<Vec<DocumentRow>> {
        let collection = collection.to_string();
        let owner = owner.map(str::to_string);
        self.request(|respond_to| StoreMessage::FindDocuments {
            collection,
            owner,
            respond_to,
        })
        .await
    }

    /// 统计文档数
    pub async fn count_documents(&self, collection: &str, owner: Option<&str>) -> Result<i64> {
        let collection = collection.to_string();
        let owner = owner.map(str::to_string);
        self.request(|respond_to| StoreMessage::CountDocuments {
            collection,
            owner,
            respond_to,
        })
        .await
    }

    /// 原子换入指定 owner 的文档
    pub async fn replace_owner_documents(
        &self,
        collection: &str,
        owner: &str,
        documents: Vec<DocumentRow>,
    ) -> Result<u64> {
        let collection = collection.to_string();
        let owner = owner.to_string();
        self.request(|respond_to| StoreMessage::ReplaceOwnerDocuments {
            collection,
            owner,
            documents,
            respond_to,
        })
        .await
    }

    /// 创建备份记录
    pub async fn create_backup_record(
        &self,
        id: &str,
        file_name: &str,
        status: &str,
        collections: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let id = id.to_string();
        let file_name = file_name.to_string();
        let status = status.to_string();
        let collections = collections.to_string();
        self.request(|respond_to| StoreMessage::CreateBackupRecord {
            id,
            file_name,
            status,
            collections,
            created_at,
            respond_to,
        })
        .await
    }

    /// 更新备份记录状态
    pub async fn update_backup_status(
        &self,
        id: &str,
        status: &str,
        total_documents: Option<i64>,
        checksum: Option<String>,
        error_message: Option<String>,
    ) -> Result<()> {
        let id = id.to_string();
        let status = status.to_string();
        self.request(|respond_to| StoreMessage::UpdateBackupStatus {
            id,
            status,
            total_documents,
            checksum,
            error_message,
            respond_to,
        })
        .await
    }

    /// 记录备份的远端文件ID
    pub async fn set_backup_remote_id(&self, id: &str, remote_file_id: &str) -> Result<()> {
        let id = id.to_string();
        let remote_file_id = remote_file_id.to_string();
        self.request(|respond_to| StoreMessage::SetBackupRemoteId {
            id,
            remote_file_id,
            respond_to,
        })
        .await
    }

    /// 按创建时间倒序获取备份记录
    pub async fn list_backups(&self, limit: usize) -> Result<Vec<BackupRow>> {
        self.request(|respond_to| StoreMessage::ListBackups { limit, respond_to })
            .await
    }

    /// 根据ID获取备份记录
    pub async fn get_backup_by_id(&self, id: &str) -> Result<Option<BackupRow>> {
        let id = id.to_string();
        self.request(|respond_to| StoreMessage::GetBackupById { id, respond_to })
            .await
    }

    /// 获取最近一次完成的备份记录
    pub async fn get_latest_completed_backup(&self) -> Result<Option<BackupRow>> {
        self.request(|respond_to| StoreMessage::GetLatestCompletedBackup { respond_to })
            .await
    }

    /// 删除备份记录
    pub async fn delete_backup_record(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.request(|respond_to| StoreMessage::DeleteBackupRecord { id, respond_to })
            .await
    }

    /// 写入（或覆盖）授权凭据
    pub async fn upsert_drive_credential(&self, credential: DriveCredentialRow) -> Result<()> {
        self.request(|respond_to| StoreMessage::UpsertDriveCredential {
            credential,
            respond_to,
        })
        .await
    }

    /// 获取指定 owner 的授权凭据
    pub async fn get_drive_credential(&self, owner: &str) -> Result<Option<DriveCredentialRow>> {
        let owner = owner.to_string();
        self.request(|respond_to| StoreMessage::GetDriveCredential { owner, respond_to })
            .await
    }

    /// 将凭据标记为已断开
    pub async fn mark_credential_disconnected(&self, owner: &str) -> Result<()> {
        let owner = owner.to_string();
        self.request(|respond_to| StoreMessage::MarkCredentialDisconnected { owner, respond_to })
            .await
    }

    /// 删除授权凭据
    pub async fn delete_drive_credential(&self, owner: &str) -> Result<()> {
        let owner = owner.to_string();
        self.request(|respond_to| StoreMessage::DeleteDriveCredential { owner, respond_to })
            .await
    }
}
