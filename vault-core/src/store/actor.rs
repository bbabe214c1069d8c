use crate::Result;
use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::StoreMessage;
use super::models::{BackupRow, DocumentRow, DriveCredentialRow};

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct StoreActor {
    connection: Connection,
}

impl StoreActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<StoreMessage>) {
        info!("文档存储 Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("文档存储 Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: StoreMessage) {
        match message {
            StoreMessage::InitTables { respond_to } => {
                let result = self.init_tables();
                let _ = respond_to.send(result);
            }
            StoreMessage::UpsertDocuments {
                collection,
                documents,
                respond_to,
            } => {
                let result = self.upsert_documents(&collection, &documents);
                let _ = respond_to.send(result);
            }
            StoreMessage::FindDocuments {
                collection,
                owner,
                respond_to,
            } => {
                let result = self.find_documents(&collection, owner.as_deref());
                let _ = respond_to.send(result);
            }
            StoreMessage::CountDocuments {
                collection,
                owner,
                respond_to,
            } => {
                let result = self.count_documents(&collection, owner.as_deref());
                let _ = respond_to.send(result);
            }
            StoreMessage::ReplaceOwnerDocuments {
                collection,
                owner,
                documents,
                respond_to,
            } => {
                let result = self.replace_owner_documents(&collection, &owner, &documents);
                let _ = respond_to.send(result);
            }
            StoreMessage::CreateBackupRecord {
                id,
                file_name,
                status,
                collections,
                created_at,
                respond_to,
            } => {
                let result =
                    self.create_backup_record(&id, &file_name, &status, &collections, created_at);
                let _ = respond_to.send(result);
            }
            StoreMessage::UpdateBackupStatus {
                id,
                status,
                total_documents,
                checksum,
                error_message,
                respond_to,
            } => {
                let result = self.update_backup_status(
                    &id,
                    &status,
                    total_documents,
                    checksum.as_deref(),
                    error_message.as_deref(),
                );
                let _ = respond_to.send(result);
            }
            StoreMessage::SetBackupRemoteId {
                id,
                remote_file_id,
                respond_to,
            } => {
                let result = self.set_backup_remote_id(&id, &remote_file_id);
                let _ = respond_to.send(result);
            }
            StoreMessage::ListBackups { limit, respond_to } => {
                let result = self.list_backups(limit);
                let _ = respond_to.send(result);
            }
            StoreMessage::GetBackupById { id, respond_to } => {
                let result = self.get_backup_by_id(&id);
                let _ = respond_to.send(result);
            }
            StoreMessage::GetLatestCompletedBackup { respond_to } => {
                let result = self.get_latest_completed_backup();
                let _ = respond_to.send(result);
            }
            StoreMessage::DeleteBackupRecord { id, respond_to } => {
                let result = self.delete_backup_record(&id);
                let _ = respond_to.send(result);
            }
            StoreMessage::UpsertDriveCredential {
                credential,
                respond_to,
            } => {
                let result = self.upsert_drive_credential(&credential);
                let _ = respond_to.send(result);
            }
            StoreMessage::GetDriveCredential { owner, respond_to } => {
                let result = self.get_drive_credential(&owner);
                let _ = respond_to.send(result);
            }
            StoreMessage::MarkCredentialDisconnected { owner, respond_to } => {
                let result = self.mark_credential_disconnected(&owner);
                let _ = respond_to.send(result);
            }
            StoreMessage::DeleteDriveCredential { owner, respond_to } => {
                let result = self.delete_drive_credential(&owner);
                let _ = respond_to.send(result);
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        // 读取并执行SQL初始化脚本
        let sql_content = include_str!("../../migrations/init_store.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';').filter(|s| !s.trim().is_empty()) {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                self.connection.execute(trimmed, [])?;
            }
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    /// 批量插入（或覆盖）文档
    fn upsert_documents(&mut self, collection: &str, documents: &[DocumentRow]) -> Result<u64> {
        let tx = self.connection.transaction()?;
        for doc in documents {
            tx.execute(
                "INSERT OR REPLACE INTO documents (collection, doc_id, owner, body, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![collection, doc.doc_id, doc.owner, doc.body, doc.updated_at],
            )?;
        }
        tx.commit()?;

        Ok(documents.len() as u64)
    }

    /// 查询文档
    fn find_documents(&mut self, collection: &str, owner: Option<&str>) -> Result<Vec<DocumentRow>> {
        let mut documents = Vec::new();

        if let Some(owner) = owner {
            let mut stmt = self.connection.prepare(
                "SELECT doc_id, owner, body, updated_at FROM documents
                 WHERE collection = ? AND owner = ? ORDER BY doc_id",
            )?;
            let iter = stmt.query_map(params![collection, owner], Self::map_document_row)?;
            for doc in iter {
                documents.push(doc?);
            }
        } else {
            let mut stmt = self.connection.prepare(
                "SELECT doc_id, owner, body, updated_at FROM documents
                 WHERE collection = ? ORDER BY doc_id",
            )?;
            let iter = stmt.query_map(params![collection], Self::map_document_row)?;
            for doc in iter {
                documents.push(doc?);
            }
        }

        Ok(documents)
    }

    fn map_document_row(row: &duckdb::Row<'_>) -> duckdb::Result<DocumentRow> {
        Ok(DocumentRow {
            doc_id: row.get(0)?,
            owner: row.get(1)?,
            body: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    /// 统计文档数
    fn count_documents(&mut self, collection: &str, owner: Option<&str>) -> Result<i64> {
        let count: i64 = if let Some(owner) = owner {
            self.connection.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ? AND owner = ?",
                params![collection, owner],
                |row| row.get(0),
            )?
        } else {
            self.connection.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?",
                params![collection],
                |row| row.get(0),
            )?
        };

        Ok(count)
    }

    /// 原子换入：删除指定 owner 的文档并写入新文档，同一事务内完成
    fn replace_owner_documents(
        &mut self,
        collection: &str,
        owner: &str,
        documents: &[DocumentRow],
    ) -> Result<u64> {
        let tx = self.connection.transaction()?;

        tx.execute(
            "DELETE FROM documents WHERE collection = ? AND owner = ?",
            params![collection, owner],
        )?;

        for doc in documents {
            tx.execute(
                "INSERT INTO documents (collection, doc_id, owner, body, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
                params![collection, doc.doc_id, owner, doc.body, doc.updated_at],
            )?;
        }

        tx.commit()?;

        Ok(documents.len() as u64)
    }

    /// 创建备份记录
    fn create_backup_record(
        &mut self,
        id: &str,
        file_name: &str,
        status: &str,
        collections: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.connection.execute(
            "INSERT INTO backups (id, file_name, status, collections, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![id, file_name, status, collections, created_at],
        )?;
        Ok(())
    }

    /// 更新备份记录状态
    fn update_backup_status(
        &mut self,
        id: &str,
        status: &str,
        total_documents: Option<i64>,
        checksum: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.connection.execute(
            "UPDATE backups SET status = ?,
                 total_documents = COALESCE(?, total_documents),
                 checksum = COALESCE(?, checksum),
                 error_message = ?
             WHERE id = ?",
            params![status, total_documents, checksum, error_message, id],
        )?;
        Ok(())
    }

    /// 记录备份的远端文件ID
    fn set_backup_remote_id(&mut self, id: &str, remote_file_id: &str) -> Result<()> {
        self.connection.execute(
            "UPDATE backups SET remote_file_id = ? WHERE id = ?",
            params![remote_file_id, id],
        )?;
        Ok(())
    }

    const BACKUP_COLUMNS: &'static str = "id, file_name, status, total_documents, collections, \
         checksum, remote_file_id, error_message, created_at";

    fn map_backup_row(row: &duckdb::Row<'_>) -> duckdb::Result<BackupRow> {
        Ok(BackupRow {
            id: row.get(0)?,
            file_name: row.get(1)?,
            status: row.get(2)?,
            total_documents: row.get(3)?,
            collections: row.get(4)?,
            checksum: row.get(5)?,
            remote_file_id: row.get(6)?,
            error_message: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    /// 按创建时间倒序获取备份记录
    fn list_backups(&mut self, limit: usize) -> Result<Vec<BackupRow>> {
        let sql = format!(
            "SELECT {} FROM backups ORDER BY created_at DESC LIMIT ?",
            Self::BACKUP_COLUMNS
        );
        let mut stmt = self.connection.prepare(&sql)?;

        let iter = stmt.query_map(params![limit as i64], Self::map_backup_row)?;

        let mut backups = Vec::new();
        for backup in iter {
            backups.push(backup?);
        }

        Ok(backups)
    }

    /// 根据ID获取备份记录
    fn get_backup_by_id(&mut self, id: &str) -> Result<Option<BackupRow>> {
        let sql = format!("SELECT {} FROM backups WHERE id = ?", Self::BACKUP_COLUMNS);
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query(params![id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::map_backup_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// 获取最近一次完成的备份记录（调度器的持久化时间锚点）
    fn get_latest_completed_backup(&mut self) -> Result<Option<BackupRow>> {
        let sql = format!(
            "SELECT {} FROM backups WHERE status = 'completed'
             ORDER BY created_at DESC LIMIT 1",
            Self::BACKUP_COLUMNS
        );
        let mut stmt = self.connection.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::map_backup_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// 删除备份记录
    fn delete_backup_record(&mut self, id: &str) -> Result<()> {
        self.connection
            .execute("DELETE FROM backups WHERE id = ?", params![id])?;
        Ok(())
    }

    /// 写入（或覆盖）授权凭据
    fn upsert_drive_credential(&mut self, credential: &DriveCredentialRow) -> Result<()> {
        self.connection.execute(
            "INSERT OR REPLACE INTO drive_credentials
                 (owner, access_token, refresh_token, token_expiry, folder_id,
                  connected, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                credential.owner,
                credential.access_token,
                credential.refresh_token,
                credential.token_expiry,
                credential.folder_id,
                credential.connected,
                credential.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 获取指定 owner 的授权凭据
    fn get_drive_credential(&mut self, owner: &str) -> Result<Option<DriveCredentialRow>> {
        let mut stmt = self.connection.prepare(
            "SELECT owner, access_token, refresh_token, token_expiry, folder_id,
                    connected, updated_at
             FROM drive_credentials WHERE owner = ?",
        )?;
        let mut rows = stmt.query(params![owner])?;

        if let Some(row) = rows.next()? {
            Ok(Some(DriveCredentialRow {
                owner: row.get(0)?,
                access_token: row.get(1)?,
                refresh_token: row.get(2)?,
                token_expiry: row.get(3)?,
                folder_id: row.get(4)?,
                connected: row.get(5)?,
                updated_at: row.get(6)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// 将凭据标记为已断开
    fn mark_credential_disconnected(&mut self, owner: &str) -> Result<()> {
        self.connection.execute(
            "UPDATE drive_credentials SET connected = FALSE, updated_at = CURRENT_TIMESTAMP
             WHERE owner = ?",
            params![owner],
        )?;
        Ok(())
    }

    /// 删除授权凭据
    fn delete_drive_credential(&mut self, owner: &str) -> Result<()> {
        self.connection.execute(
            "DELETE FROM drive_credentials WHERE owner = ?",
            params![owner],
        )?;
        Ok(())
    }
}
