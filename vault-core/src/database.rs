use crate::{
    Result, VaultError,
    store::{BackupRow, DocumentRow, DriveCredentialRow, StoreManager},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 数据库管理器 - DuckDB适配器
#[derive(Debug, Clone)]
pub struct Database {
    manager: StoreManager,
}

/// 业务文档
///
/// body 是任意 JSON 结构，引擎不关心其内部含义；
/// owner 标识文档归属，没有归属的文档使用保留作用域
/// [`crate::constants::store::UNOWNED_SCOPE`]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner: String,
    pub body: serde_json::Value,
}

/// 备份记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub file_name: String,
    pub status: BackupStatus,
    pub total_documents: i64,
    pub collections: Vec<String>,
    pub checksum: Option<String>,
    pub remote_file_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 备份状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackupStatus {
    Pending,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::Pending => "pending",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "pending" => BackupStatus::Pending,
            "completed" => BackupStatus::Completed,
            _ => BackupStatus::Failed,
        }
    }
}

/// 云端授权凭据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveCredential {
    pub owner: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
    pub folder_id: Option<String>,
    pub connected: bool,
}

impl DriveCredential {
    /// access_token 是否需要刷新（到期时间不晚于当前时刻即视为过期）
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.token_expiry <= now
    }
}

fn backup_record_from_row(row: BackupRow) -> BackupRecord {
    let collections: Vec<String> = serde_json::from_str(&row.collections).unwrap_or_default();

    BackupRecord {
        id: row.id,
        file_name: row.file_name,
        status: BackupStatus::parse(&row.status),
        total_documents: row.total_documents,
        collections,
        checksum: row.checksum,
        remote_file_id: row.remote_file_id,
        error_message: row.error_message,
        created_at: row.created_at,
    }
}

fn document_from_row(row: DocumentRow) -> Result<Document> {
    let body = serde_json::from_str(&row.body)
        .map_err(|e| VaultError::custom(format!("文档 {} 的内容不是合法JSON: {e}", row.doc_id)))?;

    Ok(Document {
        id: row.doc_id,
        owner: row.owner,
        body,
    })
}

fn document_to_row(doc: &Document) -> Result<DocumentRow> {
    Ok(DocumentRow {
        doc_id: doc.id.clone(),
        owner: doc.owner.clone(),
        body: serde_json::to_string(&doc.body)?,
        updated_at: Utc::now(),
    })
}

impl Database {
    /// 连接到数据库
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = StoreManager::new(db_path).await?;
        Ok(Database { manager })
    }

    /// 连接到内存数据库 (主要用于测试，生产环境建议使用connect()以确保数据持久化)
    pub async fn connect_memory() -> Result<Self> {
        let manager = StoreManager::new_memory().await?;
        Ok(Database { manager })
    }

    // ========================================
    // 文档集合操作
    // ========================================

    /// 批量插入（或覆盖）文档
    pub async fn upsert_documents(&self, collection: &str, documents: &[Document]) -> Result<u64> {
        let rows = documents
            .iter()
            .map(document_to_row)
            .collect::<Result<Vec<_>>>()?;
        self.manager.upsert_documents(collection, rows).await
    }

    /// 查询文档，owner 为 None 时返回整个集合
    pub async fn find_documents(
        &self,
        collection: &str,
        owner: Option<&str>,
    ) -> Result<Vec<Document>> {
        let rows = self.manager.find_documents(collection, owner).await?;
        rows.into_iter().map(document_from_row).collect()
    }

    /// 统计文档数
    pub async fn count_documents(&self, collection: &str, owner: Option<&str>) -> Result<i64> {
        self.manager.count_documents(collection, owner).await
    }

    /// 原子换入指定 owner 的文档：删除旧文档并写入新文档，同一事务完成
    pub async fn replace_owner_documents(
        &self,
        collection: &str,
        owner: &str,
        documents: &[Document],
    ) -> Result<u64> {
        let rows = documents
            .iter()
            .map(document_to_row)
            .collect::<Result<Vec<_>>>()?;
        self.manager
            .replace_owner_documents(collection, owner, rows)
            .await
    }

    // ========================================
    // 备份元数据操作
    // ========================================

    /// 创建备份记录（初始状态 pending）
    pub async fn create_backup_record(
        &self,
        id: &str,
        file_name: &str,
        collections: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let collections_json = serde_json::to_string(collections)?;
        self.manager
            .create_backup_record(
                id,
                file_name,
                BackupStatus::Pending.as_str(),
                &collections_json,
                created_at,
            )
            .await
    }

    /// 将备份记录标记为完成
    pub async fn mark_backup_completed(
        &self,
        id: &str,
        total_documents: i64,
        checksum: &str,
    ) -> Result<()> {
        self.manager
            .update_backup_status(
                id,
                BackupStatus::Completed.as_str(),
                Some(total_documents),
                Some(checksum.to_string()),
                None,
            )
            .await
    }

    /// 将备份记录标记为失败
    pub async fn mark_backup_failed(&self, id: &str, error_message: &str) -> Result<()> {
        self.manager
            .update_backup_status(
                id,
                BackupStatus::Failed.as_str(),
                None,
                None,
                Some(error_message.to_string()),
            )
            .await
    }

    /// 记录备份的远端文件ID
    pub async fn set_backup_remote_id(&self, id: &str, remote_file_id: &str) -> Result<()> {
        self.manager.set_backup_remote_id(id, remote_file_id).await
    }

    /// 按创建时间倒序获取备份记录
    pub async fn list_backups(&self, limit: usize) -> Result<Vec<BackupRecord>> {
        let rows = self.manager.list_backups(limit).await?;
        Ok(rows.into_iter().map(backup_record_from_row).collect())
    }

    /// 根据 ID 获取备份记录
    pub async fn get_backup_by_id(&self, id: &str) -> Result<Option<BackupRecord>> {
        let row = self.manager.get_backup_by_id(id).await?;
        Ok(row.map(backup_record_from_row))
    }

    /// 获取最近一次完成的备份记录（调度器用它恢复"上次备份时间"）
    pub async fn get_latest_completed_backup(&self) -> Result<Option<BackupRecord>> {
        let row = self.manager.get_latest_completed_backup().await?;
        Ok(row.map(backup_record_from_row))
    }

    /// 删除备份记录
    pub async fn delete_backup_record(&self, id: &str) -> Result<()> {
        self.manager.delete_backup_record(id).await
    }

    // ========================================
    // 云端授权凭据操作
    // ========================================

    /// 写入（或覆盖）授权凭据
    pub async fn upsert_drive_credential(&self, credential: &DriveCredential) -> Result<()> {
        self.manager
            .upsert_drive_credential(DriveCredentialRow {
                owner: credential.owner.clone(),
                access_token: credential.access_token.clone(),
                refresh_token: credential.refresh_token.clone(),
                token_expiry: credential.token_expiry,
                folder_id: credential.folder_id.clone(),
                connected: credential.connected,
                updated_at: Utc::now(),
            })
            .await
    }

    /// 获取指定 owner 的授权凭据
    pub async fn get_drive_credential(&self, owner: &str) -> Result<Option<DriveCredential>> {
        let row = self.manager.get_drive_credential(owner).await?;
        Ok(row.map(|row| DriveCredential {
            owner: row.owner,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            token_expiry: row.token_expiry,
            folder_id: row.folder_id,
            connected: row.connected,
        }))
    }

    /// 将凭据标记为已断开
    pub async fn mark_credential_disconnected(&self, owner: &str) -> Result<()> {
        self.manager.mark_credential_disconnected(owner).await
    }

    /// 删除授权凭据
    pub async fn delete_drive_credential(&self, owner: &str) -> Result<()> {
        self.manager.delete_drive_credential(owner).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(id: &str, owner: &str, amount: i64) -> Document {
        Document {
            id: id.to_string(),
            owner: owner.to_string(),
            body: json!({ "amount": amount, "currency": "CNY" }),
        }
    }

    #[tokio::test]
    async fn test_database_connection() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::connect(&db_path).await.unwrap();

        // 建表完成后库是空的
        assert_eq!(db.count_documents("invoices", None).await.unwrap(), 0);
        assert!(db.get_backup_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_document_operations() {
        let db = Database::connect_memory().await.unwrap();

        let docs = vec![doc("inv-1", "alice", 100), doc("inv-2", "bob", 200)];
        let inserted = db.upsert_documents("invoices", &docs).await.unwrap();
        assert_eq!(inserted, 2);

        // 按 owner 查询
        let alice_docs = db.find_documents("invoices", Some("alice")).await.unwrap();
        assert_eq!(alice_docs.len(), 1);
        assert_eq!(alice_docs[0].id, "inv-1");
        assert_eq!(alice_docs[0].body["amount"], json!(100));

        // 全集合查询与计数
        let all = db.find_documents("invoices", None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(db.count_documents("invoices", None).await.unwrap(), 2);
        assert_eq!(
            db.count_documents("invoices", Some("bob")).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_replace_owner_documents_is_scoped() {
        let db = Database::connect_memory().await.unwrap();

        db.upsert_documents(
            "invoices",
            &[doc("inv-1", "alice", 100), doc("inv-2", "bob", 200)],
        )
        .await
        .unwrap();

        // 换入 alice 的新文档，bob 的文档必须保持不变
        db.replace_owner_documents("invoices", "alice", &[doc("inv-9", "alice", 999)])
            .await
            .unwrap();

        let alice_docs = db.find_documents("invoices", Some("alice")).await.unwrap();
        assert_eq!(alice_docs.len(), 1);
        assert_eq!(alice_docs[0].id, "inv-9");

        let bob_docs = db.find_documents("invoices", Some("bob")).await.unwrap();
        assert_eq!(bob_docs.len(), 1);
        assert_eq!(bob_docs[0].id, "inv-2");
    }

    #[tokio::test]
    async fn test_backup_record_lifecycle() {
        let db = Database::connect_memory().await.unwrap();

        let collections = vec!["invoices".to_string(), "store_settings".to_string()];
        db.create_backup_record("bk-1", "snapshot_1.json.gz", &collections, Utc::now())
            .await
            .unwrap();

        let record = db.get_backup_by_id("bk-1").await.unwrap().unwrap();
        assert_eq!(record.status, BackupStatus::Pending);
        assert_eq!(record.collections, collections);

        // pending 记录不作为时间锚点
        assert!(db.get_latest_completed_backup().await.unwrap().is_none());

        db.mark_backup_completed("bk-1", 42, "abc123").await.unwrap();
        let record = db.get_backup_by_id("bk-1").await.unwrap().unwrap();
        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(record.total_documents, 42);
        assert_eq!(record.checksum.as_deref(), Some("abc123"));

        let latest = db.get_latest_completed_backup().await.unwrap().unwrap();
        assert_eq!(latest.id, "bk-1");

        db.delete_backup_record("bk-1").await.unwrap();
        assert!(db.get_backup_by_id("bk-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_drive_credential_storage() {
        let db = Database::connect_memory().await.unwrap();

        let credential = DriveCredential {
            owner: "alice".to_string(),
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            token_expiry: Utc::now(),
            folder_id: Some("folder-1".to_string()),
            connected: true,
        };
        db.upsert_drive_credential(&credential).await.unwrap();

        let loaded = db.get_drive_credential("alice").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "token");
        assert!(loaded.connected);

        db.mark_credential_disconnected("alice").await.unwrap();
        let loaded = db.get_drive_credential("alice").await.unwrap().unwrap();
        assert!(!loaded.connected);
    }
}
