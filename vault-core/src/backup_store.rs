use crate::{
    VaultError,
    constants::backup,
    database::{BackupRecord, BackupStatus, Database},
    error::Result,
    snapshot::{self, Snapshot},
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 备份存储
///
/// 负责"本地有哪些备份"这一事实：负载文件落在 storage_dir，
/// 元数据记在 backups 表，两者由这里保证同生共死。
#[derive(Debug, Clone)]
pub struct BackupStore {
    storage_dir: PathBuf,
    database: Database,
}

impl BackupStore {
    /// 创建新的备份存储
    pub fn new(storage_dir: PathBuf, database: Database) -> Result<Self> {
        if !storage_dir.exists() {
            std::fs::create_dir_all(&storage_dir)?;
        }

        Ok(Self {
            storage_dir,
            database,
        })
    }

    /// 创建备份：先写 pending 记录，负载落盘后翻转为 completed
    ///
    /// pending 之后的任何失败都会把记录标记为 failed 并清掉残留文件，
    /// 不会出现 completed 记录指向不存在负载的情况。
    pub async fn create(&self, snapshot: Snapshot) -> Result<BackupRecord> {
        let backup_id = uuid::Uuid::new_v4().to_string();
        let created_at = snapshot.exported_at;
        let file_name = format!(
            "{}{}_{}{}",
            backup::BACKUP_PREFIX,
            created_at.format("%Y-%m-%d_%H-%M-%S"),
            &backup_id[..8],
            backup::BACKUP_EXTENSION
        );
        let payload_path = self.storage_dir.join(&file_name);

        info!("开始创建备份: {}", payload_path.display());

        self.database
            .create_backup_record(&backup_id, &file_name, &snapshot.collection_names(), created_at)
            .await?;

        let total_documents = snapshot.total_documents();

        match Self::write_payload(snapshot, payload_path.clone()).await {
            Ok(checksum) => {
                self.database
                    .mark_backup_completed(&backup_id, total_documents, &checksum)
                    .await?;

                info!(
                    backup_id = %backup_id,
                    total_documents,
                    "备份创建成功: {}",
                    payload_path.display()
                );

                self.database
                    .get_backup_by_id(&backup_id)
                    .await?
                    .ok_or_else(|| VaultError::backup("无法获取刚创建的备份记录"))
            }
            Err(e) => {
                warn!(backup_id = %backup_id, "备份创建失败: {}", e);

                self.database
                    .mark_backup_failed(&backup_id, &e.to_string())
                    .await?;

                // 清掉可能残留的半成品文件
                if payload_path.exists() {
                    let _ = tokio::fs::remove_file(&payload_path).await;
                }

                Err(e)
            }
        }
    }

    /// 编码并原子落盘，返回负载的 sha256 校验和
    async fn write_payload(snapshot: Snapshot, payload_path: PathBuf) -> Result<String> {
        let storage_dir = payload_path
            .parent()
            .ok_or_else(|| VaultError::backup("备份路径缺少父目录"))?
            .to_path_buf();

        // 编码和落盘都是阻塞操作，放到后台线程执行
        tokio::task::spawn_blocking(move || {
            let payload = snapshot::encode(&snapshot)?;

            let mut hasher = Sha256::new();
            hasher.update(&payload);
            let hash = hasher.finalize();

            // 先写临时文件再重命名，避免留下半写的负载
            let temp = tempfile::NamedTempFile::new_in(&storage_dir)?;
            std::io::Write::write_all(&mut temp.as_file(), &payload)?;
            temp.persist(&payload_path)
                .map_err(|e| VaultError::Io(e.error))?;

            Ok::<String, VaultError>(format!("{hash:x}"))
        })
        .await?
    }

    /// 按创建时间倒序获取备份记录
    pub async fn list(&self, limit: usize) -> Result<Vec<BackupRecord>> {
        self.database.list_backups(limit).await
    }

    /// 根据 ID 获取备份记录
    pub async fn get(&self, backup_id: &str) -> Result<BackupRecord> {
        self.database
            .get_backup_by_id(backup_id)
            .await?
            .ok_or_else(|| VaultError::not_found(format!("备份记录不存在: {backup_id}")))
    }

    /// 读取备份负载（仅限 completed 状态的记录）
    pub async fn load_payload(&self, backup_id: &str) -> Result<Vec<u8>> {
        let record = self.get(backup_id).await?;

        if record.status != BackupStatus::Completed {
            return Err(VaultError::validation(format!(
                "备份 {backup_id} 状态为 {}，只有完成状态的备份可以使用",
                record.status.as_str()
            )));
        }

        let payload_path = self.storage_dir.join(&record.file_name);
        if !payload_path.exists() {
            return Err(VaultError::corrupt(format!(
                "备份文件缺失: {}",
                payload_path.display()
            )));
        }

        let payload = tokio::fs::read(&payload_path).await?;

        // 负载校验和必须与记录一致
        if let Some(expected) = &record.checksum {
            let mut hasher = Sha256::new();
            hasher.update(&payload);
            let actual = format!("{:x}", hasher.finalize());
            if &actual != expected {
                return Err(VaultError::corrupt(format!(
                    "备份 {backup_id} 校验和不匹配，文件可能已被篡改"
                )));
            }
        }

        Ok(payload)
    }

    /// 校验备份负载可以被完整解码
    pub async fn verify(&self, backup_id: &str) -> Result<bool> {
        let payload = self.load_payload(backup_id).await?;
        Ok(snapshot::decode(&payload).is_ok())
    }

    /// 删除备份：负载文件和元数据记录一起移除
    pub async fn delete(&self, backup_id: &str) -> Result<()> {
        let record = self.get(backup_id).await?;

        let payload_path = self.storage_dir.join(&record.file_name);
        if payload_path.exists() {
            tokio::fs::remove_file(&payload_path).await?;
            info!("删除备份文件: {}", payload_path.display());
        }

        self.database.delete_backup_record(backup_id).await?;
        info!("删除备份记录: {}", backup_id);

        Ok(())
    }

    /// 记录备份的远端文件ID（镜像上传成功后调用）
    pub async fn set_remote_id(&self, backup_id: &str, remote_file_id: &str) -> Result<()> {
        self.database
            .set_backup_remote_id(backup_id, remote_file_id)
            .await
    }

    /// 获取存储目录
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Document;
    use serde_json::json;
    use tempfile::tempdir;

    async fn store_with_dir(dir: &Path) -> BackupStore {
        let database = Database::connect_memory().await.unwrap();
        BackupStore::new(dir.to_path_buf(), database).unwrap()
    }

    fn sample_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new(Utc::now());
        snapshot.collections.insert(
            "invoices".to_string(),
            vec![Document {
                id: "inv-1".to_string(),
                owner: "alice".to_string(),
                body: json!({ "amount": 10 }),
            }],
        );
        snapshot
            .collections
            .insert("store_settings".to_string(), Vec::new());
        snapshot
    }

    #[tokio::test]
    async fn test_create_completes_with_counts() {
        let temp_dir = tempdir().unwrap();
        let store = store_with_dir(temp_dir.path()).await;

        let record = store.create(sample_snapshot()).await.unwrap();
        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(record.total_documents, 1);
        assert!(record.checksum.is_some());
        assert!(temp_dir.path().join(&record.file_name).exists());

        // 负载可以完整读回并解码
        let payload = store.load_payload(&record.id).await.unwrap();
        let decoded = snapshot::decode(&payload).unwrap();
        assert_eq!(decoded.total_documents(), 1);
        assert!(store.verify(&record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_marks_record_failed() {
        let temp_dir = tempdir().unwrap();
        let database = Database::connect_memory().await.unwrap();
        let dir = temp_dir.path().join("backups");
        let store = BackupStore::new(dir.clone(), database.clone()).unwrap();

        // 存储目录消失后负载无法落盘
        std::fs::remove_dir_all(&dir).unwrap();

        let err = store.create(sample_snapshot()).await.unwrap_err();
        assert!(matches!(err, VaultError::Io(_)));

        // 记录以 failed 收尾，不会出现指向不存在负载的 completed 记录
        let records = store.list(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, BackupStatus::Failed);
        assert!(records[0].error_message.is_some());
        assert!(!dir.join(&records[0].file_name).exists());
        assert!(
            database
                .get_latest_completed_backup()
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_list_is_most_recent_first_and_bounded() {
        let temp_dir = tempdir().unwrap();
        let store = store_with_dir(temp_dir.path()).await;

        for i in 0..3 {
            let mut snapshot = sample_snapshot();
            snapshot.exported_at = Utc::now() + chrono::Duration::seconds(i);
            store.create(snapshot).await.unwrap();
        }

        let listed = store.list(2).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_payload() {
        let temp_dir = tempdir().unwrap();
        let store = store_with_dir(temp_dir.path()).await;

        let record = store.create(sample_snapshot()).await.unwrap();
        let payload_path = temp_dir.path().join(&record.file_name);
        assert!(payload_path.exists());

        store.delete(&record.id).await.unwrap();
        assert!(!payload_path.exists());

        // 删除后必须是 NotFound，而不是 CorruptPayload
        let err = store.get(&record.id).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        let err = store.load_payload(&record.id).await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = store_with_dir(temp_dir.path()).await;

        let err = store.delete("no-such-backup").await.unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tampered_payload_is_corrupt() {
        let temp_dir = tempdir().unwrap();
        let store = store_with_dir(temp_dir.path()).await;

        let record = store.create(sample_snapshot()).await.unwrap();
        let payload_path = temp_dir.path().join(&record.file_name);
        tokio::fs::write(&payload_path, b"tampered").await.unwrap();

        let err = store.load_payload(&record.id).await.unwrap_err();
        assert!(matches!(err, VaultError::CorruptPayload(_)));
    }
}
