use crate::{
    VaultError,
    backup_store::BackupStore,
    database::{Database, Document},
    drive::DriveClient,
    error::Result,
    snapshot,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 恢复数据的来源
#[derive(Debug, Clone)]
pub enum RestoreSource {
    /// 本地备份记录
    Local { backup_id: String },
    /// 云端备份文件
    Remote { remote_file_id: String },
}

/// 恢复结果报告
///
/// 每个集合的换入是原子的，报告精确说明哪些集合换入成功、
/// 哪些没有动过。
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// 写入的文档总数
    pub restored: u64,
    /// 完成换入的集合
    pub completed: Vec<String>,
    /// 换入失败（数据保持原样）的集合
    pub failed: Vec<String>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 恢复引擎
///
/// 从本地或云端备份恢复指定 owner 的数据。负载先完整解码，
/// 然后按集合做 owner 范围内的原子替换，其他 owner 的数据不受影响。
#[derive(Debug, Clone)]
pub struct RestoreEngine {
    database: Database,
    backup_store: BackupStore,
    drive: Option<DriveClient>,
    /// 与调度器共享的互斥门，备份和恢复不允许同时进行
    gate: Arc<Mutex<()>>,
}

impl RestoreEngine {
    pub fn new(
        database: Database,
        backup_store: BackupStore,
        drive: Option<DriveClient>,
        gate: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            database,
            backup_store,
            drive,
            gate,
        }
    }

    /// 执行恢复
    ///
    /// 解码失败或负载无法取得时整体报错，不落任何写入；
    /// 解码成功后逐集合换入，单个集合失败记入报告但不回滚其他集合。
    pub async fn restore(&self, owner: &str, source: RestoreSource) -> Result<RestoreReport> {
        if owner.is_empty() {
            return Err(VaultError::validation("owner 不能为空"));
        }

        // 备份和恢复互斥，拿不到门直接报忙而不是排队
        let _guard = self
            .gate
            .try_lock()
            .map_err(|_| VaultError::busy("已有备份或恢复任务在执行中"))?;

        let payload = self.resolve_payload(owner, &source).await?;

        // 任何写入之前负载必须完整解码通过
        let snapshot = snapshot::decode(&payload)?;

        info!(
            owner,
            collections = snapshot.collections.len(),
            total_documents = snapshot.total_documents(),
            "开始恢复数据"
        );

        let mut report = RestoreReport {
            restored: 0,
            completed: Vec::new(),
            failed: Vec::new(),
        };

        for (collection, documents) in &snapshot.collections {
            let scoped: Vec<Document> = documents
                .iter()
                .filter(|doc| doc.owner == owner)
                .cloned()
                .collect();

            match self
                .database
                .replace_owner_documents(collection, owner, &scoped)
                .await
            {
                Ok(written) => {
                    report.restored += written;
                    report.completed.push(collection.clone());
                }
                Err(e) => {
                    warn!(owner, collection, "集合换入失败，数据保持原样: {}", e);
                    report.failed.push(collection.clone());
                }
            }
        }

        info!(
            owner,
            restored = report.restored,
            completed = report.completed.len(),
            failed = report.failed.len(),
            "恢复完成"
        );

        Ok(report)
    }

    /// 取得备份负载字节
    async fn resolve_payload(&self, owner: &str, source: &RestoreSource) -> Result<Vec<u8>> {
        match source {
            RestoreSource::Local { backup_id } => {
                if backup_id.is_empty() {
                    return Err(VaultError::validation("备份 ID 不能为空"));
                }
                self.backup_store.load_payload(backup_id).await
            }
            RestoreSource::Remote { remote_file_id } => {
                if remote_file_id.is_empty() {
                    return Err(VaultError::validation("云端文件 ID 不能为空"));
                }
                let drive = self
                    .drive
                    .as_ref()
                    .ok_or_else(|| VaultError::validation("云端镜像未启用，无法从云端恢复"))?;
                drive.download_backup(owner, remote_file_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(id: &str, owner: &str, amount: i64) -> Document {
        Document {
            id: id.to_string(),
            owner: owner.to_string(),
            body: json!({ "amount": amount }),
        }
    }

    async fn setup(dir: &std::path::Path) -> (Database, BackupStore, RestoreEngine) {
        let database = Database::connect_memory().await.unwrap();
        let backup_store = BackupStore::new(dir.to_path_buf(), database.clone()).unwrap();
        let engine = RestoreEngine::new(
            database.clone(),
            backup_store.clone(),
            None,
            Arc::new(Mutex::new(())),
        );
        (database, backup_store, engine)
    }

    /// 存入 alice 和 bob 的初始数据，并生成一份备份
    async fn seed_and_backup(
        database: &Database,
        backup_store: &BackupStore,
    ) -> crate::database::BackupRecord {
        let docs = vec![doc("inv-1", "alice", 10), doc("inv-2", "bob", 99)];
        database.upsert_documents("invoices", &docs).await.unwrap();

        let mut snapshot = Snapshot::new(Utc::now());
        snapshot.collections.insert("invoices".to_string(), docs);
        backup_store.create(snapshot).await.unwrap()
    }

    #[tokio::test]
    async fn test_restore_replaces_owner_scope_only() {
        let temp_dir = tempdir().unwrap();
        let (database, backup_store, engine) = setup(temp_dir.path()).await;
        let record = seed_and_backup(&database, &backup_store).await;

        // 备份之后数据被改动：alice 多了一张发票，bob 的发票也变了
        database
            .upsert_documents("invoices", &[doc("inv-3", "alice", 777), doc("inv-2", "bob", 1)])
            .await
            .unwrap();

        let report = engine
            .restore(
                "alice",
                RestoreSource::Local {
                    backup_id: record.id.clone(),
                },
            )
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(report.restored, 1);
        assert_eq!(report.completed, vec!["invoices".to_string()]);

        // alice 回到备份时点，inv-3 消失
        let alice_docs = database.find_documents("invoices", Some("alice")).await.unwrap();
        assert_eq!(alice_docs.len(), 1);
        assert_eq!(alice_docs[0].id, "inv-1");
        assert_eq!(alice_docs[0].body, json!({ "amount": 10 }));

        // bob 的改动保持原样，不被 alice 的恢复影响
        let bob_docs = database.find_documents("invoices", Some("bob")).await.unwrap();
        assert_eq!(bob_docs.len(), 1);
        assert_eq!(bob_docs[0].body, json!({ "amount": 1 }));
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let (database, backup_store, engine) = setup(temp_dir.path()).await;
        let record = seed_and_backup(&database, &backup_store).await;

        let source = RestoreSource::Local {
            backup_id: record.id.clone(),
        };
        engine.restore("alice", source.clone()).await.unwrap();
        let first = database.find_documents("invoices", Some("alice")).await.unwrap();

        engine.restore("alice", source).await.unwrap();
        let second = database.find_documents("invoices", Some("alice")).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_colliding_doc_id_lands_in_failed_report() {
        let temp_dir = tempdir().unwrap();
        let (database, backup_store, engine) = setup(temp_dir.path()).await;

        // 备份时 shared-1 属于 alice
        let snapshot_docs = vec![doc("shared-1", "alice", 10)];
        database
            .upsert_documents("invoices", &snapshot_docs)
            .await
            .unwrap();

        let mut snapshot = Snapshot::new(Utc::now());
        snapshot
            .collections
            .insert("invoices".to_string(), snapshot_docs);
        snapshot
            .collections
            .insert("store_settings".to_string(), vec![doc("cfg-1", "alice", 1)]);
        let record = backup_store.create(snapshot).await.unwrap();

        // 备份之后 shared-1 易主给了 bob，恢复 alice 时写入会撞主键
        database
            .replace_owner_documents("invoices", "alice", &[])
            .await
            .unwrap();
        database
            .upsert_documents("invoices", &[doc("shared-1", "bob", 99)])
            .await
            .unwrap();

        let report = engine
            .restore(
                "alice",
                RestoreSource::Local {
                    backup_id: record.id,
                },
            )
            .await
            .unwrap();

        // invoices 换入失败进入报告，store_settings 照常换入
        assert!(!report.is_complete());
        assert_eq!(report.failed, vec!["invoices".to_string()]);
        assert_eq!(report.completed, vec!["store_settings".to_string()]);
        assert_eq!(report.restored, 1);

        // bob 的文档原样保留，失败的集合没有留下任何写入痕迹
        let bob_docs = database.find_documents("invoices", Some("bob")).await.unwrap();
        assert_eq!(bob_docs.len(), 1);
        assert_eq!(bob_docs[0].body, json!({ "amount": 99 }));
        let alice_docs = database.find_documents("invoices", Some("alice")).await.unwrap();
        assert!(alice_docs.is_empty());

        let settings = database
            .find_documents("store_settings", Some("alice"))
            .await
            .unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(settings[0].id, "cfg-1");
    }

    #[tokio::test]
    async fn test_restore_after_delete_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let (database, backup_store, engine) = setup(temp_dir.path()).await;
        let record = seed_and_backup(&database, &backup_store).await;

        backup_store.delete(&record.id).await.unwrap();

        let err = engine
            .restore(
                "alice",
                RestoreSource::Local {
                    backup_id: record.id,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_while_gate_held_is_busy() {
        let temp_dir = tempdir().unwrap();
        let (database, backup_store, _) = setup(temp_dir.path()).await;
        let record = seed_and_backup(&database, &backup_store).await;

        let gate = Arc::new(Mutex::new(()));
        let engine = RestoreEngine::new(database, backup_store, None, gate.clone());

        let _held = gate.lock().await;
        let err = engine
            .restore(
                "alice",
                RestoreSource::Local {
                    backup_id: record.id,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Busy(_)));
    }

    #[tokio::test]
    async fn test_remote_restore_without_drive_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let (_, _, engine) = setup(temp_dir.path()).await;

        let err = engine
            .restore(
                "alice",
                RestoreSource::Remote {
                    remote_file_id: "remote-1".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_owner_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let (_, _, engine) = setup(temp_dir.path()).await;

        let err = engine
            .restore(
                "",
                RestoreSource::Local {
                    backup_id: "whatever".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }
}
