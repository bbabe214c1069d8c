use crate::{
    VaultError,
    backup_store::BackupStore,
    constants::{backup, store},
    database::{BackupRecord, Database},
    drive::DriveClient,
    error::Result,
    snapshot::Snapshot,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 调度器运行阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPhase {
    /// 定时循环未启动
    Stopped,
    /// 定时循环在等待下一次检查
    Idle,
    /// 正在执行导出
    Running,
}

impl SchedulerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerPhase::Stopped => "stopped",
            SchedulerPhase::Idle => "idle",
            SchedulerPhase::Running => "running",
        }
    }
}

/// 调度器状态快照
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub phase: SchedulerPhase,
    pub in_progress: bool,
    pub interval_minutes: i64,
    pub last_backup_time: Option<DateTime<Utc>>,
    /// None 表示还没有任何完成的备份，下一轮检查会立即导出
    pub next_backup_time: Option<DateTime<Utc>>,
    pub minutes_until_next: Option<i64>,
}

struct SchedulerState {
    phase: SchedulerPhase,
    in_progress: bool,
    cancel: Option<CancellationToken>,
}

/// 备份调度器
///
/// 定时检查距上次完成的备份是否已超过配置间隔，到期则执行一轮导出。
/// 导出、恢复、删除共享同一把互斥门，任何时刻最多一个任务在动数据。
/// "上次备份时间"以最近一条 completed 备份记录为准，进程重启后依然成立。
#[derive(Clone)]
pub struct BackupScheduler {
    database: Database,
    backup_store: BackupStore,
    drive: Option<DriveClient>,
    /// 定时备份自动镜像到云端时使用的 owner，None 表示不镜像
    mirror_owner: Option<String>,
    interval: Duration,
    state: Arc<Mutex<SchedulerState>>,
    gate: Arc<Mutex<()>>,
}

impl BackupScheduler {
    pub fn new(
        database: Database,
        backup_store: BackupStore,
        drive: Option<DriveClient>,
        mirror_owner: Option<String>,
        interval_minutes: u64,
        gate: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            database,
            backup_store,
            drive,
            mirror_owner,
            interval: Duration::minutes(interval_minutes as i64),
            state: Arc::new(Mutex::new(SchedulerState {
                phase: SchedulerPhase::Stopped,
                in_progress: false,
                cancel: None,
            })),
            gate,
        }
    }

    /// 备份、恢复、删除共用的互斥门
    pub fn gate(&self) -> Arc<Mutex<()>> {
        self.gate.clone()
    }

    /// 启动定时循环（重复调用是无害的空操作）
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.phase != SchedulerPhase::Stopped {
            debug!("调度器已在运行，忽略重复启动");
            return;
        }

        let token = CancellationToken::new();
        state.phase = SchedulerPhase::Idle;
        state.cancel = Some(token.clone());
        drop(state);

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run_loop(token).await;
        });

        info!(
            interval_minutes = self.interval.num_minutes(),
            "备份调度器已启动"
        );
    }

    /// 停止定时循环
    ///
    /// 只取消后续的定时检查，正在执行的导出会跑完。
    pub async fn stop(&self) {
        let state = self.state.lock().await;
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
        }
    }

    async fn run_loop(&self, token: CancellationToken) {
        let period = std::time::Duration::from_secs(backup::TICK_SECONDS);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        let mut state = self.state.lock().await;
        state.phase = SchedulerPhase::Stopped;
        state.cancel = None;
        info!("备份调度器已停止");
    }

    /// 一次定时检查：到期则执行导出，任何失败只记日志不终止循环
    async fn tick(&self) {
        {
            let state = self.state.lock().await;
            if state.in_progress {
                debug!("上一轮备份尚未结束，跳过本次检查");
                return;
            }
        }

        match self.is_backup_needed().await {
            Ok(false) => {}
            Ok(true) => match self.run_backup_cycle().await {
                Ok(record) => {
                    info!(
                        backup_id = %record.id,
                        total_documents = record.total_documents,
                        "定时备份完成"
                    );
                }
                Err(VaultError::Busy(_)) => {
                    debug!("备份或恢复任务占用中，跳过本轮定时备份");
                }
                Err(e) => {
                    warn!("定时备份失败，下一轮到期后重试: {}", e);
                }
            },
            Err(e) => {
                warn!("备份调度检查失败: {}", e);
            }
        }
    }

    /// 距上次完成的备份是否已达到配置间隔
    ///
    /// 没有任何完成的备份时视为到期；恰好到达间隔边界也视为到期。
    pub async fn is_backup_needed(&self) -> Result<bool> {
        match self.last_backup_time().await? {
            None => Ok(true),
            Some(last) => Ok(Utc::now() >= last + self.interval),
        }
    }

    /// 最近一次完成的备份时间
    pub async fn last_backup_time(&self) -> Result<Option<DateTime<Utc>>> {
        let record = self.database.get_latest_completed_backup().await?;
        Ok(record.map(|record| record.created_at))
    }

    /// 立即执行一轮备份，跳过间隔检查但仍受互斥门约束
    pub async fn force_backup_now(&self) -> Result<BackupRecord> {
        self.run_backup_cycle().await
    }

    /// 删除备份（与导出、恢复互斥）
    pub async fn delete_backup(&self, backup_id: &str) -> Result<()> {
        let _guard = self
            .gate
            .try_lock()
            .map_err(|_| VaultError::busy("已有备份或恢复任务在执行中"))?;
        self.backup_store.delete(backup_id).await
    }

    /// 当前调度状态
    pub async fn status(&self) -> Result<SchedulerStatus> {
        let (phase, in_progress) = {
            let state = self.state.lock().await;
            (state.phase, state.in_progress)
        };

        let last_backup_time = self.last_backup_time().await?;
        let next_backup_time = last_backup_time.map(|last| last + self.interval);
        let minutes_until_next =
            next_backup_time.map(|next| (next - Utc::now()).num_minutes().max(0));

        Ok(SchedulerStatus {
            phase,
            in_progress,
            interval_minutes: self.interval.num_minutes(),
            last_backup_time,
            next_backup_time,
            minutes_until_next,
        })
    }

    /// 一轮完整的导出：拿门 -> 导出快照 -> 落库落盘 -> 尽力镜像
    async fn run_backup_cycle(&self) -> Result<BackupRecord> {
        let _guard = self
            .gate
            .try_lock()
            .map_err(|_| VaultError::busy("已有备份或恢复任务在执行中"))?;

        self.mark_cycle(true).await;
        let result = self.export_once().await;
        self.mark_cycle(false).await;

        result
    }

    /// 记录导出的起止，保证失败也不会把 in_progress 卡在 true
    async fn mark_cycle(&self, running: bool) {
        let mut state = self.state.lock().await;
        state.in_progress = running;
        match (running, state.phase) {
            (true, SchedulerPhase::Idle) => state.phase = SchedulerPhase::Running,
            (false, SchedulerPhase::Running) => state.phase = SchedulerPhase::Idle,
            _ => {}
        }
    }

    /// 导出固定集合清单的一致性快照并写入备份存储
    async fn export_once(&self) -> Result<BackupRecord> {
        info!("开始导出备份快照");

        let mut snapshot = Snapshot::new(Utc::now());
        for collection in store::BACKUP_COLLECTIONS {
            let documents = self.database.find_documents(collection, None).await?;
            snapshot
                .collections
                .insert((*collection).to_string(), documents);
        }

        let record = self.backup_store.create(snapshot).await?;
        self.mirror_backup(&record).await;
        Ok(record)
    }

    /// 尽力把备份镜像到云端，失败只记日志，本地备份照常生效
    async fn mirror_backup(&self, record: &BackupRecord) {
        let (Some(drive), Some(owner)) = (self.drive.as_ref(), self.mirror_owner.as_deref())
        else {
            return;
        };

        match self.backup_store.load_payload(&record.id).await {
            Ok(payload) => match drive.push_backup(owner, record, payload).await {
                Ok(remote_file_id) => {
                    if let Err(e) = self
                        .backup_store
                        .set_remote_id(&record.id, &remote_file_id)
                        .await
                    {
                        warn!(backup_id = %record.id, "记录云端文件ID失败: {}", e);
                    }
                }
                Err(e) => {
                    warn!(
                        backup_id = %record.id,
                        "镜像上传失败，本地备份不受影响: {}", e
                    );
                }
            },
            Err(e) => {
                warn!(backup_id = %record.id, "读取备份负载失败，跳过镜像: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Document;
    use serde_json::json;
    use tempfile::tempdir;

    async fn scheduler_with(
        dir: &std::path::Path,
        interval_minutes: u64,
    ) -> (Database, BackupScheduler) {
        let database = Database::connect_memory().await.unwrap();
        let backup_store = BackupStore::new(dir.to_path_buf(), database.clone()).unwrap();
        let scheduler = BackupScheduler::new(
            database.clone(),
            backup_store,
            None,
            None,
            interval_minutes,
            Arc::new(Mutex::new(())),
        );
        (database, scheduler)
    }

    /// 直接写入一条指定时间的 completed 备份记录
    async fn completed_record_at(database: &Database, id: &str, created_at: DateTime<Utc>) {
        database
            .create_backup_record(id, &format!("{id}.json.gz"), &[], created_at)
            .await
            .unwrap();
        database.mark_backup_completed(id, 0, "checksum").await.unwrap();
    }

    #[tokio::test]
    async fn test_backup_needed_with_no_records() {
        let temp_dir = tempdir().unwrap();
        let (_, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        assert!(scheduler.is_backup_needed().await.unwrap());
    }

    #[tokio::test]
    async fn test_backup_not_needed_inside_interval() {
        let temp_dir = tempdir().unwrap();
        let (database, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        completed_record_at(&database, "bk-1", Utc::now() - Duration::minutes(29)).await;
        assert!(!scheduler.is_backup_needed().await.unwrap());
    }

    #[tokio::test]
    async fn test_backup_needed_at_interval_boundary() {
        let temp_dir = tempdir().unwrap();
        let (database, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        completed_record_at(&database, "bk-1", Utc::now() - Duration::minutes(30)).await;
        assert!(scheduler.is_backup_needed().await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_completed_record_is_the_anchor() {
        let temp_dir = tempdir().unwrap();
        let (database, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        completed_record_at(&database, "bk-old", Utc::now() - Duration::minutes(90)).await;
        completed_record_at(&database, "bk-new", Utc::now() - Duration::minutes(5)).await;

        let last = scheduler.last_backup_time().await.unwrap().unwrap();
        assert!(Utc::now() - last < Duration::minutes(10));
        assert!(!scheduler.is_backup_needed().await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_record_is_not_an_anchor() {
        let temp_dir = tempdir().unwrap();
        let (database, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        database
            .create_backup_record("bk-pending", "p.json.gz", &[], Utc::now())
            .await
            .unwrap();
        assert!(scheduler.is_backup_needed().await.unwrap());
    }

    #[tokio::test]
    async fn test_force_backup_creates_completed_record() {
        let temp_dir = tempdir().unwrap();
        let (database, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        database
            .upsert_documents(
                "invoices",
                &[Document {
                    id: "inv-1".to_string(),
                    owner: "alice".to_string(),
                    body: json!({ "amount": 10 }),
                }],
            )
            .await
            .unwrap();

        let record = scheduler.force_backup_now().await.unwrap();
        assert_eq!(record.total_documents, 1);
        let expected: Vec<String> = store::BACKUP_COLLECTIONS
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(record.collections, expected);

        // 导出结束后状态回落，不会把 in_progress 卡在 true
        let status = scheduler.status().await.unwrap();
        assert!(!status.in_progress);
        assert!(status.last_backup_time.is_some());
        assert!(!scheduler.is_backup_needed().await.unwrap());
    }

    #[tokio::test]
    async fn test_force_backup_while_gate_held_is_busy() {
        let temp_dir = tempdir().unwrap();
        let (_, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        let gate = scheduler.gate();
        let _held = gate.lock().await;

        let err = scheduler.force_backup_now().await.unwrap_err();
        assert!(matches!(err, VaultError::Busy(_)));
    }

    #[tokio::test]
    async fn test_delete_while_gate_held_is_busy() {
        let temp_dir = tempdir().unwrap();
        let (_, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        let gate = scheduler.gate();
        let _held = gate.lock().await;

        let err = scheduler.delete_backup("bk-1").await.unwrap_err();
        assert!(matches!(err, VaultError::Busy(_)));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let temp_dir = tempdir().unwrap();
        let (_, scheduler) = scheduler_with(temp_dir.path(), 30).await;

        assert_eq!(scheduler.status().await.unwrap().phase, SchedulerPhase::Stopped);

        scheduler.start().await;
        // 重复启动是空操作
        scheduler.start().await;
        assert_eq!(scheduler.status().await.unwrap().phase, SchedulerPhase::Idle);

        scheduler.stop().await;
        // 循环收到取消信号后把阶段置回 Stopped
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(scheduler.status().await.unwrap().phase, SchedulerPhase::Stopped);
    }
}
