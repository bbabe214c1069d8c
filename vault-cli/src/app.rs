use std::sync::Arc;
use tokio::sync::Mutex;
use vault_core::{
    backup_store::BackupStore,
    config::AppConfig,
    database::Database,
    drive::{DriveClient, TokenManager},
    error::Result,
    restore::RestoreEngine,
    scheduler::BackupScheduler,
};

use crate::cli::{
    BackupCommand, Commands, DocsCommand, DriveCommand, RestoreCommand, SchedulerCommand,
};
use crate::commands;
use tracing::info;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub database: Database,
    pub backup_store: BackupStore,
    pub token_manager: Option<TokenManager>,
    pub drive_client: Option<DriveClient>,
    pub restore_engine: RestoreEngine,
    pub scheduler: BackupScheduler,
}

impl CliApp {
    /// 使用智能配置查找初始化CLI应用
    pub async fn new_with_auto_config() -> Result<Self> {
        let config = AppConfig::find_and_load_config()?;

        // 初始化文档存储
        let database = Database::connect(&config.get_database_path()).await?;

        // 本地备份存储
        let backup_store = BackupStore::new(config.get_backup_dir(), database.clone())?;

        // 云端镜像是可选能力，未启用时相关命令会给出提示
        let (token_manager, drive_client) = if config.drive.enabled {
            let tokens = TokenManager::new(database.clone(), &config.drive)?;
            let client = DriveClient::new(tokens.clone(), &config.drive)?;
            (Some(tokens), Some(client))
        } else {
            (None, None)
        };

        // 导出、恢复、删除共用一把互斥门
        let gate = Arc::new(Mutex::new(()));
        let scheduler = BackupScheduler::new(
            database.clone(),
            backup_store.clone(),
            drive_client.clone(),
            config.mirror_owner().map(str::to_string),
            config.backup.interval_minutes,
            gate.clone(),
        );
        let restore_engine = RestoreEngine::new(
            database.clone(),
            backup_store.clone(),
            drive_client.clone(),
            gate,
        );

        Ok(Self {
            config,
            database,
            backup_store,
            token_manager,
            drive_client,
            restore_engine,
            scheduler,
        })
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Status => commands::run_status(self).await,
            Commands::Init { .. } => unreachable!(), // 已经在 main.rs 中处理
            Commands::Backup(backup_cmd) => self.run_backup_command(backup_cmd).await,
            Commands::Restore(restore_cmd) => self.run_restore_command(restore_cmd).await,
            Commands::Scheduler(scheduler_cmd) => self.run_scheduler_command(scheduler_cmd).await,
            Commands::Drive(drive_cmd) => self.run_drive_command(drive_cmd).await,
            Commands::Docs(docs_cmd) => self.run_docs_command(docs_cmd).await,
        }
    }

    /// 运行备份管理相关命令
    async fn run_backup_command(&self, cmd: BackupCommand) -> Result<()> {
        match cmd {
            BackupCommand::Create => {
                info!("💾 创建数据备份...");
                commands::run_backup_create(self).await
            }
            BackupCommand::List { limit } => commands::run_backup_list(self, limit).await,
            BackupCommand::Delete { backup_id, force } => {
                commands::run_backup_delete(self, &backup_id, force).await
            }
            BackupCommand::Verify { backup_id } => {
                info!("🔍 校验备份负载: {}", backup_id);
                commands::run_backup_verify(self, &backup_id).await
            }
        }
    }

    /// 运行恢复相关命令
    async fn run_restore_command(&self, cmd: RestoreCommand) -> Result<()> {
        match cmd {
            RestoreCommand::Local {
                backup_id,
                owner,
                force,
            } => {
                info!("⏪ 从本地备份恢复: {}", backup_id);
                commands::run_restore_local(self, &backup_id, &owner, force).await
            }
            RestoreCommand::Remote {
                remote_file_id,
                owner,
                force,
            } => {
                info!("⏪ 从云端备份恢复: {}", remote_file_id);
                commands::run_restore_remote(self, &remote_file_id, &owner, force).await
            }
        }
    }

    /// 运行定时备份调度相关命令
    async fn run_scheduler_command(&self, cmd: SchedulerCommand) -> Result<()> {
        match cmd {
            SchedulerCommand::Run => {
                info!("⏰ 启动定时备份调度器...");
                commands::run_scheduler_daemon(self).await
            }
            SchedulerCommand::Status => commands::run_scheduler_status(self).await,
        }
    }

    /// 运行云端镜像相关命令
    async fn run_drive_command(&self, cmd: DriveCommand) -> Result<()> {
        match cmd {
            DriveCommand::Connect {
                owner,
                access_token,
                refresh_token,
                expires_in,
                folder,
            } => {
                info!("🔗 连接云端存储: {}", owner);
                commands::run_drive_connect(
                    self,
                    &owner,
                    &access_token,
                    &refresh_token,
                    expires_in,
                    folder.as_deref(),
                )
                .await
            }
            DriveCommand::Disconnect { owner } => {
                info!("🔌 断开云端存储: {}", owner);
                commands::run_drive_disconnect(self, &owner).await
            }
            DriveCommand::Status { owner } => commands::run_drive_status(self, &owner).await,
            DriveCommand::List { owner } => commands::run_drive_list(self, &owner).await,
            DriveCommand::Push { backup_id, owner } => {
                info!("☁️  上传备份到云端: {}", backup_id);
                commands::run_drive_push(self, &backup_id, &owner).await
            }
            DriveCommand::Pull {
                remote_file_id,
                owner,
                output,
            } => {
                info!("⬇️  下载云端备份: {}", remote_file_id);
                commands::run_drive_pull(self, &remote_file_id, &owner, &output).await
            }
        }
    }

    /// 运行文档数据相关命令
    async fn run_docs_command(&self, cmd: DocsCommand) -> Result<()> {
        match cmd {
            DocsCommand::Import {
                collection,
                file,
                owner,
            } => {
                info!("📥 导入文档到集合: {}", collection);
                commands::run_docs_import(self, &collection, &file, owner.as_deref()).await
            }
            DocsCommand::Count { collection, owner } => {
                commands::run_docs_count(self, &collection, owner.as_deref()).await
            }
        }
    }
}
