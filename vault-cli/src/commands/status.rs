use crate::app::CliApp;
use tracing::{info, warn};
use vault_core::{constants::store, error::Result};

/// 显示备份系统整体状态
pub async fn run_status(app: &CliApp) -> Result<()> {
    info!("🏪 ShopVault 系统状态");
    info!("======================");

    // 文档存储概况
    info!("📄 文档存储: {}", app.config.store.db_file);
    let mut total_documents = 0;
    for collection in store::BACKUP_COLLECTIONS {
        let count = app.database.count_documents(collection, None).await?;
        total_documents += count;
        info!("   - {:<18} {} 条", collection, count);
    }
    info!("   合计: {} 条文档", total_documents);

    // 备份概况
    let backups = app.backup_store.list(1000).await?;
    info!("📦 本地备份: {} 份 ({})", backups.len(), app.config.backup.storage_dir);
    if let Some(latest) = backups.first() {
        info!(
            "   最近备份: {} ({}, {} 条文档)",
            latest.created_at.format("%Y-%m-%d %H:%M:%S"),
            latest.status.as_str(),
            latest.total_documents
        );
    } else {
        info!("   暂无备份，使用 'shopvault backup create' 创建第一份");
    }

    // 调度概况
    let status = app.scheduler.status().await?;
    info!(
        "⏰ 定时备份: 每 {} 分钟 (当前进程: {})",
        status.interval_minutes,
        status.phase.as_str()
    );
    match status.next_backup_time {
        Some(next) => info!("   下次到期: {}", next.format("%Y-%m-%d %H:%M:%S")),
        None => info!("   下次到期: 立即（还没有完成的备份）"),
    }

    // 云端镜像概况
    if app.config.drive.enabled {
        info!("☁️  云端镜像: 已启用");
        match app.config.mirror_owner() {
            Some(owner) => info!("   镜像 owner: {}", owner),
            None => warn!("   未配置 mirror_owner，定时备份不会自动镜像"),
        }
    } else {
        info!("☁️  云端镜像: 未启用");
    }

    Ok(())
}
