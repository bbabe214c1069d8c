use crate::app::CliApp;
use tracing::{info, warn};
use vault_core::error::Result;

/// 立即创建一份备份
pub async fn run_backup_create(app: &CliApp) -> Result<()> {
    let record = app.scheduler.force_backup_now().await?;

    info!("🎉 备份创建成功！");
    info!("   备份ID: {}", record.id);
    info!("   备份文件: {}", record.file_name);
    info!("   备份时间: {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    info!("   文档数量: {}", record.total_documents);
    info!("   集合: {}", record.collections.join(", "));
    if let Some(remote_file_id) = &record.remote_file_id {
        info!("   云端文件: {}", remote_file_id);
    }

    // 显示备份文件大小
    let payload_path = app.backup_store.storage_dir().join(&record.file_name);
    if let Ok(metadata) = std::fs::metadata(&payload_path) {
        let size_kb = metadata.len() as f64 / 1024.0;
        info!("   文件大小: {:.1} KB", size_kb);
    }

    Ok(())
}

/// 列出本地备份
pub async fn run_backup_list(app: &CliApp, limit: usize) -> Result<()> {
    let backups = app.backup_store.list(limit).await?;

    if backups.is_empty() {
        info!("📦 暂无备份记录");
        info!("💡 使用以下命令创建备份:");
        info!("   shopvault backup create");
        return Ok(());
    }

    info!("📦 备份列表");
    info!("============");

    info!(
        "{:<38} {:<20} {:<10} {:<8} {:<10} {}",
        "ID", "创建时间", "状态", "文档数", "云端", "文件名"
    );
    info!("{}", "-".repeat(110));

    let mut missing_payloads = 0;
    for backup in &backups {
        let payload_path = app.backup_store.storage_dir().join(&backup.file_name);
        let remote_display = if backup.remote_file_id.is_some() {
            "✅"
        } else {
            "---"
        };

        info!(
            "{:<38} {:<20} {:<10} {:<8} {:<10} {}",
            backup.id,
            backup.created_at.format("%Y-%m-%d %H:%M:%S"),
            backup.status.as_str(),
            backup.total_documents,
            remote_display,
            backup.file_name
        );

        if !payload_path.exists() {
            missing_payloads += 1;
            warn!("     ⚠️  警告: 备份文件不存在，无法用于恢复！");
            warn!("         预期路径: {}", payload_path.display());
        }
    }

    info!("{}", "-".repeat(110));
    info!("📊 共 {} 份备份", backups.len());
    if missing_payloads > 0 {
        warn!("⚠️  发现 {} 份备份的负载文件缺失", missing_payloads);
    }

    info!("💡 可用操作:");
    info!("   - 从备份恢复: shopvault restore local <备份ID> --owner <owner>");
    info!("   - 校验备份: shopvault backup verify <备份ID>");

    Ok(())
}

/// 删除备份
pub async fn run_backup_delete(app: &CliApp, backup_id: &str, force: bool) -> Result<()> {
    // 先确认记录存在，给用户一个清晰的目标
    let record = app.backup_store.get(backup_id).await?;

    if !force {
        warn!("⚠️  此操作将同时删除备份记录和负载文件，无法撤销!");
        print!(
            "请确认删除备份 {} ({}) (y/N): ",
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim().to_lowercase() != "y" {
            warn!("操作已取消");
            return Ok(());
        }
    }

    app.scheduler.delete_backup(backup_id).await?;
    info!("✅ 备份已删除: {}", backup_id);
    Ok(())
}

/// 校验备份负载
pub async fn run_backup_verify(app: &CliApp, backup_id: &str) -> Result<()> {
    match app.backup_store.verify(backup_id).await {
        Ok(true) => {
            info!("✅ 备份负载完整，可以用于恢复");
            Ok(())
        }
        Ok(false) => {
            warn!("❌ 备份负载无法解码，请选择其他备份");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
