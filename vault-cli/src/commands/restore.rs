use crate::app::CliApp;
use tracing::{info, warn};
use vault_core::{
    VaultError,
    error::Result,
    restore::{RestoreReport, RestoreSource},
};

/// 从本地备份恢复
pub async fn run_restore_local(
    app: &CliApp,
    backup_id: &str,
    owner: &str,
    force: bool,
) -> Result<()> {
    if !confirm_restore(owner, force)? {
        return Ok(());
    }

    let report = app
        .restore_engine
        .restore(
            owner,
            RestoreSource::Local {
                backup_id: backup_id.to_string(),
            },
        )
        .await?;

    print_report(owner, &report)
}

/// 从云端备份恢复
pub async fn run_restore_remote(
    app: &CliApp,
    remote_file_id: &str,
    owner: &str,
    force: bool,
) -> Result<()> {
    if !confirm_restore(owner, force)? {
        return Ok(());
    }

    let report = app
        .restore_engine
        .restore(
            owner,
            RestoreSource::Remote {
                remote_file_id: remote_file_id.to_string(),
            },
        )
        .await?;

    print_report(owner, &report)
}

/// 恢复是破坏性操作，没有 --force 时要求用户确认
fn confirm_restore(owner: &str, force: bool) -> Result<bool> {
    if force {
        return Ok(true);
    }

    warn!("⚠️  警告: 此操作将用备份内容覆盖 owner '{owner}' 的全部数据!");
    print!("请确认继续恢复 (y/N): ");

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim().to_lowercase() != "y" {
        warn!("操作已取消");
        return Ok(false);
    }
    Ok(true)
}

fn print_report(owner: &str, report: &RestoreReport) -> Result<()> {
    info!("📋 恢复结果 (owner: {})", owner);
    info!("   写入文档: {} 条", report.restored);
    for collection in &report.completed {
        info!("   ✅ {}", collection);
    }
    for collection in &report.failed {
        warn!("   ❌ {} (数据保持原样)", collection);
    }

    if report.is_complete() {
        info!("✅ 恢复完成");
        Ok(())
    } else {
        Err(VaultError::restore(format!(
            "部分集合恢复失败: {}",
            report.failed.join(", ")
        )))
    }
}
