use crate::app::CliApp;
use chrono::Utc;
use indicatif::ProgressBar;
use std::path::Path;
use tracing::{info, warn};
use vault_core::{
    VaultError,
    drive::{DriveClient, TokenManager},
    error::Result,
};

/// 云端镜像未启用时给出统一的提示
fn require_drive(app: &CliApp) -> Result<(&TokenManager, &DriveClient)> {
    match (&app.token_manager, &app.drive_client) {
        (Some(tokens), Some(client)) => Ok((tokens, client)),
        _ => Err(VaultError::validation(
            "云端镜像未启用，请在 config.toml 的 [drive] 配置中开启",
        )),
    }
}

fn transfer_spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

/// 保存云端授权凭据
pub async fn run_drive_connect(
    app: &CliApp,
    owner: &str,
    access_token: &str,
    refresh_token: &str,
    expires_in: i64,
    folder: Option<&str>,
) -> Result<()> {
    let (tokens, _) = require_drive(app)?;
    tokens
        .connect(owner, access_token, refresh_token, expires_in, folder)
        .await?;

    info!("✅ 云端存储已连接 (owner: {})", owner);
    info!("💡 定时备份镜像需要在配置中设置 mirror_owner = \"{}\"", owner);
    Ok(())
}

/// 删除云端授权凭据
pub async fn run_drive_disconnect(app: &CliApp, owner: &str) -> Result<()> {
    let (tokens, _) = require_drive(app)?;
    tokens.disconnect(owner).await?;

    info!("✅ 云端授权已删除 (owner: {})", owner);
    Ok(())
}

/// 显示云端连接状态
pub async fn run_drive_status(app: &CliApp, owner: &str) -> Result<()> {
    let (tokens, _) = require_drive(app)?;

    info!("☁️  云端连接状态 (owner: {})", owner);
    info!("========================");

    match tokens.status(owner).await? {
        Some(credential) => {
            if credential.connected {
                info!("   状态: ✅ 已连接");
            } else {
                warn!("   状态: ❌ 授权已失效，请重新连接");
            }
            let expired = credential.needs_refresh(Utc::now());
            info!(
                "   访问令牌: {} (到期时间 {})",
                if expired { "已过期（下次使用时自动刷新）" } else { "有效" },
                credential.token_expiry.format("%Y-%m-%d %H:%M:%S")
            );
        }
        None => {
            info!("   状态: 未连接");
            info!("💡 使用 'shopvault drive connect --owner {} ...' 完成连接", owner);
        }
    }

    Ok(())
}

/// 列出云端备份文件
pub async fn run_drive_list(app: &CliApp, owner: &str) -> Result<()> {
    let (_, client) = require_drive(app)?;

    let files = client.list_backups(owner).await?;
    if files.is_empty() {
        info!("☁️  云端暂无备份文件");
        info!("💡 使用 'shopvault drive push <备份ID> --owner {}' 上传备份", owner);
        return Ok(());
    }

    info!("☁️  云端备份文件");
    info!("================");
    info!("{:<35} {:<24} {:<10} {}", "文件ID", "创建时间", "大小", "文件名");
    info!("{}", "-".repeat(100));
    for file in &files {
        info!(
            "{:<35} {:<24} {:<10} {}",
            file.id,
            file.created_time.as_deref().unwrap_or("---"),
            file.size.as_deref().unwrap_or("---"),
            file.name
        );
    }
    info!("{}", "-".repeat(100));
    info!("📊 共 {} 个文件", files.len());

    Ok(())
}

/// 把本地备份上传到云端
pub async fn run_drive_push(app: &CliApp, backup_id: &str, owner: &str) -> Result<()> {
    let (_, client) = require_drive(app)?;

    let record = app.backup_store.get(backup_id).await?;
    let payload = app.backup_store.load_payload(backup_id).await?;
    let size_kb = payload.len() as f64 / 1024.0;

    let spinner = transfer_spinner(format!("上传 {} ({:.1} KB)...", record.file_name, size_kb));
    let result = client.push_backup(owner, &record, payload).await;
    spinner.finish_and_clear();

    let remote_file_id = result?;
    app.backup_store
        .set_remote_id(backup_id, &remote_file_id)
        .await?;

    info!("✅ 备份已上传到云端");
    info!("   本地备份: {}", backup_id);
    info!("   云端文件: {}", remote_file_id);
    Ok(())
}

/// 把云端备份下载到本地文件
pub async fn run_drive_pull(
    app: &CliApp,
    remote_file_id: &str,
    owner: &str,
    output: &Path,
) -> Result<()> {
    let (_, client) = require_drive(app)?;

    let spinner = transfer_spinner(format!("下载云端文件 {remote_file_id}..."));
    let result = client.download_backup(owner, remote_file_id).await;
    spinner.finish_and_clear();

    let payload = result?;
    tokio::fs::write(output, &payload).await?;

    info!("✅ 云端备份已下载");
    info!("   输出文件: {}", output.display());
    info!("   大小: {:.1} KB", payload.len() as f64 / 1024.0);
    info!("💡 使用 'shopvault restore remote {} --owner <owner>' 直接恢复", remote_file_id);
    Ok(())
}
