use crate::app::CliApp;
use tracing::info;
use vault_core::error::Result;

/// 前台运行定时备份调度器，直到收到 Ctrl-C
pub async fn run_scheduler_daemon(app: &CliApp) -> Result<()> {
    app.scheduler.start().await;

    let status = app.scheduler.status().await?;
    info!("✅ 调度器已启动，每 {} 分钟检查一次", status.interval_minutes);
    match status.next_backup_time {
        Some(next) => info!("   下次备份: {}", next.format("%Y-%m-%d %H:%M:%S")),
        None => info!("   下次备份: 下一轮检查时立即执行（还没有完成的备份）"),
    }
    info!("💡 按 Ctrl-C 停止");

    tokio::signal::ctrl_c().await?;

    info!("收到退出信号，停止调度器...");
    app.scheduler.stop().await;
    // 给循环一点时间退出并打印收尾日志
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    info!("✅ 调度器已停止");

    Ok(())
}

/// 显示调度状态
pub async fn run_scheduler_status(app: &CliApp) -> Result<()> {
    let status = app.scheduler.status().await?;

    info!("⏰ 定时备份状态");
    info!("================");
    info!("   当前进程阶段: {}", status.phase.as_str());
    info!("   备份执行中: {}", if status.in_progress { "是" } else { "否" });
    info!("   备份间隔: {} 分钟", status.interval_minutes);

    match status.last_backup_time {
        Some(last) => info!("   上次备份: {}", last.format("%Y-%m-%d %H:%M:%S")),
        None => info!("   上次备份: 无"),
    }
    match (status.next_backup_time, status.minutes_until_next) {
        (Some(next), Some(minutes)) => {
            info!(
                "   下次到期: {} (约 {} 分钟后)",
                next.format("%Y-%m-%d %H:%M:%S"),
                minutes
            );
        }
        _ => info!("   下次到期: 立即（还没有完成的备份）"),
    }

    info!("💡 使用 'shopvault scheduler run' 在前台运行调度器");
    Ok(())
}
