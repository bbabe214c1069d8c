use crate::project_info::{metadata, version_info};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 备份管理相关命令
#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// 立即创建一份备份（跳过间隔检查）
    Create,
    /// 列出本地备份
    List {
        /// 显示条数上限
        #[arg(long, default_value = "20", help = "显示条数上限")]
        limit: usize,
    },
    /// 删除备份（记录和负载文件一起删除）
    Delete {
        /// 备份 ID
        backup_id: String,
        /// 跳过确认
        #[arg(long)]
        force: bool,
    },
    /// 校验备份负载可以被完整解码
    Verify {
        /// 备份 ID
        backup_id: String,
    },
}

/// 恢复相关命令
#[derive(Subcommand, Debug)]
pub enum RestoreCommand {
    /// 从本地备份恢复
    Local {
        /// 备份 ID
        backup_id: String,
        /// 恢复哪个 owner 的数据
        #[arg(long)]
        owner: String,
        /// 跳过确认
        #[arg(long)]
        force: bool,
    },
    /// 从云端备份文件恢复
    Remote {
        /// 云端文件 ID
        remote_file_id: String,
        /// 恢复哪个 owner 的数据
        #[arg(long)]
        owner: String,
        /// 跳过确认
        #[arg(long)]
        force: bool,
    },
}

/// 定时备份调度相关命令
#[derive(Subcommand, Debug)]
pub enum SchedulerCommand {
    /// 前台运行定时备份调度器（Ctrl-C 退出）
    Run,
    /// 显示调度状态
    Status,
}

/// 云端镜像相关命令
#[derive(Subcommand, Debug)]
pub enum DriveCommand {
    /// 保存云端授权凭据
    Connect {
        /// owner 身份
        #[arg(long)]
        owner: String,
        /// OAuth 访问令牌
        #[arg(long)]
        access_token: String,
        /// OAuth 刷新令牌
        #[arg(long)]
        refresh_token: String,
        /// 访问令牌有效期（秒）
        #[arg(long, default_value = "3600")]
        expires_in: i64,
        /// 备份镜像落入的云端目录ID（缺省传到根目录）
        #[arg(long)]
        folder: Option<String>,
    },
    /// 删除云端授权凭据
    Disconnect {
        /// owner 身份
        #[arg(long)]
        owner: String,
    },
    /// 显示云端连接状态
    Status {
        /// owner 身份
        #[arg(long)]
        owner: String,
    },
    /// 列出云端备份文件
    List {
        /// owner 身份
        #[arg(long)]
        owner: String,
    },
    /// 把本地备份上传到云端
    Push {
        /// 备份 ID
        backup_id: String,
        /// owner 身份
        #[arg(long)]
        owner: String,
    },
    /// 把云端备份下载到本地文件
    Pull {
        /// 云端文件 ID
        remote_file_id: String,
        /// owner 身份
        #[arg(long)]
        owner: String,
        /// 输出文件路径
        #[arg(long)]
        output: PathBuf,
    },
}

/// 文档数据相关命令
#[derive(Subcommand, Debug)]
pub enum DocsCommand {
    /// 从 JSON 文件导入文档到指定集合
    Import {
        /// 目标集合名
        collection: String,
        /// JSON 文件路径（文档数组）
        file: PathBuf,
        /// 文档归属的 owner（文件内 owner 字段优先）
        #[arg(long)]
        owner: Option<String>,
    },
    /// 统计集合内的文档数量
    Count {
        /// 集合名
        collection: String,
        /// 只统计指定 owner 的文档
        #[arg(long)]
        owner: Option<String>,
    },
}

/// ShopVault CLI - 备份与恢复编排工具
#[derive(Parser)]
#[command(name = "shopvault")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 显示备份系统整体状态
    Status,
    /// 首次使用时初始化，创建配置文件和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 备份管理
    #[command(subcommand)]
    Backup(BackupCommand),
    /// 从备份恢复数据
    #[command(subcommand)]
    Restore(RestoreCommand),
    /// 定时备份调度
    #[command(subcommand)]
    Scheduler(SchedulerCommand),
    /// 云端镜像管理
    #[command(subcommand)]
    Drive(DriveCommand),
    /// 文档数据管理
    #[command(subcommand)]
    Docs(DocsCommand),
}
