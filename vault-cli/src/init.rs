use tracing::{info, warn};
use vault_core::{config::AppConfig, constants, database::Database, error::Result};

/// 运行独立的初始化流程
pub async fn run_init(force: bool) -> Result<()> {
    info!("🏪 ShopVault 初始化");
    info!("======================");

    // 检查是否已经初始化过
    if !force
        && (constants::config::get_config_file_path().exists()
            || constants::store::get_database_path().exists())
    {
        warn!("⚠️  检测到已存在的配置文件或数据库文件");
        info!("如果您要重新初始化，请使用 --force 参数");
        info!("示例: shopvault init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件和目录结构");

    // 创建默认配置
    let config = AppConfig::default();
    config.save_to_file("config.toml")?;
    info!("   ✅ 创建配置文件: config.toml");

    // 创建备份存储目录
    std::fs::create_dir_all(&config.backup.storage_dir)?;
    info!("   ✅ 创建目录结构:");
    info!("      - {}    (备份存储目录)", config.backup.storage_dir);

    info!("📋 步骤 2: 初始化数据库");

    // 初始化数据库，建表在连接时完成
    let db_path = config.get_database_path();
    let _database = Database::connect(&db_path).await?;
    info!("   ✅ 创建DuckDB数据库: {}", db_path.display());

    info!("🎉 初始化完成！");
    info!("");
    info!("📝 接下来的步骤:");
    info!("   1️⃣  运行 'shopvault docs import <集合> <文件>' 导入业务文档");
    info!("   2️⃣  运行 'shopvault backup create' 创建第一份备份");
    info!("   3️⃣  运行 'shopvault scheduler run' 启动定时备份");
    info!("");
    info!("💡 提示:");
    info!("   - 配置文件: config.toml (可手动编辑修改配置)");
    info!(
        "   - 数据库文件: {} (存储业务文档和备份记录)",
        db_path.display()
    );
    info!("   - 云端镜像需要在配置中启用并运行 'shopvault drive connect'");
    info!("   - 使用 'shopvault --help' 查看所有可用命令");
    info!("   - 使用 'shopvault status' 查看当前系统状态");

    Ok(())
}
