/// ShopVault CLI 项目信息模块
///
/// shopvault 是面向用户的主程序，项目元数据统一在这里定义；
/// vault-core 作为内部库，只提供技术性常量。

/// 项目元数据（自动从 Cargo.toml 同步）
pub mod metadata {
    /// 项目名称
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    /// 项目描述
    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    /// 项目作者
    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称（手动维护，用于 UI 显示）
    pub mod display {
        /// 用户友好的项目名称
        pub const FRIENDLY_NAME: &str = "ShopVault";

        /// 项目详细描述
        pub const DESCRIPTION_LONG: &str = "店铺业务数据的备份与恢复编排工具，支持定时快照导出、按 owner 范围的确定性恢复，以及到 Drive 类云端存储的备份镜像";
    }
}

/// 版本信息
pub mod version_info {
    /// CLI 版本（自动从 Cargo.toml 同步）
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");
}
