//! 云端镜像模块
//!
//! 负责把本地备份镜像到 Drive 类云端存储：
//! - `credentials` 管理 OAuth 授权凭据和访问令牌刷新
//! - `client` 封装云端文件的上传、下载、列表和删除

mod client;
mod credentials;

pub use client::{DriveClient, RemoteFile};
pub use credentials::TokenManager;
