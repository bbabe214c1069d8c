use crate::{
    VaultError,
    config::DriveConfig,
    constants::drive,
    database::{Database, DriveCredential},
    error::Result,
};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// OAuth token 端点的刷新响应
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// 访问令牌管理器
///
/// 凭据持久化在数据库中，按 owner 隔离。令牌过期时自动向授权服务器
/// 刷新，同一 owner 的并发刷新通过 per-owner 锁收敛为一次请求。
#[derive(Debug, Clone)]
pub struct TokenManager {
    database: Database,
    http: Client,
    client_id: String,
    client_secret: String,
    token_endpoint: String,
    refresh_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TokenManager {
    /// 创建新的令牌管理器
    pub fn new(database: Database, config: &DriveConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(drive::http::CONNECT_TIMEOUT))
            .timeout(std::time::Duration::from_secs(drive::http::REQUEST_TIMEOUT))
            .user_agent(drive::http::USER_AGENT)
            .build()?;

        let token_endpoint = config
            .token_endpoint
            .clone()
            .unwrap_or_else(|| drive::TOKEN_ENDPOINT.to_string());

        Ok(Self {
            database,
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token_endpoint,
            refresh_locks: Arc::new(DashMap::new()),
        })
    }

    /// 保存一组新的授权凭据（用户完成授权流程后调用）
    ///
    /// folder_id 指定镜像上传落入的云端目录，None 表示传到根目录。
    pub async fn connect(
        &self,
        owner: &str,
        access_token: &str,
        refresh_token: &str,
        expires_in_seconds: i64,
        folder_id: Option<&str>,
    ) -> Result<()> {
        if owner.is_empty() {
            return Err(VaultError::validation("owner 不能为空"));
        }
        if access_token.is_empty() || refresh_token.is_empty() {
            return Err(VaultError::validation("访问令牌和刷新令牌不能为空"));
        }

        let credential = DriveCredential {
            owner: owner.to_string(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_expiry: Utc::now() + Duration::seconds(expires_in_seconds),
            folder_id: folder_id.map(str::to_string),
            connected: true,
        };
        self.database.upsert_drive_credential(&credential).await?;
        info!(owner, "云端授权凭据已保存");
        Ok(())
    }

    /// 删除指定 owner 的授权凭据
    pub async fn disconnect(&self, owner: &str) -> Result<()> {
        self.database.delete_drive_credential(owner).await?;
        info!(owner, "云端授权凭据已删除");
        Ok(())
    }

    /// 获取凭据连接状态（不触发刷新）
    pub async fn status(&self, owner: &str) -> Result<Option<DriveCredential>> {
        self.database.get_drive_credential(owner).await
    }

    /// 获取一个可用的访问令牌凭据，过期时自动刷新
    pub async fn valid_credential(&self, owner: &str) -> Result<DriveCredential> {
        let credential = self.require_credential(owner).await?;
        if !credential.needs_refresh(Utc::now()) {
            return Ok(credential);
        }
        self.refresh_locked(owner, None).await
    }

    /// 强制刷新访问令牌（云端对 stale_token 返回 401 后调用）
    ///
    /// 拿到锁后如果发现令牌已经不是 stale_token，说明别的任务
    /// 刚刷新过，直接复用，不再请求授权服务器。
    pub async fn force_refresh(&self, owner: &str, stale_token: &str) -> Result<DriveCredential> {
        self.refresh_locked(owner, Some(stale_token)).await
    }

    /// 读取凭据，不存在或已断开均视为未授权
    async fn require_credential(&self, owner: &str) -> Result<DriveCredential> {
        let credential = self
            .database
            .get_drive_credential(owner)
            .await?
            .ok_or_else(|| {
                VaultError::unauthorized(format!("owner {owner} 尚未连接云端存储"))
            })?;

        if !credential.connected {
            return Err(VaultError::unauthorized(format!(
                "owner {owner} 的云端授权已失效，请重新连接"
            )));
        }

        Ok(credential)
    }

    /// 在 per-owner 锁内执行刷新，保证同一 owner 同时只有一次刷新请求
    async fn refresh_locked(
        &self,
        owner: &str,
        stale_token: Option<&str>,
    ) -> Result<DriveCredential> {
        let lock = self
            .refresh_locks
            .entry(owner.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // 拿到锁后重新读取：排队期间可能已经有别的任务刷新过了
        let credential = self.require_credential(owner).await?;
        let already_fresh = match stale_token {
            Some(stale) => credential.access_token != stale,
            None => !credential.needs_refresh(Utc::now()),
        };
        if already_fresh {
            return Ok(credential);
        }

        self.refresh_with_provider(credential).await
    }

    /// 向授权服务器换取新的访问令牌，成功后先落库再返回
    ///
    /// 刷新失败一律视为未授权：授权服务器明确拒绝时把凭据标记为
    /// 已断开，网络层面的失败只影响本次调用，凭据保留，下次再试。
    async fn refresh_with_provider(&self, credential: DriveCredential) -> Result<DriveCredential> {
        info!(owner = %credential.owner, "访问令牌已过期，向授权服务器请求刷新");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", credential.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| VaultError::unauthorized(format!("无法连接授权服务器刷新令牌: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let token: TokenResponse = response.json().await?;
            let refreshed = DriveCredential {
                owner: credential.owner.clone(),
                access_token: token.access_token,
                refresh_token: token
                    .refresh_token
                    .unwrap_or_else(|| credential.refresh_token.clone()),
                token_expiry: Utc::now() + Duration::seconds(token.expires_in),
                folder_id: credential.folder_id.clone(),
                connected: true,
            };

            // 新令牌必须先持久化，调用方才能开始使用
            self.database.upsert_drive_credential(&refreshed).await?;
            info!(owner = %refreshed.owner, "访问令牌刷新成功");
            Ok(refreshed)
        } else if status.is_client_error() {
            // 授权服务器明确拒绝（refresh_token 被吊销等），凭据作废
            let text = response.text().await.unwrap_or_default();
            warn!(
                owner = %credential.owner,
                "授权服务器拒绝刷新请求: {} - {}", status, text
            );
            self.database
                .mark_credential_disconnected(&credential.owner)
                .await?;
            Err(VaultError::unauthorized(
                "云端授权已失效，请重新连接云端存储",
            ))
        } else {
            Err(VaultError::unauthorized(format!(
                "授权服务器刷新令牌失败: {status}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// token 端点指向本机的关闭端口，任何刷新请求都会立刻失败
    fn unreachable_config() -> DriveConfig {
        DriveConfig {
            enabled: true,
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            mirror_owner: String::new(),
            token_endpoint: Some("http://127.0.0.1:19999/token".to_string()),
            api_base: None,
        }
    }

    async fn manager() -> TokenManager {
        let database = Database::connect_memory().await.unwrap();
        TokenManager::new(database, &unreachable_config()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential_is_unauthorized() {
        let tokens = manager().await;
        let err = tokens.valid_credential("nobody").await.unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_disconnected_credential_is_unauthorized() {
        let tokens = manager().await;
        tokens.connect("alice", "at", "rt", 3600, None).await.unwrap();
        tokens.database.mark_credential_disconnected("alice").await.unwrap();

        let err = tokens.valid_credential("alice").await.unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_fresh_token_skips_provider() {
        let tokens = manager().await;
        tokens.connect("alice", "at", "rt", 3600, None).await.unwrap();

        // 端点不可达，能拿到凭据说明没有发起网络请求
        let credential = tokens.valid_credential("alice").await.unwrap();
        assert_eq!(credential.access_token, "at");
    }

    #[tokio::test]
    async fn test_refresh_failure_is_unauthorized_and_keeps_credential() {
        let tokens = manager().await;
        tokens.connect("alice", "at", "rt", -10, None).await.unwrap();

        // 刷新失败必须报未授权，而不是暂时性错误
        let err = tokens.valid_credential("alice").await.unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized(_)));

        // 网络失败不作废存储的凭据，网络恢复后可以再试
        let stored = tokens.status("alice").await.unwrap().unwrap();
        assert!(stored.connected);
    }

    #[tokio::test]
    async fn test_force_refresh_reuses_concurrent_result() {
        let tokens = manager().await;
        tokens.connect("alice", "new-token", "rt", 3600, None).await.unwrap();

        // 库里令牌已经换过，带着旧令牌来刷新应直接复用，不碰网络
        let credential = tokens.force_refresh("alice", "old-token").await.unwrap();
        assert_eq!(credential.access_token, "new-token");
    }

    #[tokio::test]
    async fn test_connect_persists_folder_id() {
        let tokens = manager().await;
        tokens
            .connect("alice", "at", "rt", 3600, Some("folder-1"))
            .await
            .unwrap();

        let stored = tokens.status("alice").await.unwrap().unwrap();
        assert_eq!(stored.folder_id.as_deref(), Some("folder-1"));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_fields() {
        let tokens = manager().await;
        let err = tokens.connect("", "at", "rt", 3600, None).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));

        let err = tokens.connect("alice", "", "rt", 3600, None).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
    }
}
