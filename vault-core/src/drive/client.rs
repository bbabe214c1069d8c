use crate::{
    VaultError,
    config::DriveConfig,
    constants::drive,
    database::BackupRecord,
    drive::credentials::TokenManager,
    error::Result,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::Deserialize;
use tracing::{info, warn};

/// 云端备份文件元信息
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct UploadedFile {
    id: String,
}

/// Drive 类云端存储客户端
///
/// 所有请求都带 Bearer 访问令牌。云端返回 401 时刷新一次令牌并
/// 重试一次，重试仍失败则把错误原样交给调用方，不做第二次刷新。
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: Client,
    tokens: TokenManager,
    files_endpoint: String,
    upload_endpoint: String,
}

impl DriveClient {
    /// 创建新的云端客户端
    pub fn new(tokens: TokenManager, config: &DriveConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(drive::http::CONNECT_TIMEOUT))
            .timeout(std::time::Duration::from_secs(drive::http::REQUEST_TIMEOUT))
            .user_agent(drive::http::USER_AGENT)
            .build()?;

        let (files_endpoint, upload_endpoint) = match &config.api_base {
            Some(base) => {
                // 基地址必须是合法 URL，尽早报配置错误
                let base = url::Url::parse(base)?;
                let base = base.as_str().trim_end_matches('/').to_string();
                (format!("{base}/files"), format!("{base}/upload/files"))
            }
            None => (
                drive::FILES_ENDPOINT.to_string(),
                drive::UPLOAD_ENDPOINT.to_string(),
            ),
        };

        Ok(Self {
            http,
            tokens,
            files_endpoint,
            upload_endpoint,
        })
    }

    /// 上传备份负载，返回云端文件ID
    ///
    /// 凭据里带 folder_id 时文件落入该目录，否则传到根目录。
    pub async fn push_backup(
        &self,
        owner: &str,
        record: &BackupRecord,
        payload: Vec<u8>,
    ) -> Result<String> {
        let folder_id = self
            .tokens
            .status(owner)
            .await?
            .and_then(|credential| credential.folder_id);

        let boundary = format!("vault_{}", uuid::Uuid::new_v4().simple());
        let metadata = upload_metadata(record, folder_id.as_deref());
        let body = build_multipart_body(&metadata.to_string(), &payload, &boundary);
        let url = format!("{}?uploadType=multipart&fields=id", self.upload_endpoint);

        info!(
            owner,
            backup_id = %record.id,
            size = body.len(),
            "开始上传备份到云端"
        );

        let response = self
            .send_with_refresh(owner, |token| {
                self.http
                    .post(&url)
                    .bearer_auth(token)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/related; boundary={boundary}"),
                    )
                    .body(body.clone())
            })
            .await?;

        let uploaded: UploadedFile = response.json().await?;
        info!(owner, remote_file_id = %uploaded.id, "备份上传成功");
        Ok(uploaded.id)
    }

    /// 列出云端所有本应用的备份文件（按创建时间倒序）
    pub async fn list_backups(&self, owner: &str) -> Result<Vec<RemoteFile>> {
        let query = format!(
            "appProperties has {{ key='{}' and value='{}' }} and trashed=false",
            drive::APP_MARKER_KEY,
            drive::APP_MARKER_VALUE,
        );

        let response = self
            .send_with_refresh(owner, |token| {
                self.http
                    .get(&self.files_endpoint)
                    .bearer_auth(token)
                    .query(&[
                        ("q", query.as_str()),
                        ("orderBy", "createdTime desc"),
                        ("fields", "files(id,name,size,createdTime)"),
                    ])
            })
            .await?;

        let list: FileList = response.json().await?;
        Ok(list.files)
    }

    /// 按备份ID查找对应的云端文件
    pub async fn find_backup(&self, owner: &str, backup_id: &str) -> Result<Option<RemoteFile>> {
        let query = format!(
            "appProperties has {{ key='backupId' and value='{backup_id}' }} and trashed=false"
        );

        let response = self
            .send_with_refresh(owner, |token| {
                self.http
                    .get(&self.files_endpoint)
                    .bearer_auth(token)
                    .query(&[("q", query.as_str()), ("fields", "files(id,name,size,createdTime)")])
            })
            .await?;

        let list: FileList = response.json().await?;
        Ok(list.files.into_iter().next())
    }

    /// 下载云端备份负载
    pub async fn download_backup(&self, owner: &str, remote_file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{remote_file_id}", self.files_endpoint);

        let response = self
            .send_with_refresh(owner, |token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("alt", "media")])
            })
            .await?;

        Ok(response.bytes().await?.to_vec())
    }

    /// 获取云端文件的浏览器下载链接
    pub async fn get_download_url(
        &self,
        owner: &str,
        remote_file_id: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/{remote_file_id}", self.files_endpoint);

        let response = self
            .send_with_refresh(owner, |token| {
                self.http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("fields", "webContentLink")])
            })
            .await?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct FileLink {
            #[serde(default)]
            web_content_link: Option<String>,
        }
        let link: FileLink = response.json().await?;
        Ok(link.web_content_link)
    }

    /// 删除云端备份文件（文件已不存在时视为成功）
    pub async fn delete_backup(&self, owner: &str, remote_file_id: &str) -> Result<()> {
        let url = format!("{}/{remote_file_id}", self.files_endpoint);

        let result = self
            .send_with_refresh(owner, |token| self.http.delete(&url).bearer_auth(token))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(VaultError::NotFound(_)) => {
                warn!(owner, remote_file_id, "云端文件已不存在，跳过删除");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 发送请求并处理 401：刷新一次令牌后用新令牌重建请求再发一次
    async fn send_with_refresh<F>(&self, owner: &str, build: F) -> Result<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let credential = self.tokens.valid_credential(owner).await?;
        let response = build(&credential.access_token)
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        warn!(owner, "云端请求返回 401，刷新访问令牌后重试");
        let refreshed = self
            .tokens
            .force_refresh(owner, &credential.access_token)
            .await?;
        let retry = build(&refreshed.access_token)
            .send()
            .await
            .map_err(map_send_error)?;
        check_status(retry).await
    }
}

/// 网络层面的失败归为暂时性错误，其余保留原始错误
fn map_send_error(e: reqwest::Error) -> VaultError {
    if e.is_connect() || e.is_timeout() {
        VaultError::transient(format!("无法连接云端存储: {e}"))
    } else {
        VaultError::Http(e)
    }
}

/// 把云端响应状态映射到统一的错误分类
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(VaultError::unauthorized(
            format!("云端拒绝访问: {status}"),
        )),
        StatusCode::NOT_FOUND => Err(VaultError::not_found("云端文件不存在")),
        StatusCode::TOO_MANY_REQUESTS => {
            Err(VaultError::transient("云端限流，请稍后重试"))
        }
        _ if status.is_server_error() => Err(VaultError::transient(format!(
            "云端服务暂时不可用: {status} - {text}"
        ))),
        _ => Err(VaultError::custom(format!(
            "云端请求失败: {status} - {text}"
        ))),
    }
}

/// 构造上传元数据：文件名、MIME、识别本应用文件的 appProperties 标记
fn upload_metadata(record: &BackupRecord, folder_id: Option<&str>) -> serde_json::Value {
    let mut metadata = serde_json::json!({
        "name": record.file_name,
        "mimeType": drive::PAYLOAD_MIME,
        "appProperties": {
            drive::APP_MARKER_KEY: drive::APP_MARKER_VALUE,
            "backupId": record.id,
        },
    });
    if let Some(folder) = folder_id {
        metadata["parents"] = serde_json::json!([folder]);
    }
    metadata
}

/// 构造 multipart/related 上传体：元数据 JSON 一段，负载一段
fn build_multipart_body(metadata: &str, payload: &[u8], boundary: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + metadata.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", drive::PAYLOAD_MIME).as_bytes());
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{BackupStatus, Database};
    use chrono::Utc;

    /// API 基地址指向本机的关闭端口，任何请求都会立刻失败
    fn unreachable_config() -> DriveConfig {
        DriveConfig {
            enabled: true,
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            mirror_owner: String::new(),
            token_endpoint: Some("http://127.0.0.1:19999/token".to_string()),
            api_base: Some("http://127.0.0.1:19998".to_string()),
        }
    }

    async fn client_with_tokens() -> (DriveClient, TokenManager) {
        let database = Database::connect_memory().await.unwrap();
        let config = unreachable_config();
        let tokens = TokenManager::new(database, &config).unwrap();
        let client = DriveClient::new(tokens.clone(), &config).unwrap();
        (client, tokens)
    }

    fn sample_record() -> BackupRecord {
        BackupRecord {
            id: "bk-1".to_string(),
            file_name: "snapshot_test.json.gz".to_string(),
            status: BackupStatus::Completed,
            total_documents: 1,
            collections: vec!["invoices".to_string()],
            checksum: Some("abc".to_string()),
            remote_file_id: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_upload_metadata_carries_folder_and_marker() {
        let record = sample_record();

        let metadata = upload_metadata(&record, None);
        assert_eq!(metadata["name"], "snapshot_test.json.gz");
        assert_eq!(metadata["appProperties"]["backupId"], "bk-1");
        assert!(metadata.get("parents").is_none());

        // 凭据带目录时上传落入该目录
        let metadata = upload_metadata(&record, Some("folder-1"));
        assert_eq!(metadata["parents"], serde_json::json!(["folder-1"]));
    }

    #[test]
    fn test_multipart_body_layout() {
        let body = build_multipart_body(r#"{"name":"x"}"#, b"PAYLOAD", "bbb");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--bbb\r\n"));
        assert!(text.contains(r#"{"name":"x"}"#));
        assert!(text.contains("Content-Type: application/gzip"));
        assert!(text.contains("PAYLOAD"));
        assert!(text.ends_with("--bbb--\r\n"));
    }

    #[tokio::test]
    async fn test_push_without_credential_is_unauthorized() {
        let (client, _tokens) = client_with_tokens().await;

        let err = client
            .push_backup("nobody", &sample_record(), vec![1, 2, 3])
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_transient() {
        let (client, tokens) = client_with_tokens().await;
        tokens.connect("alice", "at", "rt", 3600, None).await.unwrap();

        let err = client.list_backups("alice").await.unwrap_err();
        assert!(matches!(err, VaultError::TransientProvider(_)));
    }
}
