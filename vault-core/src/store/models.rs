use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 文档行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRow {
    pub doc_id: String,
    pub owner: String,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

/// 备份记录行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRow {
    pub id: String,
    pub file_name: String,
    pub status: String,
    pub total_documents: i64,
    pub collections: String,
    pub checksum: Option<String>,
    pub remote_file_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 云端授权凭据行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveCredentialRow {
    pub owner: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
    pub folder_id: Option<String>,
    pub connected: bool,
    pub updated_at: DateTime<Utc>,
}
