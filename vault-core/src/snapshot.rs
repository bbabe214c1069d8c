use crate::database::Document;
use crate::error::{Result, VaultError};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// 当前快照格式版本，不兼容的旧版本解码时直接报错
pub const SNAPSHOT_VERSION: u32 = 1;

/// 一次导出的点时快照
///
/// collections 使用 BTreeMap 保证序列化后的键顺序稳定，
/// 同一份快照两次编码得到完全相同的字节序列。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub collections: BTreeMap<String, Vec<Document>>,
}

impl Snapshot {
    pub fn new(exported_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            exported_at,
            collections: BTreeMap::new(),
        }
    }

    /// 全部集合的文档总数
    pub fn total_documents(&self) -> i64 {
        self.collections.values().map(|docs| docs.len() as i64).sum()
    }

    /// 集合名列表（导出顺序）
    pub fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }
}

/// 将快照编码为 gzip 压缩的 JSON 负载
pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(snapshot)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let payload = encoder.finish()?;

    Ok(payload)
}

/// 解码备份负载
///
/// 任何失败（gzip 损坏、JSON 非法、版本不兼容）都返回
/// [`VaultError::CorruptPayload`]，绝不产生半解码的结果。
pub fn decode(payload: &[u8]) -> Result<Snapshot> {
    let mut decoder = GzDecoder::new(payload);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| VaultError::corrupt(format!("gzip 解压失败: {e}")))?;

    let value: serde_json::Value = serde_json::from_slice(&json)
        .map_err(|e| VaultError::corrupt(format!("JSON 解析失败: {e}")))?;

    // 先校验版本再反序列化，避免对不兼容的结构做部分解析
    let version = value
        .get("version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| VaultError::corrupt("快照缺少版本号"))?;
    if version != u64::from(SNAPSHOT_VERSION) {
        return Err(VaultError::corrupt(format!(
            "不兼容的快照版本: {version}，当前支持版本 {SNAPSHOT_VERSION}"
        )));
    }

    let snapshot: Snapshot = serde_json::from_value(value)
        .map_err(|e| VaultError::corrupt(format!("快照结构不合法: {e}")))?;

    Ok(snapshot)
}
