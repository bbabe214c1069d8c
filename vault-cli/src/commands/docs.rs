use crate::app::CliApp;
use std::path::Path;
use tracing::{info, warn};
use vault_core::{VaultError, constants::store, database::Document, error::Result};

/// 从 JSON 文件导入文档到指定集合
///
/// 文件内容是文档对象数组，每个对象需要 `id` 字段；`owner` 字段
/// 缺失时依次使用 --owner 参数和无归属保留作用域。
pub async fn run_docs_import(
    app: &CliApp,
    collection: &str,
    file: &Path,
    owner: Option<&str>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file).await?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&content)?;

    if values.is_empty() {
        warn!("⚠️  文件中没有文档: {}", file.display());
        return Ok(());
    }

    let mut documents = Vec::with_capacity(values.len());
    for value in values {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VaultError::validation("文档缺少字符串类型的 id 字段"))?
            .to_string();
        let doc_owner = value
            .get("owner")
            .and_then(|v| v.as_str())
            .or(owner)
            .unwrap_or(store::UNOWNED_SCOPE)
            .to_string();

        documents.push(Document {
            id,
            owner: doc_owner,
            body: value,
        });
    }

    let written = app.database.upsert_documents(collection, &documents).await?;
    info!("✅ 导入完成: {} 条文档写入集合 {}", written, collection);

    if !store::BACKUP_COLLECTIONS.contains(&collection) {
        warn!(
            "⚠️  集合 {} 不在备份清单内，定时备份不会包含它 (备份清单: {})",
            collection,
            store::BACKUP_COLLECTIONS.join(", ")
        );
    }

    Ok(())
}

/// 统计集合内的文档数量
pub async fn run_docs_count(app: &CliApp, collection: &str, owner: Option<&str>) -> Result<()> {
    let count = app.database.count_documents(collection, owner).await?;

    match owner {
        Some(owner) => info!("📄 集合 {} 中 owner {} 的文档: {} 条", collection, owner, count),
        None => info!("📄 集合 {} 的文档: {} 条", collection, count),
    }
    Ok(())
}
