// 从 JSON 文件加载翻译单元
use crate::domain::error::TmError;
use crate::domain::model::Document;
use std::path::Path;

/// Load a document stored as a JSON array of `{source, target, context}` units.
pub async fn load_document(path: &Path) -> Result<Document, TmError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_document(&content)
}

pub fn parse_document(content: &str) -> Result<Document, TmError> {
    Ok(serde_json::from_str::<Document>(content)?)
}
