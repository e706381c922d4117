//! 本地临床指南知识库工具
//!
//! 从 TOML 文件加载「主题 -> 指南文本」映射，按主题子串匹配返回；文件缺失时退回
//! 一组内置条目，保证离线环境可运行。

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

/// 知识库文件结构：[guidelines] topic = "text"
#[derive(Debug, Deserialize, Default)]
struct KnowledgeFile {
    #[serde(default)]
    guidelines: BTreeMap<String, String>,
}

/// 临床指南工具：本地知识库查询
pub struct ClinicalGuidelineTool {
    guidelines: BTreeMap<String, String>,
}

fn builtin_guidelines() -> BTreeMap<String, String> {
    let mut g = BTreeMap::new();
    g.insert(
        "hypertension".to_string(),
        "First-line treatment is lifestyle modification plus a thiazide diuretic, \
         ACE inhibitor, ARB or calcium channel blocker."
            .to_string(),
    );
    g.insert(
        "asthma".to_string(),
        "Preferred controller therapy is low-dose inhaled corticosteroid; \
         reliever as needed."
            .to_string(),
    );
    g
}

impl ClinicalGuidelineTool {
    /// 从文件加载；path 为 None 或文件不存在 / 解析失败时使用内置条目
    pub fn from_file(path: Option<&Path>) -> Self {
        let guidelines = path
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|text| match toml::from_str::<KnowledgeFile>(&text) {
                Ok(file) if !file.guidelines.is_empty() => Some(file.guidelines),
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("knowledge file parse failed ({}), using builtin entries", e);
                    None
                }
            })
            .unwrap_or_else(builtin_guidelines);
        Self { guidelines }
    }
}

#[async_trait]
impl Tool for ClinicalGuidelineTool {
    fn name(&self) -> &str {
        "rag_clinical_data"
    }

    fn description(&self) -> &str {
        "Retrieve clinical guidelines or protocols from the local knowledge base. \
         Use when the user asks about guidelines likely present locally."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Guideline topic to look up" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| "rag_clinical_data requires a query argument".to_string())?;

        let needle = query.to_lowercase();
        tracing::info!(query, "querying clinical knowledge base");
        let hit = self
            .guidelines
            .iter()
            .find(|(topic, _)| needle.contains(topic.as_str()) || topic.contains(&needle));
        match hit {
            Some((topic, text)) => Ok(format!("Clinical Guidelines for {}: {}", topic, text)),
            None => Err(format!("No local guideline found for: {}", query)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_builtin_lookup() {
        let tool = ClinicalGuidelineTool::from_file(None);
        let out = tool
            .execute(serde_json::json!({"query": "management of hypertension"}))
            .await
            .unwrap();
        assert!(out.contains("thiazide"));
    }

    #[tokio::test]
    async fn test_miss_is_failure() {
        let tool = ClinicalGuidelineTool::from_file(None);
        let err = tool
            .execute(serde_json::json!({"query": "podiatry"}))
            .await
            .unwrap_err();
        assert!(err.contains("No local guideline"));
    }

    #[tokio::test]
    async fn test_file_backed_lookup() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[guidelines]\nsepsis = \"Start broad-spectrum antibiotics within one hour.\"").unwrap();

        let tool = ClinicalGuidelineTool::from_file(Some(f.path()));
        let out = tool
            .execute(serde_json::json!({"query": "sepsis bundle"}))
            .await
            .unwrap();
        assert!(out.contains("one hour"));
    }
}
