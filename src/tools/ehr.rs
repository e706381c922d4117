//! 电子病历（EHR）查询工具
//!
//! 模拟 EHR 后端：按 patient_id 返回内置病历记录。真实部署时替换 execute 内的
//! 查询来源即可，Tool 契约不变。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

/// EHR 工具：patient_id -> 病历摘要
pub struct EhrTool {
    records: HashMap<String, String>,
}

impl Default for EhrTool {
    fn default() -> Self {
        let mut records = HashMap::new();
        records.insert(
            "P001".to_string(),
            "Age: 45, History: Hypertension, Medications: Lisinopril".to_string(),
        );
        records.insert(
            "P002".to_string(),
            "Age: 62, History: Type 2 Diabetes, Medications: Metformin".to_string(),
        );
        Self { records }
    }
}

impl EhrTool {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Tool for EhrTool {
    fn name(&self) -> &str {
        "fetch_ehr_data"
    }

    fn description(&self) -> &str {
        "Fetch Electronic Health Records for a patient. Use when the user asks \
         about a specific patient's medical history or records."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "patient_id": { "type": "string", "description": "Patient identifier" }
            },
            "required": ["patient_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let patient_id = args["patient_id"]
            .as_str()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| "fetch_ehr_data requires a patient_id argument".to_string())?;

        tracing::info!(patient_id, "fetching EHR record");
        match self.records.get(patient_id) {
            Some(record) => Ok(format!("EHR Data for {}: {}", patient_id, record)),
            None => Err(format!("No EHR record found for patient {}", patient_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_patient() {
        let tool = EhrTool::new();
        let out = tool
            .execute(serde_json::json!({"patient_id": "P001"}))
            .await
            .unwrap();
        assert!(out.contains("Hypertension"));
    }

    #[tokio::test]
    async fn test_unknown_patient_is_failure() {
        let tool = EhrTool::new();
        let err = tool
            .execute(serde_json::json!({"patient_id": "nobody"}))
            .await
            .unwrap_err();
        assert!(err.contains("No EHR record"));
    }
}
