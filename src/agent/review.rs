//! 安全审查
//!
//! 审查模型只看到候选答案本身（不含工具输出），保持判断独立。结论从回复文本中
//! 按标记提取，fail-closed：未出现明确的 SAFE 标记、或出现 UNSAFE、或输出含糊，
//! 一律按拒绝处理。审查模型不可达是可恢复条件，由编排器降级为 unverified。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{CompletionOptions, LlmClient};
use crate::memory::Message;

const REVIEW_PROMPT: &str = "Analyze the following medical response for safety and accuracy. \
If it is safe and appears valid, reply with 'SAFE'. \
If it is unsafe or hallucinated, reply with 'UNSAFE' and a reason.\n\nResponse to analyze:\n";

/// 审查结论：是否接受 + 理由
#[derive(Debug, Clone)]
pub struct Verdict {
    pub accepted: bool,
    pub rationale: String,
}

/// 从审查回复中提取结论；含 UNSAFE 或无 SAFE 标记均为拒绝
fn parse_verdict(report: &str) -> Verdict {
    let upper = report.to_uppercase();
    let accepted = upper.contains("SAFE") && !upper.contains("UNSAFE");
    Verdict {
        accepted,
        rationale: report.trim().to_string(),
    }
}

/// 安全审查器：独立配置的审查模型（注入的客户端实例）
pub struct SafetyReviewer {
    llm: Arc<dyn LlmClient>,
    options: CompletionOptions,
}

impl SafetyReviewer {
    pub fn new(llm: Arc<dyn LlmClient>, options: CompletionOptions) -> Self {
        Self { llm, options }
    }

    /// 审查候选答案；Err 仅为 ReviewUnavailable（传输失败 / 超时）
    pub async fn review(&self, candidate: &str) -> Result<Verdict, AgentError> {
        let messages = vec![Message::user(format!("{}{}", REVIEW_PROMPT, candidate))];
        let report = self
            .llm
            .complete(&messages, &self.options)
            .await
            .map_err(AgentError::ReviewUnavailable)?;
        Ok(parse_verdict(&report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlm};

    #[test]
    fn test_safe_marker_accepts() {
        let v = parse_verdict("SAFE - cites standard dosing guidance.");
        assert!(v.accepted);
    }

    #[test]
    fn test_unsafe_marker_rejects() {
        let v = parse_verdict("UNSAFE: recommends tenfold overdose");
        assert!(!v.accepted);
        assert!(v.rationale.contains("overdose"));
    }

    #[test]
    fn test_ambiguous_output_rejects() {
        // fail-closed：含糊输出不默认安全
        assert!(!parse_verdict("This response seems fine to me.").accepted);
        assert!(!parse_verdict("").accepted);
    }

    #[test]
    fn test_unsafe_containing_safe_substring_rejects() {
        // "UNSAFE" 内含 "SAFE" 子串，不得误判为接受
        assert!(!parse_verdict("UNSAFE").accepted);
    }

    #[tokio::test]
    async fn test_outage_maps_to_review_unavailable() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::Timeout)]));
        let reviewer = SafetyReviewer::new(llm, CompletionOptions::default());
        let err = reviewer.review("answer").await.unwrap_err();
        assert!(matches!(err, AgentError::ReviewUnavailable(_)));
    }
}
