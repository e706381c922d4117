//! 回合状态定义
//!
//! TurnState 是单次请求-响应周期内穿过各节点的可变记录；每个节点的输出以带标签的
//! 枚举表达，状态转移在编排器中逐一匹配，不依赖松散的共享字典。

use serde::{Deserialize, Serialize};

/// 状态机阶段：BUILD_PROMPT -> GENERATE -> REVIEW -> {ACCEPT, RETRY, GIVE_UP}
///
/// Accept 与 GiveUp 是仅有的终态；Retry 携带审查理由回到 BuildPrompt。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    BuildPrompt,
    Generate,
    Review,
    Accept,
    Retry,
    GiveUp,
}

/// 回合终态的对外状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// 审查通过
    Success,
    /// 重试预算耗尽或审查不可用，答案未经验证
    Unverified,
}

/// 工具结果：成功载荷或失败原因，不存在部分有效
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolOutcome {
    Success(String),
    Failure(String),
}

/// 一次工具调用的记录（回合内按工具名唯一、只追加）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolRecord {
    pub tool: String,
    pub outcome: ToolOutcome,
}

/// 单回合可变状态，终态产生后即丢弃
#[derive(Clone, Debug)]
pub struct TurnState {
    /// 用户问题
    pub query: String,
    /// 本回合已调用的工具及结果（只追加，工具名唯一）
    pub tool_records: Vec<ToolRecord>,
    /// 最近一次生成的候选答案
    pub candidate: Option<String>,
    /// 审查结论与理由
    pub verdict: Option<bool>,
    pub rationale: Option<String>,
    /// 安全重试计数，从 0 开始，不超过配置上限
    pub retries: u32,
    /// 本回合已消耗的工具往返次数
    pub tool_rounds: u32,
    /// 上一次审查拒绝的理由，作为纠正性上下文进入下一次提示
    pub feedback: Option<String>,
    pub phase: TurnPhase,
}

impl TurnState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            tool_records: Vec::new(),
            candidate: None,
            verdict: None,
            rationale: None,
            retries: 0,
            tool_rounds: 0,
            feedback: None,
            phase: TurnPhase::BuildPrompt,
        }
    }

    /// 追加一条工具记录；同名工具已存在时不覆盖（回合内同一缓存键不重复调用）
    pub fn record_tool(&mut self, tool: &str, outcome: ToolOutcome) {
        if self.lookup_tool(tool).is_none() {
            self.tool_records.push(ToolRecord {
                tool: tool.to_string(),
                outcome,
            });
        }
    }

    pub fn lookup_tool(&self, tool: &str) -> Option<&ToolOutcome> {
        self.tool_records
            .iter()
            .find(|r| r.tool == tool)
            .map(|r| &r.outcome)
    }
}

/// 回合最终产物：对请求表面（CLI / HTTP）的应答
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnReport {
    pub session_id: String,
    pub status: TurnStatus,
    pub answer: String,
    pub safety_verdict: bool,
    pub safety_rationale: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tool_append_only() {
        let mut turn = TurnState::new("q");
        turn.record_tool("pubmed", ToolOutcome::Success("first".into()));
        turn.record_tool("pubmed", ToolOutcome::Success("second".into()));
        assert_eq!(turn.tool_records.len(), 1);
        assert_eq!(
            turn.lookup_tool("pubmed"),
            Some(&ToolOutcome::Success("first".into()))
        );
    }

    #[test]
    fn test_new_turn_starts_at_build_prompt() {
        let turn = TurnState::new("q");
        assert_eq!(turn.phase, TurnPhase::BuildPrompt);
        assert_eq!(turn.retries, 0);
    }
}
