//! 提示构建
//!
//! build() 是其输入（系统指令、历史、当前问题、工具结果、拒绝理由）的确定性函数，
//! 无副作用。总字符数受预算约束，超出时先丢弃最旧的历史，历史丢尽仍超出时截断
//! 反馈与工具结果；仅当系统指令 + 当前问题本身已超预算时返回 PromptTooLarge
//! （对本回合致命）。输出的消息总字符数不超过预算。

use crate::core::state::{ToolOutcome, ToolRecord};
use crate::core::AgentError;
use crate::memory::Message;

/// 系统指令模板头部；Available tools 段落由注册表生成
const SYSTEM_HEADER: &str = "You are a medical AI assistant participating in a multi-turn \
conversation with a user. Use the conversation history to decide whether a tool is needed \
on a given turn. First try to answer directly from your medical knowledge; only use tools \
when evidence, patient data access or local guideline retrieval is specifically needed.

You have access to the following tools:";

const SYSTEM_FOOTER: &str = "If you decide to call a tool, respond with EXACTLY this format \
on its own line (no extra text):

TOOL_CALL: tool_name(\"argument\")

For example:
TOOL_CALL: search_pubmed(\"asthma treatment\")

For search_pubmed you can optionally specify num_articles and top_n like: \
search_pubmed(\"query\", num_articles=20, top_n=5). If you call a tool, wait for the tool \
result and then produce your reply based on that result. If you can answer without \
external tools, return a direct, concise answer.";

/// 提示构建器：持有系统指令与字符预算
pub struct PromptBuilder {
    system_prompt: String,
    max_chars: usize,
}

impl PromptBuilder {
    /// tool_descriptions 来自注册表（已按名排序，保证确定性）
    pub fn new(tool_descriptions: &[(String, String)], max_chars: usize) -> Self {
        let mut system_prompt = String::from(SYSTEM_HEADER);
        for (idx, (name, desc)) in tool_descriptions.iter().enumerate() {
            system_prompt.push_str(&format!("\n\n{}. {} - {}", idx + 1, name, desc));
        }
        system_prompt.push_str("\n\n");
        system_prompt.push_str(SYSTEM_FOOTER);
        Self {
            system_prompt,
            max_chars,
        }
    }

    /// 组装一次生成调用的消息序列：
    /// system -> (截断后的历史) -> 纠正性反馈 -> 工具结果 -> 当前问题
    pub fn build(
        &self,
        history: &[Message],
        query: &str,
        tool_records: &[ToolRecord],
        feedback: Option<&str>,
    ) -> Result<Vec<Message>, AgentError> {
        let system = Message::system(self.system_prompt.clone());
        let user = Message::user(format!("User Query: {}", query));

        // 预算检查只看不可丢弃的最小字段
        let required = chars_of(&system) + chars_of(&user);
        if required > self.max_chars {
            return Err(AgentError::PromptTooLarge {
                required,
                budget: self.max_chars,
            });
        }

        let mut extras: Vec<Message> = Vec::new();
        if let Some(reason) = feedback {
            extras.push(Message::user(format!(
                "The previous response was flagged as unsafe/invalid. Reason: {}. \
                 Please correct it.",
                reason
            )));
        }
        for record in tool_records {
            extras.push(tool_result_message(record));
        }

        // 反馈与工具结果同样受预算约束：超出不可丢弃字段之外剩余预算的按序截断，
        // 截断到零的整条丢弃（只有在历史全部丢弃都无济于事时才会走到这里）
        let mut avail = self.max_chars - required;
        let mut tail: Vec<Message> = Vec::new();
        for mut msg in extras {
            if chars_of(&msg) > avail {
                msg.content = truncate_chars(&msg.content, avail);
            }
            if msg.content.is_empty() {
                continue;
            }
            avail -= chars_of(&msg);
            tail.push(msg);
        }
        tail.push(user);

        // 历史从最旧开始丢，直到进入剩余预算
        let mut keep_from = 0;
        let mut history_chars: usize = history.iter().map(chars_of).sum();
        while keep_from < history.len() && history_chars > avail {
            history_chars -= chars_of(&history[keep_from]);
            keep_from += 1;
        }

        let mut messages = Vec::with_capacity(1 + history.len() - keep_from + tail.len());
        messages.push(system);
        messages.extend_from_slice(&history[keep_from..]);
        messages.extend(tail);
        Ok(messages)
    }
}

/// 工具结果折回提示：成功的载荷要求模型据此作答，失败原因要求模型绕行并指出信息缺口
fn tool_result_message(record: &ToolRecord) -> Message {
    match &record.outcome {
        ToolOutcome::Success(payload) => Message::user(format!(
            "Tool Result from {}: {}\n\nNow provide a comprehensive answer based on this \
             information.",
            record.tool, payload
        )),
        ToolOutcome::Failure(reason) => Message::user(format!(
            "Tool {} failed: {}. Answer from your own knowledge and note that this data \
             source was unavailable.",
            record.tool, reason
        )),
    }
}

fn chars_of(msg: &Message) -> usize {
    msg.content.chars().count()
}

/// 截断提示；附加在被裁剪的消息末尾
const TRUNCATION_NOTICE: &str = "\n[content truncated to fit the prompt budget]";

/// 按字符数截断到 budget（含截断提示）；预算连提示都放不下时返回空串
fn truncate_chars(content: &str, budget: usize) -> String {
    let notice_len = TRUNCATION_NOTICE.chars().count();
    if budget <= notice_len {
        return String::new();
    }
    let mut out: String = content.chars().take(budget - notice_len).collect();
    out.push_str(TRUNCATION_NOTICE);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;

    fn builder(max_chars: usize) -> PromptBuilder {
        PromptBuilder::new(
            &[("search_pubmed".to_string(), "search literature".to_string())],
            max_chars,
        )
    }

    #[test]
    fn test_build_is_deterministic() {
        let b = builder(10_000);
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let a = b.build(&history, "dose of drug X?", &[], None).unwrap();
        let c = b.build(&history, "dose of drug X?", &[], None).unwrap();
        assert_eq!(a.len(), c.len());
        for (x, y) in a.iter().zip(c.iter()) {
            assert_eq!(x.content, y.content);
        }
    }

    #[test]
    fn test_truncates_oldest_history_first() {
        let b = builder(2_000);
        let old = Message::user("x".repeat(1_500));
        let recent = Message::assistant("recent".to_string());
        let msgs = b.build(&[old, recent], "q", &[], None).unwrap();
        // system + recent + query；最旧的一条被丢弃
        assert!(msgs.iter().all(|m| m.content.len() < 1_500));
        assert!(msgs.iter().any(|m| m.content == "recent"));
        let total: usize = msgs.iter().map(|m| m.content.chars().count()).sum();
        assert!(total <= 2_000);
    }

    #[test]
    fn test_large_tool_payload_is_truncated_to_budget() {
        let b = builder(3_000);
        let records = vec![ToolRecord {
            tool: "search_pubmed".to_string(),
            outcome: ToolOutcome::Success("y".repeat(5_000)),
        }];
        let msgs = b.build(&[], "q", &records, None).unwrap();
        let total: usize = msgs.iter().map(|m| m.content.chars().count()).sum();
        assert!(total <= 3_000);
        assert!(msgs
            .iter()
            .any(|m| m.content.contains("truncated to fit the prompt budget")));
        // 当前问题不参与截断，总在最后
        assert!(msgs.last().unwrap().content.contains("User Query: q"));
    }

    #[test]
    fn test_minimal_fields_over_budget_is_fatal() {
        let b = builder(50);
        let err = b.build(&[], &"q".repeat(100), &[], None).unwrap_err();
        assert!(matches!(err, AgentError::PromptTooLarge { .. }));
    }

    #[test]
    fn test_feedback_and_tool_results_included() {
        let b = builder(10_000);
        let records = vec![ToolRecord {
            tool: "search_pubmed".to_string(),
            outcome: ToolOutcome::Failure("upstream outage".to_string()),
        }];
        let msgs = b
            .build(&[], "q", &records, Some("cites nothing"))
            .unwrap();
        let joined: String = msgs.iter().map(|m| m.content.as_str()).collect();
        assert!(joined.contains("cites nothing"));
        assert!(joined.contains("upstream outage"));
        assert!(joined.contains("note that this data source was unavailable"));
        // 当前问题总在最后
        assert_eq!(msgs.last().unwrap().role, Role::User);
        assert!(msgs.last().unwrap().content.contains("User Query: q"));
    }
}
