//! 生成步骤
//!
//! 调用生成模型一次，解析回复中显式标记的工具调用（TOOL_CALL: name("arg")）。
//! 标记解析是尽力而为：任何语法或校验失败都按「未请求工具」处理，回复即候选答案，
//! 绝不因模型输出格式崩溃。每回合至多一次工具往返，超出时附加预算提示并要求模型
//! 基于已有信息作答。模型传输失败在有限次立即重试后升级为 GenerationUnavailable。

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::agent::PromptBuilder;
use crate::core::state::{ToolOutcome, TurnState};
use crate::core::AgentError;
use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::ToolExecutor;

/// 解析出的工具调用请求（已归一化为 JSON 参数）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub tool: String,
    pub args: serde_json::Value,
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"TOOL_CALL:\s*(\w+)\((.*)\)"#).expect("valid regex"))
}

fn quoted_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("valid regex"))
}

fn kwarg(arg_str: &str, key: &str) -> Option<u64> {
    let re = Regex::new(&format!(r"{key}\s*=\s*(\d+)")).ok()?;
    re.captures(arg_str)?.get(1)?.as_str().parse().ok()
}

/// 从模型回复中提取工具调用；任何解析失败返回 None（视为直接回答）
pub fn parse_tool_call(output: &str) -> Option<ToolCallRequest> {
    let caps = marker_regex().captures(output)?;
    let tool = caps.get(1)?.as_str().to_string();
    let arg_str = caps.get(2)?.as_str().trim();

    // 主参数必须是带引号的字符串；缺失即视为无效标记
    let main_arg = quoted_regex()
        .captures(arg_str)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())?;

    // 参数名按工具归一（fetch_ehr_data 取病人号，其余取查询串）
    let mut args = if tool == "fetch_ehr_data" {
        serde_json::json!({ "patient_id": main_arg })
    } else {
        serde_json::json!({ "query": main_arg })
    };
    if let Some(n) = kwarg(arg_str, "num_articles") {
        args["num_articles"] = n.into();
    }
    if let Some(n) = kwarg(arg_str, "top_n") {
        args["top_n"] = n.into();
    }

    Some(ToolCallRequest { tool, args })
}

/// 生成步骤：注入的 LLM 客户端 + 采样参数 + 立即重试次数 + 工具往返上限
pub struct Generator {
    llm: Arc<dyn LlmClient>,
    options: CompletionOptions,
    attempts: u32,
    max_tool_rounds: u32,
}

impl Generator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        options: CompletionOptions,
        attempts: u32,
        max_tool_rounds: u32,
    ) -> Self {
        Self {
            llm,
            options,
            attempts: attempts.max(1),
            max_tool_rounds,
        }
    }

    /// 有限次立即重试的补全；全部失败 -> GenerationUnavailable（对回合致命）
    async fn complete_with_retry(
        &self,
        messages: &[Message],
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut last: Option<LlmError> = None;
        for attempt in 1..=self.attempts {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match self.llm.complete(messages, &self.options).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "generation attempt failed");
                    last = Some(e);
                }
            }
        }
        Err(AgentError::GenerationUnavailable {
            attempts: self.attempts,
            last: last.unwrap_or(LlmError::Timeout),
        })
    }

    /// 执行一次生成（含至多 max_tool_rounds 次工具往返），返回候选答案。
    /// 工具调用及其结果写入 TurnState；工具失败折回提示而非中止回合。
    pub async fn run(
        &self,
        prompt: &PromptBuilder,
        history: &[Message],
        turn: &mut TurnState,
        executor: &ToolExecutor,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut messages = prompt.build(
            history,
            &turn.query,
            &turn.tool_records,
            turn.feedback.as_deref(),
        )?;

        loop {
            let reply = self.complete_with_retry(&messages, cancel).await?;

            let call = match parse_tool_call(&reply) {
                Some(call) if executor.contains(&call.tool) => call,
                Some(call) => {
                    // 幻觉工具名：按未请求工具处理，但留下日志
                    tracing::warn!(tool = %call.tool, "model requested unknown tool, treating reply as answer");
                    return Ok(reply);
                }
                None => return Ok(reply),
            };

            if turn.tool_rounds >= self.max_tool_rounds {
                // 工具预算已耗尽：告知模型并要求其基于已有信息作答
                tracing::info!(tool = %call.tool, "tool round budget exhausted");
                messages.push(Message::assistant(reply));
                messages.push(Message::user(
                    "Tool budget for this turn is exhausted; no further tool calls will be \
                     executed. Answer the question now from the information you already have.",
                ));
                return self.complete_with_retry(&messages, cancel).await;
            }

            // 同名工具在本回合内不重复调用，复用已记录的结果
            if turn.lookup_tool(&call.tool).is_none() {
                let outcome = match executor.execute(&call.tool, call.args.clone()).await {
                    Ok(payload) => ToolOutcome::Success(payload),
                    Err(AgentError::ToolTimeout(t)) => {
                        ToolOutcome::Failure(format!("timeout while calling {}", t))
                    }
                    Err(AgentError::ToolExecutionFailed(reason)) => ToolOutcome::Failure(reason),
                    Err(other) => return Err(other),
                };
                turn.record_tool(&call.tool, outcome);
            }
            turn.tool_rounds += 1;

            // 带上工具结果重建提示，进入下一次生成
            messages = prompt.build(
                history,
                &turn.query,
                &turn.tool_records,
                turn.feedback.as_deref(),
            )?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_call() {
        let call = parse_tool_call("TOOL_CALL: search_pubmed(\"asthma treatment\")").unwrap();
        assert_eq!(call.tool, "search_pubmed");
        assert_eq!(call.args["query"], "asthma treatment");
    }

    #[test]
    fn test_parse_with_kwargs() {
        let call =
            parse_tool_call("TOOL_CALL: search_pubmed(\"flu\", num_articles=20, top_n=5)").unwrap();
        assert_eq!(call.args["num_articles"], 20);
        assert_eq!(call.args["top_n"], 5);
    }

    #[test]
    fn test_parse_ehr_uses_patient_id() {
        let call = parse_tool_call("TOOL_CALL: fetch_ehr_data('P001')").unwrap();
        assert_eq!(call.args["patient_id"], "P001");
    }

    #[test]
    fn test_marker_inside_prose_is_found() {
        let text = "Let me check.\nTOOL_CALL: rag_clinical_data(\"sepsis\")\n";
        assert!(parse_tool_call(text).is_some());
    }

    #[test]
    fn test_no_marker_is_plain_answer() {
        assert!(parse_tool_call("The typical dose is 500mg.").is_none());
    }

    #[test]
    fn test_unquoted_argument_is_not_a_call() {
        // 缺少引号的主参数按未请求工具处理，不报错
        assert!(parse_tool_call("TOOL_CALL: search_pubmed(asthma)").is_none());
    }

    #[test]
    fn test_empty_args_is_not_a_call() {
        assert!(parse_tool_call("TOOL_CALL: search_pubmed()").is_none());
    }
}
