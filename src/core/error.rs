//! 回合错误类型
//!
//! 只有真正不可恢复的条件（提示超预算、LLM 完全不可达、配置错误、用户取消）以错误形式
//! 穿出编排器；工具失败折回提示上下文，审查不可用降级为 unverified，重试预算耗尽是
//! GiveUp 终态而非错误。

use thiserror::Error;

use crate::llm::LlmError;

/// 回合执行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 系统指令 + 当前问题本身已超出提示预算，调用方必须缩短输入
    #[error("Prompt exceeds budget: minimal fields need {required} chars, budget is {budget}")]
    PromptTooLarge { required: usize, budget: usize },

    /// 生成模型在有限次立即重试后仍不可达
    #[error("Generation model unavailable after {attempts} attempts: {last}")]
    GenerationUnavailable { attempts: u32, last: LlmError },

    /// 审查模型不可达（仅在 SafetyReviewer 内部出现，编排器将其降级为 unverified）
    #[error("Safety review unavailable: {0}")]
    ReviewUnavailable(LlmError),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// 回合在外部调用挂起期间被取消；会话检查点已回滚到上一个已提交版本
    #[error("Turn cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}
