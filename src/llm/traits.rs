//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::complete；生成与审查各持有
//! 显式注入的客户端实例，不使用模块级单例。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 单次补全的采样参数：温度与最大输出长度
#[derive(Clone, Copy, Debug)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// LLM 调用错误；超时与传输失败等价于后端不可用
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error: {0}")]
    Api(String),
}

/// LLM 客户端 trait：非流式补全
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;
}
