//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! MockLlmClient 回显最后一条 User 消息；ScriptedLlm 按顺序返回预置回复，
//! 用于集成测试中精确控制生成 / 审查的每一步输出。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{CompletionOptions, LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }
}

/// 脚本化客户端：依次弹出预置回复；脚本耗尽后重复最后一条
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Option<Result<String, LlmError>>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// 已接收的补全调用次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        _messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock().await;
        match replies.pop_front() {
            Some(reply) => {
                *self.last.lock().await = Some(reply.clone());
                reply
            }
            None => self
                .last
                .lock()
                .await
                .clone()
                .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let llm = ScriptedLlm::new(vec![Ok("a".into()), Ok("b".into())]);
        let opts = CompletionOptions::default();
        assert_eq!(llm.complete(&[], &opts).await.unwrap(), "a");
        assert_eq!(llm.complete(&[], &opts).await.unwrap(), "b");
        // 脚本耗尽后重复最后一条
        assert_eq!(llm.complete(&[], &opts).await.unwrap(), "b");
        assert_eq!(llm.call_count(), 3);
    }
}
