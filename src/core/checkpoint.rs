//! 会话检查点
//!
//! 终态回合将会话历史与到达的阶段写入 CheckpointStore；进程重启或显式 resume 时，
//! 同一 session_id 的下一个回合可从持久化历史继续，而非从头重放。核心不关心存储
//! 介质，内存实现用于默认部署。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::state::TurnPhase;
use crate::memory::Message;

/// 会话状态快照：历史 + 最近终态阶段 + 写入时间
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub history: Vec<Message>,
    /// 上一个回合到达的阶段（Accept / GiveUp）
    pub phase: TurnPhase,
    pub updated_at: i64,
}

impl Checkpoint {
    pub fn new(session_id: impl Into<String>, history: Vec<Message>, phase: TurnPhase) -> Self {
        Self {
            session_id: session_id.into(),
            history,
            phase,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// 检查点存储接口：get / put / remove
///
/// 并发约束由上层保证：一个回合从读取检查点到写回终态期间持有该会话的互斥锁，
/// 因此同一 session_id 不会出现读写交错。
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<Checkpoint>;
    async fn put(&self, session_id: &str, checkpoint: Checkpoint);
    async fn remove(&self, session_id: &str);
}

/// 内存检查点存储（进程生命周期内有效）
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, session_id: &str) -> Option<Checkpoint> {
        self.inner.read().await.get(session_id).cloned()
    }

    async fn put(&self, session_id: &str, checkpoint: Checkpoint) {
        self.inner
            .write()
            .await
            .insert(session_id.to_string(), checkpoint);
    }

    async fn remove(&self, session_id: &str) {
        self.inner.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let store = MemoryCheckpointStore::new();
        let history = vec![Message::user("dose of drug X?"), Message::assistant("...")];
        store
            .put("s1", Checkpoint::new("s1", history.clone(), TurnPhase::Accept))
            .await;

        let got = store.get("s1").await.expect("checkpoint present");
        assert_eq!(got.history.len(), 2);
        assert_eq!(got.history[0].content, history[0].content);
        assert_eq!(got.phase, TurnPhase::Accept);
    }

    #[tokio::test]
    async fn test_remove_clears_entry() {
        let store = MemoryCheckpointStore::new();
        store
            .put("s1", Checkpoint::new("s1", vec![], TurnPhase::GiveUp))
            .await;
        store.remove("s1").await;
        assert!(store.get("s1").await.is_none());
    }
}
