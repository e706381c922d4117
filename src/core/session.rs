//! 会话管理
//!
//! 每个 session_id 对应一个 Arc<Mutex<Session>>；回合在整个执行期间持有锁，
//! 同一会话的并发回合被串行化，检查点不会出现丢失更新。不同会话互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::memory::ConversationMemory;

/// 单个会话：对话历史（进程内长期存在，显式 reset 才清空）
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub history: ConversationMemory,
}

impl Session {
    fn new(id: impl Into<String>, max_context_turns: usize) -> Self {
        Self {
            id: id.into(),
            history: ConversationMemory::new(max_context_turns),
        }
    }
}

/// 会话注册表：首次出现的 session_id 自动创建，之后复用同一把锁
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    max_context_turns: usize,
}

impl SessionManager {
    pub fn new(max_context_turns: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_context_turns,
        }
    }

    /// 获取或创建会话；返回的 Arc<Mutex<..>> 由调用方在回合期间锁定
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(s) = sessions.get(session_id) {
                return s.clone();
            }
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session::new(session_id, self.max_context_turns)))
            })
            .clone()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let mgr = SessionManager::new(8);
        let a = mgr.get_or_create("s1").await;
        a.lock().await.history.push(crate::memory::Message::user("hi"));

        let b = mgr.get_or_create("s1").await;
        assert_eq!(b.lock().await.history.len(), 1);
        assert_eq!(mgr.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_sessions_are_isolated() {
        let mgr = SessionManager::new(8);
        let a = mgr.get_or_create("s1").await;
        a.lock().await.history.push(crate::memory::Message::user("hi"));

        let b = mgr.get_or_create("s2").await;
        assert!(b.lock().await.history.is_empty());
    }
}
