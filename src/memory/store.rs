//! 会话持久化
//!
//! SessionStore 以显式 SessionId 读写 SessionState；InMemory 用于单进程，
//! JsonFile 每个会话一个 JSON 文件，可跨进程恢复（可选使用）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{AgentError, SessionId, SessionState};

/// 会话存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取会话；不存在返回 None
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, AgentError>;

    async fn save(&self, id: &SessionId, state: &SessionState) -> Result<(), AgentError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, AgentError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save(&self, id: &SessionId, state: &SessionState) -> Result<(), AgentError> {
        self.sessions.write().await.insert(id.clone(), state.clone());
        Ok(())
    }
}

/// 文件持久化：`{dir}/{session_id}.json`
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    dir: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, id: &SessionId) -> Result<PathBuf, AgentError> {
        let name = id.as_str();
        // 会话 id 直接作为文件名，不允许路径分隔符
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(AgentError::Store(format!("invalid session id: {}", name)));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionState>, AgentError> {
        let path = self.path_for(id)?;
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AgentError::Store(format!("read {}: {}", path.display(), e))),
        };
        let state = serde_json::from_str(&data)
            .map_err(|e| AgentError::Store(format!("decode {}: {}", path.display(), e)))?;
        Ok(Some(state))
    }

    /// 父目录不存在时自动创建
    async fn save(&self, id: &SessionId, state: &SessionState) -> Result<(), AgentError> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AgentError::Store(format!("create {}: {}", self.dir.display(), e)))?;
        let data = serde_json::to_string_pretty(state).map_err(|e| AgentError::Store(e.to_string()))?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AgentError::Store(format!("write {}: {}", path.display(), e)))?;
        tracing::debug!(session = %id, path = %path.display(), "session saved");
        Ok(())
    }
}
