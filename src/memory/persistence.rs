//! 会话归档
//!
//! 会话进入 Closed 后，把最终状态、文字记录与总结报告写成 `<archive_dir>/<session_id>.json`。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::SessionState;
use crate::memory::Message;

/// 一段已结束会话的归档记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub state: SessionState,
    pub transcript: Vec<Message>,
    pub report: String,
}

/// 简单的文件归档：每段会话一个 JSON 文件
#[derive(Debug, Clone)]
pub struct SessionArchive {
    dir: PathBuf,
}

impl SessionArchive {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// 写入归档；目录不存在时自动创建
    pub fn save(&self, record: &SessionRecord) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&record.id);
        std::fs::write(&path, serde_json::to_string_pretty(record)?)?;
        Ok(path)
    }

    /// 读取归档；文件不存在时返回 None
    pub fn load(&self, id: &str) -> anyhow::Result<Option<SessionRecord>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Phase;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let archive = SessionArchive::new(dir.path().join("sessions"));
        let mut state = SessionState::default();
        state.phase = Phase::Closed;
        let record = SessionRecord {
            id: "abc".into(),
            started_at: Utc::now(),
            closed_at: Utc::now(),
            state,
            transcript: vec![Message::user("hi"), Message::assistant("hello")],
            report: "# Session summary".into(),
        };

        let path = archive.save(&record).unwrap();
        assert!(path.ends_with("abc.json"));

        let loaded = archive.load("abc").unwrap().unwrap();
        assert_eq!(loaded.state.phase, Phase::Closed);
        assert_eq!(loaded.transcript.len(), 2);
        assert!(archive.load("missing").unwrap().is_none());
    }
}
