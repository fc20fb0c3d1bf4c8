use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use docchat_core::traits::DocumentStore;
use docchat_core::types::{ChatRecord, Chunk, ConversationTurn, DocumentRecord};

/// Document and chat records as JSON files under one root:
/// `documents/<stem>.json` and `chats/<stem>.json`, where the stem is the
/// blake3 hex of the record id. Writes go through a temp file and a rename,
/// so readers never see a half-written record. Chat updates are serialized
/// per chat id.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    chat_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl JsonFileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["documents", "chats"] {
            tokio::fs::create_dir_all(root.join(dir)).await.with_context(|| format!("creating {}", root.join(dir).display()))?;
        }
        Ok(Self { root, chat_locks: Arc::default() })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", blake3::hash(id.as_bytes()).to_hex()))
    }

    /// Get or create the lock guarding one chat's file.
    async fn chat_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.chat_locks.lock().await;
        locks.entry(chat_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).with_context(|| format!("decoding {}", path.display()))?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await.with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path).await.with_context(|| format!("replacing {}", path.display()))?;
        debug!(path = %path.display(), "record written");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn document(&self, id: &str) -> Result<Option<DocumentRecord>> { self.read(&self.path("documents", id)).await }

    async fn save_document(&self, document: DocumentRecord) -> Result<()> {
        let path = self.path("documents", &document.id);
        self.write(&path, &document).await
    }

    async fn save_chunks(&self, document_id: &str, chunks: Vec<Chunk>) -> Result<()> {
        let path = self.path("documents", document_id);
        let mut doc = self.read::<DocumentRecord>(&path).await?.unwrap_or_else(|| DocumentRecord { id: document_id.to_string(), ..DocumentRecord::default() });
        doc.chunks = chunks;
        self.write(&path, &doc).await
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path("documents", id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn chat(&self, id: &str) -> Result<Option<ChatRecord>> { self.read(&self.path("chats", id)).await }

    async fn save_chat(&self, chat: ChatRecord) -> Result<()> {
        let lock = self.chat_lock(&chat.id).await;
        let _guard = lock.lock().await;
        let path = self.path("chats", &chat.id);
        self.write(&path, &chat).await
    }

    async fn append_turns(&self, chat_id: &str, turns: Vec<ConversationTurn>) -> Result<()> {
        let lock = self.chat_lock(chat_id).await;
        let _guard = lock.lock().await;
        let path = self.path("chats", chat_id);
        let mut chat: ChatRecord = self.read(&path).await?.with_context(|| format!("chat '{}' does not exist", chat_id))?;
        chat.messages.extend(turns);
        self.write(&path, &chat).await
    }
}
