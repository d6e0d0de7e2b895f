use async_trait::async_trait;
use recall_core::{Document, RecallError, RecallResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Trait for corpus storage backends.
///
/// The retrieval engine only reads full snapshots; the write methods are
/// used by ingestion tooling.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// A point-in-time copy of every stored document, in insertion order.
    async fn all_documents(&self) -> RecallResult<Arc<Vec<Document>>>;

    /// Look up one document by ID.
    async fn get_document(&self, id: Uuid) -> RecallResult<Option<Document>>;

    /// Insert a document, or replace the stored document with the same ID.
    ///
    /// Returns `true` when an existing document was replaced. Documents
    /// with no passages are rejected.
    async fn upsert(&self, document: Document) -> RecallResult<bool>;

    /// Delete a document by ID.
    async fn delete(&self, id: Uuid) -> RecallResult<bool>;

    /// Count documents.
    async fn count(&self) -> RecallResult<usize>;
}

fn ensure_persistable(document: &Document) -> RecallResult<()> {
    if document.passages.is_empty() {
        return Err(RecallError::InvalidDocument(format!(
            "Document {} ({}) has no passages",
            document.id, document.url
        )));
    }
    Ok(())
}

/// In-memory corpus store.
///
/// Snapshots are shared `Arc`s rebuilt on write, so readers never observe a
/// half-applied update.
pub struct InMemoryCorpusStore {
    documents: RwLock<Arc<Vec<Document>>>,
}

impl InMemoryCorpusStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Create a store pre-populated with documents, validating each.
    pub fn with_documents(documents: Vec<Document>) -> RecallResult<Self> {
        for doc in &documents {
            ensure_persistable(doc)?;
        }
        Ok(Self {
            documents: RwLock::new(Arc::new(documents)),
        })
    }
}

impl Default for InMemoryCorpusStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpusStore {
    async fn all_documents(&self) -> RecallResult<Arc<Vec<Document>>> {
        Ok(Arc::clone(&*self.documents.read().await))
    }

    async fn get_document(&self, id: Uuid) -> RecallResult<Option<Document>> {
        let docs = self.documents.read().await;
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn upsert(&self, document: Document) -> RecallResult<bool> {
        ensure_persistable(&document)?;
        let mut guard = self.documents.write().await;
        let docs = Arc::make_mut(&mut *guard);
        if let Some(existing) = docs.iter_mut().find(|d| d.id == document.id) {
            *existing = document;
            Ok(true)
        } else {
            docs.push(document);
            Ok(false)
        }
    }

    async fn delete(&self, id: Uuid) -> RecallResult<bool> {
        let mut guard = self.documents.write().await;
        let docs = Arc::make_mut(&mut *guard);
        let before = docs.len();
        docs.retain(|d| d.id != id);
        Ok(docs.len() < before)
    }

    async fn count(&self) -> RecallResult<usize> {
        Ok(self.documents.read().await.len())
    }
}

/// File-backed corpus store that persists documents as JSONL on disk.
/// Loads all documents into memory on creation; appends on insert; rewrites
/// on replace or delete.
///
/// The file is written before the in-memory snapshot changes, so a failed
/// write leaves both untouched.
pub struct FileCorpusStore {
    path: PathBuf,
    inner: InMemoryCorpusStore,
    write_lock: Mutex<()>,
}

impl FileCorpusStore {
    /// Open the store at the given path, loading any existing documents.
    pub async fn open(path: PathBuf) -> RecallResult<Self> {
        let mut documents = Vec::new();

        if path.exists() {
            let data = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| RecallError::Store(format!("Failed to read corpus: {e}")))?;
            for (lineno, line) in data.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let doc: Document = serde_json::from_str(line).map_err(|e| {
                    RecallError::Store(format!("Invalid JSONL entry at line {}: {e}", lineno + 1))
                })?;
                documents.push(doc);
            }
        } else if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RecallError::Store(format!("Failed to create dir: {e}")))?;
        }

        info!(path = %path.display(), documents = documents.len(), "Corpus store opened");
        Ok(Self {
            path,
            inner: InMemoryCorpusStore::with_documents(documents)?,
            write_lock: Mutex::new(()),
        })
    }

    /// Location of the JSONL file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn append_to_file(&self, document: &Document) -> RecallResult<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| RecallError::Store(format!("Failed to open corpus: {e}")))?;
        let mut line = serde_json::to_string(document)?;
        line.push('\n');
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| RecallError::Store(format!("Failed to write document: {e}")))?;
        Ok(())
    }

    /// Replace the file with `documents` via a temporary sibling and rename.
    async fn rewrite_file(&self, documents: &[Document]) -> RecallResult<()> {
        let mut data = String::new();
        for doc in documents {
            data.push_str(&serde_json::to_string(doc)?);
            data.push('\n');
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        let written = async {
            tokio::fs::write(&tmp, data.as_bytes()).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RecallError::Store(format!("Failed to write corpus: {e}")));
        }
        debug!(path = %self.path.display(), documents = documents.len(), "Corpus rewritten");
        Ok(())
    }
}

#[async_trait]
impl CorpusStore for FileCorpusStore {
    async fn all_documents(&self) -> RecallResult<Arc<Vec<Document>>> {
        self.inner.all_documents().await
    }

    async fn get_document(&self, id: Uuid) -> RecallResult<Option<Document>> {
        self.inner.get_document(id).await
    }

    async fn upsert(&self, document: Document) -> RecallResult<bool> {
        ensure_persistable(&document)?;
        let _guard = self.write_lock.lock().await;

        let current = self.inner.all_documents().await?;
        if current.iter().any(|d| d.id == document.id) {
            let next: Vec<Document> = current
                .iter()
                .map(|d| if d.id == document.id { document.clone() } else { d.clone() })
                .collect();
            self.rewrite_file(&next).await?;
        } else {
            self.append_to_file(&document).await?;
        }
        self.inner.upsert(document).await
    }

    async fn delete(&self, id: Uuid) -> RecallResult<bool> {
        let _guard = self.write_lock.lock().await;

        let current = self.inner.all_documents().await?;
        if !current.iter().any(|d| d.id == id) {
            return Ok(false);
        }
        let next: Vec<Document> = current.iter().filter(|d| d.id != id).cloned().collect();
        self.rewrite_file(&next).await?;
        self.inner.delete(id).await
    }

    async fn count(&self) -> RecallResult<usize> {
        self.inner.count().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use recall_core::Passage;

    fn make_doc(url: &str, text: &str) -> Document {
        Document::new(url, "Title", text).with_passages(vec![Passage::new(text, 0, 0.5)])
    }

    #[tokio::test]
    async fn test_insert_and_count() {
        let store = InMemoryCorpusStore::new();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!store.upsert(make_doc("https://a.dev", "hello")).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_document_without_passages() {
        let store = InMemoryCorpusStore::new();
        let err = store
            .upsert(Document::new("https://a.dev", "Empty", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, RecallError::InvalidDocument(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let store = InMemoryCorpusStore::new();
        let first = make_doc("https://a.dev", "first");
        let second = make_doc("https://b.dev", "second");
        store.upsert(first.clone()).await.unwrap();
        store.upsert(second.clone()).await.unwrap();

        let mut revisited = first.clone();
        revisited.passages = vec![Passage::new("revisited", 0, 0.9)];
        assert!(store.upsert(revisited).await.unwrap());

        let docs = store.all_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, first.id);
        assert_eq!(docs[0].passages[0].text, "revisited");
    }

    #[tokio::test]
    async fn test_snapshot_is_isolated_from_later_writes() {
        let store = InMemoryCorpusStore::new();
        store.upsert(make_doc("https://a.dev", "one")).await.unwrap();
        let snapshot = store.all_documents().await.unwrap();
        store.upsert(make_doc("https://b.dev", "two")).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.all_documents().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = InMemoryCorpusStore::new();
        let doc = make_doc("https://a.dev", "to_delete");
        let id = doc.id;
        store.upsert(doc).await.unwrap();

        assert_eq!(store.get_document(id).await.unwrap().unwrap().id, id);
        assert!(store.delete(id).await.unwrap());
        assert!(store.get_document(id).await.unwrap().is_none());
        assert!(!store.delete(Uuid::new_v4()).await.unwrap());
    }

    #[test]
    fn test_with_documents_validates() {
        assert!(InMemoryCorpusStore::with_documents(vec![Document::new("u", "t", "")]).is_err());
        assert!(InMemoryCorpusStore::with_documents(vec![make_doc("u", "x")]).is_ok());
    }

    // --- FileCorpusStore tests ---

    #[tokio::test]
    async fn test_file_store_insert_and_persist() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("corpus.jsonl");

        {
            let store = FileCorpusStore::open(path.clone()).await.unwrap();
            store.upsert(make_doc("https://a.dev", "hello")).await.unwrap();
            store.upsert(make_doc("https://b.dev", "world")).await.unwrap();
            assert_eq!(store.count().await.unwrap(), 2);
        }

        let reopened = FileCorpusStore::open(path).await.unwrap();
        let docs = reopened.all_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].passages[0].text, "hello");
        assert_eq!(docs[1].passages[0].text, "world");
    }

    #[tokio::test]
    async fn test_file_store_replace_and_delete_rewrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("corpus.jsonl");

        let store = FileCorpusStore::open(path.clone()).await.unwrap();
        let doc = make_doc("https://a.dev", "original");
        let keep = make_doc("https://b.dev", "keep");
        store.upsert(doc.clone()).await.unwrap();
        store.upsert(keep.clone()).await.unwrap();

        let mut replaced = doc.clone();
        replaced.passages = vec![Passage::new("replaced", 0, 0.5)];
        assert!(store.upsert(replaced).await.unwrap());

        let reopened = FileCorpusStore::open(path.clone()).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 2);
        let got = reopened.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(got.passages[0].text, "replaced");

        assert!(store.delete(doc.id).await.unwrap());
        let reopened = FileCorpusStore::open(path).await.unwrap();
        let docs = reopened.all_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, keep.id);
    }

    #[tokio::test]
    async fn test_file_store_invalid_line_is_store_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("corpus.jsonl");
        tokio::fs::write(&path, "{not json}\n").await.unwrap();
        let err = FileCorpusStore::open(path).await.err().unwrap();
        assert!(matches!(err, RecallError::Store(_)));
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test]
    async fn test_file_store_failed_write_leaves_snapshot_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("corpus.jsonl");
        let store = FileCorpusStore::open(path.clone()).await.unwrap();
        let original = make_doc("https://a.dev", "original");
        store.upsert(original.clone()).await.unwrap();

        // A directory at the corpus path makes every write fail.
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir(&path).await.unwrap();

        let fresh = make_doc("https://b.dev", "fresh");
        let err = store.upsert(fresh.clone()).await.unwrap_err();
        assert!(matches!(err, RecallError::Store(_)));
        assert!(store.get_document(fresh.id).await.unwrap().is_none());

        let mut replaced = original.clone();
        replaced.passages = vec![Passage::new("replaced", 0, 0.5)];
        assert!(store.upsert(replaced).await.is_err());
        assert!(store.delete(original.id).await.is_err());

        let docs = store.all_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].passages[0].text, "original");
    }

    #[tokio::test]
    async fn test_file_store_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileCorpusStore::open(tmp.path().join("corpus.jsonl")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
