//! Notebook persistence.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::notebook::Notebook;

/// A stored notebook with its authorship metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookRecord {
    pub name: String,
    pub authors: Vec<String>,
    pub source: Notebook,
    pub updated_at: DateTime<Utc>,
}

impl NotebookRecord {
    pub fn new(name: impl Into<String>, author: impl Into<String>, source: Notebook) -> Self {
        Self {
            name: name.into(),
            authors: vec![author.into()],
            source,
            updated_at: Utc::now(),
        }
    }
}

/// Storage backend for notebooks, keyed by name and scoped by author.
pub trait NotebookStore: Send + Sync {
    /// Fetch a notebook by name, visible to `author`.
    fn get<'a>(
        &'a self,
        author: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NotebookRecord>, Error>> + Send + 'a>>;

    fn save<'a>(
        &'a self,
        record: NotebookRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;

    /// Names of all notebooks visible to `author`.
    fn list<'a>(
        &'a self,
        author: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, Error>> + Send + 'a>>;
}

/// In-memory store. Useful for tests and single-process runs.
#[derive(Default)]
pub struct InMemoryNotebookStore {
    notebooks: RwLock<HashMap<String, NotebookRecord>>,
}

impl InMemoryNotebookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotebookStore for InMemoryNotebookStore {
    fn get<'a>(
        &'a self,
        author: &'a str,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<NotebookRecord>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let notebooks = self
                .notebooks
                .read()
                .map_err(|_| Error::Store("notebook store lock poisoned".into()))?;
            Ok(notebooks
                .get(name)
                .filter(|record| record.authors.iter().any(|a| a == author))
                .cloned())
        })
    }

    fn save<'a>(
        &'a self,
        mut record: NotebookRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
        Box::pin(async move {
            let mut notebooks = self
                .notebooks
                .write()
                .map_err(|_| Error::Store("notebook store lock poisoned".into()))?;
            if let Some(existing) = notebooks.get(&record.name) {
                // Keep authors from previous saves.
                for author in &existing.authors {
                    if !record.authors.contains(author) {
                        record.authors.push(author.clone());
                    }
                }
            }
            record.updated_at = Utc::now();
            notebooks.insert(record.name.clone(), record);
            Ok(())
        })
    }

    fn list<'a>(
        &'a self,
        author: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, Error>> + Send + 'a>> {
        Box::pin(async move {
            let notebooks = self
                .notebooks
                .read()
                .map_err(|_| Error::Store("notebook store lock poisoned".into()))?;
            let mut names: Vec<String> = notebooks
                .values()
                .filter(|record| record.authors.iter().any(|a| a == author))
                .map(|record| record.name.clone())
                .collect();
            names.sort();
            Ok(names)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::Cell;

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = InMemoryNotebookStore::new();
        let mut nb = Notebook::new();
        nb.cells.push(Cell::code("import xarray as xr"));

        store
            .save(NotebookRecord::new("analysis.ipynb", "alice", nb.clone()))
            .await
            .unwrap();

        let record = store.get("alice", "analysis.ipynb").await.unwrap().unwrap();
        assert_eq!(record.source, nb);
        assert_eq!(record.authors, vec!["alice"]);
    }

    #[tokio::test]
    async fn get_is_scoped_to_author() {
        let store = InMemoryNotebookStore::new();
        store
            .save(NotebookRecord::new("spi.ipynb", "alice", Notebook::new()))
            .await
            .unwrap();

        assert!(store.get("bob", "spi.ipynb").await.unwrap().is_none());
        assert!(store.get("alice", "spi.ipynb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_merges_authors() {
        let store = InMemoryNotebookStore::new();
        store
            .save(NotebookRecord::new("nb.ipynb", "alice", Notebook::new()))
            .await
            .unwrap();
        store
            .save(NotebookRecord::new("nb.ipynb", "bob", Notebook::new()))
            .await
            .unwrap();

        let record = store.get("alice", "nb.ipynb").await.unwrap().unwrap();
        assert!(record.authors.contains(&"alice".to_string()));
        assert!(record.authors.contains(&"bob".to_string()));
    }

    #[tokio::test]
    async fn list_filters_by_author() {
        let store = InMemoryNotebookStore::new();
        store
            .save(NotebookRecord::new("a.ipynb", "alice", Notebook::new()))
            .await
            .unwrap();
        store
            .save(NotebookRecord::new("b.ipynb", "bob", Notebook::new()))
            .await
            .unwrap();

        assert_eq!(store.list("alice").await.unwrap(), vec!["a.ipynb"]);
    }
}
