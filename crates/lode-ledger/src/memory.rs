//! In-memory ledger implementation
//!
//! Backs tests and single-process deployments. Collections are plain maps
//! behind a `parking_lot` lock; subscriptions ride a `tokio::sync::broadcast`
//! channel per collection. Lock scopes never cross an await point.

use crate::{merge_patch, ChangeEvent, Document, LedgerStore, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-memory [`LedgerStore`]
#[derive(Default)]
pub struct MemoryLedger {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    events: RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, collection: &str, id: &str, data: Value) {
        let events = self.events.read();
        if let Some(tx) = events.get(collection) {
            // No receivers is fine; subscribers may come and go
            let _ = tx.send(ChangeEvent {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            });
        }
    }

    fn matches(doc: &Value, field: &str, value: &Value) -> bool {
        doc.get(field) == Some(value)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set_document(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data.clone());
        self.notify(collection, id, data);
        Ok(())
    }

    async fn merge_update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let merged = {
            let mut collections = self.collections.write();
            let docs = collections.entry(collection.to_string()).or_default();
            let doc = docs
                .entry(id.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            merge_patch(doc, &patch);
            doc.clone()
        };
        self.notify(collection, id, merged);
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        let existed = self
            .collections
            .write()
            .get_mut(collection)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false);
        if existed {
            self.notify(collection, id, Value::Null);
        }
        Ok(existed)
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| Self::matches(doc, field, value))
                    .map(|(id, doc)| Document {
                        id: id.clone(),
                        data: doc.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, doc)| Document {
                        id: id.clone(),
                        data: doc.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn append_record(&self, collection: &str, data: Value) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data.clone());
        self.notify(collection, &id, data);
        Ok(id)
    }

    async fn count_matching(&self, collection: &str, field: &str, value: &Value) -> Result<u64> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| Self::matches(doc, field, value))
                    .count() as u64
            })
            .unwrap_or(0))
    }

    fn subscribe(&self, collection: &str) -> broadcast::Receiver<ChangeEvent> {
        let mut events = self.events.write();
        events
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
            .subscribe()
    }
}
