use std::sync::Mutex as StdMutex;

use anyhow::{Context, Result};
use mongodb::bson::{doc, Document};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock;

// ---------------------------------------------------------------------------
// Entry types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: Uuid,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub id: Uuid,
    pub timestamp: String,
    pub source: String,
    pub payload: Value,
    pub status: String,
    pub error: Option<String>,
    pub strategy_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: Uuid,
    pub timestamp: String,
    pub webhook_id: Uuid,
    pub order_kind: String,
    pub response_data: Value,
    pub status: String,
    pub error: Option<String>,
    pub strategy_id: String,
}

/// The three record families the journal accepts. Closed sum type; adding a
/// variant is a breaking change for every consumer.
#[derive(Debug, Clone)]
pub enum JournalEntry {
    Log(LogRecord),
    WebhookReceived(WebhookRecord),
    VenueResponse(ResponseRecord),
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryStore {
    logs: Vec<LogRecord>,
    webhooks: Vec<WebhookRecord>,
    responses: Vec<ResponseRecord>,
}

enum Backend {
    Mongo {
        logs: Collection<Document>,
        webhooks: Collection<Document>,
        responses: Collection<Document>,
    },
    Memory(StdMutex<MemoryStore>),
}

/// Append-only store of logs, inbound webhooks and outbound venue responses.
/// Insertion order is the key; store-internal identifiers never leave this
/// module. External records carry only their own uuid and timestamp.
pub struct Journal {
    backend: Backend,
}

impl Journal {
    pub fn mongo(db: &Database) -> Self {
        Self {
            backend: Backend::Mongo {
                logs: db.collection("logs"),
                webhooks: db.collection("webhooks"),
                responses: db.collection("responses"),
            },
        }
    }

    /// Volatile backend used by tests and local runs without a store.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(StdMutex::new(MemoryStore::default())),
        }
    }

    pub async fn append(&self, entry: JournalEntry) -> Result<()> {
        match &self.backend {
            Backend::Mongo {
                logs,
                webhooks,
                responses,
            } => {
                let (collection, document) = match &entry {
                    JournalEntry::Log(r) => (logs, to_document(r)?),
                    JournalEntry::WebhookReceived(r) => (webhooks, to_document(r)?),
                    JournalEntry::VenueResponse(r) => (responses, to_document(r)?),
                };
                collection
                    .insert_one(document)
                    .await
                    .context("journal insert failed")?;
            }
            Backend::Memory(store) => {
                let mut store = lock_memory(store);
                match entry {
                    JournalEntry::Log(r) => store.logs.push(r),
                    JournalEntry::WebhookReceived(r) => store.webhooks.push(r),
                    JournalEntry::VenueResponse(r) => store.responses.push(r),
                }
            }
        }
        Ok(())
    }

    /// Writes a log entry to console and store. Store failures are downgraded
    /// to a warning: losing a log line must not fail the pipeline.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>, details: Option<Value>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(target: "bridge::journal", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "bridge::journal", "{message}"),
            LogLevel::Error => tracing::error!(target: "bridge::journal", "{message}"),
        }
        let record = LogRecord {
            id: Uuid::new_v4(),
            timestamp: clock::now_iso(),
            level,
            message,
            details,
        };
        if let Err(e) = self.append(JournalEntry::Log(record)).await {
            tracing::warn!(error = %e, "journal_log_write_failed");
        }
    }

    pub async fn recent_logs(
        &self,
        limit: usize,
        level: Option<LogLevel>,
    ) -> Result<Vec<LogRecord>> {
        match &self.backend {
            Backend::Mongo { logs, .. } => {
                let mut filter = doc! {};
                if let Some(level) = level {
                    filter.insert("level", level.as_str());
                }
                newest_first(logs, filter, limit).await
            }
            Backend::Memory(store) => {
                let store = lock_memory(store);
                Ok(store
                    .logs
                    .iter()
                    .rev()
                    .filter(|r| level.map(|l| r.level == l).unwrap_or(true))
                    .take(limit)
                    .cloned()
                    .collect())
            }
        }
    }

    /// Newest-first webhooks. `strategy_ids` of `None` means unfiltered; an
    /// explicitly empty set yields the empty result: showing nothing is a
    /// deliberate operator gesture, not a missing parameter.
    pub async fn recent_webhooks(
        &self,
        limit: usize,
        strategy_ids: Option<&[String]>,
    ) -> Result<Vec<WebhookRecord>> {
        if matches!(strategy_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }
        match &self.backend {
            Backend::Mongo { webhooks, .. } => {
                newest_first(webhooks, strategy_filter(strategy_ids), limit).await
            }
            Backend::Memory(store) => {
                let store = lock_memory(store);
                Ok(store
                    .webhooks
                    .iter()
                    .rev()
                    .filter(|r| matches_strategy(&r.strategy_id, strategy_ids))
                    .take(limit)
                    .cloned()
                    .collect())
            }
        }
    }

    pub async fn recent_responses(
        &self,
        limit: usize,
        strategy_ids: Option<&[String]>,
    ) -> Result<Vec<ResponseRecord>> {
        if matches!(strategy_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }
        match &self.backend {
            Backend::Mongo { responses, .. } => {
                newest_first(responses, strategy_filter(strategy_ids), limit).await
            }
            Backend::Memory(store) => {
                let store = lock_memory(store);
                Ok(store
                    .responses
                    .iter()
                    .rev()
                    .filter(|r| matches_strategy(&r.strategy_id, strategy_ids))
                    .take(limit)
                    .cloned()
                    .collect())
            }
        }
    }

    pub async fn clear_logs(&self) -> Result<u64> {
        match &self.backend {
            Backend::Mongo { logs, .. } => {
                let result = logs
                    .delete_many(doc! {})
                    .await
                    .context("clear logs failed")?;
                Ok(result.deleted_count)
            }
            Backend::Memory(store) => {
                let mut store = lock_memory(store);
                let deleted = store.logs.len() as u64;
                store.logs.clear();
                Ok(deleted)
            }
        }
    }
}

fn to_document<T: Serialize>(record: &T) -> Result<Document> {
    mongodb::bson::to_document(record).context("journal record serialization failed")
}

fn lock_memory(store: &StdMutex<MemoryStore>) -> std::sync::MutexGuard<'_, MemoryStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn strategy_filter(strategy_ids: Option<&[String]>) -> Document {
    match strategy_ids {
        Some(ids) => doc! {"strategy_id": {"$in": ids}},
        None => doc! {},
    }
}

fn matches_strategy(strategy_id: &str, filter: Option<&[String]>) -> bool {
    match filter {
        Some(ids) => ids.iter().any(|id| id == strategy_id),
        None => true,
    }
}

/// `_id` is monotonically increasing on insert, which makes it the insertion
/// order key; it is stripped on the way out by deserializing into the plain
/// record type.
async fn newest_first<T: for<'de> Deserialize<'de>>(
    collection: &Collection<Document>,
    filter: Document,
    limit: usize,
) -> Result<Vec<T>> {
    use futures_util::TryStreamExt;

    let documents: Vec<Document> = collection
        .find(filter)
        .sort(doc! {"_id": -1})
        .limit(limit as i64)
        .await
        .context("journal query failed")?
        .try_collect()
        .await
        .context("journal cursor failed")?;

    let mut records = Vec::with_capacity(documents.len());
    for document in documents {
        match mongodb::bson::from_document::<T>(document) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error = %e, "journal_document_malformed"),
        }
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
