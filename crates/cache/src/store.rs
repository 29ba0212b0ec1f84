//! Persistent prompt store with a debounced single writer.
//!
//! Reads go straight to SQLite (after checking the not-yet-written pending
//! buffer). Writes are absorbed into the pending buffer and landed by one
//! background task after a quiet period, so a burst of extractions becomes
//! one transaction. An explicit [`flush`](PromptStore::flush) lands the
//! buffer immediately; teardown paths call it before closing the pool.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Rows kept in the table; the oldest beyond this are evicted per batch.
pub const STORE_CAPACITY: i64 = 512;
/// Quiet period before buffered writes are landed.
pub const WRITE_DEBOUNCE: Duration = Duration::from_secs(5);

enum Command {
    /// A new entry entered the pending buffer.
    Wake,
    /// Land the buffer now and acknowledge.
    Flush(oneshot::Sender<()>),
}

type Pending = Arc<Mutex<HashMap<String, String>>>;

/// Handle to the persistent tier.
#[derive(Clone, Debug)]
pub struct PromptStore {
    pool: SqlitePool,
    pending: Pending,
    commands: mpsc::UnboundedSender<Command>,
}

impl PromptStore {
    /// Create a store over an open pool and spawn its writer task.
    ///
    /// The writer exits when the last store handle drops.
    pub fn new(pool: SqlitePool) -> Self {
        let pending: Pending = Arc::default();
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer(pool.clone(), Arc::clone(&pending), rx));
        Self { pool, pending, commands }
    }

    /// Look up a prompt, seeing buffered writes that haven't landed yet.
    pub async fn get(&self, locator: &str) -> Result<Option<String>> {
        if let Some(hit) = lock(&self.pending).get(locator).cloned() {
            return Ok(Some(hit));
        }
        sqlx::query_scalar("SELECT prompt FROM prompts WHERE locator = ?")
            .bind(locator)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Buffer a prompt for the next debounced write.
    pub fn put(&self, locator: &str, prompt: &str) {
        lock(&self.pending).insert(locator.to_string(), prompt.to_string());
        // Send failure means the writer is gone; the entry stays readable
        // in the pending buffer for this process's lifetime.
        if self.commands.send(Command::Wake).is_err() {
            warn!("prompt store writer is gone; entry will not be persisted");
        }
    }

    /// Land all buffered writes and wait until they are durable.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.commands.send(Command::Flush(ack)).map_err(|_| exn::Exn::from(ErrorKind::WriterGone))?;
        done.await.map_err(|_| exn::Exn::from(ErrorKind::WriterGone))
    }
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
    pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Single-writer loop: each wake starts (or extends) a debounce window;
/// flushes and shutdown land the buffer immediately.
async fn writer(pool: SqlitePool, pending: Pending, mut rx: mpsc::UnboundedReceiver<Command>) {
    loop {
        match rx.recv().await {
            None => {
                drain(&pool, &pending).await;
                return;
            },
            Some(Command::Flush(ack)) => {
                drain(&pool, &pending).await;
                let _ = ack.send(());
            },
            Some(Command::Wake) => loop {
                tokio::select! {
                    _ = tokio::time::sleep(WRITE_DEBOUNCE) => {
                        drain(&pool, &pending).await;
                        break;
                    },
                    command = rx.recv() => match command {
                        None => {
                            drain(&pool, &pending).await;
                            return;
                        },
                        Some(Command::Flush(ack)) => {
                            drain(&pool, &pending).await;
                            let _ = ack.send(());
                            break;
                        },
                        // Another wake restarts the quiet period.
                        Some(Command::Wake) => continue,
                    },
                }
            },
        }
    }
}

/// Land the pending buffer in one transaction, then evict the oldest rows
/// beyond capacity. Failures are logged and the batch is dropped; the cache
/// is best-effort by contract.
async fn drain(pool: &SqlitePool, pending: &Pending) {
    let batch: Vec<(String, String)> = lock(pending).drain().collect();
    if batch.is_empty() {
        return;
    }
    let count = batch.len();
    if let Err(error) = land(pool, batch).await {
        warn!(%error, count, "dropping prompt batch after write failure");
    } else {
        debug!(count, "landed prompt batch");
    }
}

async fn land(pool: &SqlitePool, batch: Vec<(String, String)>) -> Result<()> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .or_raise(|| ErrorKind::Database)?;
    let mut tx = pool.begin().await.or_raise(|| ErrorKind::Database)?;
    for (locator, prompt) in batch {
        sqlx::query(
            "INSERT INTO prompts (locator, prompt, inserted_at) VALUES (?, ?, ?)
             ON CONFLICT (locator) DO UPDATE SET prompt = excluded.prompt,
                                                 inserted_at = excluded.inserted_at",
        )
        .bind(locator)
        .bind(prompt)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .or_raise(|| ErrorKind::Database)?;
    }
    sqlx::query(
        "DELETE FROM prompts WHERE locator IN (
             SELECT locator FROM prompts ORDER BY inserted_at DESC, locator LIMIT -1 OFFSET ?
         )",
    )
    .bind(STORE_CAPACITY)
    .execute(&mut *tx)
    .await
    .or_raise(|| ErrorKind::Database)?;
    tx.commit().await.or_raise(|| ErrorKind::Database)
}
