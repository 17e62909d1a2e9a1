use crate::{
    Result,
    operations::{
        LogRequest,
        MintRequest,
        OperationId,
        OperationKind,
        OperationOutcome,
        OperationSnapshot,
        OperationState,
        QueueStats,
        QueuedOperation,
    },
    queue::{
        chain_writer::ChainWriter,
        retry::RetryPolicy,
    },
};
use anyhow::Context;
use chrono::Utc;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};

pub mod chain_writer;
pub mod ethereum;
pub mod retry;


/// Terminal operations stay queryable this many entries back.
const TERMINAL_RETENTION: usize = 256;

/// Strict-FIFO serializer for blockchain writes through one signing identity.
///
/// Writes are enqueued by API handlers and dispatched one at a time by a
/// single processing loop which owns the account's nonce counter. Without a
/// configured writer the queue accepts work but never dispatches it.
pub struct TxQueue<C> {
    writer: Option<Arc<C>>,
    policy: RetryPolicy,
    inner: Arc<Mutex<QueueInner>>,
}

impl<C> Clone for TxQueue<C> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
            policy: self.policy,
            inner: self.inner.clone(),
        }
    }
}

#[derive(Default)]
struct QueueInner {
    active: VecDeque<QueuedOperation>,
    terminal: VecDeque<QueuedOperation>,
    next_nonce: Option<u64>,
    is_processing: bool,
}

impl<C> TxQueue<C> {
    pub fn new(writer: Option<C>, policy: RetryPolicy) -> Self {
        Self {
            writer: writer.map(Arc::new),
            policy,
            inner: Arc::new(Mutex::new(QueueInner::default())),
        }
    }

    pub fn get_status(&self, id: OperationId) -> Option<OperationSnapshot> {
        let inner = self.inner.lock().unwrap();
        inner
            .active
            .iter()
            .chain(inner.terminal.iter())
            .find(|op| op.id == id)
            .map(QueuedOperation::snapshot)
    }

    pub fn get_stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        let mut stats = QueueStats {
            is_processing: inner.is_processing,
            ..QueueStats::default()
        };
        for op in inner.active.iter().chain(inner.terminal.iter()) {
            stats.total += 1;
            match op.state {
                OperationState::Pending => stats.pending += 1,
                OperationState::InFlight => stats.in_flight += 1,
                OperationState::Completed => stats.completed += 1,
                OperationState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Drop all queued and retained operations and return the loop to idle.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.active.clear();
        inner.terminal.clear();
        inner.is_processing = false;
    }
}

impl<C> TxQueue<C>
where
    C: ChainWriter + Send + Sync + 'static,
{
    /// Validate and queue a game-result log. Returns the id immediately; the
    /// submission itself happens on the processing loop.
    pub fn enqueue_log(&self, request: LogRequest) -> Result<OperationId> {
        let entry = request.validate()?;
        Ok(self.enqueue(OperationKind::Log(entry)))
    }

    /// Validate and queue an NFT mint. Returns the id immediately.
    pub fn enqueue_mint(&self, request: MintRequest) -> Result<OperationId> {
        let mint = request.validate()?;
        Ok(self.enqueue(OperationKind::Mint(mint)))
    }

    fn enqueue(&self, kind: OperationKind) -> OperationId {
        let op = QueuedOperation::new(kind);
        let id = op.id;
        let label = op.kind.label();
        let should_kick = {
            let mut inner = self.inner.lock().unwrap();
            inner.active.push_back(op);
            self.writer.is_some() && !inner.is_processing
        };
        tracing::info!(%id, kind = label, "queued operation");
        if should_kick {
            let queue = self.clone();
            tokio::spawn(async move {
                queue.process().await;
            });
        }
        id
    }

    /// Run the processing loop until the queue drains or a retry delay is
    /// pending. A no-op when already running or when no writer is configured.
    pub async fn process(&self) {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.is_processing {
                return;
            }
            inner.is_processing = true;
        }
        let Some(writer) = self.writer.clone() else {
            self.inner.lock().unwrap().is_processing = false;
            return;
        };

        let outcome = self.drain(writer.as_ref()).await;
        self.inner.lock().unwrap().is_processing = false;

        match outcome {
            Ok(Some(delay)) => {
                tracing::info!(delay_ms = delay.as_millis() as u64, "retry scheduled");
                spawn_retry(self.clone(), delay);
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "processing loop stopped");
            }
        }
    }

    async fn drain(&self, writer: &C) -> Result<Option<Duration>> {
        if self.inner.lock().unwrap().next_nonce.is_none() {
            let nonce = writer
                .pending_nonce()
                .await
                .context("reading initial account nonce")?;
            self.inner.lock().unwrap().next_nonce = Some(nonce);
            tracing::info!(nonce, "initialized signer nonce");
        }

        loop {
            let Some((id, kind, nonce, attempt)) = self.take_head() else {
                return Ok(None);
            };
            tracing::info!(%id, kind = kind.label(), attempt, nonce, "submitting operation");
            let outcome = match &kind {
                OperationKind::Log(entry) => writer
                    .submit_game_result(entry, nonce)
                    .await
                    .map(|receipt| OperationOutcome::Log {
                        tx_hash: receipt.tx_hash,
                        block_number: receipt.block_number,
                    }),
                OperationKind::Mint(mint) => writer
                    .submit_mint(mint, nonce)
                    .await
                    .map(|receipt| OperationOutcome::Mint {
                        tx_hash: receipt.tx_hash,
                        token_id: receipt.token_id,
                    }),
            };
            match outcome {
                Ok(result) => self.complete_head(id, result),
                Err(error) => {
                    if let Some(delay) = self.fail_head(id, &error) {
                        return Ok(Some(delay));
                    }
                }
            }
        }
    }

    /// Claim the head operation for dispatch, consuming one nonce. Returns
    /// None when the head is not dispatchable (empty queue, or a failed head
    /// with no retries left that has not yet been evicted).
    fn take_head(&self) -> Option<(OperationId, OperationKind, u64, u32)> {
        let mut inner = self.inner.lock().unwrap();
        let nonce = inner.next_nonce?;
        let policy = self.policy;
        let op = inner.active.front_mut()?;
        let dispatchable = match op.state {
            OperationState::Pending => true,
            OperationState::Failed => op.attempt < policy.max_attempts,
            OperationState::InFlight | OperationState::Completed => false,
        };
        if !dispatchable {
            return None;
        }
        op.state = OperationState::InFlight;
        op.attempt += 1;
        op.last_attempt_at = Some(Utc::now());
        let claimed = (op.id, op.kind.clone(), nonce, op.attempt);
        inner.next_nonce = Some(nonce + 1);
        Some(claimed)
    }

    fn complete_head(&self, id: OperationId, result: OperationOutcome) {
        let mut inner = self.inner.lock().unwrap();
        let Some(op) = inner.active.front_mut().filter(|op| op.id == id) else {
            tracing::warn!(%id, "completed operation no longer at queue head");
            return;
        };
        op.state = OperationState::Completed;
        op.outcome = Some(result);
        op.last_error = None;
        tracing::info!(%id, "operation completed");
        let op = inner.active.pop_front().unwrap();
        retain_terminal(&mut inner, op);
    }

    /// Record a failed attempt. Returns the delay before the next attempt,
    /// or None when the operation is out of retries and has been evicted.
    fn fail_head(&self, id: OperationId, error: &anyhow::Error) -> Option<Duration> {
        let mut inner = self.inner.lock().unwrap();
        let Some(op) = inner.active.front_mut().filter(|op| op.id == id) else {
            tracing::warn!(%id, "failed operation no longer at queue head");
            return None;
        };
        op.state = OperationState::Failed;
        op.last_error = Some(error.to_string());
        if op.attempt >= self.policy.max_attempts {
            tracing::error!(%id, attempt = op.attempt, %error, "operation failed terminally");
            let op = inner.active.pop_front().unwrap();
            retain_terminal(&mut inner, op);
            return None;
        }
        let delay = self.policy.delay_for(op.attempt);
        tracing::warn!(
            %id,
            attempt = op.attempt,
            %error,
            delay_ms = delay.as_millis() as u64,
            "submission failed; will retry"
        );
        Some(delay)
    }
}

/// Spawn the delayed retry kick on a detached task. Extracting this out of
/// `TxQueue::process` keeps the recursive `process()` call from forming a
/// `Send` auto-trait inference cycle with the `tokio::spawn` bound.
fn spawn_retry<C>(queue: TxQueue<C>, delay: Duration)
where
    C: ChainWriter + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        queue.process().await;
    });
}

fn retain_terminal(inner: &mut QueueInner, op: QueuedOperation) {
    inner.terminal.push_back(op);
    while inner.terminal.len() > TERMINAL_RETENTION {
        inner.terminal.pop_front();
    }
}
