//! The worker loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::task::{JoinError, JoinSet};

use super::{Disposition, WorkerSettings, WorkerStats};
use crate::error::PipelineError;
use crate::notify::{ErrorNotifier, NotificationMetadata};
use crate::queue::{QueueRouter, ReceivedMessage};
use crate::routine::{Invocation, InvocationRequest, RoutineOutcome, RoutineRegistry};

/// Polls the bound queues and runs each message as an invocation.
///
/// Concurrency is bounded by a semaphore: the loop only receives a message
/// once a permit is free, so a slow invocation occupies one slot and never
/// blocks polling for the others. Cloning shares all state.
#[derive(Debug, Clone)]
pub struct WorkerRuntime {
    router: QueueRouter,
    routines: Arc<RoutineRegistry>,
    notifier: Arc<dyn ErrorNotifier>,
    settings: Arc<WorkerSettings>,
    stats: Arc<WorkerStats>,
}

impl WorkerRuntime {
    /// Creates a runtime.
    #[must_use]
    pub fn new(
        router: QueueRouter,
        routines: Arc<RoutineRegistry>,
        notifier: Arc<dyn ErrorNotifier>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            router,
            routines,
            notifier,
            settings: Arc::new(settings),
            stats: Arc::new(WorkerStats::new()),
        }
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until `shutdown` flips to `true` (or its sender is dropped), or
    /// until `max_messages` messages were received. In-flight invocations
    /// are awaited before returning.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if no queue is configured.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PipelineError> {
        let queues = &self.settings.queues;
        if queues.is_empty() {
            return Err(PipelineError::Config("worker has no queue to poll".to_string()));
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut received: u64 = 0;
        let mut cursor = 0usize;
        let mut empty_receives = 0usize;

        tracing::info!(
            queues = ?queues,
            concurrency = self.settings.concurrency,
            max_messages = ?self.settings.max_messages,
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let remaining = match self.settings.max_messages {
                Some(max) if received >= max => break,
                Some(max) => usize::try_from(max - received).unwrap_or(usize::MAX),
                None => usize::MAX,
            };
            while let Some(joined) = tasks.try_join_next() {
                Self::on_join(joined);
            }

            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let Some(queue_url) = queues.get(cursor % queues.len()) else {
                break;
            };
            cursor = cursor.wrapping_add(1);

            let want = self
                .settings
                .receive_batch
                .max(1)
                .min(semaphore.available_permits() + 1)
                .min(remaining);
            let messages = match self
                .router
                .receive(queue_url, want, self.settings.visibility_timeout)
                .await
            {
                Ok(messages) => messages,
                Err(err) => {
                    tracing::warn!(queue = %queue_url, error = %err, "receive failed");
                    drop(permit);
                    self.idle(&mut shutdown).await;
                    continue;
                }
            };

            if messages.is_empty() {
                drop(permit);
                empty_receives += 1;
                if empty_receives >= queues.len() {
                    empty_receives = 0;
                    self.idle(&mut shutdown).await;
                }
                continue;
            }
            empty_receives = 0;

            let mut permit = Some(permit);
            for message in messages {
                received += 1;
                self.stats.record_received();
                let slot = permit
                    .take()
                    .or_else(|| Arc::clone(&semaphore).try_acquire_owned().ok());
                let Some(slot) = slot else {
                    tracing::debug!(queue = %queue_url, "no free slot, releasing message");
                    if let Err(err) = self
                        .router
                        .release(queue_url, &message, Duration::ZERO)
                        .await
                    {
                        tracing::warn!(queue = %queue_url, error = %err, "release failed");
                    }
                    continue;
                };
                self.spawn(&mut tasks, slot, queue_url.clone(), message);
            }
        }

        tracing::info!(in_flight = tasks.len(), "worker stopping, draining invocations");
        while let Some(joined) = tasks.join_next().await {
            Self::on_join(joined);
        }
        tracing::info!(stats = ?self.stats.snapshot(), "worker stopped");
        Ok(())
    }

    fn spawn(
        &self,
        tasks: &mut JoinSet<()>,
        permit: OwnedSemaphorePermit,
        queue_url: String,
        message: ReceivedMessage,
    ) {
        let worker = self.clone();
        tasks.spawn(async move {
            let _permit = permit;
            worker.stats.record_started();
            worker.handle(&queue_url, message).await;
            worker.stats.record_finished();
        });
    }

    fn on_join(joined: Result<(), JoinError>) {
        if let Err(err) = joined {
            // The message stays in flight and comes back after its
            // visibility timeout.
            tracing::error!(error = %err, "invocation task aborted");
        }
    }

    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            () = tokio::time::sleep(self.settings.poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    /// Processes one received message to its disposition.
    async fn handle(&self, queue_url: &str, message: ReceivedMessage) {
        let mut request = match InvocationRequest::from_body(&message.body) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(
                    queue = queue_url,
                    message_id = %message.message_id,
                    error = %err,
                    "dropping malformed message"
                );
                let metadata = NotificationMetadata::default().with_queue(queue_url);
                self.notifier.notify(&err, &metadata).await;
                self.stats.record_dropped();
                self.delete(queue_url, &message).await;
                return;
            }
        };

        // A budget past the visibility timeout would let another worker
        // receive the message while it still runs here.
        let visibility_secs = self.settings.visibility_timeout.as_secs().max(1);
        if let Some(requested) = request.cap_timeout(visibility_secs) {
            tracing::warn!(
                queue = queue_url,
                message_id = %message.message_id,
                requested,
                capped = visibility_secs,
                "message timeout capped at the visibility timeout"
            );
        }

        let invocation = Invocation::new(request, message.receive_count);
        tracing::debug!(
            invocation_id = %invocation.id,
            routine_type = invocation.routine_type(),
            queue = queue_url,
            attempt = invocation.attempt,
            "invocation received"
        );

        let outcome = self
            .routines
            .dispatch(&invocation, self.settings.timeout_grace)
            .await;
        self.report(queue_url, &invocation, &outcome).await;

        let disposition = Disposition::for_outcome(
            &outcome,
            message.receive_count,
            self.settings.max_receive_count,
        );
        self.apply(queue_url, &message, disposition).await;
    }

    async fn report(&self, queue_url: &str, invocation: &Invocation, outcome: &RoutineOutcome) {
        let routine_type = invocation.routine_type();
        match outcome {
            RoutineOutcome::Completed(status) => {
                self.stats.record_completed();
                tracing::info!(
                    invocation_id = %invocation.id,
                    routine_type,
                    %status,
                    "invocation completed"
                );
            }
            RoutineOutcome::TimedOut { elapsed, status } => {
                self.stats.record_timed_out();
                tracing::warn!(
                    invocation_id = %invocation.id,
                    routine_type,
                    %status,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "invocation timed out"
                );
            }
            RoutineOutcome::Failed(err) => {
                self.stats.record_failed();
                tracing::error!(
                    invocation_id = %invocation.id,
                    routine_type,
                    attempt = invocation.attempt,
                    error = %err,
                    "invocation failed"
                );
            }
            RoutineOutcome::Fatal(err) => {
                self.stats.record_fatal();
                tracing::error!(
                    invocation_id = %invocation.id,
                    routine_type,
                    attempt = invocation.attempt,
                    error = %err,
                    "invocation fatal"
                );
            }
        }
        if let Some(err) = outcome.error() {
            let metadata = NotificationMetadata::for_invocation(invocation).with_queue(queue_url);
            self.notifier.notify(err, &metadata).await;
        }
    }

    async fn apply(&self, queue_url: &str, message: &ReceivedMessage, disposition: Disposition) {
        match disposition {
            Disposition::Delete => self.delete(queue_url, message).await,
            Disposition::Drop => {
                self.stats.record_dropped();
                self.delete(queue_url, message).await;
            }
            Disposition::Release => {
                let delay = self
                    .settings
                    .release_backoff
                    .delay_for(message.receive_count.saturating_sub(1))
                    .min(self.settings.visibility_timeout);
                match self.router.release(queue_url, message, delay).await {
                    Ok(()) => self.stats.record_released(),
                    Err(err) => {
                        tracing::warn!(queue = queue_url, error = %err, "release failed");
                    }
                }
            }
            Disposition::DeadLetter => match self.router.dead_letter(queue_url, message).await {
                Ok(true) => self.stats.record_dead_lettered(),
                Ok(false) => {
                    tracing::error!(
                        queue = queue_url,
                        message_id = %message.message_id,
                        receive_count = message.receive_count,
                        "no dead-letter queue configured, discarding message"
                    );
                    self.stats.record_dropped();
                    self.delete(queue_url, message).await;
                }
                Err(err) => {
                    tracing::warn!(queue = queue_url, error = %err, "dead-letter failed");
                }
            },
        }
    }

    async fn delete(&self, queue_url: &str, message: &ReceivedMessage) {
        if let Err(err) = self.router.ack(queue_url, message).await {
            tracing::warn!(
                queue = queue_url,
                message_id = %message.message_id,
                error = %err,
                "delete failed"
            );
        }
    }
}
