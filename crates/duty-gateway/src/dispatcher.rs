//! Unread mail drain.
//!
//! One producer periodically fetches unread messages and pushes them into a
//! bounded channel; a fixed pool of workers takes messages off the channel
//! and marks them as read. Failures never stop a loop: they are logged,
//! published as [`DispatchEvent`]s and retried implicitly on the next tick
//! because the message is still unread. A message stays claimed from the
//! moment it is queued until its mark finishes, so a later tick never queues
//! it twice.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::MailConfig;
use crate::error::FetchError;
use crate::mail::{MailFetcher, MailMarker};
use crate::provider::{MailProvider, MessageSummary};

/// Events kept for slow observers before they start lagging
const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub channel_capacity: usize,
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_secs(10),
            channel_capacity: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&MailConfig> for DispatcherConfig {
    fn from(config: &MailConfig) -> Self {
        Self {
            workers: config.workers,
            poll_interval: config.poll_interval(),
            channel_capacity: config.channel_capacity(),
            request_timeout: config.request_timeout(),
        }
    }
}

/// Observable outcome of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// A fetch cycle handed `count` messages to the workers. Messages still
    /// being marked from an earlier cycle are not counted.
    Fetched { count: usize, elapsed: Duration },
    /// A fetch cycle failed; `recovered` messages fetched before the failure
    /// were still handed to the workers
    FetchFailed { error: String, recovered: usize },
    Marked { id: String, worker: usize },
    MarkFailed {
        id: String,
        worker: usize,
        error: String,
    },
}

/// Ids queued or being marked.
#[derive(Default)]
struct InFlight(std::sync::Mutex<HashSet<String>>);

impl InFlight {
    /// Returns false when the id is already claimed.
    fn claim(&self, id: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string())
    }

    fn release(&self, id: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }
}

pub struct Dispatcher {
    fetcher: Arc<MailFetcher>,
    marker: Arc<MailMarker>,
    config: DispatcherConfig,
    events: broadcast::Sender<DispatchEvent>,
}

impl Dispatcher {
    pub fn new(mail: Arc<dyn MailProvider>, config: DispatcherConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            fetcher: Arc::new(MailFetcher::new(mail.clone(), config.request_timeout)),
            marker: Arc::new(MailMarker::new(mail, config.request_timeout)),
            config,
            events,
        }
    }

    /// Subscribe before `start` to observe every event.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Spawn the worker pool and the producer.
    pub fn start(self) -> DispatcherHandle {
        let cancel = CancellationToken::new();
        let workers = self.config.workers.max(1);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(InFlight::default());

        tracing::info!(
            "Starting mail dispatcher ({} workers, interval: {:?})",
            workers,
            self.config.poll_interval
        );

        let mut tasks = Vec::with_capacity(workers + 1);
        for worker in 0..workers {
            tasks.push(tokio::spawn(run_worker(
                worker,
                rx.clone(),
                self.marker.clone(),
                in_flight.clone(),
                cancel.clone(),
                self.events.clone(),
            )));
        }

        tasks.push(tokio::spawn(run_producer(
            self.fetcher.clone(),
            tx,
            in_flight,
            self.config.poll_interval,
            cancel.clone(),
            self.events.clone(),
        )));

        DispatcherHandle {
            cancel,
            tasks,
            events: self.events,
        }
    }
}

/// Running dispatcher.
pub struct DispatcherHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    events: broadcast::Sender<DispatchEvent>,
}

impl DispatcherHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    /// Ask the producer and the workers to stop. In-flight calls are
    /// cancelled; queued messages stay unread.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait until every task has exited.
    pub async fn join(self) {
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!("Dispatcher task error: {:?}", e);
            }
        }
        tracing::info!("Mail dispatcher stopped");
    }
}

async fn run_producer(
    fetcher: Arc<MailFetcher>,
    tx: mpsc::Sender<MessageSummary>,
    in_flight: Arc<InFlight>,
    poll_interval: Duration,
    cancel: CancellationToken,
    events: broadcast::Sender<DispatchEvent>,
) {
    'ticks: loop {
        let started = Instant::now();

        let messages = match fetcher.fetch_unread(&cancel).await {
            Ok(messages) => messages,
            Err(FetchError::Cancelled { .. }) => break,
            Err(e) => {
                tracing::error!("Mail fetch failed: {}", e);
                let _ = events.send(DispatchEvent::FetchFailed {
                    error: e.to_string(),
                    recovered: e.partial().len(),
                });
                e.into_partial()
            }
        };

        let mut count = 0;
        for message in messages {
            if !in_flight.claim(&message.id) {
                tracing::debug!("{} is still being marked, skipping", message.id);
                continue;
            }

            tracing::debug!("Sending {} ({})", message.id, message.subject);
            let id = message.id.clone();
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    in_flight.release(&id);
                    break 'ticks;
                }
                sent = tx.send(message) => {
                    if sent.is_err() {
                        in_flight.release(&id);
                        tracing::warn!("All mail workers are gone, stopping producer");
                        break 'ticks;
                    }
                    count += 1;
                }
            }
        }

        let elapsed = started.elapsed();
        tracing::info!("Queued {} unread messages. Spent {:?}.", count, elapsed);
        let _ = events.send(DispatchEvent::Fetched { count, elapsed });

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    tracing::debug!("Mail producer stopped");
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<MessageSummary>>>,
    marker: Arc<MailMarker>,
    in_flight: Arc<InFlight>,
    cancel: CancellationToken,
    events: broadcast::Sender<DispatchEvent>,
) {
    loop {
        let next = {
            let mut rx = tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                guard = rx.lock() => guard,
            };
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                message = rx.recv() => message,
            }
        };

        let Some(message) = next else {
            break;
        };

        tracing::debug!("Worker {} received {}", worker, message.id);

        let result = marker.mark_read(&message, &cancel).await;
        in_flight.release(&message.id);

        let event = match result {
            Ok(()) => DispatchEvent::Marked {
                id: message.id,
                worker,
            },
            Err(e) => {
                tracing::error!("{}", e);
                DispatchEvent::MarkFailed {
                    id: message.id,
                    worker,
                    error: e.to_string(),
                }
            }
        };
        let _ = events.send(event);
    }

    tracing::debug!("Mail worker {} stopped", worker);
}
