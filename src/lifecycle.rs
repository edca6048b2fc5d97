/// Cancellation signal and supervision of the ingestion and publishing tasks
use futures_util::future::join;
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{timeout, Duration};

/// Process-wide cancellation signal, set at most once
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal has been set (immediately if it already was)
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only ends when the value flips
        let _ = rx.wait_for(|&stopped| stopped).await;
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{task} task failed: {reason}")]
    TaskFailed { task: &'static str, reason: String },
    #[error("tasks did not stop within {0:?} after shutdown")]
    Unresponsive(Duration),
}

/// Run the ingestion and publishing tasks until shutdown or until one of them ends
///
/// Whichever happens first, the shutdown signal is set so the other task
/// returns too, and both are joined within `grace`.
///
/// # Arguments
/// * `ingest` - Ingestion loop, returns an error when the transport gives up
/// * `publish` - Publishing loop
/// * `shutdown` - Signal shared with both loops
/// * `grace` - Upper bound for joining both tasks after shutdown
///
/// # Returns
/// Ok on a requested shutdown with both tasks finished cleanly
pub async fn supervise<I, P, E>(
    ingest: I,
    publish: P,
    shutdown: Shutdown,
    grace: Duration,
) -> Result<(), LifecycleError>
where
    I: Future<Output = Result<(), E>> + Send + 'static,
    P: Future<Output = ()> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut ingest = tokio::spawn(ingest);
    let mut publish = tokio::spawn(publish);
    let aborts = [ingest.abort_handle(), publish.abort_handle()];

    let mut ingest_result = None;
    let mut publish_result = None;

    tokio::select! {
        res = &mut ingest => {
            warn!("Ingestion task ended, shutting down");
            ingest_result = Some(res);
        }
        res = &mut publish => {
            warn!("Publishing task ended, shutting down");
            publish_result = Some(res);
        }
        _ = shutdown.cancelled() => info!("Shutdown requested"),
    }
    shutdown.trigger();

    let ingest = async move {
        match ingest_result {
            Some(res) => res,
            None => ingest.await,
        }
    };
    let publish = async move {
        match publish_result {
            Some(res) => res,
            None => publish.await,
        }
    };

    let (ingest_result, publish_result) = match timeout(grace, join(ingest, publish)).await {
        Ok(results) => results,
        Err(_) => {
            error!("Tasks did not stop within {:?}", grace);
            for handle in &aborts {
                handle.abort();
            }
            return Err(LifecycleError::Unresponsive(grace));
        }
    };
    info!("Both tasks joined");

    match ingest_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(failed("ingestion", e.to_string())),
        Err(e) => return Err(failed("ingestion", join_reason(e))),
    }
    if let Err(e) = publish_result {
        return Err(failed("publishing", join_reason(e)));
    }

    Ok(())
}

/// Join a helper task (such as the metrics server) after shutdown has fired
///
/// A task still running after `grace` is aborted and reported as unresponsive.
pub async fn join_within<E>(
    task: &'static str,
    handle: JoinHandle<Result<(), E>>,
    grace: Duration,
) -> Result<(), LifecycleError>
where
    E: std::fmt::Display,
{
    let abort = handle.abort_handle();
    match timeout(grace, handle).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(failed(task, e.to_string())),
        Ok(Err(e)) => Err(failed(task, join_reason(e))),
        Err(_) => {
            error!("{} task did not stop within {:?}, aborting", task, grace);
            abort.abort();
            Err(LifecycleError::Unresponsive(grace))
        }
    }
}

fn failed(task: &'static str, reason: String) -> LifecycleError {
    let err = LifecycleError::TaskFailed { task, reason };
    error!("{}", err);
    err
}

fn join_reason(e: JoinError) -> String {
    if e.is_panic() {
        "panicked".to_string()
    } else {
        e.to_string()
    }
}
