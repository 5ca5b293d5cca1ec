/*
┌────────────────────────────────────────────────────────┐
│                        Router                          │
│  backends: ordered registry, one Supervisor task each  │
│  apps:     ordered registry, shared by the Pipeline    │
└────────────────────────────────────────────────────────┘
        ▲                                   │
        │ sink.incoming(msg)                │ outgoing(msg)
        │                                   ▼
┌───────┴────────┐                 ┌─────────────────────┐
│  Supervisor    │                 │      Pipeline       │
│  start/restart │                 │ parse→handle→cleanup│
│  one backend   │                 │ outgoing → send     │
└────────────────┘                 └─────────────────────┘
*/
pub mod pipeline;
pub mod supervisor;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use backend_plugin::{AppPlugin, BackendError, BackendPlugin, BackendState, InboundSink, Message};
use crossbeam_utils::atomic::AtomicCell;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::RouterConfig;
use crate::logger::Logger;
use pipeline::Pipeline;
use supervisor::Supervisor;

/// Errors the router itself can produce.
///
/// Backend and app failures during steady state are handled where they
/// happen (supervised restart, logged isolation); only the outgoing path
/// surfaces errors to its caller.
#[derive(Error, Debug)]
pub enum RouterError {
    /// The outgoing message names a backend nobody registered.
    #[error("no backend named `{0}` is registered")]
    UnknownBackend(String),

    /// The owning backend refused the send. Passed through uninterpreted;
    /// failure semantics are the backend's own.
    #[error(transparent)]
    Send(#[from] BackendError),
}

/// Triggers the router's stop path from anywhere: another task, a signal
/// handler, a test.
#[derive(Clone, Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(true);
    }
}

/// The process-wide coordination object.
///
/// Holds the ordered backend and app registries, dispatches every inbound
/// and outbound message through the phase pipeline, and supervises one
/// worker task per backend so a crash in one backend never stops message
/// flow through the others.
///
/// Register everything first, then call [`Router::run`]; registration takes
/// `&mut self` so the registries are necessarily frozen before any worker
/// can observe them.
pub struct Router {
    config: RouterConfig,
    logger: Logger,
    backends: Vec<Arc<dyn BackendPlugin>>,
    states: Vec<(String, Arc<AtomicCell<BackendState>>)>,
    pipeline: Pipeline,
    stop_tx: watch::Sender<bool>,
}

impl Router {
    pub fn new(config: RouterConfig, logger: Logger) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            pipeline: Pipeline::new(logger.clone()),
            logger,
            backends: Vec::new(),
            states: Vec::new(),
            stop_tx,
        }
    }

    /// Append a backend to the registry. Each registered backend gets its
    /// own supervised worker; the outgoing send table is keyed by name, so
    /// a duplicate name replaces the previous send target (and is worth a
    /// warning).
    pub fn add_backend(&mut self, backend: Arc<dyn BackendPlugin>) {
        let name = backend.name();
        if self.pipeline.add_backend(backend.clone()) {
            warn!(backend = %name, "duplicate backend name, outgoing sends now target the newer instance");
        }
        self.states
            .push((name, Arc::new(AtomicCell::new(BackendState::Stopped))));
        self.backends.push(backend);
    }

    /// Append an app to the registry. Registration order is the order apps
    /// run within every phase.
    pub fn add_app(&mut self, app: Arc<dyn AppPlugin>) {
        self.pipeline.add_app(app);
    }

    /// Handle to request a programmatic stop.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    /// Backend name → supervision state, for health checks and logs.
    pub fn diagnostics(&self) -> HashMap<String, BackendState> {
        self.states
            .iter()
            .map(|(name, cell)| (name.clone(), cell.load()))
            .collect()
    }

    /// Run an inbound message through the phase pipeline. Called by
    /// backends when they receive traffic; safe to call concurrently from
    /// any number of workers.
    pub async fn incoming(&self, mut msg: Message) {
        self.pipeline.dispatch_incoming(&mut msg).await;
    }

    /// Run an outbound message through the outgoing phase, then hand it to
    /// its owning backend.
    pub async fn outgoing(&self, msg: Message) -> Result<(), RouterError> {
        self.pipeline.dispatch_outgoing(msg).await
    }

    /// Spawn one supervised worker per registered backend, then block until
    /// an interrupt (ctrl-c) or a [`StopHandle::stop`] request. On stop:
    /// call `stop()` on every backend to unblock its `start()`, then wait
    /// for every worker, each bounded by the configured stop timeout.
    pub async fn run(&self) -> Result<()> {
        let sink: Arc<dyn InboundSink> = Arc::new(self.pipeline.clone());

        let mut workers = Vec::with_capacity(self.backends.len());
        for (backend, (name, state)) in self.backends.iter().zip(&self.states) {
            let supervisor = Supervisor::new(
                backend.clone(),
                sink.clone(),
                state.clone(),
                self.config.restart_delay,
                self.config.max_restarts,
                self.stop_tx.subscribe(),
                self.logger.clone(),
            );
            workers.push((name.clone(), tokio::spawn(supervisor.run())));
        }

        info!(
            backends = self.backends.len(),
            apps = self.pipeline.app_count(),
            "router serving"
        );

        let mut stop_rx = self.stop_tx.subscribe();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                let _ = self.stop_tx.send(true);
            }
            _ = supervisor::stopped(&mut stop_rx) => {
                info!("stop requested, shutting down");
            }
        }

        // unblock every backend's start() first, then collect the workers;
        // stop() is cooperative, so it gets the same bound as the join
        for backend in &self.backends {
            if timeout(self.config.stop_timeout, backend.stop()).await.is_err() {
                warn!(backend = %backend.name(), "backend did not acknowledge stop within the timeout");
            }
        }

        for (name, handle) in workers {
            let abort = handle.abort_handle();
            if timeout(self.config.stop_timeout, handle).await.is_err() {
                warn!(backend = %name, "worker did not stop within the timeout, abandoning it");
                abort.abort();
            }
        }

        info!("router stopped");
        Ok(())
    }
}
