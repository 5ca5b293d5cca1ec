use std::{sync::Arc, time::Duration};

use backend_plugin::{BackendPlugin, BackendState, InboundSink, LogLevel};
use crossbeam_utils::atomic::AtomicCell;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use crate::logger::Logger;

/// Keeps exactly one live execution of a backend for the life of the
/// router.
///
/// `start()` is the backend's own event loop, so supervising it means
/// awaiting it: a clean return ends the worker, an error puts the worker
/// to sleep for the configured delay and then starts the backend again.
/// There is no restart cap unless the config sets one. The stop signal
/// interrupts the backoff sleep and prevents any further restart; it does
/// not abort a running `start()` — the router unblocks that by calling
/// `stop()` on the backend itself.
pub(crate) struct Supervisor {
    backend: Arc<dyn BackendPlugin>,
    sink: Arc<dyn InboundSink>,
    state: Arc<AtomicCell<BackendState>>,
    restart_delay: Duration,
    max_restarts: Option<u32>,
    stop_rx: watch::Receiver<bool>,
    logger: Logger,
}

impl Supervisor {
    pub(crate) fn new(
        backend: Arc<dyn BackendPlugin>,
        sink: Arc<dyn InboundSink>,
        state: Arc<AtomicCell<BackendState>>,
        restart_delay: Duration,
        max_restarts: Option<u32>,
        stop_rx: watch::Receiver<bool>,
        logger: Logger,
    ) -> Self {
        Self {
            backend,
            sink,
            state,
            restart_delay,
            max_restarts,
            stop_rx,
            logger,
        }
    }

    pub(crate) async fn run(mut self) {
        let name = self.backend.name();
        let mut restarts: u32 = 0;

        loop {
            self.state.store(BackendState::Starting);
            // no handshake: start() runs the backend's loop, so the backend
            // counts as running the moment it is invoked
            self.state.store(BackendState::Running);

            match self.backend.start(self.sink.clone()).await {
                Ok(()) => {
                    self.state.store(BackendState::Stopped);
                    info!(backend = %name, "backend stopped cleanly");
                    break;
                }
                Err(e) => {
                    self.state.store(BackendState::Failed);
                    self.logger
                        .log(LogLevel::Error, &name, &format!("backend raised an error: {e}"));

                    if *self.stop_rx.borrow() {
                        self.state.store(BackendState::Stopped);
                        break;
                    }

                    if let Some(max) = self.max_restarts {
                        if restarts >= max {
                            error!(backend = %name, restarts, "restart cap reached, giving up");
                            self.state.store(BackendState::Stopped);
                            break;
                        }
                    }

                    self.state.store(BackendState::Restarting);
                    tokio::select! {
                        _ = sleep(self.restart_delay) => {}
                        _ = stopped(&mut self.stop_rx) => {
                            self.state.store(BackendState::Stopped);
                            break;
                        }
                    }

                    restarts += 1;
                    info!(backend = %name, restarts, "restarting backend");
                }
            }
        }
    }
}

/// Resolves once the stop flag flips to true. A dropped sender counts as
/// a stop request too.
pub(crate) async fn stopped(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}
