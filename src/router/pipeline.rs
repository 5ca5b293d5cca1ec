use std::sync::Arc;

use async_trait::async_trait;
use backend_plugin::{AppPlugin, BackendPlugin, InboundSink, LogLevel, Message, Phase};
use dashmap::DashMap;

use crate::logger::Logger;
use crate::router::RouterError;

/// Ordered fan-out of one message to every registered app.
///
/// Phase order and app order are both significant: incoming dispatch runs
/// parse, then handle, then cleanup, each across all apps in registration
/// order (phase-major, app-order-minor). Apps mutate the message in place,
/// so later phases and later apps observe earlier changes. This is the
/// extensibility point where apps translate, log or reroute messages.
///
/// The pipeline is frozen before the router starts; dispatch never takes a
/// lock over the registries.
#[derive(Clone)]
pub struct Pipeline {
    apps: Vec<Arc<dyn AppPlugin>>,
    backends: Arc<DashMap<String, Arc<dyn BackendPlugin>>>,
    logger: Logger,
}

impl Pipeline {
    pub(crate) fn new(logger: Logger) -> Self {
        Self {
            apps: Vec::new(),
            backends: Arc::new(DashMap::new()),
            logger,
        }
    }

    pub(crate) fn add_app(&mut self, app: Arc<dyn AppPlugin>) {
        self.apps.push(app);
    }

    /// Register the backend as a send target. Returns true if a backend
    /// with the same name was already registered (and got replaced).
    pub(crate) fn add_backend(&mut self, backend: Arc<dyn BackendPlugin>) -> bool {
        self.backends.insert(backend.name(), backend).is_some()
    }

    pub(crate) fn app_count(&self) -> usize {
        self.apps.len()
    }

    /// One phase across all apps, registration order. An app failure is
    /// logged and the remaining apps still run; a misbehaving app cannot
    /// block the pipeline for the others.
    async fn run_phase(&self, phase: Phase, msg: &mut Message) {
        for app in &self.apps {
            let result = match phase {
                Phase::Parse => app.parse(msg).await,
                Phase::Handle => app.handle(msg).await,
                Phase::Cleanup => app.cleanup(msg).await,
                Phase::Outgoing => app.outgoing(msg).await,
            };
            if let Err(e) = result {
                self.logger.log(
                    LogLevel::Error,
                    &app.name(),
                    &format!("{phase} failed for message {}: {e}", msg.id),
                );
            }
        }
    }

    /// Run an inbound message through parse, handle and cleanup. Returns
    /// only after every app has been offered every phase.
    pub async fn dispatch_incoming(&self, msg: &mut Message) {
        for phase in Phase::INCOMING {
            self.run_phase(phase, msg).await;
        }
    }

    /// Run an outbound message through the outgoing phase, then hand it to
    /// its backend's `send` exactly once. A send failure is the backend's
    /// own to interpret; it is passed through untouched.
    pub async fn dispatch_outgoing(&self, mut msg: Message) -> Result<(), RouterError> {
        for phase in Phase::OUTGOING {
            self.run_phase(phase, &mut msg).await;
        }

        let backend = self
            .backends
            .get(&msg.backend)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RouterError::UnknownBackend(msg.backend.clone()))?;

        backend.send(msg).await.map_err(RouterError::Send)
    }
}

#[async_trait]
impl InboundSink for Pipeline {
    async fn incoming(&self, mut msg: Message) {
        self.dispatch_incoming(&mut msg).await;
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::logger::{Logger, TracingLogger};
    use backend_plugin::{AppError, BackendError};
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every phase callback as "<app>.<phase>".
    pub struct RecordingApp {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingApp {
        pub fn new(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                log,
            })
        }

        fn record(&self, phase: &str) {
            self.log.lock().unwrap().push(format!("{}.{}", self.name, phase));
        }
    }

    #[async_trait]
    impl AppPlugin for RecordingApp {
        fn name(&self) -> String {
            self.name.clone()
        }

        async fn parse(&self, _msg: &mut Message) -> Result<(), AppError> {
            self.record("parse");
            Ok(())
        }

        async fn handle(&self, _msg: &mut Message) -> Result<(), AppError> {
            self.record("handle");
            Ok(())
        }

        async fn cleanup(&self, _msg: &mut Message) -> Result<(), AppError> {
            self.record("cleanup");
            Ok(())
        }

        async fn outgoing(&self, _msg: &mut Message) -> Result<(), AppError> {
            self.record("outgoing");
            Ok(())
        }
    }

    /// Fails every phase, to prove failures stay contained.
    struct BrokenApp;

    #[async_trait]
    impl AppPlugin for BrokenApp {
        fn name(&self) -> String {
            "broken".into()
        }

        async fn parse(&self, _msg: &mut Message) -> Result<(), AppError> {
            Err(AppError::Other("parse blew up".into()))
        }

        async fn handle(&self, _msg: &mut Message) -> Result<(), AppError> {
            Err(AppError::Other("handle blew up".into()))
        }

        async fn outgoing(&self, _msg: &mut Message) -> Result<(), AppError> {
            Err(AppError::InvalidMessage("bad outgoing".into()))
        }
    }

    /// A backend that only records what it was asked to send.
    pub struct SendRecorder {
        name: String,
        pub sent: Arc<Mutex<Vec<Message>>>,
    }

    impl SendRecorder {
        pub fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                sent: Arc::new(Mutex::new(Vec::new())),
            })
        }
    }

    #[async_trait]
    impl BackendPlugin for SendRecorder {
        fn name(&self) -> String {
            self.name.clone()
        }

        async fn start(&self, _sink: Arc<dyn InboundSink>) -> Result<(), BackendError> {
            Ok(())
        }

        async fn stop(&self) {}

        async fn send(&self, msg: Message) -> Result<(), BackendError> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    fn pipeline_with_apps(apps: Vec<Arc<dyn AppPlugin>>) -> Pipeline {
        let mut pipeline = Pipeline::new(Logger(Box::new(TracingLogger::new())));
        for app in apps {
            pipeline.add_app(app);
        }
        pipeline
    }

    #[tokio::test]
    async fn test_incoming_is_phase_major_app_order_minor() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = RecordingApp::new("A", log.clone());
        let b = RecordingApp::new("B", log.clone());
        let pipeline = pipeline_with_apps(vec![a, b]);

        let mut msg = Message::incoming("gsm0", None, "hello");
        pipeline.dispatch_incoming(&mut msg).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["A.parse", "B.parse", "A.handle", "B.handle", "A.cleanup", "B.cleanup"]
        );
    }

    #[tokio::test]
    async fn test_outgoing_runs_apps_then_sends_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = RecordingApp::new("A", log.clone());
        let b = RecordingApp::new("B", log.clone());
        let mut pipeline = pipeline_with_apps(vec![a, b]);

        let backend = SendRecorder::new("gsm0");
        pipeline.add_backend(backend.clone());

        let msg = Message::outgoing("gsm0", Some("+45550001".into()), "bye");
        let id = msg.id.clone();
        pipeline.dispatch_outgoing(msg).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["A.outgoing", "B.outgoing"]);
        let sent = backend.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, id);
    }

    #[tokio::test]
    async fn test_app_failure_does_not_block_the_pipeline() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = RecordingApp::new("A", log.clone());
        let pipeline = pipeline_with_apps(vec![Arc::new(BrokenApp), a]);

        let mut msg = Message::incoming("gsm0", None, "hello");
        pipeline.dispatch_incoming(&mut msg).await;

        // the broken app failed every phase, A still saw all of them
        assert_eq!(*log.lock().unwrap(), vec!["A.parse", "A.handle", "A.cleanup"]);
    }

    #[tokio::test]
    async fn test_outgoing_to_unknown_backend_errors() {
        let pipeline = pipeline_with_apps(vec![]);
        let msg = Message::outgoing("nowhere", None, "lost");
        let err = pipeline.dispatch_outgoing(msg).await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownBackend(name) if name == "nowhere"));
    }

    #[tokio::test]
    async fn test_later_apps_observe_earlier_mutations() {
        struct Tagger;

        #[async_trait]
        impl AppPlugin for Tagger {
            fn name(&self) -> String {
                "tagger".into()
            }

            async fn parse(&self, msg: &mut Message) -> Result<(), AppError> {
                msg.set("lang".to_string(), json!("en"));
                Ok(())
            }
        }

        struct Checker {
            seen: Arc<Mutex<Option<serde_json::Value>>>,
        }

        #[async_trait]
        impl AppPlugin for Checker {
            fn name(&self) -> String {
                "checker".into()
            }

            async fn parse(&self, msg: &mut Message) -> Result<(), AppError> {
                *self.seen.lock().unwrap() = msg.get("lang").cloned();
                Ok(())
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let pipeline = pipeline_with_apps(vec![
            Arc::new(Tagger),
            Arc::new(Checker { seen: seen.clone() }),
        ]);

        let mut msg = Message::incoming("gsm0", None, "hej");
        pipeline.dispatch_incoming(&mut msg).await;

        assert_eq!(*seen.lock().unwrap(), Some(json!("en")));
    }
}
