pub mod app;
pub mod backend;
pub mod message;

pub use app::{AppError, AppPlugin, Phase};
pub use backend::{BackendError, BackendPlugin, BackendState, InboundSink, LogLevel};
pub use message::{Message, MessageDirection};
