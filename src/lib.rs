pub mod config;
pub mod logger;
pub mod router;

pub use config::{ConfigManager, EnvConfigManager, MapConfigManager, RouterConfig};
pub use logger::{init_tracing, Logger, LoggerType, TracingLogger};
pub use router::{Router, RouterError, StopHandle};
