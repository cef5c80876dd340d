//! Infrastructure layer for configuration, logging, HTTP and storage
//!
//! Everything here talks to the outside world (files, network, clock); the
//! extraction and matching layers stay free of I/O.

pub mod clock;
pub mod config; // Configuration file, env layering and defaults
pub mod logging;
pub mod remote_api; // Marketplace-data proxy client
pub mod sandbox;
pub mod simple_http_client;
pub mod storage;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigManager, SharedConfig};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use remote_api::{ProductSearchApi, RemoteApiClient};
pub use sandbox::{with_sandbox, HttpSandboxFactory, Sandbox, SandboxFactory, SandboxHandle};
pub use simple_http_client::HttpClient;
pub use storage::{DurableStore, JsonFileStore, MemoryStore};
