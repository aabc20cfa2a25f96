pub mod app;
pub mod config;
pub mod detector;
pub mod emitter;
pub mod k8s;
pub mod logging;
pub mod monitor;
pub mod state;
pub mod version;
pub mod watch;

// Re-export main types
pub use detector::RestartRecord;
pub use emitter::EventEmitter;
pub use monitor::RestartMonitor;
pub use state::PodStore;
pub use watch::WatchCoordinator;
