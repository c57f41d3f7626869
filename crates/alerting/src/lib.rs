//! Alerting System
//!
//! Advisory diagnostics for the mileage engine: consistency checks over
//! computed distances, diagnostic event types, and pluggable sinks with
//! deduplication and throttling.

mod event;
mod manager;
mod monitor;
mod sink;

pub use event::{DiagnosticEvent, DiagnosticKind, Severity};
pub use manager::{AlertConfig, ThrottledSink};
pub use monitor::{ConsistencyMonitor, MonitorConfig, WindowScope};
pub use sink::{spawn_drain, ChannelSink, DiagnosticSink, MemorySink, TracingSink};
