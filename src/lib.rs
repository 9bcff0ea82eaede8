//! report-stream - Live consumer for AI report streams
//!
//! This library turns a long-lived HTTP response carrying newline-delimited
//! JSON messages into an append-only, cancellable text value that a UI can
//! re-render as it grows.
//!
//! ## Key Features
//!
//! - **Incremental framing**: tolerates records and UTF-8 characters split across reads
//! - **Fault isolation**: undecodable lines are logged, counted and skipped
//! - **Cancellation**: user stops end in `Idle`, never in an error state
//! - **Restart safety**: a generation tag keeps superseded streams from writing

pub mod config;
pub mod metrics;
pub mod render;
pub mod stream;

pub use config::{Config, ConfigBuilder, ConfigError};
pub use metrics::{MetricsSummary, MetricsTracker, StreamMetrics};
pub use stream::{
    connect, decode, DecodeFault, Generation, HttpTransport, LineFramer, Message, StreamError,
    StreamRequest, StreamSession, StreamSnapshot, StreamStatus, Transport, TransportError,
};
