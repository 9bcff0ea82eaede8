//! Incremental consumer for newline-delimited JSON report streams
//!
//! The pipeline runs transport → framer → decoder → session:
//! - [`transport`] opens the request and exposes the body as pulled byte batches
//! - [`framer`] turns byte batches into complete newline-delimited frames
//! - [`decoder`] validates each frame as a `chunk`, `status` or `error` message
//! - [`session`] applies messages in order and publishes the observable state

pub mod decoder;
pub mod framer;
pub mod session;
pub mod transport;

pub use decoder::{decode, DecodeFault, Message};
pub use framer::{LineFramer, Utf8Decoder};
pub use session::{Generation, StreamSession, StreamSnapshot, StreamStatus};
pub use transport::{
    BodyStream, ByteReader, CancelHandle, HttpTransport, Method, ReadOutcome, StreamRequest,
    Transport, TransportError,
};

use crate::config::{Config, ConfigError};
use crate::metrics::MetricsTracker;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Transport setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Build an HTTP-backed session from validated configuration
pub fn connect(config: &Config, metrics: MetricsTracker) -> Result<StreamSession, StreamError> {
    config.validate()?;
    let transport = HttpTransport::new(&config.server)?;
    Ok(StreamSession::with_metrics(Arc::new(transport), metrics))
}
