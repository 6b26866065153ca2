//! Transport seam for the connection manager
//!
//! A [`Connector`] opens a [`Link`]: a write half owned by the connection
//! manager and a read half drained by a per-connection reader task.

mod websocket;

use async_trait::async_trait;

use crate::error::Result;

pub use websocket::WebSocketConnector;

/// Write half of an open transport
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the transport with a normal-closure code
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open transport
#[async_trait]
pub trait FrameSource: Send {
    /// Next text frame; `None` once the transport has closed
    async fn next(&mut self) -> Option<Result<String>>;
}

/// One open physical connection
pub struct Link {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

impl Link {
    pub fn new(sink: impl FrameSink + 'static, source: impl FrameSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

/// Opens links to service endpoints
///
/// Returning `Ok` means the service handshake completed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Link>;
}
