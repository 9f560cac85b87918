//! # Eoka Frames
//!
//! Frame-context tracking for CDP browser automation.
//!
//! Pages rebuild their frame tree behind the driver's back: an iframe is
//! reloaded, a single-page app swaps a widget, a navigation throws away the
//! whole document. Commands still have to run against the *current*
//! document and window. [`FrameContext`] consumes `DOM.childNodeRemoved`,
//! `DOM.childNodeInserted`, `Page.loadEventFired` and `Page.frameDetached`
//! in whatever order Chrome delivers them, follows the current frame to its
//! replacement, and hands out the current document with a bounded wait.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eoka_frames::{CdpMessage, CdpResolver, CommandChannel, FrameContext, Session};
//!
//! # async fn example(channel: Arc<dyn CommandChannel>) -> eoka_frames::Result<()> {
//! let session = Session::new(channel, "session-id");
//! let context = Arc::new(FrameContext::new(CdpResolver::new(session)));
//!
//! // Feed it the page's CDP events
//! let (tx, rx) = context.config().event_channel();
//! context.spawn(rx);
//! # let _: &tokio::sync::mpsc::Sender<CdpMessage> = &tx;
//!
//! // Commands resolve against whatever frame is current
//! context.wait_for_page_to_load(30_000).await?;
//! let document = context.current_document().await?;
//! # drop((tx, document));
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod cdp;
pub mod context;
pub mod error;
pub mod event;
pub mod frame;
pub mod journal;
pub mod resolver;

// Re-exports
pub use cdp::{CdpMessage, CommandChannel, Session};
pub use context::{FrameContext, FrameState};
pub use error::{Error, Result};
pub use event::{ChildIframeInserted, FrameEvent, MutationEvent, NodeId};
pub use frame::{FrameHandle, NodeResolver, RemoteNode, RemoteWindow};
pub use journal::EventJournal;
pub use resolver::CdpResolver;

/// Polling bounds for the readiness and page-load gates
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// How long one readiness attempt waits
    pub ready_poll_interval: Duration,
    /// Attempts before `current_document` gives up and forces ready
    pub ready_max_attempts: u32,
    /// Re-check interval while waiting for a page load
    pub page_load_poll_interval: Duration,
    /// Capacity of the event delivery channel
    pub event_buffer: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(250),
            ready_max_attempts: 20,
            page_load_poll_interval: Duration::from_millis(50),
            event_buffer: 256,
        }
    }
}

impl FrameConfig {
    /// Short intervals (local drivers, tests)
    pub fn fast() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(10),
            ready_max_attempts: 5,
            page_load_poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    /// Longest `current_document` will wait
    pub fn ready_timeout(&self) -> Duration {
        self.ready_poll_interval * self.ready_max_attempts
    }

    /// Delivery channel sized per this config
    pub fn event_channel(
        &self,
    ) -> (
        tokio::sync::mpsc::Sender<CdpMessage>,
        tokio::sync::mpsc::Receiver<CdpMessage>,
    ) {
        tokio::sync::mpsc::channel(self.event_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ready_timeout_is_five_seconds() {
        assert_eq!(FrameConfig::default().ready_timeout(), Duration::from_secs(5));
    }
}
