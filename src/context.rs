//! Frame Context
//!
//! Tracks which frame driver commands run against while the page rebuilds
//! its frame tree underneath them.
//!
//! One task feeds protocol events in through [`FrameContext::handle`]; any
//! number of command tasks read the published [`FrameState`] and park on the
//! readiness or page-load gates. Event handling is serialized behind an async
//! mutex, readers never take it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cdp::types::PageFrameDetachedEvent;
use crate::cdp::CdpMessage;
use crate::error::{Error, Result};
use crate::event::{ChildIframeInserted, FrameEvent, MutationEvent, NodeId};
use crate::frame::{FrameHandle, NodeResolver, RemoteNode, RemoteWindow};
use crate::journal::EventJournal;
use crate::FrameConfig;

/// What command tasks see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameState {
    /// Current (iframe, document, window) triple
    pub frame: Arc<FrameHandle>,
    /// No iframe is selected
    pub on_main_frame: bool,
    /// False while a detached frame's replacement is awaited
    pub ready: bool,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            frame: Arc::new(FrameHandle::default()),
            on_main_frame: true,
            ready: true,
        }
    }
}

/// State only the event path touches
#[derive(Debug, Default)]
struct Tracker {
    main_frame: Arc<FrameHandle>,
    awaited_parent: Option<NodeId>,
    journal: EventJournal,
}

/// Frame-context state machine for one page session
pub struct FrameContext<R> {
    resolver: R,
    config: FrameConfig,
    tracker: Mutex<Tracker>,
    state: watch::Sender<FrameState>,
    page_loaded: watch::Sender<bool>,
}

impl<R> std::fmt::Debug for FrameContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameContext")
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<R: NodeResolver> FrameContext<R> {
    /// Create a context with the default polling bounds
    pub fn new(resolver: R) -> Self {
        Self::with_config(resolver, FrameConfig::default())
    }

    pub fn with_config(resolver: R, config: FrameConfig) -> Self {
        Self {
            resolver,
            config,
            tracker: Mutex::new(Tracker::default()),
            state: watch::Sender::new(FrameState::default()),
            page_loaded: watch::Sender::new(false),
        }
    }

    /// Get the resolver
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    /// Apply one DOM mutation.
    ///
    /// Failures (e.g. the replacement's window cannot be resolved) are logged
    /// and the event is dropped; a caller will see it later as a readiness
    /// timeout.
    pub async fn handle(&self, event: MutationEvent) {
        let mut tracker = self.tracker.lock().await;
        if let Err(e) = self.apply(&mut tracker, event).await {
            tracing::warn!("Dropped frame event: {}", e);
        }
    }

    async fn apply(&self, tracker: &mut Tracker, event: MutationEvent) -> Result<()> {
        match event {
            MutationEvent::ChildNodeRemoved { node, parent } => {
                tracker.journal.discard_node(node);

                let current = Arc::clone(&self.state.borrow().frame);
                let is_current = current.iframe().is_some_and(|f| f.node_id == node);
                if !is_current {
                    return Ok(());
                }

                tracing::debug!("Current frame {} is gone, parent = {}", node, parent);
                tracker.awaited_parent = Some(parent);
                self.state.send_modify(|s| s.ready = false);

                match tracker.journal.count_matching(parent) {
                    0 => Ok(()),
                    1 => {
                        let claimed = tracker.journal.take_matching(parent).into_iter().next();
                        match claimed {
                            Some(inserted) => self.reattach(tracker, inserted).await,
                            None => Ok(()),
                        }
                    }
                    candidates => {
                        let anomaly = Error::ProtocolAnomaly { parent, candidates };
                        tracing::warn!("{}; waiting for further events", anomaly);
                        Ok(())
                    }
                }
            }
            MutationEvent::ChildIframeInserted(inserted) => {
                let ready = self.state.borrow().ready;
                if !ready && tracker.awaited_parent == Some(inserted.parent) {
                    tracing::debug!("Replacement frame {} is here", inserted.node);
                    self.reattach(tracker, inserted).await
                } else {
                    tracker.journal.record(inserted);
                    Ok(())
                }
            }
        }
    }

    async fn reattach(&self, tracker: &mut Tracker, inserted: ChildIframeInserted) -> Result<()> {
        let mut iframe = self.resolver.node(inserted.node).await?;
        if iframe.frame_id.is_none() {
            iframe.frame_id = inserted.frame_id;
        }
        let document = self.resolver.node(inserted.content_document).await?;
        let window = self.resolver.content_window(&iframe).await?;
        self.install(tracker, FrameHandle::child(iframe, document, window));
        Ok(())
    }

    /// Set-current-frame protocol. Always leaves the context ready.
    fn install(&self, tracker: &mut Tracker, frame: FrameHandle) {
        let on_main_frame = frame.iframe().is_none();
        let current = match (frame.iframe().is_none(), frame.document().is_none()) {
            // switch to default content
            (true, true) => Arc::clone(&tracker.main_frame),
            (true, false) => {
                let main = Arc::new(frame);
                tracker.main_frame = Arc::clone(&main);
                main
            }
            _ => Arc::new(frame),
        };
        tracker.awaited_parent = None;

        self.state.send_modify(|s| {
            s.frame = current;
            s.on_main_frame = on_main_frame;
            s.ready = true;
        });
    }

    /// Full reset: a new document replaced everything held so far
    pub async fn on_page_load(&self) {
        self.reset().await;
        self.page_loaded.send_replace(true);
        tracing::debug!("Page loaded, frame context reset");
    }

    /// Drop every frame reference: current frame, saved main frame and the
    /// insertion journal. Readiness and the awaited parent are left alone.
    pub async fn reset(&self) {
        let mut tracker = self.tracker.lock().await;
        tracker.main_frame = Arc::new(FrameHandle::default());
        tracker.journal.clear();
        self.state.send_modify(|s| {
            s.frame = Arc::new(FrameHandle::default());
            s.on_main_frame = true;
        });
    }

    /// Liveness check on a `Page.frameDetached`-style signal.
    ///
    /// When the payload names a frame other than the tracked one it is
    /// ignored. Otherwise, if the tracked iframe is confirmed gone, the
    /// context is forced ready so commands fail fast instead of waiting for a
    /// replacement that will never come.
    pub async fn on_frame_died(&self, payload: &Value) {
        let frame = Arc::clone(&self.state.borrow().frame);
        let Some(iframe) = frame.iframe() else {
            return;
        };

        let detached = serde_json::from_value::<PageFrameDetachedEvent>(payload.clone())
            .ok()
            .filter(|d| !d.frame_id.is_empty());
        if let (Some(detached), Some(tracked)) = (detached, iframe.frame_id.as_ref()) {
            if detached.frame_id != *tracked {
                tracing::trace!("Frame {} detached, tracking {}", detached.frame_id, tracked);
                return;
            }
        }

        match self.resolver.exists(iframe).await {
            Ok(false) => {
                tracing::debug!(
                    "Current frame {} is dead; switch to default content or another frame",
                    iframe.node_id
                );
                self.force_ready().await;
            }
            Ok(true) => {}
            Err(e) => tracing::debug!("Liveness probe for frame {} failed: {}", iframe.node_id, e),
        }
    }

    /// Route a decoded event
    pub async fn dispatch(&self, event: FrameEvent) {
        match event {
            FrameEvent::Mutation(mutation) => self.handle(mutation).await,
            FrameEvent::PageLoaded => self.on_page_load().await,
            FrameEvent::FrameDied(payload) => self.on_frame_died(&payload).await,
        }
    }

    /// Process a CDP message.
    /// Returns true if the message was a frame event that was processed
    pub async fn process_message(&self, message: &CdpMessage) -> bool {
        match FrameEvent::from_message(message) {
            Some(event) => {
                self.dispatch(event).await;
                true
            }
            None => false,
        }
    }

    /// Consume the delivery channel until the sender side goes away
    pub async fn run(&self, mut events: mpsc::Receiver<CdpMessage>) {
        while let Some(message) = events.recv().await {
            self.process_message(&message).await;
        }
        tracing::debug!("Frame event loop ended");
    }

    /// Run the event loop on a tokio task
    pub fn spawn(self: &Arc<Self>, events: mpsc::Receiver<CdpMessage>) -> JoinHandle<()>
    where
        R: 'static,
    {
        let context = Arc::clone(self);
        tokio::spawn(async move { context.run(events).await })
    }

    // =========================================================================
    // Driver-side switching
    // =========================================================================

    /// Set the current frame directly (set-current-frame protocol)
    pub async fn set_current_frame(&self, frame: FrameHandle) {
        let mut tracker = self.tracker.lock().await;
        self.install(&mut tracker, frame);
    }

    /// Establish the top-level document
    pub async fn set_main_document(&self, document: RemoteNode, window: RemoteWindow) {
        self.set_current_frame(FrameHandle::main(document, window))
            .await;
    }

    /// Enter the iframe `iframe` whose content document is `document`
    pub async fn switch_to_frame(&self, iframe: NodeId, document: NodeId) -> Result<()> {
        let iframe = self.resolver.node(iframe).await?;
        let document = self.resolver.node(document).await?;
        let window = self.resolver.content_window(&iframe).await?;
        self.set_current_frame(FrameHandle::child(iframe, document, window))
            .await;
        Ok(())
    }

    /// Go back to the saved main document
    pub async fn switch_to_default_content(&self) {
        self.set_current_frame(FrameHandle::default()).await;
    }

    // =========================================================================
    // Readers
    // =========================================================================

    /// Current document, waiting out an in-flight frame replacement.
    ///
    /// Waits at most `ready_max_attempts` × `ready_poll_interval`. On timeout
    /// the context is forced ready (so the next caller does not wait again)
    /// and the caller gets [`Error::Timeout`]; whatever is current afterwards
    /// may be stale.
    pub async fn current_document(&self) -> Result<Option<RemoteNode>> {
        if let Some(document) = self.ready_document() {
            return Ok(document);
        }

        let started = Instant::now();
        let mut rx = self.state.subscribe();

        for _ in 0..self.config.ready_max_attempts {
            let outcome = tokio::time::timeout(
                self.config.ready_poll_interval,
                rx.wait_for(|s| s.ready),
            )
            .await
            .map(|r| r.map(|s| s.frame.document().cloned()));

            match outcome {
                Ok(Ok(document)) => return Ok(document),
                Ok(Err(_)) => return Err(Error::ChannelClosed("frame state".into())),
                Err(_) => {}
            }
        }

        self.force_ready().await;
        tracing::warn!(
            "Document not ready after {} attempts, giving up",
            self.config.ready_max_attempts
        );
        Err(Error::timeout("document not ready", started.elapsed()))
    }

    fn ready_document(&self) -> Option<Option<RemoteNode>> {
        let state = self.state.borrow();
        state.ready.then(|| state.frame.document().cloned())
    }

    /// Current window. Never waits.
    pub fn window(&self) -> Option<RemoteWindow> {
        self.state.borrow().frame.window().cloned()
    }

    /// Current iframe element, `None` on the main frame
    pub fn current_frame(&self) -> Option<RemoteNode> {
        self.state.borrow().frame.iframe().cloned()
    }

    pub fn is_on_main_frame(&self) -> bool {
        self.state.borrow().on_main_frame
    }

    pub fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    /// Copy of the published state
    pub fn snapshot(&self) -> FrameState {
        self.state.borrow().clone()
    }

    /// Parent node a replacement frame is expected under, if any
    pub async fn awaited_parent(&self) -> Option<NodeId> {
        self.tracker.lock().await.awaited_parent
    }

    /// Number of journaled insertions nobody has claimed yet
    pub async fn pending_insertions(&self) -> usize {
        self.tracker.lock().await.journal.len()
    }

    /// Wait for the next page load.
    ///
    /// The load signal is consumed: a later waiter needs a later load.
    pub async fn wait_for_page_to_load(&self, timeout_ms: u64) -> Result<()> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(timeout_ms);
        let mut rx = self.page_loaded.subscribe();

        loop {
            if self.page_loaded.send_if_modified(|loaded| std::mem::take(loaded)) {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::timeout(
                    format!("failed to load the page after {}ms", timeout_ms),
                    started.elapsed(),
                ));
            }

            let wait = self.config.page_load_poll_interval.min(deadline - now);
            let _ = tokio::time::timeout(wait, rx.changed()).await;
        }
    }

    /// Give up on the awaited replacement
    async fn force_ready(&self) {
        let mut tracker = self.tracker.lock().await;
        tracker.awaited_parent = None;
        self.state.send_if_modified(|s| {
            let flipped = !s.ready;
            s.ready = true;
            flipped
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeResolver {
        dead: StdMutex<HashSet<NodeId>>,
        broken_windows: bool,
    }

    #[async_trait]
    impl NodeResolver for FakeResolver {
        async fn node(&self, node_id: NodeId) -> Result<RemoteNode> {
            Ok(RemoteNode {
                node_id,
                object_id: Some(format!("node-{}", node_id)),
                frame_id: None,
            })
        }

        async fn content_window(&self, iframe: &RemoteNode) -> Result<RemoteWindow> {
            if self.broken_windows {
                return Err(Error::CdpSimple("contentWindow unavailable".into()));
            }
            Ok(RemoteWindow::new(format!("window-{}", iframe.node_id)))
        }

        async fn exists(&self, node: &RemoteNode) -> Result<bool> {
            Ok(!self.dead.lock().unwrap().contains(&node.node_id))
        }
    }

    fn fast_context() -> FrameContext<FakeResolver> {
        FrameContext::with_config(FakeResolver::default(), FrameConfig::fast())
    }

    /// Put the context inside iframe 10 (document 11) hosted by node 1
    async fn enter_iframe(ctx: &FrameContext<FakeResolver>) {
        ctx.switch_to_frame(NodeId(10), NodeId(11)).await.unwrap();
    }

    #[tokio::test]
    async fn test_starts_ready_on_main_frame() {
        let ctx = fast_context();
        assert!(ctx.is_ready());
        assert!(ctx.is_on_main_frame());
        assert!(ctx.current_frame().is_none());
        assert_eq!(ctx.current_document().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unrelated_removal_ignored() {
        let ctx = fast_context();
        enter_iframe(&ctx).await;
        let before = ctx.snapshot();

        ctx.handle(MutationEvent::removed(99, 1)).await;

        assert_eq!(ctx.snapshot(), before);
        assert_eq!(ctx.awaited_parent().await, None);
    }

    #[tokio::test]
    async fn test_removal_of_current_frame_awaits_parent() {
        let ctx = fast_context();
        enter_iframe(&ctx).await;

        ctx.handle(MutationEvent::removed(10, 1)).await;

        assert!(!ctx.is_ready());
        assert_eq!(ctx.awaited_parent().await, Some(NodeId(1)));
    }

    #[tokio::test]
    async fn test_insert_under_other_parent_is_journaled() {
        let ctx = fast_context();
        enter_iframe(&ctx).await;
        ctx.handle(MutationEvent::removed(10, 1)).await;

        ctx.handle(MutationEvent::iframe_inserted(30, 2, 31)).await;

        assert!(!ctx.is_ready());
        assert_eq!(ctx.pending_insertions().await, 1);
    }

    #[tokio::test]
    async fn test_failed_reattach_is_dropped() {
        let ctx = FrameContext::with_config(
            FakeResolver {
                broken_windows: true,
                ..Default::default()
            },
            FrameConfig::fast(),
        );
        ctx.set_current_frame(FrameHandle::child(
            RemoteNode::new(10),
            RemoteNode::new(11),
            RemoteWindow::new("w"),
        ))
        .await;
        ctx.handle(MutationEvent::removed(10, 1)).await;

        ctx.handle(MutationEvent::iframe_inserted(20, 1, 21)).await;

        assert!(!ctx.is_ready());
        assert_eq!(ctx.pending_insertions().await, 0);
    }

    #[tokio::test]
    async fn test_reattach_clears_awaited_parent() {
        let ctx = fast_context();
        enter_iframe(&ctx).await;
        ctx.handle(MutationEvent::removed(10, 1)).await;
        ctx.handle(MutationEvent::iframe_inserted(20, 1, 21)).await;

        assert!(ctx.is_ready());
        assert!(!ctx.is_on_main_frame());
        assert_eq!(ctx.awaited_parent().await, None);
        assert_eq!(
            ctx.window(),
            Some(RemoteWindow::new("window-20"))
        );
    }

    #[tokio::test]
    async fn test_frame_died_forces_ready_when_gone() {
        let ctx = fast_context();
        enter_iframe(&ctx).await;
        ctx.handle(MutationEvent::removed(10, 1)).await;
        assert!(!ctx.is_ready());

        ctx.resolver().dead.lock().unwrap().insert(NodeId(10));
        ctx.on_frame_died(&serde_json::json!({})).await;

        assert!(ctx.is_ready());
        assert_eq!(ctx.awaited_parent().await, None);
    }

    #[tokio::test]
    async fn test_frame_died_for_live_frame_is_noop() {
        let ctx = fast_context();
        enter_iframe(&ctx).await;
        ctx.handle(MutationEvent::removed(10, 1)).await;

        ctx.on_frame_died(&serde_json::json!({})).await;

        assert!(!ctx.is_ready());
    }

    #[tokio::test]
    async fn test_frame_died_for_other_frame_id_ignored() {
        let ctx = fast_context();
        let mut iframe = RemoteNode::new(10);
        iframe.frame_id = Some("TRACKED".into());
        ctx.set_current_frame(FrameHandle::child(
            iframe,
            RemoteNode::new(11),
            RemoteWindow::new("w"),
        ))
        .await;
        ctx.handle(MutationEvent::removed(10, 1)).await;
        ctx.resolver().dead.lock().unwrap().insert(NodeId(10));

        ctx.on_frame_died(&serde_json::json!({ "frameId": "OTHER" }))
            .await;
        assert!(!ctx.is_ready());

        ctx.on_frame_died(&serde_json::json!({ "frameId": "TRACKED" }))
            .await;
        assert!(ctx.is_ready());
    }

    #[tokio::test]
    async fn test_reset_clears_journal_keeps_awaited_parent() {
        let ctx = fast_context();
        enter_iframe(&ctx).await;
        ctx.handle(MutationEvent::removed(10, 1)).await;
        ctx.handle(MutationEvent::iframe_inserted(30, 2, 31)).await;

        ctx.reset().await;

        assert_eq!(ctx.pending_insertions().await, 0);
        assert_eq!(ctx.awaited_parent().await, Some(NodeId(1)));
        assert!(!ctx.is_ready());
    }

    #[tokio::test]
    async fn test_page_load_clears_journal() {
        let ctx = fast_context();
        ctx.handle(MutationEvent::iframe_inserted(20, 1, 21)).await;
        assert_eq!(ctx.pending_insertions().await, 1);

        ctx.on_page_load().await;

        assert_eq!(ctx.pending_insertions().await, 0);
        assert!(ctx.snapshot().frame.is_empty());
    }
}
