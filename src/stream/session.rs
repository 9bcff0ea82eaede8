//! Session state machine for one logical stream
//!
//! A [`StreamSession`] owns the observable state of the stream it is
//! currently consuming: the accumulated text and a status of
//! `Idle → Loading → {Done, Failed}`. Every `start()` and every effective
//! `cancel()` bumps the session [`Generation`]; the driver task for a stream
//! re-checks its generation under the session lock before each mutation, so
//! a superseded transport can never write into a newer session.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::decoder::{decode, Message};
use super::framer::LineFramer;
use super::transport::{ByteReader, CancelHandle, ReadOutcome, StreamRequest, Transport};
use crate::metrics::MetricsTracker;

/// Longest frame excerpt written to logs
const FRAME_PREVIEW_CHARS: usize = 120;

/// Identifies which `start()` call a transport or message belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StreamStatus {
    /// Nothing running; the initial state and the state after `cancel()`
    Idle,
    Loading,
    Done,
    Failed(String),
}

/// Observable state, republished after every applied mutation.
///
/// The published snapshot is the only copy of the accumulated text; chunks
/// are appended to it in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamSnapshot {
    pub text: String,
    pub loading: bool,
    pub error: Option<String>,
    pub done: bool,
}

impl StreamSnapshot {
    fn sync_status(&mut self, status: &StreamStatus) {
        self.loading = *status == StreamStatus::Loading;
        self.error = match status {
            StreamStatus::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        self.done = *status == StreamStatus::Done;
    }
}

#[derive(Debug)]
struct SessionState {
    generation: Generation,
    status: StreamStatus,
    cancel: Option<CancelHandle>,
}

impl SessionState {
    fn accepts(&self, generation: Generation) -> bool {
        self.generation == generation && self.status == StreamStatus::Loading
    }
}

enum Flow {
    Continue,
    Stop,
}

struct Shared {
    state: Mutex<SessionState>,
    snapshot_tx: watch::Sender<StreamSnapshot>,
    metrics: MetricsTracker,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &SessionState) {
        self.publish_with(state, |_| {});
    }

    /// Publish the current status along with an in-place edit of the text.
    ///
    /// Callers hold the state lock, so publications follow mutation order.
    fn publish_with(&self, state: &SessionState, edit: impl FnOnce(&mut String)) {
        self.snapshot_tx.send_modify(|snapshot| {
            edit(&mut snapshot.text);
            snapshot.sync_status(&state.status);
        });
    }

    fn text_chars(&self) -> usize {
        self.snapshot_tx.borrow().text.chars().count()
    }

    fn apply_frame(&self, generation: Generation, frame: &str) -> Flow {
        match decode(frame) {
            Ok(Some(message)) => self.apply(generation, message),
            Ok(None) => Flow::Continue,
            Err(fault) => {
                if !self.lock().accepts(generation) {
                    debug!("Discarding frame from superseded stream {}", generation);
                    self.metrics.record_stale_frame();
                    return Flow::Stop;
                }
                warn!(
                    "Dropping undecodable frame in {}: {} ({})",
                    generation,
                    fault,
                    preview(frame)
                );
                self.metrics.record_decode_fault();
                Flow::Continue
            }
        }
    }

    fn apply(&self, generation: Generation, message: Message) -> Flow {
        let mut state = self.lock();
        if !state.accepts(generation) {
            debug!("Discarding frame from superseded stream {}", generation);
            self.metrics.record_stale_frame();
            return Flow::Stop;
        }

        match message {
            Message::Chunk { content } => {
                self.publish_with(&state, |text| text.push_str(&content));
                self.metrics.record_chunk(content.chars().count());
                Flow::Continue
            }
            Message::Status { fields } => {
                debug!("Status update for {}: {:?}", generation, fields);
                self.metrics.record_status();
                Flow::Continue
            }
            Message::Error { content } => {
                warn!("Stream {} reported an error: {}", generation, content);
                state.status = StreamStatus::Failed(content);
                state.cancel = None;
                self.publish(&state);
                self.metrics.record_failed();
                Flow::Stop
            }
        }
    }

    fn fail(&self, generation: Generation, reason: String) {
        let mut state = self.lock();
        if !state.accepts(generation) {
            return;
        }
        warn!("Stream {} failed: {}", generation, reason);
        state.status = StreamStatus::Failed(reason);
        state.cancel = None;
        self.publish(&state);
        self.metrics.record_failed();
    }

    fn complete(&self, generation: Generation) {
        let mut state = self.lock();
        if !state.accepts(generation) {
            return;
        }
        info!("Stream {} finished ({} chars)", generation, self.text_chars());
        state.status = StreamStatus::Done;
        state.cancel = None;
        self.publish(&state);
        self.metrics.record_done();
    }
}

/// Live, cancellable consumer of one newline-delimited report stream at a
/// time.
///
/// `start` spawns a tokio task and must be called from within a runtime.
pub struct StreamSession {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
}

impl StreamSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_metrics(transport, MetricsTracker::new())
    }

    pub fn with_metrics(transport: Arc<dyn Transport>, metrics: MetricsTracker) -> Self {
        let state = SessionState {
            generation: Generation::default(),
            status: StreamStatus::Idle,
            cancel: None,
        };
        let (snapshot_tx, _) = watch::channel(StreamSnapshot::default());

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                snapshot_tx,
                metrics,
            }),
            transport,
        }
    }

    /// Begin a new stream, superseding any stream still in flight.
    ///
    /// The accumulated text is reset immediately.
    pub fn start(&self, request: impl Into<StreamRequest>) -> Generation {
        let request = request.into();
        let cancel = CancelHandle::new();

        let generation = {
            let mut state = self.shared.lock();
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }
            if state.status == StreamStatus::Loading {
                debug!("Superseding stream {}", state.generation);
                self.shared.metrics.record_cancelled();
            }
            state.generation = state.generation.next();
            state.status = StreamStatus::Loading;
            state.cancel = Some(cancel.clone());
            self.shared.publish_with(&state, String::clear);
            state.generation
        };

        self.shared.metrics.record_started();
        info!("Starting stream {}: {:?} {}", generation, request.method, request.url);

        tokio::spawn(drive(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            request,
            generation,
            cancel,
        ));

        generation
    }

    /// Stop the active stream and return to `Idle`, keeping the text.
    ///
    /// Returns `false` without touching anything if no stream is loading.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.lock();
        if state.status != StreamStatus::Loading {
            return false;
        }

        if let Some(handle) = state.cancel.take() {
            handle.cancel();
        }
        info!("Cancelled stream {}", state.generation);
        state.generation = state.generation.next();
        state.status = StreamStatus::Idle;
        self.shared.publish(&state);
        self.shared.metrics.record_cancelled();
        true
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.lock().status.clone()
    }

    pub fn generation(&self) -> Generation {
        self.shared.lock().generation
    }

    pub fn snapshot(&self) -> StreamSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    ///
    /// Intermediate snapshots may be coalesced, but the latest one is always
    /// observed and text only ever grows within a generation.
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Wait until the session is no longer loading
    pub async fn wait(&self) -> StreamSnapshot {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|snapshot| !snapshot.loading)
            .await
            .map(|snapshot| StreamSnapshot::clone(&snapshot));
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.shared.metrics
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if let Some(handle) = state.cancel.take() {
            handle.cancel();
        }
        state.generation = state.generation.next();
    }
}

async fn drive(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    request: StreamRequest,
    generation: Generation,
    cancel: CancelHandle,
) {
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("Stream {} cancelled before the response arrived", generation);
            return;
        }
        opened = transport.open(&request) => match opened {
            Ok(body) => body,
            Err(e) => {
                shared.fail(generation, e.to_string());
                return;
            }
        },
    };

    let mut reader = ByteReader::new(body, cancel);
    let mut framer = LineFramer::new();

    loop {
        match reader.read().await {
            Ok(ReadOutcome::Chunk(bytes)) => {
                shared.metrics.record_bytes(bytes.len());
                let frames = framer.feed(&bytes);
                shared.metrics.record_frames(frames.len());
                for frame in &frames {
                    if let Flow::Stop = shared.apply_frame(generation, frame) {
                        return;
                    }
                }
            }
            Ok(ReadOutcome::End) => {
                if let Some(frame) = framer.finish() {
                    shared.metrics.record_frames(1);
                    if let Flow::Stop = shared.apply_frame(generation, &frame) {
                        return;
                    }
                }
                shared.complete(generation);
                return;
            }
            Ok(ReadOutcome::Aborted) => {
                debug!("Stream {} aborted", generation);
                return;
            }
            Err(e) => {
                shared.fail(generation, e.to_string());
                return;
            }
        }
    }
}

fn preview(frame: &str) -> String {
    let mut chars = frame.chars();
    let head: String = chars.by_ref().take(FRAME_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::transport::{BodyStream, TransportError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures_util::StreamExt;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    type BodySender = mpsc::Sender<Result<Bytes, TransportError>>;

    /// Transport whose bodies are fed by the test through channels
    #[derive(Default)]
    struct ScriptedTransport {
        bodies: std::sync::Mutex<VecDeque<Result<ReceiverStream<Result<Bytes, TransportError>>, TransportError>>>,
    }

    impl ScriptedTransport {
        fn push_body(&self) -> BodySender {
            let (tx, rx) = mpsc::channel(64);
            self.bodies
                .lock()
                .unwrap()
                .push_back(Ok(ReceiverStream::new(rx)));
            tx
        }

        fn push_error(&self, err: TransportError) {
            self.bodies.lock().unwrap().push_back(Err(err));
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&self, _request: &StreamRequest) -> Result<BodyStream, TransportError> {
            let next = self.bodies.lock().unwrap().pop_front();
            match next {
                Some(Ok(body)) => Ok(body.boxed()),
                Some(Err(e)) => Err(e),
                None => Err(TransportError::Stream("no scripted body".into())),
            }
        }
    }

    fn session() -> (StreamSession, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        (StreamSession::new(transport.clone()), transport)
    }

    async fn send(tx: &BodySender, bytes: &[u8]) {
        tx.send(Ok(Bytes::copy_from_slice(bytes)))
            .await
            .expect("body receiver alive");
    }

    async fn settled(session: &StreamSession) -> StreamSnapshot {
        tokio::time::timeout(Duration::from_secs(2), session.wait())
            .await
            .expect("session settled")
    }

    async fn wait_for_text(session: &StreamSession, expected: &str) {
        let mut rx = session.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.text == expected))
            .await
            .expect("text arrived")
            .expect("session alive");
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let (session, _) = session();
        assert_eq!(session.status(), StreamStatus::Idle);
        assert_eq!(session.snapshot(), StreamSnapshot::default());
        assert_eq!(session.generation().value(), 0);
    }

    #[tokio::test]
    async fn test_split_record_assembles_hello_world() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        assert!(session.snapshot().loading);

        send(&tx, br#"{"type":"chunk","content":"Hel"#).await;
        send(&tx, b"lo\"}\n{\"type\":\"chunk\",\"content\":\" World\"}\n").await;
        wait_for_text(&session, "Hello World").await;
        assert_eq!(session.status(), StreamStatus::Loading);

        drop(tx);
        let snapshot = settled(&session).await;
        assert_eq!(snapshot.text, "Hello World");
        assert!(snapshot.done);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.error, None);
        assert_eq!(session.status(), StreamStatus::Done);
        assert_eq!(session.metrics().get_metrics().chunks_applied, 2);
    }

    #[tokio::test]
    async fn test_error_frame_fails_session() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(&tx, b"{\"type\":\"error\",\"content\":\"rate limited\"}\n").await;

        let snapshot = settled(&session).await;
        assert_eq!(session.status(), StreamStatus::Failed("rate limited".into()));
        assert_eq!(snapshot.error.as_deref(), Some("rate limited"));
        assert_eq!(snapshot.text, "");
        assert!(!snapshot.done);
    }

    #[tokio::test]
    async fn test_error_after_text_preserves_partial_answer() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(
            &tx,
            b"{\"type\":\"chunk\",\"content\":\"partial\"}\n{\"type\":\"error\",\"content\":\"model overloaded\"}\n{\"type\":\"chunk\",\"content\":\" ignored\"}\n",
        )
        .await;

        let snapshot = settled(&session).await;
        assert_eq!(snapshot.text, "partial");
        assert_eq!(snapshot.error.as_deref(), Some("model overloaded"));
    }

    #[tokio::test]
    async fn test_open_failure_fails_session() {
        let (session, transport) = session();
        transport.push_error(TransportError::Status {
            status: 503,
            body: "busy".into(),
        });

        session.start("http://localhost/stream");
        let snapshot = settled(&session).await;
        let error = snapshot.error.expect("failure reason");
        assert!(error.contains("503"), "{}", error);
        assert_eq!(session.metrics().get_metrics().sessions_failed, 1);
    }

    #[tokio::test]
    async fn test_mid_stream_transport_error_keeps_text() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(&tx, b"{\"type\":\"chunk\",\"content\":\"so far\"}\n").await;
        tx.send(Err(TransportError::Stream("connection reset".into())))
            .await
            .expect("body receiver alive");

        let snapshot = settled(&session).await;
        assert_eq!(snapshot.text, "so far");
        assert!(snapshot.error.expect("failure reason").contains("connection reset"));
    }

    #[tokio::test]
    async fn test_malformed_line_is_dropped() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(
            &tx,
            b"{\"type\":\"chunk\",\"content\":\"a\"}\nnot json at all\n{\"type\":\"chunk\",\"content\":\"b\"}\n",
        )
        .await;
        wait_for_text(&session, "ab").await;
        assert_eq!(session.status(), StreamStatus::Loading);

        drop(tx);
        let snapshot = settled(&session).await;
        assert!(snapshot.done);

        let metrics = session.metrics().get_metrics();
        assert_eq!(metrics.decode_faults, 1);
        assert_eq!(metrics.chunks_applied, 2);
    }

    #[tokio::test]
    async fn test_status_frames_do_not_touch_text() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(
            &tx,
            b"{\"type\":\"status\",\"stage\":\"loading quotes\"}\n{\"type\":\"chunk\",\"content\":\"x\"}\n",
        )
        .await;
        drop(tx);

        let snapshot = settled(&session).await;
        assert_eq!(snapshot.text, "x");
        assert_eq!(session.metrics().get_metrics().status_messages, 1);
    }

    #[tokio::test]
    async fn test_unterminated_final_record_applied() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(&tx, b"{\"type\":\"chunk\",\"content\":\"a\"}\n{\"type\":\"chunk\",\"content\":\"b\"}").await;
        drop(tx);

        let snapshot = settled(&session).await;
        assert_eq!(snapshot.text, "ab");
        assert!(snapshot.done);
    }

    #[tokio::test]
    async fn test_unterminated_final_error_fails() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(&tx, b"{\"type\":\"error\",\"content\":\"quota\"}").await;
        drop(tx);

        let snapshot = settled(&session).await;
        assert_eq!(snapshot.error.as_deref(), Some("quota"));
        assert!(!snapshot.done);
    }

    #[tokio::test]
    async fn test_byte_at_a_time_matches_single_batch() {
        let input = "{\"type\":\"chunk\",\"content\":\"涨停\"}\n{\"type\":\"status\"}\n{\"type\":\"chunk\",\"content\":\" board\"}";

        let (whole, transport) = session();
        let tx = transport.push_body();
        whole.start("http://localhost/stream");
        send(&tx, input.as_bytes()).await;
        drop(tx);
        let expected = settled(&whole).await;

        let (split, transport) = session();
        let tx = transport.push_body();
        split.start("http://localhost/stream");
        for byte in input.as_bytes() {
            send(&tx, std::slice::from_ref(byte)).await;
        }
        drop(tx);
        let actual = settled(&split).await;

        assert_eq!(actual, expected);
        assert_eq!(actual.text, "涨停 board");
        assert_eq!(
            split.metrics().get_metrics().chunks_applied,
            whole.metrics().get_metrics().chunks_applied
        );
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_answer_and_ignores_late_bytes() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(&tx, b"{\"type\":\"chunk\",\"content\":\"partial answer\"}\n").await;
        wait_for_text(&session, "partial answer").await;

        assert!(session.cancel());
        let snapshot = session.snapshot();
        assert_eq!(session.status(), StreamStatus::Idle);
        assert_eq!(snapshot.text, "partial answer");
        assert_eq!(snapshot.error, None);
        assert!(!snapshot.loading);

        // The reader may already be gone, in which case the send fails
        let _ = tx
            .send(Ok(Bytes::from_static(b"{\"type\":\"chunk\",\"content\":\" more\"}\n")))
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(session.snapshot(), snapshot);
        assert_eq!(session.status(), StreamStatus::Idle);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (session, transport) = session();
        assert!(!session.cancel());
        assert_eq!(session.snapshot(), StreamSnapshot::default());

        let _tx = transport.push_body();
        session.start("http://localhost/stream");
        assert!(session.cancel());
        let after_first = (session.snapshot(), session.generation());

        assert!(!session.cancel());
        assert_eq!((session.snapshot(), session.generation()), after_first);
        assert_eq!(session.metrics().get_metrics().sessions_cancelled, 1);
    }

    #[tokio::test]
    async fn test_cancel_after_done_is_noop() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        drop(tx);
        settled(&session).await;

        assert!(!session.cancel());
        assert_eq!(session.status(), StreamStatus::Done);
    }

    #[tokio::test]
    async fn test_restart_discards_stale_stream() {
        let (session, transport) = session();
        let old_tx = transport.push_body();
        let new_tx = transport.push_body();

        let first = session.start("http://localhost/a");
        send(&old_tx, b"{\"type\":\"chunk\",\"content\":\"old\"}\n").await;
        wait_for_text(&session, "old").await;

        let second = session.start("http://localhost/b");
        assert!(second > first);
        assert_eq!(session.snapshot().text, "");
        assert!(session.snapshot().loading);

        let _ = old_tx
            .send(Ok(Bytes::from_static(b"{\"type\":\"chunk\",\"content\":\"stale\"}\n")))
            .await;
        send(&new_tx, b"{\"type\":\"chunk\",\"content\":\"new\"}\n").await;
        drop(old_tx);
        drop(new_tx);

        let snapshot = settled(&session).await;
        assert_eq!(snapshot.text, "new");
        assert!(snapshot.done);
        assert_eq!(session.metrics().get_metrics().sessions_started, 2);
    }

    #[tokio::test]
    async fn test_stale_generation_cannot_mutate() {
        let (session, transport) = session();
        let _old = transport.push_body();
        let _new = transport.push_body();

        let stale = session.start("http://localhost/a");
        session.start("http://localhost/b");

        let flow = session
            .shared
            .apply_frame(stale, "{\"type\":\"chunk\",\"content\":\"late\"}");
        assert!(matches!(flow, Flow::Stop));
        session.shared.fail(stale, "late failure".into());
        session.shared.complete(stale);

        assert_eq!(session.snapshot().text, "");
        assert_eq!(session.status(), StreamStatus::Loading);
        assert_eq!(session.metrics().get_metrics().stale_frames, 1);
    }

    #[tokio::test]
    async fn test_garbage_from_superseded_stream_is_not_a_decode_fault() {
        let (session, transport) = session();
        let _old = transport.push_body();
        let _new = transport.push_body();

        let stale = session.start("http://localhost/a");
        let current = session.start("http://localhost/b");

        let flow = session.shared.apply_frame(stale, "not-json");
        assert!(matches!(flow, Flow::Stop));
        let metrics = session.metrics().get_metrics();
        assert_eq!(metrics.decode_faults, 0);
        assert_eq!(metrics.stale_frames, 1);

        let flow = session.shared.apply_frame(current, "not-json");
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(session.metrics().get_metrics().decode_faults, 1);
    }

    #[tokio::test]
    async fn test_many_chunks_accumulate_in_published_snapshot() {
        let (session, transport) = session();
        let _tx = transport.push_body();
        let generation = session.start("http://localhost/stream");
        let mut rx = session.subscribe();

        for _ in 0..5_000 {
            let flow = session
                .shared
                .apply_frame(generation, "{\"type\":\"chunk\",\"content\":\"ab\"}");
            assert!(matches!(flow, Flow::Continue));
        }

        assert!(rx.has_changed().expect("sender alive"));
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.text.len(), 10_000);
        assert!(snapshot.loading);
        assert_eq!(session.metrics().get_metrics().chunks_applied, 5_000);
    }

    #[tokio::test]
    async fn test_drop_cancels_in_flight_transport() {
        let (session, transport) = session();
        let tx = transport.push_body();

        session.start("http://localhost/stream");
        send(&tx, b"{\"type\":\"chunk\",\"content\":\"x\"}\n").await;
        wait_for_text(&session, "x").await;

        drop(session);
        tokio::time::timeout(Duration::from_secs(2), tx.closed())
            .await
            .expect("reader released after drop");
    }

    #[test]
    fn test_preview_truncates_long_frames() {
        let long = "x".repeat(FRAME_PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), FRAME_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
