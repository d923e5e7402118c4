//! The single writer: pulls records from a transport and applies them.

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use ocsync_core::DecodeError;
use ocsync_events::{RawEvent, SseDecoder};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::handle::SharedStore;
use crate::store::ApplyOutcome;

/// Something that yields raw event records.
///
/// `None` means the stream ended. Errors for which
/// [`TransportError::is_recoverable`] holds skip one record; any other error
/// ends the stream.
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Option<Result<RawEvent, TransportError>>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<Result<RawEvent, TransportError>> {
    async fn next_event(&mut self) -> Option<Result<RawEvent, TransportError>> {
        self.recv().await
    }
}

/// Adapts a byte-chunk stream carrying server-sent events.
pub struct SseEventSource<S> {
    stream: S,
    decoder: SseDecoder,
    ready: VecDeque<Result<RawEvent, DecodeError>>,
}

impl<S> SseEventSource<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
        }
    }
}

#[async_trait]
impl<S, B, E> EventSource for SseEventSource<S>
where
    S: Stream<Item = Result<B, E>> + Unpin + Send,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    async fn next_event(&mut self) -> Option<Result<RawEvent, TransportError>> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Some(record.map_err(TransportError::from));
            }

            let Some(chunk) = self.stream.next().await else {
                if self.decoder.has_partial_record() {
                    warn!("Event stream ended in the middle of a record");
                }
                return None;
            };
            match chunk {
                Ok(chunk) => self.ready.extend(self.decoder.feed(chunk.as_ref())),
                Err(e) => return Some(Err(TransportError::stream(e.to_string()))),
            }
        }
    }
}

/// Why the event loop stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source reported end of stream.
    #[default]
    Closed,
    /// The cancellation token fired.
    Cancelled,
    /// The source failed.
    Failed(String),
}

/// Tally of one run of [`run_event_loop`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub applied: usize,
    pub unchanged: usize,
    pub buffered: usize,
    pub rejected: usize,
    pub dropped: usize,
    pub ignored: usize,
    pub malformed: usize,
    pub end: StreamEnd,
}

impl StreamSummary {
    fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied | ApplyOutcome::Connected => self.applied += 1,
            ApplyOutcome::Unchanged => self.unchanged += 1,
            ApplyOutcome::Buffered => self.buffered += 1,
            ApplyOutcome::Rejected(_) => self.rejected += 1,
            ApplyOutcome::Dropped => self.dropped += 1,
            ApplyOutcome::Ignored => self.ignored += 1,
        }
    }

    /// Records taken off the source, malformed ones included.
    pub fn total(&self) -> usize {
        self.applied
            + self.unchanged
            + self.buffered
            + self.rejected
            + self.dropped
            + self.ignored
            + self.malformed
    }
}

/// Drive `source` into `store` until the stream ends, fails or `cancel` fires.
///
/// Events are applied one at a time in arrival order. Malformed records are
/// logged and skipped. Whatever was applied before stopping stays applied.
pub async fn run_event_loop<S: EventSource>(
    mut source: S,
    store: SharedStore,
    cancel: CancellationToken,
) -> StreamSummary {
    info!("Event stream started");
    let mut summary = StreamSummary::default();

    let end = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break StreamEnd::Cancelled,
            next = source.next_event() => next,
        };

        let raw = match next {
            None => break StreamEnd::Closed,
            Some(Ok(raw)) => raw,
            Some(Err(e)) if e.is_recoverable() => {
                warn!(error = %e, "Dropping malformed record");
                summary.malformed += 1;
                continue;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Event stream failed");
                break StreamEnd::Failed(e.to_string());
            }
        };

        match raw.decode() {
            Ok(event) => {
                let outcome = store.apply(event);
                debug!(event = %raw.name, ?outcome, "Applied event");
                summary.record(&outcome);
            }
            Err(e) => {
                warn!(event = %raw.name, error = %e, "Dropping malformed event");
                summary.malformed += 1;
            }
        }
    };

    store.set_connected(false);
    summary.end = end;
    info!(
        applied = summary.applied,
        malformed = summary.malformed,
        end = ?summary.end,
        "Event stream ended"
    );
    summary
}

/// Run [`run_event_loop`] on its own task.
pub fn spawn_event_loop<S>(
    source: S,
    store: SharedStore,
    cancel: CancellationToken,
) -> JoinHandle<StreamSummary>
where
    S: EventSource + 'static,
{
    tokio::spawn(run_event_loop(source, store, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use ocsync_core::SyncConfig;

    fn chunks(
        parts: &[&'static str],
    ) -> impl Stream<Item = Result<&'static [u8], String>> + Unpin {
        stream::iter(
            parts
                .iter()
                .copied()
                .map(|p| Ok(p.as_bytes()))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_sse_source_yields_frames_across_chunks() {
        let mut source = SseEventSource::new(chunks(&[
            "data: {\"type\":\"server.con",
            "nected\",\"properties\":{}}\n\nid: 4\nevent: session.idle\n",
            "data: {\"properties\":{\"sessionID\":\"s\"}}\n\n",
        ]));

        let first = source.next_event().await.unwrap().unwrap();
        assert_eq!(first.name, "server.connected");
        let second = source.next_event().await.unwrap().unwrap();
        assert_eq!(second.name, "session.idle");
        assert_eq!(second.sequence(), Some(4));
        assert!(source.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_sse_source_reports_untyped_frame_as_malformed() {
        let mut source = SseEventSource::new(chunks(&["data: {\"properties\":{}}\n\n"]));
        let err = source.next_event().await.unwrap().unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_sse_source_keeps_characters_split_between_chunks() {
        let frame = "data: {\"type\":\"message.part.updated\",\"properties\":{\"part\":{\"id\":\"prt_1\",\"sessionID\":\"ses_1\",\"messageID\":\"msg_1\",\"type\":\"text\",\"text\":\"h\u{e9}llo\"},\"delta\":\"h\u{e9}llo\"}}\n\n";
        let bytes = frame.as_bytes();
        // cut between the two bytes of the é in the delta
        let cut = bytes.iter().rposition(|&b| b == 0xc3).unwrap() + 1;
        let (head, tail) = bytes.split_at(cut);
        let source = SseEventSource::new(stream::iter(vec![
            Ok::<_, String>(head.to_vec()),
            Ok(tail.to_vec()),
        ]));

        let store = SharedStore::new(&SyncConfig::default());
        store.insert_session(ocsync_core::Session::new("ses_1"));
        store.apply(ocsync_events::Event::MessageUpdated(ocsync_events::MessageInfo {
            info: ocsync_core::Message::new("msg_1", "ses_1", ocsync_core::Role::Assistant),
        }));

        let summary = run_event_loop(source, store.clone(), CancellationToken::new()).await;
        assert_eq!(summary.malformed, 0);
        assert_eq!(summary.applied, 1);
        assert_eq!(store.read().part("prt_1").and_then(|p| p.text()), Some("h\u{e9}llo"));
    }

    #[tokio::test]
    async fn test_sse_source_surfaces_stream_errors() {
        let failing = stream::iter(vec![Err::<&'static [u8], _>("connection reset".to_string())]);
        let mut source = SseEventSource::new(failing);
        let err = source.next_event().await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::Stream(ref msg) if msg == "connection reset"));
    }

    #[tokio::test]
    async fn test_loop_counts_outcomes_and_skips_malformed() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(RawEvent::new("server.connected", Vec::new())))
            .await
            .unwrap();
        tx.send(Ok(RawEvent::new("session.idle", b"{".to_vec())))
            .await
            .unwrap();
        tx.send(Err(TransportError::from(
            ocsync_core::DecodeError::MissingField("type"),
        )))
        .await
        .unwrap();
        tx.send(Ok(RawEvent::new("tui.toast.show", b"{}".to_vec())))
            .await
            .unwrap();
        drop(tx);

        let store = SharedStore::new(&SyncConfig::default());
        let summary = run_event_loop(rx, store.clone(), CancellationToken::new()).await;

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.malformed, 2);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.end, StreamEnd::Closed);
        assert!(!store.is_connected());
    }

    #[tokio::test]
    async fn test_loop_stops_on_fatal_transport_error() {
        let (tx, rx) = mpsc::channel::<Result<RawEvent, TransportError>>(2);
        tx.send(Err(TransportError::stream("tls handshake failed")))
            .await
            .unwrap();

        let store = SharedStore::new(&SyncConfig::default());
        let summary = run_event_loop(rx, store, CancellationToken::new()).await;
        assert!(matches!(summary.end, StreamEnd::Failed(ref msg) if msg.contains("tls")));
        drop(tx);
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancel() {
        let (tx, rx) = mpsc::channel::<Result<RawEvent, TransportError>>(1);
        let store = SharedStore::new(&SyncConfig::default());
        let cancel = CancellationToken::new();

        let handle = spawn_event_loop(rx, store, cancel.clone());
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.end, StreamEnd::Cancelled);
        assert_eq!(summary.total(), 0);
        drop(tx);
    }
}
