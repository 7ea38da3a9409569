// SPDX-License-Identifier: MPL-2.0
//! Transcode sessions, cancellation and the shared log bus.
//!
//! One [`TranscodeSession`] exists per logical unit of work (a conversion
//! pass, a detection pass). Each session owns an independent cancellation
//! token; aborting one never aborts siblings. The [`TranscodeLogBus`]
//! aggregates the open sessions of one upload interaction and keeps a
//! bounded, append-only transcript of progress lines.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::DEFAULT_TRANSCRIPT_CAPACITY;

/// Cancellation token shared between a caller and its running operation.
pub type CancellationToken = Arc<AtomicBool>;

/// Creates a fresh, unsignalled cancellation token.
#[must_use]
pub fn new_token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

/// Checks whether the cancellation token has been triggered.
#[inline]
#[must_use]
pub fn is_cancelled(token: &CancellationToken) -> bool {
    token.load(Ordering::SeqCst)
}

/// Signals the token. Running operations observe this cooperatively.
pub fn signal(token: &CancellationToken) {
    token.store(true, Ordering::SeqCst);
}

/// Callback receiving one transcript line at a time.
///
/// Sinks must not throw; the pipeline never recovers a panicking sink.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A log sink that drops every line. Useful for tests and for callers
/// that do not surface a transcript.
#[must_use]
pub fn null_sink() -> LogSink {
    Arc::new(|_line: &str| {})
}

/// State shared between a [`SessionHandle`] and the owning bus.
#[derive(Debug)]
pub struct TranscodeSession {
    id: u64,
    token: CancellationToken,
    completed: AtomicBool,
}

impl TranscodeSession {
    fn new(id: u64) -> Self {
        Self {
            id,
            token: new_token(),
            completed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        is_cancelled(&self.token)
    }
}

#[derive(Debug)]
struct BusInner {
    sessions: Mutex<Vec<Arc<TranscodeSession>>>,
    transcript: Mutex<VecDeque<String>>,
    capacity: usize,
    next_id: AtomicU64,
}

/// Aggregate of the sessions opened by one upload/view interaction.
///
/// Cloning the bus is cheap and shares the same underlying state.
#[derive(Debug, Clone)]
pub struct TranscodeLogBus {
    inner: Arc<BusInner>,
}

impl Default for TranscodeLogBus {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscodeLogBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TRANSCRIPT_CAPACITY)
    }

    /// Creates a bus whose transcript retains at most `capacity` lines,
    /// evicting the oldest when full.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(BusInner {
                sessions: Mutex::new(Vec::new()),
                transcript: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Opens a new session with its own cancellation token.
    #[must_use]
    pub fn open_session(&self) -> SessionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(TranscodeSession::new(id));
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::clone(&session));
        SessionHandle {
            session,
            bus: Self {
                inner: Arc::clone(&self.inner),
            },
        }
    }

    /// True while at least one session is open on the bus. Drives the
    /// caller's "transcoding activity" visibility state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_empty()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Appends one line to the transcript, evicting the oldest line when
    /// the buffer is full.
    pub fn append(&self, line: &str) {
        let mut transcript = self
            .inner
            .transcript
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if transcript.len() >= self.inner.capacity {
            transcript.pop_front();
        }
        transcript.push_back(line.to_string());
    }

    /// Returns the retained transcript lines, oldest first.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.inner
            .transcript
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Aborts every session that has not completed and removes all
    /// sessions from the bus, leaving the transcript in place.
    ///
    /// Completed sessions are skipped so already-finished work is not
    /// retroactively marked aborted. This is the failure-path cleanup:
    /// the transcript stays visible until the caller dismisses it.
    pub fn abort_sessions(&self) {
        let mut sessions = self
            .inner
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for session in sessions.iter() {
            if !session.is_completed() {
                signal(&session.token);
            }
        }
        sessions.clear();
    }

    /// Aborts uncompleted sessions, removes all sessions and empties the
    /// transcript. Invoked when the caller dismisses the log view or the
    /// pipeline finishes without a size-change notice.
    pub fn clear(&self) {
        self.abort_sessions();
        self.inner
            .transcript
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    fn remove(&self, id: u64) {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .retain(|s| s.id() != id);
    }
}

/// Caller-side handle to one open session.
///
/// The handle is released explicitly; dropping it without `release`
/// leaves the session on the bus until the bus is cleared.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session: Arc<TranscodeSession>,
    bus: TranscodeLogBus,
}

impl SessionHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.session.id()
    }

    /// The session's cancellation token, shared with the operation.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        Arc::clone(&self.session.token)
    }

    /// A sink appending this session's lines to the owning bus.
    #[must_use]
    pub fn log_sink(&self) -> LogSink {
        let bus = self.bus.clone();
        let id = self.session.id();
        Arc::new(move |line: &str| {
            bus.append(&format!("[#{id}] {line}"));
        })
    }

    /// Signals this session's token only; sibling sessions are untouched.
    pub fn abort(&self) {
        signal(&self.session.token);
    }

    /// Marks the work finished so a later bus clear leaves it alone.
    pub fn complete(&self) {
        self.session.completed.store(true, Ordering::SeqCst);
    }

    /// Removes the session from the owning bus.
    pub fn release(self) {
        self.bus.remove(self.session.id());
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.session.is_completed()
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.session.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_get_unique_ids() {
        let bus = TranscodeLogBus::new();
        let a = bus.open_session();
        let b = bus.open_session();
        assert_ne!(a.id(), b.id());
        assert_eq!(bus.session_count(), 2);
    }

    #[test]
    fn aborting_one_session_leaves_siblings_alone() {
        let bus = TranscodeLogBus::new();
        let a = bus.open_session();
        let b = bus.open_session();

        a.abort();

        assert!(is_cancelled(&a.token()));
        assert!(!is_cancelled(&b.token()));
    }

    #[test]
    fn clear_aborts_only_uncompleted_sessions() {
        let bus = TranscodeLogBus::new();
        let finished = bus.open_session();
        let in_flight = bus.open_session();
        finished.complete();

        let finished_token = finished.token();
        let in_flight_token = in_flight.token();

        bus.clear();

        assert!(!is_cancelled(&finished_token), "completed work is skipped");
        assert!(is_cancelled(&in_flight_token), "in-flight work is aborted");
        assert_eq!(bus.session_count(), 0);
        assert!(!bus.is_active());
    }

    #[test]
    fn release_removes_the_session_from_the_bus() {
        let bus = TranscodeLogBus::new();
        let handle = bus.open_session();
        assert!(bus.is_active());

        handle.complete();
        handle.release();
        assert!(!bus.is_active());
    }

    #[test]
    fn transcript_preserves_append_order() {
        let bus = TranscodeLogBus::new();
        let handle = bus.open_session();
        let sink = handle.log_sink();

        sink("decoding");
        sink("encoding");
        sink("done");

        let id = handle.id();
        let transcript = bus.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0], format!("[#{id}] decoding"));
        assert_eq!(transcript[2], format!("[#{id}] done"));
    }

    #[test]
    fn transcript_evicts_oldest_at_capacity() {
        let bus = TranscodeLogBus::with_capacity(2);
        bus.append("one");
        bus.append("two");
        bus.append("three");

        assert_eq!(bus.transcript(), vec!["two", "three"]);
    }

    #[test]
    fn clear_empties_the_transcript() {
        let bus = TranscodeLogBus::new();
        bus.append("line");
        bus.clear();
        assert!(bus.transcript().is_empty());
    }

    #[test]
    fn abort_sessions_keeps_the_transcript() {
        let bus = TranscodeLogBus::new();
        let handle = bus.open_session();
        let token = handle.token();
        bus.append("engine failed");

        bus.abort_sessions();

        assert!(is_cancelled(&token));
        assert_eq!(bus.session_count(), 0);
        assert_eq!(bus.transcript(), vec!["engine failed"]);
    }

    #[test]
    fn signalled_token_reads_cancelled() {
        let token = new_token();
        assert!(!is_cancelled(&token));
        signal(&token);
        assert!(is_cancelled(&token));
    }
}
