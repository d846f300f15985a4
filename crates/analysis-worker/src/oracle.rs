//! Asynchronous request/response channel to the search oracle.
//!
//! One tokio task owns the engine and serves requests in arrival order.
//! Each logical flow (live evaluation, background analysis) talks to it
//! through its own [`OracleSession`]. Starting a new run on a session makes
//! every request of the previous run stale: the service skips them, aborts
//! the one it is searching, and the client discards their late replies.
//! A request whose client gave up (deadline expired) is aborted the same way.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chess_core::MoveGenerator;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::AnalysisError;
use crate::evaluation::EngineScore;

/// Requests waiting for the engine before senders block.
const QUEUE_CAPACITY: usize = 32;

/// How long an aborted search may take to wind down.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub fen: String,
    pub depth: u32,
    /// Number of principal variations wanted.
    pub lines: u32,
}

/// One line as reported by the engine, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 0-based, 0 = engine's first choice.
    pub rank: u32,
    /// UCI moves.
    pub moves: Vec<String>,
    pub depth: u32,
    pub cp: Option<i32>,
    pub mate: Option<i32>,
}

impl RawLine {
    pub fn score(&self) -> EngineScore {
        EngineScore::from_parts(self.cp, self.mate)
    }
}

/// A validated principal variation for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineLine {
    pub rank: u32,
    pub moves: Vec<String>,
    /// Normalized, side-to-move perspective.
    pub evaluation: f64,
    pub depth: u32,
    pub mate: Option<i32>,
    /// Compact from-to-promotion id of the first move.
    pub first_move: String,
}

impl EngineLine {
    /// Validate a raw line against the position it was computed for.
    /// Returns None when the first move is missing or not legal there.
    pub fn from_raw<G: MoveGenerator + ?Sized>(raw: RawLine, board: &G) -> Option<Self> {
        let first = raw.moves.first()?;
        let resolved = match board.resolve(first) {
            Some(mv) => mv,
            None => {
                debug!(rank = raw.rank, notation = %first, fen = %board.fen(), "Dropping engine line with illegal move");
                return None;
            }
        };
        let score = raw.score();
        Some(Self {
            rank: raw.rank,
            evaluation: score.normalized(),
            mate: score.mate(),
            depth: raw.depth,
            first_move: resolved.uci(),
            moves: raw.moves,
        })
    }
}

/// Anything that can search a position and report ranked lines.
pub trait SearchEngine: Send + 'static {
    fn search(
        &mut self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<Vec<RawLine>, AnalysisError>> + Send;

    /// Called after an unfinished `search` future was dropped, so the engine
    /// is idle again before the next request.
    fn cancel(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called once when the service stops.
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Correlates a request with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTag {
    pub run: u64,
    pub seq: u64,
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.run, self.seq)
    }
}

/// Identity of one run on a session. Stale once the session starts another.
#[derive(Debug, Clone)]
pub struct RunToken {
    run: u64,
    generation: watch::Receiver<u64>,
}

impl RunToken {
    pub fn run(&self) -> u64 {
        self.run
    }

    pub fn is_current(&self) -> bool {
        *self.generation.borrow() == self.run
    }

    /// Resolves once a newer run starts or the session goes away.
    async fn superseded(&mut self) {
        let run = self.run;
        let _ = self.generation.wait_for(|current| *current != run).await;
    }

    fn superseded_error(&self) -> AnalysisError {
        AnalysisError::Superseded { run: self.run }
    }
}

#[derive(Debug)]
pub struct SearchResponse {
    pub tag: RequestTag,
    pub result: Result<Vec<RawLine>, AnalysisError>,
}

struct Envelope {
    tag: RequestTag,
    token: RunToken,
    request: SearchRequest,
    reply: oneshot::Sender<SearchResponse>,
}

/// Sending side of the oracle service.
#[derive(Clone)]
pub struct OracleHandle {
    tx: mpsc::Sender<Envelope>,
}

impl OracleHandle {
    /// Move the engine into its own task. The task ends, shutting the engine
    /// down, once every handle and session is dropped.
    pub fn spawn<E: SearchEngine>(engine: E) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(serve(engine, rx));
        (Self { tx }, task)
    }
}

async fn serve<E: SearchEngine>(mut engine: E, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(mut envelope) = rx.recv().await {
        if !envelope.token.is_current() {
            debug!(tag = %envelope.tag, "Skipping stale search request");
            continue;
        }
        if envelope.reply.is_closed() {
            debug!(tag = %envelope.tag, "Skipping abandoned search request");
            continue;
        }

        let result = tokio::select! {
            result = engine.search(&envelope.request) => Some(result),
            _ = envelope.reply.closed() => None,
            _ = envelope.token.superseded() => None,
        };

        let Some(result) = result else {
            debug!(tag = %envelope.tag, "Aborting search nobody is waiting for");
            if tokio::time::timeout(CANCEL_GRACE, engine.cancel()).await.is_err() {
                warn!(tag = %envelope.tag, "Engine did not stop within {:?}", CANCEL_GRACE);
            }
            continue;
        };

        if let Err(e) = &result {
            warn!(tag = %envelope.tag, error = %e, "Search failed");
        }

        // The client may have timed out meanwhile.
        let _ = envelope.reply.send(SearchResponse {
            tag: envelope.tag,
            result,
        });
    }
    engine.shutdown().await;
    debug!("Oracle service stopped");
}

/// Per-flow client of the oracle service.
pub struct OracleSession {
    handle: OracleHandle,
    generation: watch::Sender<u64>,
    seq: AtomicU64,
    timeout: Duration,
}

impl OracleSession {
    pub fn new(handle: OracleHandle, timeout: Duration) -> Self {
        Self {
            handle,
            generation: watch::Sender::new(0),
            seq: AtomicU64::new(0),
            timeout,
        }
    }

    /// Start a new run, invalidating the previous one.
    pub fn begin_run(&self) -> RunToken {
        let mut run = 0;
        self.generation.send_modify(|current| {
            *current += 1;
            run = *current;
        });
        RunToken {
            run,
            generation: self.generation.subscribe(),
        }
    }

    /// Send one request and wait for its reply within the session deadline.
    pub async fn request(
        &self,
        token: &RunToken,
        ply: usize,
        request: SearchRequest,
    ) -> Result<Vec<RawLine>, AnalysisError> {
        if !token.is_current() {
            return Err(token.superseded_error());
        }

        let tag = RequestTag {
            run: token.run,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            tag,
            token: token.clone(),
            request,
            reply: reply_tx,
        };

        self.handle
            .tx
            .send(envelope)
            .await
            .map_err(|_| AnalysisError::OracleFailure {
                ply,
                reason: "oracle service is not running".to_string(),
            })?;

        let mut watcher = token.clone();
        let outcome = tokio::select! {
            outcome = tokio::time::timeout(self.timeout, reply_rx) => outcome,
            _ = watcher.superseded() => {
                debug!(tag = %tag, "Abandoning request of superseded run");
                return Err(token.superseded_error());
            }
        };

        if !token.is_current() {
            debug!(tag = %tag, "Discarding response for superseded run");
            return Err(token.superseded_error());
        }

        let response = match outcome {
            Err(_) => {
                return Err(AnalysisError::OracleTimeout {
                    ply,
                    tag,
                    timeout_ms: self.timeout.as_millis(),
                })
            }
            Ok(Err(_)) => {
                return Err(AnalysisError::OracleFailure {
                    ply,
                    reason: "oracle dropped the request".to_string(),
                })
            }
            Ok(Ok(response)) => response,
        };

        if response.tag != tag {
            warn!(expected = %tag, received = %response.tag, "Mismatched oracle response");
            return Err(AnalysisError::OracleFailure {
                ply,
                reason: format!("response {} does not match request {}", response.tag, tag),
            });
        }

        response.result.map_err(|e| AnalysisError::OracleFailure {
            ply,
            reason: e.to_string(),
        })
    }
}
