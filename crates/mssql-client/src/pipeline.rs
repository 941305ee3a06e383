//! Stall diagnostics for in-flight requests.
//!
//! SQL Server responses are read one full message at a time (see
//! [`mssql_codec::connection::Connection::read_message`]), so the place a
//! request can appear to hang is that single await point: the server has
//! accepted the request but isn't sending bytes back, or packets are
//! trickling in slowly enough that reassembly never completes. This module
//! provides the watchdog that rides alongside that await point and the ring
//! buffer used to remember what the connection was doing right before it
//! stalled.
//!
//! There is no separate actor task here. `Client<S>` already serializes
//! requests through `&mut self`, so a cooperative-actor-per-connection would
//! just reintroduce the coordination the type-state design exists to avoid.
//! `StallWatchdog::watch` is called inline from the request methods instead.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::cancel::CancelHandle;
use crate::error::{Error, Result};

/// Coarse classification of a TDS token, recorded in the [`TokenRing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `COLMETADATA`
    ColMetaData,
    /// `ROW`
    Row,
    /// `NBCROW`
    NbcRow,
    /// `DONE`
    Done,
    /// `DONEPROC`
    DoneProc,
    /// `DONEINPROC`
    DoneInProc,
    /// `ERROR`
    Error,
    /// `ENVCHANGE`
    EnvChange,
    /// `RETURNVALUE`
    ReturnValue,
    /// Any other token kind, collapsed to keep the ring cheap to render.
    Other,
}

/// Classify a parsed token for the [`TokenRing`].
#[must_use]
pub fn classify(token: &tds_protocol::token::Token) -> TokenKind {
    use tds_protocol::token::Token;
    match token {
        Token::ColMetaData(_) => TokenKind::ColMetaData,
        Token::Row(_) => TokenKind::Row,
        Token::NbcRow(_) => TokenKind::NbcRow,
        Token::Done(_) => TokenKind::Done,
        Token::DoneProc(_) => TokenKind::DoneProc,
        Token::DoneInProc(_) => TokenKind::DoneInProc,
        Token::Error(_) => TokenKind::Error,
        Token::EnvChange(_) => TokenKind::EnvChange,
        Token::ReturnValue(_) => TokenKind::ReturnValue,
        _ => TokenKind::Other,
    }
}

/// A single observed-token entry in a [`TokenRing`].
#[derive(Debug, Clone, Copy)]
pub struct TokenRingEntry {
    /// The kind of token observed.
    pub kind: TokenKind,
    /// When the token was observed.
    pub observed_at: Instant,
}

/// Fixed-capacity ring buffer of recently observed tokens.
///
/// Used only for diagnostics: when a request stalls or fails, its summary is
/// attached to the warning log so an operator can see what the connection
/// last did before things went quiet.
#[derive(Debug, Clone)]
pub struct TokenRing {
    capacity: usize,
    entries: VecDeque<TokenRingEntry>,
}

impl TokenRing {
    /// Create a ring with room for `capacity` entries (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(256)),
        }
    }

    /// Record an observed token, evicting the oldest entry if full.
    pub fn record(&mut self, kind: TokenKind) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TokenRingEntry {
            kind,
            observed_at: Instant::now(),
        });
    }

    /// The most recently recorded entry, if any.
    #[must_use]
    pub fn last(&self) -> Option<&TokenRingEntry> {
        self.entries.back()
    }

    /// Render the most recent entries as a short human-readable summary,
    /// newest first, for inclusion in stall warnings.
    #[must_use]
    pub fn snapshot_summary(&self) -> String {
        if self.entries.is_empty() {
            return "(no tokens observed yet)".to_string();
        }
        self.entries
            .iter()
            .rev()
            .take(8)
            .map(|e| format!("{:?}@{:.1}s ago", e.kind, e.observed_at.elapsed().as_secs_f32()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// How often the watchdog checks on an in-flight request and logs a stall
/// snapshot if it hasn't completed yet.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);
/// Elapsed time after which the watchdog sends an out-of-band Attention if
/// the request still hasn't completed.
const ATTENTION_AT: Duration = Duration::from_secs(5);
/// Elapsed time after which the watchdog gives up and force-fails the
/// request with [`Error::CommandTimeout`], regardless of whether the
/// Attention was acknowledged.
const FORCE_FAIL_AT: Duration = Duration::from_secs(15);

/// Drives a single in-flight request's escalation policy: periodic stall
/// snapshots, an Attention once the request has been outstanding too long,
/// and a forced timeout if it never recovers.
///
/// Mirrors the "pipeline request slot" fields described for request
/// tracking (submitted_at, stall_snapshots_sent, attention_sent) without
/// requiring a dedicated actor task — see the module docs.
pub struct StallWatchdog {
    cancel: CancelHandle,
    snapshot_limit: u32,
}

impl StallWatchdog {
    /// Create a watchdog that will send Attention via `cancel` once the
    /// request it's watching stalls past the escalation thresholds, or once
    /// `snapshot_limit` stall snapshots have fired (whichever comes first).
    #[must_use]
    pub fn new(cancel: CancelHandle, snapshot_limit: u32) -> Self {
        Self {
            cancel,
            snapshot_limit: snapshot_limit.max(1),
        }
    }

    /// Drive `fut` to completion under the escalation policy.
    ///
    /// On success, returns the future's output unchanged. Three independent
    /// triggers can force-fail the request with [`Error::CommandTimeout`]
    /// without closing the connection: reaching `snapshot_limit` stall
    /// snapshots (each [`SNAPSHOT_INTERVAL`] apart), the request having been
    /// outstanding past [`FORCE_FAIL_AT`], or (redundantly, as a backstop)
    /// whichever of those fires first. An out-of-band Attention is sent once
    /// the request has been outstanding past [`ATTENTION_AT`], independent of
    /// the snapshot count; callers should expect the server to eventually
    /// acknowledge it with a DONE carrying the ATTN flag before the
    /// connection is reused.
    pub async fn watch<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::pin!(fut);
        let submitted_at = Instant::now();
        let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // the first tick fires immediately; consume it

        let mut stall_snapshots_sent: u32 = 0;
        let mut attention_sent = false;

        loop {
            tokio::select! {
                biased;
                result = &mut fut => return result,
                _ = ticker.tick() => {
                    let elapsed = submitted_at.elapsed();
                    stall_snapshots_sent += 1;
                    tracing::warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        snapshot = stall_snapshots_sent,
                        "request appears stalled"
                    );

                    // Rule 4: hard 15s backstop regardless of snapshot count.
                    if elapsed >= FORCE_FAIL_AT {
                        if !attention_sent {
                            let _ = self.cancel.cancel().await;
                        }
                        return Err(Error::CommandTimeout);
                    }

                    // Rule 2: N snapshots without recovery force-fails the
                    // request on its own, independent of elapsed wall-clock
                    // time, so `stall_snapshot_limit` actually controls how
                    // soon the request gives up.
                    if stall_snapshots_sent >= self.snapshot_limit {
                        return Err(Error::CommandTimeout);
                    }

                    // Rule 3: past ATTENTION_AT, send an out-of-band Attention.
                    if elapsed >= ATTENTION_AT && !attention_sent {
                        tracing::warn!("sending attention after stall");
                        if self.cancel.cancel().await.is_ok() {
                            attention_sent = true;
                        }
                    }
                }
            }
        }
    }
}
