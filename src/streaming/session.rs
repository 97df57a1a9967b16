//! One stream request from the first body byte to cleanup.
//!
//! A [`StreamSession`] owns the source ([`QueueSource`]), the framed output
//! and the [`Transfer`] registration. [`StreamSession::run`] is the blocking
//! copy loop; it must run on a blocking thread.

use std::io::{self, BufWriter, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use streamforged_common::{PlayStatus, PlayerId, SharedQueue};
use tokio_util::sync::CancellationToken;

use super::range::HttpRange;
use super::range_writer::RangeWriter;
use super::shoutcast::ShoutcastWriter;
use super::sink::is_client_disconnect;
use super::source::QueueSource;
use super::status::{StatusRegistry, StreamKind, TransferStatus};
use super::throttle::BandwidthLimiter;
use crate::config::StreamingConfig;
use crate::stats::UserStats;

/// Byte used for idle keep-alive and for padding short sources.
pub const FILLER_BYTE: u8 = 0xFF;

/// Granularity of sleeps that must stay responsive to termination.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Copy loop tuning, taken from `[streaming]`.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub chunk_size: usize,
    pub liveness_check_interval: u64,
    pub idle_filler_delay: Duration,
    pub idle_filler_size: usize,
}

impl From<&StreamingConfig> for SessionSettings {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            liveness_check_interval: config.liveness_check_interval.max(1),
            idle_filler_delay: Duration::from_millis(config.idle_filler_delay_ms),
            idle_filler_size: config.idle_filler_size,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Source exhausted (or the requested range delivered).
    Completed,
    /// Superseded by a newer queue stream on the same player.
    Terminated,
    /// Server shutting down.
    Cancelled,
    /// The client went away.
    ClientGone,
    /// Source or sink failed.
    Failed(String),
}

/// A registered transfer. Dropping it flushes the user's byte count and
/// removes the status from the registry.
pub struct Transfer {
    registry: Arc<StatusRegistry>,
    stats: Arc<UserStats>,
    status: Arc<TransferStatus>,
}

impl Transfer {
    /// Register a new transfer, terminating superseded queue streams.
    pub fn register(
        registry: Arc<StatusRegistry>,
        stats: Arc<UserStats>,
        player: &PlayerId,
        username: &str,
        kind: StreamKind,
    ) -> Self {
        let status = registry.register(player, username, kind);
        Self {
            registry,
            stats,
            status,
        }
    }

    pub fn status(&self) -> &Arc<TransferStatus> {
        &self.status
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        self.stats
            .add_bytes_streamed(self.status.username(), self.status.bytes_transferred());
        self.registry.deregister(&self.status);
        tracing::debug!(
            transfer = %self.status.id(),
            player = %self.status.player(),
            bytes = self.status.bytes_transferred(),
            "Transfer deregistered"
        );
    }
}

/// Writer enforcing a promised `Content-Length`.
///
/// Bytes past the limit are dropped and reported as written so the source
/// keeps being drained.
#[derive(Debug)]
pub struct ClipWriter<W> {
    inner: W,
    limit: Option<u64>,
    written: u64,
    warned: bool,
}

impl<W: Write> ClipWriter<W> {
    pub fn new(inner: W, limit: Option<u64>) -> Self {
        Self {
            inner,
            limit,
            written: 0,
            warned: false,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bytes still owed to the client, if a length was promised.
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.written))
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ClipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let allowed = match self.remaining() {
            Some(room) if (buf.len() as u64) > room => {
                if !self.warned {
                    tracing::warn!(
                        limit = self.limit,
                        "Source produced more bytes than the promised length, dropping the excess"
                    );
                    self.warned = true;
                }
                room as usize
            }
            _ => buf.len(),
        };

        if allowed > 0 {
            self.inner.write_all(&buf[..allowed])?;
            self.written += allowed as u64;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Response framing negotiated for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// Whole body, optionally with a promised length.
    Plain { content_length: Option<u64> },
    /// Partial content. `start_offset` is where the source output starts
    /// in the full stream (bytes the source skipped itself).
    Ranged {
        range: HttpRange,
        start_offset: u64,
        content_length: u64,
    },
    /// ICY metadata interleaved every `interval` bytes.
    Shoutcast { interval: usize },
}

enum Output<W: Write> {
    Plain(ClipWriter<W>),
    Ranged(RangeWriter<ClipWriter<W>>),
    Shoutcast(ShoutcastWriter<ClipWriter<W>>),
}

impl<W: Write> Output<W> {
    fn new(sink: W, framing: Framing, queue: SharedQueue) -> Self {
        match framing {
            Framing::Plain { content_length } => Output::Plain(ClipWriter::new(sink, content_length)),
            Framing::Ranged {
                range,
                start_offset,
                content_length,
            } => Output::Ranged(RangeWriter::starting_at(
                ClipWriter::new(sink, Some(content_length)),
                Some(range),
                start_offset,
            )),
            Framing::Shoutcast { interval } => Output::Shoutcast(ShoutcastWriter::with_interval(
                ClipWriter::new(sink, None),
                queue,
                interval,
            )),
        }
    }

    fn clip(&mut self) -> &mut ClipWriter<W> {
        match self {
            Output::Plain(w) => w,
            Output::Ranged(w) => w.get_mut(),
            Output::Shoutcast(w) => w.get_mut(),
        }
    }

    fn range_complete(&self) -> bool {
        matches!(self, Output::Ranged(w) if w.is_complete())
    }
}

impl<W: Write> Write for Output<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(w) => w.write(buf),
            Output::Ranged(w) => w.write(buf),
            Output::Shoutcast(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(w) => w.flush(),
            Output::Ranged(w) => w.flush(),
            Output::Shoutcast(w) => w.flush(),
        }
    }
}

/// A negotiated stream, ready to copy.
pub struct StreamSession<W: Write> {
    source: QueueSource,
    output: Output<BufWriter<W>>,
    queue: SharedQueue,
    kind: StreamKind,
    settings: SessionSettings,
    limiter: BandwidthLimiter,
    cancel: CancellationToken,
    transfer: Transfer,
}

impl<W: Write> StreamSession<W> {
    pub fn new(
        source: QueueSource,
        sink: W,
        framing: Framing,
        queue: SharedQueue,
        transfer: Transfer,
        settings: SessionSettings,
    ) -> Self {
        let kind = transfer.status.kind();
        let sink = BufWriter::with_capacity(settings.chunk_size.max(ICY_HEADROOM), sink);
        Self {
            source,
            output: Output::new(sink, framing, Arc::clone(&queue)),
            queue,
            kind,
            settings,
            limiter: BandwidthLimiter::new(0),
            cancel: CancellationToken::new(),
            transfer,
        }
    }

    pub fn with_limiter(mut self, limiter: BandwidthLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn status(&self) -> &Arc<TransferStatus> {
        &self.transfer.status
    }

    /// Copy until the source is exhausted, the stream is terminated or the
    /// client goes away. Source, sink and registration are released on
    /// return.
    pub fn run(mut self) -> SessionOutcome {
        let status = Arc::clone(&self.transfer.status);
        tracing::debug!(
            transfer = %status.id(),
            player = %status.player(),
            kind = ?self.kind,
            "Stream started"
        );

        let outcome = self.copy();

        match &outcome {
            SessionOutcome::Failed(message) => tracing::error!(
                transfer = %status.id(),
                player = %status.player(),
                bytes = status.bytes_transferred(),
                error = %message,
                "Stream failed"
            ),
            outcome => tracing::debug!(
                transfer = %status.id(),
                player = %status.player(),
                bytes = status.bytes_transferred(),
                ?outcome,
                "Stream ended"
            ),
        }

        outcome
    }

    fn copy(&mut self) -> SessionOutcome {
        let mut buf = vec![0u8; self.settings.chunk_size];
        let mut chunks: u64 = 0;

        loop {
            if chunks % self.settings.liveness_check_interval == 0 {
                if let Some(outcome) = self.check_liveness() {
                    return outcome;
                }
            }
            chunks += 1;

            if self.queue.lock().status() == PlayStatus::Stopped {
                if self.kind.is_isolated() {
                    return self.finish();
                }
                if let Some(outcome) = self.idle() {
                    return outcome;
                }
                continue;
            }

            // A superseded queue stream must not read on into the next track.
            if self.kind == StreamKind::Queue && self.transfer.status.is_terminated() {
                return SessionOutcome::Terminated;
            }

            let n = match self.source.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return SessionOutcome::Failed(e.to_string()),
            };

            if n == 0 {
                if self.kind.is_isolated() {
                    return self.finish();
                }
                if let Some(outcome) = self.idle() {
                    return outcome;
                }
                continue;
            }

            if let Err(e) = self.send(&buf[..n]) {
                return write_failure(e);
            }

            if self.output.range_complete() {
                return self.finish();
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.write_all(bytes)?;
        self.output.flush()?;
        self.transfer.status.add_bytes(bytes.len() as u64);
        self.limiter
            .throttle(bytes.len(), self.transfer.registry.active_count());
        Ok(())
    }

    fn check_liveness(&self) -> Option<SessionOutcome> {
        if self.cancel.is_cancelled() {
            return Some(SessionOutcome::Cancelled);
        }
        if self.transfer.status.is_terminated() {
            return Some(SessionOutcome::Terminated);
        }
        None
    }

    /// Wait, then send filler so the client does not reconnect while the
    /// queue is stopped.
    fn idle(&mut self) -> Option<SessionOutcome> {
        let mut waited = Duration::ZERO;
        while waited < self.settings.idle_filler_delay {
            if let Some(outcome) = self.check_liveness() {
                return Some(outcome);
            }
            let slice = IDLE_POLL.min(self.settings.idle_filler_delay - waited);
            std::thread::sleep(slice);
            waited += slice;
        }
        if let Some(outcome) = self.check_liveness() {
            return Some(outcome);
        }

        let filler = vec![FILLER_BYTE; self.settings.idle_filler_size];
        self.send(&filler).err().map(write_failure)
    }

    /// Pad up to the promised length, then report completion.
    fn finish(&mut self) -> SessionOutcome {
        let clip = self.output.clip();
        if let Some(missing) = clip.remaining().filter(|m| *m > 0) {
            tracing::debug!(
                transfer = %self.transfer.status.id(),
                missing,
                "Source ended short of the promised length, padding"
            );
            let filler = vec![FILLER_BYTE; self.settings.chunk_size.min(missing as usize).max(1)];
            let mut left = missing;
            while left > 0 {
                let n = filler.len().min(left as usize);
                if let Err(e) = clip.write_all(&filler[..n]) {
                    return write_failure(e);
                }
                self.transfer.status.add_bytes(n as u64);
                left -= n as u64;
            }
        }

        match self.output.flush() {
            Ok(()) => SessionOutcome::Completed,
            Err(e) => write_failure(e),
        }
    }
}

/// Buffer floor so a metadata block and its audio leave as one chunk.
const ICY_HEADROOM: usize = 4096;

fn write_failure(err: io::Error) -> SessionOutcome {
    if is_client_disconnect(&err) {
        tracing::trace!(error = %err, "Client disconnected");
        SessionOutcome::ClientGone
    } else {
        SessionOutcome::Failed(err.to_string())
    }
}
