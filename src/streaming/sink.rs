//! Blocking `Write` adapter feeding an async response body.

use bytes::Bytes;
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Item type of the response body stream.
pub type BodyChunk = Result<Bytes, io::Error>;

/// Sends every write as one body chunk. Must be used from a blocking thread.
///
/// Once the receiving body is dropped (client went away) writes fail with
/// [`io::ErrorKind::BrokenPipe`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<BodyChunk>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<BodyChunk>) -> Self {
        Self { tx }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Whether an I/O error just means the client hung up.
pub fn is_client_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_become_chunks() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = ChannelSink::new(tx);
        sink.write_all(b"abc").unwrap();
        sink.write_all(b"").unwrap();
        drop(sink);

        let first = rx.blocking_recv().unwrap().unwrap();
        assert_eq!(&first[..], b"abc");
        assert!(rx.blocking_recv().is_none());
    }

    #[test]
    fn closed_receiver_is_broken_pipe() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        let err = sink.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert!(is_client_disconnect(&err));
    }

    #[test]
    fn other_errors_are_not_disconnects() {
        let err = io::Error::other("ffmpeg exited with 1");
        assert!(!is_client_disconnect(&err));
        assert!(!is_client_disconnect(&io::Error::from(io::ErrorKind::TimedOut)));
    }
}
