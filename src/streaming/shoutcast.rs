//! Shoutcast (ICY) metadata interleaving.
//!
//! Clients that send `Icy-MetaData: 1` get a metadata block after every
//! [`ICY_METAINT`] bytes of audio. The block carries
//! `StreamTitle='Artist - Title';`, re-read from the play queue's current
//! entry each time a block is due.

use std::io::{self, Write};
use streamforged_common::SharedQueue;

/// Audio bytes between two metadata blocks, advertised as `icy-metaint`.
pub const ICY_METAINT: usize = 8192;

/// Largest encodable metadata payload (length byte counts 16-byte blocks).
const MAX_METADATA_LEN: usize = 255 * 16;

/// Bytes of `StreamTitle='';` around the title.
const METADATA_FRAME_LEN: usize = 15;

/// Encode one metadata block: a length byte counting 16-byte blocks,
/// followed by the NUL-padded text.
pub fn metadata_block(title: &str) -> Vec<u8> {
    if title.is_empty() {
        return vec![0];
    }

    // Single quotes delimit the value and have no escape sequence.
    let mut title = title.replace('\'', "\u{2019}");
    let room = MAX_METADATA_LEN - METADATA_FRAME_LEN;
    if title.len() > room {
        let mut end = room;
        while !title.is_char_boundary(end) {
            end -= 1;
        }
        title.truncate(end);
    }
    let text = format!("StreamTitle='{}';", title).into_bytes();

    let blocks = text.len().div_ceil(16);
    let mut out = Vec::with_capacity(blocks * 16 + 1);
    out.push(blocks as u8);
    out.extend_from_slice(&text);
    out.resize(blocks * 16 + 1, 0);
    out
}

/// Write wrapper inserting metadata blocks at fixed audio intervals.
pub struct ShoutcastWriter<W> {
    inner: W,
    queue: SharedQueue,
    interval: usize,
    since_metadata: usize,
}

impl<W: Write> ShoutcastWriter<W> {
    pub fn new(inner: W, queue: SharedQueue) -> Self {
        Self::with_interval(inner, queue, ICY_METAINT)
    }

    pub fn with_interval(inner: W, queue: SharedQueue, interval: usize) -> Self {
        Self {
            inner,
            queue,
            interval: interval.max(1),
            since_metadata: 0,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn current_title(&self) -> String {
        self.queue
            .lock()
            .current()
            .map(|file| file.now_playing())
            .unwrap_or_default()
    }
}

impl<W: Write> Write for ShoutcastWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;

        while !remaining.is_empty() {
            let until_metadata = self.interval - self.since_metadata;
            if remaining.len() < until_metadata {
                self.inner.write_all(remaining)?;
                self.since_metadata += remaining.len();
                break;
            }

            let (audio, rest) = remaining.split_at(until_metadata);
            self.inner.write_all(audio)?;
            self.inner.write_all(&metadata_block(&self.current_title()))?;
            self.since_metadata = 0;
            remaining = rest;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;
    use std::sync::Arc;
    use streamforged_common::{MediaFile, MediaFileId, PlayQueue};

    fn queue(artist: &str, title: &str) -> SharedQueue {
        let file = MediaFile {
            id: MediaFileId::from(1),
            path: PathBuf::from("/m/a.mp3"),
            duration_secs: None,
            bit_rate: None,
            width: None,
            height: None,
            format: "mp3".into(),
            size: 0,
            is_directory: false,
            title: Some(title.into()),
            artist: Some(artist.into()),
            album: None,
            genre: None,
        };
        Arc::new(Mutex::new(PlayQueue::single(file)))
    }

    #[test]
    fn block_is_padded_to_sixteen() {
        let block = metadata_block("A - B");
        // "StreamTitle='A - B';" is 20 bytes, so two blocks.
        assert_eq!(block[0], 2);
        assert_eq!(block.len(), 33);
        assert_eq!(&block[1..21], b"StreamTitle='A - B';");
        assert!(block[21..].iter().all(|b| *b == 0));
    }

    #[test]
    fn empty_title_is_single_zero() {
        assert_eq!(metadata_block(""), vec![0]);
    }

    #[test]
    fn quotes_are_replaced() {
        let block = metadata_block("It's");
        let text = String::from_utf8_lossy(&block[1..]);
        assert!(text.starts_with("StreamTitle='It\u{2019}s';"));
    }

    #[test]
    fn long_titles_are_truncated() {
        let block = metadata_block(&"x".repeat(10_000));
        assert_eq!(block[0], 255);
        assert_eq!(block.len(), MAX_METADATA_LEN + 1);
        assert!(block.ends_with(b"';"));
    }

    #[test]
    fn truncation_keeps_characters_whole() {
        // Four-byte characters; the byte limit falls inside one.
        let block = metadata_block(&"\u{1F3B5}".repeat(2000));
        assert_eq!(block[0], 255);
        let text = std::str::from_utf8(&block[1..]).unwrap().trim_end_matches('\0');
        assert!(text.starts_with("StreamTitle='\u{1F3B5}"));
        assert!(text.ends_with("\u{1F3B5}';"));
    }

    #[test]
    fn metadata_inserted_at_interval_across_writes() {
        let q = queue("Artist", "Song");
        let mut writer = ShoutcastWriter::with_interval(Vec::new(), q, 10);
        writer.write_all(&[1u8; 7]).unwrap();
        writer.write_all(&[2u8; 7]).unwrap();
        writer.write_all(&[3u8; 6]).unwrap();
        let out = writer.into_inner();

        let block = metadata_block("Artist - Song");
        let mut expected = Vec::new();
        expected.extend_from_slice(&[1u8; 7]);
        expected.extend_from_slice(&[2u8; 3]);
        expected.extend_from_slice(&block);
        expected.extend_from_slice(&[2u8; 4]);
        expected.extend_from_slice(&[3u8; 6]);
        expected.extend_from_slice(&block);
        assert_eq!(out, expected);
    }

    #[test]
    fn title_change_applies_at_next_boundary() {
        let q = queue("A", "One");
        let mut writer = ShoutcastWriter::with_interval(Vec::new(), Arc::clone(&q), 4);
        writer.write_all(&[0u8; 4]).unwrap();
        {
            let mut guard = q.lock();
            let mut files = guard.files().to_vec();
            files[0].title = Some("Two".into());
            guard.set_files(files);
        }
        writer.write_all(&[0u8; 4]).unwrap();
        let out = writer.into_inner();

        let first = metadata_block("A - One");
        let second = metadata_block("A - Two");
        assert_eq!(&out[4..4 + first.len()], first.as_slice());
        assert_eq!(&out[out.len() - second.len()..], second.as_slice());
    }
}
