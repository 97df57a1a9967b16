//! Source side of the copy loop.
//!
//! A [`QueueSource`] reads the play queue's current file to the end, then
//! advances the queue and continues with the next one. Each file is opened
//! through a [`FileOpener`]: raw files are read (and seeked) directly,
//! everything else goes through a [`streamforged_av::TranscodeChain`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use streamforged_common::{MediaFile, MediaFileId, PlayStatus, Player, SharedQueue, User};

use crate::transcoding::{TranscodeRequest, TranscodingResolver};

/// Opens a readable byte stream for one file.
pub trait FileOpener: Send {
    /// Open `file`, skipping `offset` bytes when the output is seekable.
    /// Returns the reader and the number of bytes actually skipped.
    fn open(&mut self, file: &MediaFile, offset: u64) -> io::Result<(Box<dyn Read + Send>, u64)>;
}

/// Opens files through the transcoding resolver.
pub struct TranscodingOpener {
    pub resolver: Arc<dyn TranscodingResolver>,
    pub player: Arc<Player>,
    pub user: User,
    pub request: TranscodeRequest,
    pub program_overrides: Vec<(String, PathBuf)>,
    pub stall_timeout: Option<Duration>,
}

impl FileOpener for TranscodingOpener {
    fn open(&mut self, file: &MediaFile, offset: u64) -> io::Result<(Box<dyn Read + Send>, u64)> {
        let params = self
            .resolver
            .resolve(file, &self.player, &self.user, &self.request);

        if !params.is_transcoding() {
            let mut reader = File::open(&file.path)?;
            if offset > 0 {
                reader.seek(SeekFrom::Start(offset))?;
            }
            tracing::debug!(file = %file.id, offset, "Streaming raw file");
            return Ok((Box::new(reader), offset));
        }

        let chain = params
            .spawn(file, &self.program_overrides, self.stall_timeout)
            .map_err(io::Error::other)?;
        Ok((Box::new(chain), 0))
    }
}

/// Reads the files of a play queue back to back.
pub struct QueueSource {
    queue: SharedQueue,
    opener: Box<dyn FileOpener>,
    current: Option<(MediaFileId, Box<dyn Read + Send>)>,
    pending_offset: u64,
    on_file: Option<Box<dyn FnMut(Option<MediaFileId>) + Send>>,
    halted: Option<Box<dyn Fn() -> bool + Send>>,
}

impl QueueSource {
    pub fn new(queue: SharedQueue, opener: Box<dyn FileOpener>) -> Self {
        Self {
            queue,
            opener,
            current: None,
            pending_offset: 0,
            on_file: None,
            halted: None,
        }
    }

    /// Skip `offset` bytes of the first file opened, when it is seekable.
    pub fn with_start_offset(mut self, offset: u64) -> Self {
        self.pending_offset = offset;
        self
    }

    /// Called whenever the file being read changes.
    pub fn on_file_change(mut self, f: impl FnMut(Option<MediaFileId>) + Send + 'static) -> Self {
        self.on_file = Some(Box::new(f));
        self
    }

    /// Stop touching the queue once `f` returns true: the source neither
    /// advances past the file it is reading nor opens another one, and
    /// reports end of stream instead.
    pub fn halt_when(mut self, f: impl Fn() -> bool + Send + 'static) -> Self {
        self.halted = Some(Box::new(f));
        self
    }

    fn is_halted(&self) -> bool {
        self.halted.as_ref().is_some_and(|f| f())
    }

    /// Open the queue's current file ahead of the first read.
    ///
    /// Returns the number of bytes the opener skipped, which is where the
    /// output of this source starts.
    pub fn prime(&mut self) -> io::Result<u64> {
        if self.current.is_some() {
            return Ok(0);
        }
        self.open_current()
    }

    /// Id of the file currently being read.
    pub fn current_file(&self) -> Option<MediaFileId> {
        self.current.as_ref().map(|(id, _)| *id)
    }

    fn open_current(&mut self) -> io::Result<u64> {
        let file = {
            let queue = self.queue.lock();
            if queue.status() == PlayStatus::Stopped || self.is_halted() {
                return Ok(0);
            }
            queue.current().cloned()
        };

        let Some(file) = file else {
            self.queue.lock().set_status(PlayStatus::Stopped);
            return Ok(0);
        };

        let offset = std::mem::take(&mut self.pending_offset);
        let (reader, skipped) = self.opener.open(&file, offset)?;
        self.current = Some((file.id, reader));
        if let Some(cb) = self.on_file.as_mut() {
            cb(Some(file.id));
        }
        Ok(skipped)
    }
}

impl Read for QueueSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.current.is_none() {
                self.open_current()?;
                if self.current.is_none() {
                    return Ok(0);
                }
            }

            let Some((id, reader)) = self.current.as_mut() else {
                return Ok(0);
            };
            match reader.read(buf) {
                Ok(0) => {
                    let id = *id;
                    self.current = None;
                    // Checked under the queue lock so a halted source never
                    // moves a queue another stream has taken over.
                    let advanced = {
                        let mut queue = self.queue.lock();
                        if self.is_halted() {
                            false
                        } else {
                            queue.next();
                            true
                        }
                    };
                    if let Some(cb) = self.on_file.as_mut() {
                        cb(None);
                    }
                    if !advanced {
                        tracing::debug!(file = %id, "Finished file, source halted");
                        return Ok(0);
                    }
                    tracing::debug!(file = %id, "Finished file, advancing queue");
                }
                other => return other,
            }
        }
    }
}
