//! Play queue: the ordered list of files a player is working through.

use crate::ids::MediaFileId;
use crate::types::MediaFile;
use serde::Serialize;

/// Playback status of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayStatus {
    #[default]
    Playing,
    Stopped,
}

/// Ordered sequence of media files with a cursor and a status.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    files: Vec<MediaFile>,
    index: usize,
    status: PlayStatus,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue containing exactly one file.
    pub fn single(file: MediaFile) -> Self {
        Self::from_files(vec![file])
    }

    pub fn from_files(files: Vec<MediaFile>) -> Self {
        Self {
            files,
            index: 0,
            status: PlayStatus::Playing,
        }
    }

    /// Replace the contents and rewind to the first entry.
    pub fn set_files(&mut self, files: Vec<MediaFile>) {
        self.files = files;
        self.index = 0;
        self.status = PlayStatus::Playing;
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Move the cursor. Out-of-range values park the cursor past the end.
    pub fn set_index(&mut self, index: usize) {
        self.index = index.min(self.files.len());
    }

    /// Position of the first entry with the given id.
    pub fn index_of(&self, id: MediaFileId) -> Option<usize> {
        self.files.iter().position(|f| f.id == id)
    }

    /// File under the cursor.
    pub fn current(&self) -> Option<&MediaFile> {
        self.files.get(self.index)
    }

    /// Advance the cursor and return the new current file. Running off the
    /// end stops the queue.
    pub fn next(&mut self) -> Option<&MediaFile> {
        if self.index < self.files.len() {
            self.index += 1;
        }
        if self.index >= self.files.len() {
            self.status = PlayStatus::Stopped;
        }
        self.files.get(self.index)
    }

    pub fn status(&self) -> PlayStatus {
        self.status
    }

    pub fn set_status(&mut self, status: PlayStatus) {
        self.status = status;
    }

    /// Sum of the sizes of all queued files.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}
