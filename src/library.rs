//! Media metadata lookup.
//!
//! The delivery pipeline only needs to find files by id or path and to list
//! a playlist's files. [`InMemoryLibrary`] serves those from a JSON catalog.

use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::path::Path;
use streamforged_common::{MediaFile, MediaFileId, PlaylistId};

/// Read access to the media library.
pub trait MediaLibrary: Send + Sync {
    fn media_file(&self, id: MediaFileId) -> Option<MediaFile>;

    fn media_file_by_path(&self, path: &Path) -> Option<MediaFile>;

    /// Files of a playlist in order, `None` if the playlist is unknown.
    fn playlist_files(&self, id: PlaylistId) -> Option<Vec<MediaFile>>;
}

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    files: Vec<MediaFile>,
    #[serde(default)]
    playlists: Vec<CatalogPlaylist>,
}

#[derive(Debug, Deserialize)]
struct CatalogPlaylist {
    id: PlaylistId,
    files: Vec<MediaFileId>,
}

/// Library held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryLibrary {
    files: DashMap<MediaFileId, MediaFile>,
    playlists: DashMap<PlaylistId, Vec<MediaFileId>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog of the form `{"files": [...], "playlists": [{"id": 1, "files": [..]}]}`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read library catalog: {:?}", path))?;
        let catalog: Catalog = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse library catalog: {:?}", path))?;

        let library = Self::new();
        for file in catalog.files {
            library.insert_file(file);
        }
        for playlist in catalog.playlists {
            library.insert_playlist(playlist.id, playlist.files);
        }

        tracing::info!(
            files = library.files.len(),
            playlists = library.playlists.len(),
            "Loaded library catalog"
        );
        Ok(library)
    }

    pub fn insert_file(&self, file: MediaFile) {
        self.files.insert(file.id, file);
    }

    pub fn insert_playlist(&self, id: PlaylistId, files: Vec<MediaFileId>) {
        self.playlists.insert(id, files);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl MediaLibrary for InMemoryLibrary {
    fn media_file(&self, id: MediaFileId) -> Option<MediaFile> {
        self.files.get(&id).map(|f| f.clone())
    }

    fn media_file_by_path(&self, path: &Path) -> Option<MediaFile> {
        self.files
            .iter()
            .find(|entry| entry.value().path == path)
            .map(|entry| entry.value().clone())
    }

    fn playlist_files(&self, id: PlaylistId) -> Option<Vec<MediaFile>> {
        let ids = self.playlists.get(&id)?.clone();
        // Entries pointing at files no longer in the library are skipped.
        Some(ids.into_iter().filter_map(|id| self.media_file(id)).collect())
    }
}
