//! Streamforged-Common: shared domain types and errors.
//!
//! - **Typed IDs**: media files, playlists, players and transfers
//! - **Domain types**: [`MediaFile`], [`User`], [`PlayQueue`], [`Player`]
//! - **Error handling**: the unified [`Error`] and [`Result`] alias
//!
//! # Examples
//!
//! ```
//! use streamforged_common::{MediaFileId, PlayQueue, Error, Result};
//!
//! let queue = PlayQueue::new();
//! assert!(queue.current().is_none());
//!
//! fn lookup(id: MediaFileId) -> Result<()> {
//!     Err(Error::not_found("media_file", id))
//! }
//! assert_eq!(lookup(MediaFileId::from(1)).unwrap_err().http_status(), 404);
//! ```

pub mod error;
pub mod ids;
pub mod player;
pub mod queue;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use player::{Player, SharedQueue};
pub use queue::{PlayQueue, PlayStatus};
pub use types::*;
