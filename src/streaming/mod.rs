//! Media streaming core.
//!
//! A stream request is negotiated by the `/stream` handler and then handed
//! to a [`StreamSession`], which copies bytes from a [`QueueSource`] (raw
//! files or a transcoder chain) into the response body on a blocking
//! thread:
//!
//! ```text
//! QueueSource -> [RangeWriter | ShoutcastWriter] -> ClipWriter -> ChannelSink -> Body
//! ```
//!
//! Every running session is registered in the [`StatusRegistry`], which is
//! how a new queue stream terminates the one it supersedes.

pub mod content_type;
pub mod range;
pub mod range_writer;
pub mod session;
pub mod shoutcast;
pub mod sink;
pub mod source;
pub mod status;
pub mod throttle;

pub use range::HttpRange;
pub use range_writer::RangeWriter;
pub use session::{ClipWriter, Framing, SessionOutcome, SessionSettings, StreamSession, Transfer};
pub use shoutcast::{ShoutcastWriter, ICY_METAINT};
pub use sink::{is_client_disconnect, BodyChunk, ChannelSink};
pub use source::{FileOpener, QueueSource, TranscodingOpener};
pub use status::{StatusRegistry, StreamKind, TransferSnapshot, TransferStatus};
pub use throttle::BandwidthLimiter;
