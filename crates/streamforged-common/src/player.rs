//! Players: the devices or sessions that consume streams.

use crate::ids::PlayerId;
use crate::queue::PlayQueue;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to a play queue.
pub type SharedQueue = Arc<Mutex<PlayQueue>>;

/// A player and its live play queue.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub username: String,
    pub client_id: Option<String>,
    /// Remote address the player was first seen from.
    pub ip_address: Option<String>,
    /// Player-level bitrate cap in kbps, 0 meaning unlimited.
    pub max_bit_rate: u32,
    queue: SharedQueue,
}

impl Player {
    pub fn new(id: PlayerId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            client_id: None,
            ip_address: None,
            max_bit_rate: 0,
            queue: Arc::new(Mutex::new(PlayQueue::new())),
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_max_bit_rate(mut self, kbps: u32) -> Self {
        self.max_bit_rate = kbps;
        self
    }

    /// The player's live, shared play queue.
    pub fn play_queue(&self) -> SharedQueue {
        Arc::clone(&self.queue)
    }
}
