//! Player lookup and creation.

use dashmap::DashMap;
use std::sync::Arc;
use streamforged_common::{Player, PlayerId};

use crate::config::PlayerConfig;

/// Resolves the player a request is streaming to.
pub trait PlayerRegistry: Send + Sync {
    fn player(&self, id: &PlayerId) -> Option<Arc<Player>>;

    /// Player named by `requested`, or one keyed by the client address.
    /// Unknown players are created for the default user.
    fn resolve(&self, requested: Option<&str>, client_addr: Option<&str>) -> Arc<Player>;

    fn all(&self) -> Vec<Arc<Player>>;
}

/// Players kept in memory for the lifetime of the process.
#[derive(Debug)]
pub struct InMemoryPlayers {
    players: DashMap<PlayerId, Arc<Player>>,
    default_user: String,
}

impl InMemoryPlayers {
    pub fn new(default_user: impl Into<String>) -> Self {
        Self {
            players: DashMap::new(),
            default_user: default_user.into(),
        }
    }

    /// Registry pre-populated from `[[players]]`.
    pub fn from_config(default_user: impl Into<String>, configured: &[PlayerConfig]) -> Self {
        let registry = Self::new(default_user);
        for p in configured {
            let mut player = Player::new(PlayerId::new(p.id.as_str()), p.username.as_str())
                .with_max_bit_rate(p.max_bit_rate);
            if let Some(client_id) = &p.client_id {
                player = player.with_client_id(client_id.as_str());
            }
            registry.insert(player);
        }
        registry
    }

    pub fn insert(&self, player: Player) -> Arc<Player> {
        let player = Arc::new(player);
        self.players.insert(player.id.clone(), Arc::clone(&player));
        player
    }
}

impl PlayerRegistry for InMemoryPlayers {
    fn player(&self, id: &PlayerId) -> Option<Arc<Player>> {
        self.players.get(id).map(|p| Arc::clone(p.value()))
    }

    fn resolve(&self, requested: Option<&str>, client_addr: Option<&str>) -> Arc<Player> {
        let id = match (requested.filter(|s| !s.is_empty()), client_addr) {
            (Some(id), _) => PlayerId::new(id),
            (None, Some(addr)) => PlayerId::new(format!("client-{addr}")),
            (None, None) => PlayerId::new("anonymous"),
        };

        let entry = self.players.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(player = %id, "Created player for default user");
            let mut player = Player::new(id, self.default_user.as_str());
            if let Some(addr) = client_addr {
                player = player.with_ip_address(addr);
            }
            Arc::new(player)
        });
        Arc::clone(entry.value())
    }

    fn all(&self) -> Vec<Arc<Player>> {
        self.players.iter().map(|p| Arc::clone(p.value())).collect()
    }
}
