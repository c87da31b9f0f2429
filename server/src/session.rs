//! Session registry for the arena server
//!
//! This module tracks which network address belongs to which player session,
//! including:
//! - Session lifecycle (join, disconnect, inactivity timeout)
//! - Monotonic session id assignment
//! - Safe-zone occupancy, kept as an explicit per-zone occupant slot rather
//!   than re-derived from player positions
//!
//! The registry is only ever mutated from the server's single game loop, so
//! zone assignment always sees a fully up-to-date occupancy snapshot.

use log::{info, warn};
use shared::House;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a session may stay silent before it is treated as disconnected.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// A connected session and its liveness bookkeeping.
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier assigned by the registry
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this session
    pub last_seen: Instant,
}

impl Session {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// How a safe zone ended up assigned to a joining player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneFit {
    /// A free zone matching the player's body color was available
    ColorMatched,
    /// No color match was free; any unoccupied zone was used
    AnyFree,
    /// Every zone was occupied; the player shares zone 0
    Shared,
}

/// Tracks connected sessions and safe-zone occupancy.
pub struct SessionRegistry {
    sessions: HashMap<SocketAddr, Session>,
    next_id: u32,
    /// One occupant slot per arena house, refreshed each match cycle
    zones: Vec<Option<u32>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 1,
            zones: Vec::new(),
        }
    }

    /// Registers a new session for the given address and returns its id.
    ///
    /// Callers are expected to have removed any previous session for the
    /// same address first (a reconnect replaces the old session).
    pub fn register(&mut self, addr: SocketAddr) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        info!("Session {} connected from {}", id, addr);
        self.sessions.insert(addr, Session::new(id, addr));
        id
    }

    /// Removes the session for an address, freeing its zone slot.
    pub fn remove(&mut self, addr: &SocketAddr) -> Option<u32> {
        let session = self.sessions.remove(addr)?;
        self.release_zone(session.id);
        info!("Session {} disconnected", session.id);
        Some(session.id)
    }

    pub fn find_by_addr(&self, addr: &SocketAddr) -> Option<u32> {
        self.sessions.get(addr).map(|s| s.id)
    }

    pub fn addr_of(&self, id: u32) -> Option<SocketAddr> {
        self.sessions
            .values()
            .find(|s| s.id == id)
            .map(|s| s.addr)
    }

    /// Refreshes the liveness clock for an address, if registered.
    pub fn touch(&mut self, addr: &SocketAddr) {
        if let Some(session) = self.sessions.get_mut(addr) {
            session.last_seen = Instant::now();
        }
    }

    /// Returns the addresses of sessions that have gone silent.
    pub fn timed_out(&self) -> Vec<SocketAddr> {
        self.sessions
            .values()
            .filter(|s| s.is_timed_out(SESSION_TIMEOUT))
            .map(|s| s.addr)
            .collect()
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.sessions.values().map(|s| s.addr).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Resets the occupancy slots for a freshly generated arena layout.
    pub fn reset_zones(&mut self, zone_count: usize) {
        self.zones = vec![None; zone_count];
    }

    /// Assigns a safe zone to a player: a free color-matched house if one
    /// exists, otherwise any free house, otherwise house 0 shared with its
    /// current occupant.
    pub fn assign_zone(&mut self, player_id: u32, body_color: &str, houses: &[House]) -> (usize, ZoneFit) {
        let color_match = houses.iter().position(|house| {
            house.color == body_color && self.zones.get(house.id) == Some(&None)
        });
        if let Some(index) = color_match {
            self.zones[index] = Some(player_id);
            return (index, ZoneFit::ColorMatched);
        }

        let any_free = self.zones.iter().position(|slot| slot.is_none());
        if let Some(index) = any_free {
            self.zones[index] = Some(player_id);
            warn!(
                "No free color-matched zone for player {} ({}), using zone {}",
                player_id, body_color, index
            );
            return (index, ZoneFit::AnyFree);
        }

        warn!(
            "All safe zones occupied, player {} shares zone 0",
            player_id
        );
        (0, ZoneFit::Shared)
    }

    /// Frees the zone slot held by a player, if any.
    pub fn release_zone(&mut self, player_id: u32) {
        for slot in self.zones.iter_mut() {
            if *slot == Some(player_id) {
                *slot = None;
            }
        }
    }

    pub fn zone_occupant(&self, index: usize) -> Option<u32> {
        self.zones.get(index).copied().flatten()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
