//! Authoritative match state and message handlers.
//!
//! `GameState` is the single context object owning every collection the
//! match is made of: the session registry, players, marks, traps, pending
//! battles, the arena layout, and the match clock. All handlers run on the
//! server's single game loop, one message or timer event at a time, so no
//! handler ever observes another handler's partial update.
//!
//! Handlers mutate state and return the packets to transmit as a list of
//! [`Outbound`] events; the network layer turns those into datagrams. This
//! keeps the whole rule set testable without sockets.

use crate::battle::{self, Battle, BattleBook, ChoiceOutcome};
use crate::layout;
use crate::scoring;
use crate::session::SessionRegistry;
use log::{debug, info};
use shared::{
    clamp_to_arena, distance, ArenaLayout, BattleOutcome, Breed, Choice, LeaderboardEntry, Mark,
    Packet, PlayerState, TrapView, ENCOUNTER_RADIUS, MARK_COOLDOWN_MS, MARK_COST,
    MATCH_DURATION_SECS, MAX_CHARGE, MAX_HEALTH, MAX_TRAPS, PLAYERS_TO_START, RECHARGE_PER_UPDATE,
    TRAP_COOLDOWN_MS, TRAP_GRACE_MS, TRAP_TRIGGER_RADIUS, ZONE_SLACK,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, for client-facing timestamps.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// A packet and where it should go.
#[derive(Debug)]
pub enum Outbound {
    /// To one session, dropped silently if the session is gone
    To(u32, Packet),
    /// To every connected session
    Broadcast(Packet),
}

/// A player record: the client-visible state plus server-side bookkeeping.
#[derive(Debug)]
pub struct Player {
    pub state: PlayerState,
    /// True once the player supplied their own display name; only named
    /// players count toward match start
    pub named: bool,
    /// Index of the safe zone assigned at join
    pub home_zone: usize,
    pub last_mark: Option<Instant>,
    pub last_trap: Option<Instant>,
}

impl Player {
    #[cfg(test)]
    pub fn test_fixture(id: u32, breed: Breed) -> Self {
        Self {
            state: PlayerState {
                id,
                name: format!("Dog {}", id),
                breed,
                body_color: breed.default_body_color().to_string(),
                mark_color: breed.default_mark_color().to_string(),
                x: 100.0,
                y: 100.0,
                health: MAX_HEALTH,
                charge: MAX_CHARGE,
                alive: true,
                trap_count: 0,
            },
            named: true,
            home_zone: 0,
            last_mark: None,
            last_trap: None,
        }
    }
}

/// A placed trap. The placement instant drives the grace period.
#[derive(Debug)]
pub struct Trap {
    pub id: u64,
    pub owner: u32,
    pub x: f32,
    pub y: f32,
    pub placed: Instant,
}

impl Trap {
    fn view(&self) -> TrapView {
        TrapView {
            id: self.id,
            owner: self.owner,
            x: self.x,
            y: self.y,
        }
    }
}

/// Match start and end bookkeeping.
#[derive(Debug)]
pub struct MatchClock {
    pub started: bool,
    pub over: bool,
    pub start: Option<Instant>,
    pub duration: Duration,
}

impl MatchClock {
    fn new() -> Self {
        Self {
            started: false,
            over: false,
            start: None,
            duration: Duration::from_secs(MATCH_DURATION_SECS),
        }
    }

    fn time_up(&self) -> bool {
        match self.start {
            Some(start) => start.elapsed() >= self.duration,
            None => false,
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// The authoritative match state.
pub struct GameState {
    pub registry: SessionRegistry,
    pub players: HashMap<u32, Player>,
    pub marks: HashMap<u64, Mark>,
    pub traps: HashMap<u64, Trap>,
    pub battles: BattleBook,
    pub clock: MatchClock,
    pub layout: Option<ArenaLayout>,
    next_mark_id: u64,
    next_trap_id: u64,
    /// Battles created since the network layer last drained them, so it
    /// can schedule their deadline timers
    started_battles: Vec<u64>,
}

impl GameState {
    pub fn new() -> Self {
        Self {
            registry: SessionRegistry::new(),
            players: HashMap::new(),
            marks: HashMap::new(),
            traps: HashMap::new(),
            battles: BattleBook::new(),
            clock: MatchClock::new(),
            layout: None,
            next_mark_id: 1,
            next_trap_id: 1,
            started_battles: Vec::new(),
        }
    }

    /// Battles created by recent handlers, needing deadline timers.
    pub fn take_started_battles(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.started_battles)
    }

    fn player_of(&self, addr: &SocketAddr) -> Option<u32> {
        let id = self.registry.find_by_addr(addr)?;
        self.players.contains_key(&id).then_some(id)
    }

    fn alive_player_of(&self, addr: &SocketAddr) -> Option<u32> {
        let id = self.player_of(addr)?;
        self.players
            .get(&id)
            .filter(|p| p.state.alive)
            .map(|p| p.state.id)
    }

    fn named_count(&self) -> usize {
        self.players.values().filter(|p| p.named).count()
    }

    fn alive_ids(&self) -> Vec<u32> {
        self.players
            .values()
            .filter(|p| p.state.alive)
            .map(|p| p.state.id)
            .collect()
    }

    /// Resets everything for a fresh match: new layout, cleared ledgers,
    /// rewound clock. Runs when the first player joins an empty arena.
    fn begin_cycle(&mut self) {
        let layout = layout::generate(&mut rand::thread_rng());
        self.registry.reset_zones(layout.houses.len());
        self.marks.clear();
        self.traps.clear();
        self.battles.clear();
        self.clock.reset();
        info!("Generated new arena layout ({} safe zones)", layout.houses.len());
        self.layout = Some(layout);
    }

    pub fn handle_join(
        &mut self,
        addr: SocketAddr,
        name: String,
        breed: Breed,
        body_color: String,
        mark_color: String,
    ) -> Vec<Outbound> {
        let mut out = Vec::new();

        // A reconnect from the same address replaces the old session
        if self.registry.find_by_addr(&addr).is_some() {
            out.extend(self.handle_leave(addr));
        }

        if self.registry.is_empty() {
            self.begin_cycle();
        }

        let id = self.registry.register(addr);

        let body_color = if body_color.is_empty() {
            breed.default_body_color().to_string()
        } else {
            body_color
        };
        let mark_color = if mark_color.is_empty() {
            breed.default_mark_color().to_string()
        } else {
            mark_color
        };
        let named = !name.trim().is_empty();
        let name = if named {
            name.trim().to_string()
        } else {
            format!("Dog {}", id)
        };

        let layout = self.layout.as_ref().expect("layout generated");
        let (zone, _fit) = self.registry.assign_zone(id, &body_color, &layout.houses);
        let (x, y) = layout.houses[zone].rect.center();

        let player = Player {
            state: PlayerState {
                id,
                name,
                breed,
                body_color,
                mark_color,
                x,
                y,
                health: MAX_HEALTH,
                charge: MAX_CHARGE,
                alive: true,
                trap_count: 0,
            },
            named,
            home_zone: zone,
            last_mark: None,
            last_trap: None,
        };
        info!(
            "Player {} ({}) joined at zone {} ({}, {})",
            id, player.state.name, zone, x, y
        );

        out.push(Outbound::To(
            id,
            Packet::Joined {
                player: player.state.clone(),
                layout: layout.clone(),
                duration_secs: MATCH_DURATION_SECS,
            },
        ));
        self.players.insert(id, player);

        out.push(Outbound::Broadcast(Packet::PlayerJoined {
            player: self.players[&id].state.clone(),
            total: self.players.len(),
        }));

        if !self.clock.started && self.named_count() >= PLAYERS_TO_START {
            self.clock.started = true;
            self.clock.start = Some(Instant::now());
            info!("Match started with {} players", self.players.len());
            out.push(Outbound::Broadcast(Packet::MatchStarted {
                start_ms: now_ms(),
            }));
        }

        out
    }

    pub fn handle_leave(&mut self, addr: SocketAddr) -> Vec<Outbound> {
        let Some(id) = self.registry.remove(&addr) else {
            return Vec::new();
        };
        self.players.remove(&id);
        self.marks.retain(|_, mark| mark.owner != id);
        self.traps.retain(|_, trap| trap.owner != id);
        // Pending battles involving the leaver are left to their deadline;
        // resolution treats the missing participant as a no-op.

        let mut out = vec![Outbound::Broadcast(Packet::PlayerLeft {
            id,
            total: self.players.len(),
        })];
        out.extend(self.check_match_end());
        out
    }

    pub fn handle_move(&mut self, addr: SocketAddr, x: f32, y: f32) -> Vec<Outbound> {
        let Some(id) = self.alive_player_of(&addr) else {
            debug!("Move rejected for unknown or dead session at {}", addr);
            return Vec::new();
        };

        let mut out = Vec::new();
        let (x, y) = clamp_to_arena(x, y);

        let home_zone = {
            let player = self.players.get_mut(&id).expect("player exists");
            player.state.x = x;
            player.state.y = y;
            player.home_zone
        };

        // Recharge while inside the player's own safe zone
        let in_home = self
            .layout
            .as_ref()
            .and_then(|l| l.houses.get(home_zone))
            .map(|house| house.rect.overlaps_circle(x, y, ZONE_SLACK))
            .unwrap_or(false);
        if in_home {
            let player = self.players.get_mut(&id).expect("player exists");
            if player.state.charge < MAX_CHARGE {
                player.state.charge =
                    (player.state.charge + RECHARGE_PER_UPDATE).min(MAX_CHARGE);
                out.push(Outbound::To(
                    id,
                    Packet::ResourceUpdated {
                        charge: player.state.charge,
                    },
                ));
            }
        }

        out.extend(self.trigger_traps(id, x, y));

        // A player eliminated by a trap mid-step no longer starts encounters
        if self.players.get(&id).is_some_and(|p| p.state.alive) {
            out.extend(self.detect_encounters(id, x, y));
        }

        let charge = self.players[&id].state.charge;
        out.push(Outbound::Broadcast(Packet::PlayerMoved { id, x, y, charge }));
        out
    }

    /// Consumes every armed trap the mover stepped on, applying damage and
    /// stopping early if the mover is eliminated.
    fn trigger_traps(&mut self, id: u32, x: f32, y: f32) -> Vec<Outbound> {
        let mut out = Vec::new();

        let tripped: Vec<u64> = self
            .traps
            .values()
            .filter(|trap| {
                trap.owner != id
                    && trap.placed.elapsed() >= Duration::from_millis(TRAP_GRACE_MS)
                    && distance(x, y, trap.x, trap.y) < TRAP_TRIGGER_RADIUS
            })
            .map(|trap| trap.id)
            .collect();

        for trap_id in tripped {
            let Some(trap) = self.traps.remove(&trap_id) else {
                continue;
            };
            if let Some(owner) = self.players.get_mut(&trap.owner) {
                owner.state.trap_count = owner.state.trap_count.saturating_sub(1);
            }

            let player = self.players.get_mut(&id).expect("player exists");
            player.state.health = player.state.health.saturating_sub(1);
            let health = player.state.health;
            debug!("Player {} hit trap {} (health {})", id, trap_id, health);
            out.push(Outbound::To(id, Packet::TrapHit { health }));

            if health == 0 {
                out.extend(self.eliminate(id));
                break;
            }
        }

        out
    }

    /// Starts a battle with every alive player in encounter range that the
    /// mover is not already facing.
    fn detect_encounters(&mut self, id: u32, x: f32, y: f32) -> Vec<Outbound> {
        let mover_name = self.players[&id].state.name.clone();
        let nearby: Vec<(u32, String)> = self
            .players
            .values()
            .filter(|other| {
                other.state.id != id
                    && other.state.alive
                    && distance(x, y, other.state.x, other.state.y) < ENCOUNTER_RADIUS
            })
            .map(|other| (other.state.id, other.state.name.clone()))
            .collect();

        let mut out = Vec::new();
        for (other_id, other_name) in nearby {
            let Some(battle_id) = self.battles.try_start(id, other_id) else {
                continue;
            };
            self.started_battles.push(battle_id);
            debug!(
                "Battle {} started between {} and {}",
                battle_id, id, other_id
            );
            out.push(Outbound::To(
                id,
                Packet::BattleStart {
                    battle_id,
                    opponent_id: other_id,
                    opponent_name: other_name,
                },
            ));
            out.push(Outbound::To(
                other_id,
                Packet::BattleStart {
                    battle_id,
                    opponent_id: id,
                    opponent_name: mover_name.clone(),
                },
            ));
        }
        out
    }

    pub fn handle_place_mark(&mut self, addr: SocketAddr, x: f32, y: f32) -> Vec<Outbound> {
        let Some(id) = self.alive_player_of(&addr) else {
            return Vec::new();
        };

        let player = self.players.get_mut(&id).expect("player exists");
        if player.state.charge < MARK_COST {
            debug!("Mark rejected for player {}: charge too low", id);
            return Vec::new();
        }
        let cooling = player
            .last_mark
            .is_some_and(|t| t.elapsed() < Duration::from_millis(MARK_COOLDOWN_MS));
        if cooling {
            debug!("Mark rejected for player {}: cooldown", id);
            return Vec::new();
        }

        player.state.charge -= MARK_COST;
        player.last_mark = Some(Instant::now());
        let charge = player.state.charge;
        let color = player.state.mark_color.clone();

        let (x, y) = clamp_to_arena(x, y);
        let mark = Mark {
            id: self.next_mark_id,
            owner: id,
            x,
            y,
            color,
            created_ms: now_ms(),
        };
        self.next_mark_id += 1;
        self.marks.insert(mark.id, mark.clone());

        vec![
            Outbound::Broadcast(Packet::MarkPlaced(mark)),
            Outbound::To(id, Packet::ResourceUpdated { charge }),
        ]
    }

    pub fn handle_place_trap(&mut self, addr: SocketAddr, x: f32, y: f32) -> Vec<Outbound> {
        let Some(id) = self.alive_player_of(&addr) else {
            return Vec::new();
        };

        let player = self.players.get_mut(&id).expect("player exists");
        let cooling = player
            .last_trap
            .is_some_and(|t| t.elapsed() < Duration::from_millis(TRAP_COOLDOWN_MS));
        if cooling {
            debug!("Trap rejected for player {}: cooldown", id);
            return Vec::new();
        }
        if player.state.trap_count >= MAX_TRAPS {
            debug!("Trap rejected for player {}: quota reached", id);
            return Vec::new();
        }

        player.state.trap_count += 1;
        player.last_trap = Some(Instant::now());

        let (x, y) = clamp_to_arena(x, y);
        let trap = Trap {
            id: self.next_trap_id,
            owner: id,
            x,
            y,
            placed: Instant::now(),
        };
        self.next_trap_id += 1;
        let view = trap.view();
        self.traps.insert(trap.id, trap);

        vec![Outbound::Broadcast(Packet::TrapPlaced(view))]
    }

    pub fn handle_battle_choice(
        &mut self,
        addr: SocketAddr,
        battle_id: u64,
        choice: Choice,
    ) -> Vec<Outbound> {
        let Some(id) = self.player_of(&addr) else {
            return Vec::new();
        };

        match self.battles.record_choice(battle_id, id, choice) {
            ChoiceOutcome::Rejected => {
                debug!("Choice rejected for player {} on battle {}", id, battle_id);
                Vec::new()
            }
            ChoiceOutcome::Recorded => Vec::new(),
            ChoiceOutcome::Ready(battle) => self.resolve_battle(battle),
        }
    }

    /// Deadline fired for a battle. A no-op when the battle resolved early.
    pub fn handle_battle_deadline(&mut self, battle_id: u64) -> Vec<Outbound> {
        let Some(mut battle) = self.battles.take(battle_id) else {
            return Vec::new();
        };
        for participant in battle.participants {
            battle
                .choices
                .entry(participant)
                .or_insert_with(battle::random_choice);
        }
        self.resolve_battle(battle)
    }

    pub fn handle_request_leaderboard(&mut self, addr: SocketAddr) -> Vec<Outbound> {
        let Some(id) = self.player_of(&addr) else {
            return Vec::new();
        };
        vec![Outbound::To(
            id,
            Packet::LeaderboardUpdate(scoring::leaderboard(&self.players, &self.marks)),
        )]
    }

    /// Runs exactly once per battle: the battle has already left the pending
    /// set and both choices are present.
    fn resolve_battle(&mut self, mut battle: Battle) -> Vec<Outbound> {
        battle.abort_timer();
        let [a, b] = battle.participants;
        let (Some(&choice_a), Some(&choice_b)) = (battle.choices.get(&a), battle.choices.get(&b))
        else {
            return Vec::new();
        };

        let both_alive = self.players.get(&a).is_some_and(|p| p.state.alive)
            && self.players.get(&b).is_some_and(|p| p.state.alive);

        let mut out = Vec::new();
        let (outcome_a, outcome_b) = if !both_alive || choice_a == choice_b {
            // A battle whose participants are not both alive resolves as a
            // no-op rather than being re-fought.
            (BattleOutcome::Draw, BattleOutcome::Draw)
        } else {
            let a_wins = choice_a.beats(choice_b);
            let loser = if a_wins { b } else { a };

            let player = self.players.get_mut(&loser).expect("loser alive");
            player.state.health = player.state.health.saturating_sub(1);
            if player.state.health == 0 {
                out.extend(self.eliminate(loser));
            }

            if a_wins {
                (BattleOutcome::Win, BattleOutcome::Loss)
            } else {
                (BattleOutcome::Loss, BattleOutcome::Win)
            }
        };

        let health_a = self.players.get(&a).map(|p| p.state.health).unwrap_or(0);
        let health_b = self.players.get(&b).map(|p| p.state.health).unwrap_or(0);
        info!(
            "Battle {} resolved: {:?} vs {:?} -> {:?}/{:?}",
            battle.id, choice_a, choice_b, outcome_a, outcome_b
        );

        out.push(Outbound::To(
            a,
            Packet::BattleResult {
                battle_id: battle.id,
                your_choice: choice_a,
                opponent_choice: choice_b,
                outcome: outcome_a,
                your_health: health_a,
                opponent_health: health_b,
            },
        ));
        out.push(Outbound::To(
            b,
            Packet::BattleResult {
                battle_id: battle.id,
                your_choice: choice_b,
                opponent_choice: choice_a,
                outcome: outcome_b,
                your_health: health_b,
                opponent_health: health_a,
            },
        ));
        out.extend(self.check_match_end());
        out
    }

    /// Marks a player dead, notifies everyone, and re-evaluates the match
    /// end conditions.
    fn eliminate(&mut self, id: u32) -> Vec<Outbound> {
        if let Some(player) = self.players.get_mut(&id) {
            player.state.alive = false;
            info!("Player {} ({}) eliminated", id, player.state.name);
        }
        let mut out = vec![Outbound::Broadcast(Packet::PlayerEliminated { id })];
        out.extend(self.check_match_end());
        out
    }

    /// Evaluates end conditions. Idempotent: once the match is over this
    /// does nothing until a new cycle begins.
    fn check_match_end(&mut self) -> Vec<Outbound> {
        if !self.clock.started || self.clock.over {
            return Vec::new();
        }

        let alive = self.alive_ids();
        let winner: Option<LeaderboardEntry> = if self.clock.time_up() {
            scoring::leaderboard(&self.players, &self.marks)
                .into_iter()
                .next()
        } else if alive.len() == 1 {
            scoring::leaderboard(&self.players, &self.marks)
                .into_iter()
                .find(|entry| entry.id == alive[0])
        } else if alive.is_empty() {
            None
        } else {
            return Vec::new();
        };

        self.clock.over = true;
        match &winner {
            Some(entry) => info!("Match ended, winner: {} ({})", entry.name, entry.id),
            None => info!("Match ended with no winner"),
        }
        vec![Outbound::Broadcast(Packet::MatchEnded { winner })]
    }

    /// Periodic tick: sweeps silent sessions, then emits either the waiting
    /// status or the leaderboard plus a time-based end check.
    pub fn handle_tick(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();

        for addr in self.registry.timed_out() {
            info!("Session at {} timed out", addr);
            out.extend(self.handle_leave(addr));
        }

        if self.players.is_empty() {
            return out;
        }

        if !self.clock.started {
            out.push(Outbound::Broadcast(Packet::WaitingForPlayers {
                current: self.named_count(),
                required: PLAYERS_TO_START,
            }));
        } else if !self.clock.over {
            out.push(Outbound::Broadcast(Packet::LeaderboardUpdate(
                scoring::leaderboard(&self.players, &self.marks),
            )));
            out.extend(self.check_match_end());
        }

        out
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
