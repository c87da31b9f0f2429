use serde::{Deserialize, Serialize};

pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;
pub const MOVE_MARGIN: f32 = 15.0;
pub const HOUSE_SIZE: f32 = 60.0;
pub const ZONE_SLACK: f32 = 16.0;

pub const MAX_HEALTH: u8 = 5;
pub const MAX_CHARGE: u8 = 100;
pub const MAX_TRAPS: u8 = 5;
pub const RECHARGE_PER_UPDATE: u8 = 1;

pub const MARK_COST: u8 = 20;
pub const MARK_COOLDOWN_MS: u64 = 1_000;
pub const TRAP_COOLDOWN_MS: u64 = 3_000;
pub const TRAP_GRACE_MS: u64 = 1_000;
pub const TRAP_TRIGGER_RADIUS: f32 = 20.0;
pub const ENCOUNTER_RADIUS: f32 = 30.0;

pub const BATTLE_DEADLINE_SECS: u64 = 5;
pub const MATCH_DURATION_SECS: u64 = 300;
pub const PLAYERS_TO_START: usize = 2;

/// Cosmetic avatar breeds. Purely visual, but each carries a default
/// body and mark color used when a client joins without picking its own.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Breed {
    Shiba,
    Beagle,
    Dachshund,
    Bulldog,
    Poodle,
    Retriever,
    Labrador,
    Chihuahua,
}

impl Breed {
    pub fn display_name(&self) -> &'static str {
        match self {
            Breed::Shiba => "Shiba",
            Breed::Beagle => "Beagle",
            Breed::Dachshund => "Dachshund",
            Breed::Bulldog => "Bulldog",
            Breed::Poodle => "Poodle",
            Breed::Retriever => "Retriever",
            Breed::Labrador => "Labrador",
            Breed::Chihuahua => "Chihuahua",
        }
    }

    pub fn default_body_color(&self) -> &'static str {
        match self {
            Breed::Shiba => "#FFD700",
            Breed::Beagle => "#8B4513",
            Breed::Dachshund => "#654321",
            Breed::Bulldog => "#696969",
            Breed::Poodle => "#F5F5DC",
            Breed::Retriever => "#DAA520",
            Breed::Labrador => "#000000",
            Breed::Chihuahua => "#DEB887",
        }
    }

    pub fn default_mark_color(&self) -> &'static str {
        match self {
            Breed::Shiba => "#FFFF00",
            Breed::Beagle => "#FFA500",
            Breed::Dachshund => "#FF8C00",
            Breed::Bulldog => "#FF6347",
            Breed::Poodle => "#FFB6C1",
            Breed::Retriever => "#FFD700",
            Breed::Labrador => "#FF4500",
            Breed::Chihuahua => "#FF69B4",
        }
    }
}

/// A duel choice. The beats-relation is the usual cycle:
/// rock > scissors > paper > rock.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Rock,
    Paper,
    Scissors,
}

impl Choice {
    pub fn beats(&self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Rock, Choice::Scissors)
                | (Choice::Scissors, Choice::Paper)
                | (Choice::Paper, Choice::Rock)
        )
    }
}

/// Duel outcome from the recipient's perspective.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BattleOutcome {
    Win,
    Loss,
    Draw,
}

/// Everything a client needs to render another player.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayerState {
    pub id: u32,
    pub name: String,
    pub breed: Breed,
    pub body_color: String,
    pub mark_color: String,
    pub x: f32,
    pub y: f32,
    pub health: u8,
    pub charge: u8,
    pub alive: bool,
    pub trap_count: u8,
}

/// A territory mark. Immutable once placed; the color is the owner's
/// mark color at placement time, not a live reference.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Mark {
    pub id: u64,
    pub owner: u32,
    pub x: f32,
    pub y: f32,
    pub color: String,
    pub created_ms: u64,
}

/// The client-visible part of a trap. The grace-period clock stays
/// server-side.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TrapView {
    pub id: u64,
    pub owner: u32,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Circle-vs-rect overlap test, used for safe-zone occupancy where a
    /// player only partially inside the zone still counts.
    pub fn overlaps_circle(&self, cx: f32, cy: f32, radius: f32) -> bool {
        cx + radius > self.x
            && cx - radius < self.x + self.width
            && cy + radius > self.y
            && cy - radius < self.y + self.height
    }
}

/// A colored rectangle of the arena: roads, parks, shop floors.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Zone {
    pub rect: Rect,
    pub color: String,
}

/// A safe-zone house. Players assigned to a house recharge inside it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct House {
    pub id: usize,
    pub rect: Rect,
    pub color: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkKind {
    Fountain,
    Park,
    Shop,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Landmark {
    pub rect: Rect,
    pub kind: LandmarkKind,
    pub color: String,
}

/// Static arena geometry, generated once per match cycle and read-only
/// afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ArenaLayout {
    pub houses: Vec<House>,
    pub roads: Vec<Zone>,
    pub landmarks: Vec<Landmark>,
    pub parks: Vec<Zone>,
    pub shops: Vec<Zone>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LeaderboardEntry {
    pub id: u32,
    pub name: String,
    pub breed: Breed,
    pub health: u8,
    pub territory: f32,
    pub color: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> server
    Join {
        name: String,
        breed: Breed,
        body_color: String,
        mark_color: String,
    },
    Move {
        x: f32,
        y: f32,
    },
    PlaceMark {
        x: f32,
        y: f32,
    },
    PlaceTrap {
        x: f32,
        y: f32,
    },
    BattleChoice {
        battle_id: u64,
        choice: Choice,
    },
    RequestLeaderboard,
    Heartbeat,
    Disconnect,

    // Server -> client
    Joined {
        player: PlayerState,
        layout: ArenaLayout,
        duration_secs: u64,
    },
    PlayerJoined {
        player: PlayerState,
        total: usize,
    },
    PlayerLeft {
        id: u32,
        total: usize,
    },
    PlayerMoved {
        id: u32,
        x: f32,
        y: f32,
        charge: u8,
    },
    MarkPlaced(Mark),
    TrapPlaced(TrapView),
    ResourceUpdated {
        charge: u8,
    },
    TrapHit {
        health: u8,
    },
    PlayerEliminated {
        id: u32,
    },
    BattleStart {
        battle_id: u64,
        opponent_id: u32,
        opponent_name: String,
    },
    BattleResult {
        battle_id: u64,
        your_choice: Choice,
        opponent_choice: Choice,
        outcome: BattleOutcome,
        your_health: u8,
        opponent_health: u8,
    },
    LeaderboardUpdate(Vec<LeaderboardEntry>),
    MatchStarted {
        start_ms: u64,
    },
    WaitingForPlayers {
        current: usize,
        required: usize,
    },
    MatchEnded {
        winner: Option<LeaderboardEntry>,
    },
}

pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    (dx * dx + dy * dy).sqrt()
}

/// Clamps a position to the playable arena, keeping the avatar body
/// fully on screen.
pub fn clamp_to_arena(x: f32, y: f32) -> (f32, f32) {
    (
        x.clamp(MOVE_MARGIN, ARENA_WIDTH - MOVE_MARGIN),
        y.clamp(MOVE_MARGIN, ARENA_HEIGHT - MOVE_MARGIN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_choice_beats_cycle() {
        assert!(Choice::Rock.beats(Choice::Scissors));
        assert!(Choice::Scissors.beats(Choice::Paper));
        assert!(Choice::Paper.beats(Choice::Rock));

        assert!(!Choice::Scissors.beats(Choice::Rock));
        assert!(!Choice::Paper.beats(Choice::Scissors));
        assert!(!Choice::Rock.beats(Choice::Paper));

        for choice in [Choice::Rock, Choice::Paper, Choice::Scissors] {
            assert!(!choice.beats(choice));
        }
    }

    #[test]
    fn test_distance() {
        assert_approx_eq!(distance(0.0, 0.0, 3.0, 4.0), 5.0, 0.0001);
        assert_approx_eq!(distance(10.0, 10.0, 10.0, 10.0), 0.0, 0.0001);
    }

    #[test]
    fn test_clamp_to_arena() {
        let (x, y) = clamp_to_arena(-50.0, 1000.0);
        assert_eq!(x, MOVE_MARGIN);
        assert_eq!(y, ARENA_HEIGHT - MOVE_MARGIN);

        let (x, y) = clamp_to_arena(400.0, 300.0);
        assert_eq!(x, 400.0);
        assert_eq!(y, 300.0);
    }

    #[test]
    fn test_rect_overlaps_circle() {
        let rect = Rect::new(100.0, 100.0, 60.0, 60.0);

        // Center inside
        assert!(rect.overlaps_circle(130.0, 130.0, 16.0));
        // Partially overlapping from the left edge
        assert!(rect.overlaps_circle(90.0, 130.0, 16.0));
        // Clearly outside
        assert!(!rect.overlaps_circle(0.0, 0.0, 16.0));
        // Just beyond the radius
        assert!(!rect.overlaps_circle(100.0 - 16.0, 130.0, 16.0));
    }

    #[test]
    fn test_rect_center() {
        let rect = Rect::new(100.0, 200.0, 60.0, 60.0);
        let (cx, cy) = rect.center();
        assert_approx_eq!(cx, 130.0, 0.0001);
        assert_approx_eq!(cy, 230.0, 0.0001);
    }

    #[test]
    fn test_breed_defaults() {
        assert_eq!(Breed::Shiba.display_name(), "Shiba");
        assert_eq!(Breed::Shiba.default_body_color(), "#FFD700");
        assert_eq!(Breed::Labrador.default_mark_color(), "#FF4500");
    }

    #[test]
    fn test_packet_serialization_join() {
        let packet = Packet::Join {
            name: "Rex".to_string(),
            breed: Breed::Beagle,
            body_color: "#8B4513".to_string(),
            mark_color: "#FFA500".to_string(),
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Join { name, breed, .. } => {
                assert_eq!(name, "Rex");
                assert_eq!(breed, Breed::Beagle);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_battle_result() {
        let packet = Packet::BattleResult {
            battle_id: 7,
            your_choice: Choice::Rock,
            opponent_choice: Choice::Scissors,
            outcome: BattleOutcome::Win,
            your_health: 5,
            opponent_health: 4,
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::BattleResult {
                battle_id,
                your_choice,
                opponent_choice,
                outcome,
                your_health,
                opponent_health,
            } => {
                assert_eq!(battle_id, 7);
                assert_eq!(your_choice, Choice::Rock);
                assert_eq!(opponent_choice, Choice::Scissors);
                assert_eq!(outcome, BattleOutcome::Win);
                assert_eq!(your_health, 5);
                assert_eq!(opponent_health, 4);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_leaderboard() {
        let entries = vec![
            LeaderboardEntry {
                id: 1,
                name: "Rex".to_string(),
                breed: Breed::Shiba,
                health: 5,
                territory: 75.0,
                color: "#FFD700".to_string(),
            },
            LeaderboardEntry {
                id: 2,
                name: "Fido".to_string(),
                breed: Breed::Poodle,
                health: 3,
                territory: 25.0,
                color: "#F5F5DC".to_string(),
            },
        ];

        let packet = Packet::LeaderboardUpdate(entries.clone());
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::LeaderboardUpdate(got) => assert_eq!(got, entries),
            _ => panic!("Wrong packet type after deserialization"),
        }
    }
}
