//! Territory scoring and leaderboard derivation.

use crate::game::Player;
use shared::{LeaderboardEntry, Mark};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Share of all marks on the field owned by the player, in percent.
/// Zero when the field is empty.
pub fn territory_percentage(marks: &HashMap<u64, Mark>, player_id: u32) -> f32 {
    if marks.is_empty() {
        return 0.0;
    }
    let owned = marks.values().filter(|m| m.owner == player_id).count();
    owned as f32 / marks.len() as f32 * 100.0
}

/// All players ranked by territory percentage descending, ties broken by
/// health descending.
pub fn leaderboard(players: &HashMap<u32, Player>, marks: &HashMap<u64, Mark>) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = players
        .values()
        .map(|player| LeaderboardEntry {
            id: player.state.id,
            name: player.state.name.clone(),
            breed: player.state.breed,
            health: player.state.health,
            territory: territory_percentage(marks, player.state.id),
            color: player.state.body_color.clone(),
        })
        .collect();

    entries.sort_by(|a, b| {
        b.territory
            .partial_cmp(&a.territory)
            .unwrap_or(Ordering::Equal)
            .then(b.health.cmp(&a.health))
    });

    entries
}
