//! One-shot arena layout generation.
//!
//! Produces the static town geometry the match is played on: twelve colored
//! houses (the safe zones), a road grid, and a handful of landmarks. House
//! positions are shuffled each generation so consecutive matches differ, and
//! every rectangle is clamped inside the arena margin.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{ArenaLayout, House, Landmark, LandmarkKind, Rect, Zone, ARENA_HEIGHT, ARENA_WIDTH, HOUSE_SIZE};

const LAYOUT_MARGIN: f32 = 20.0;

const HOUSE_SPOTS: [(f32, f32, &str); 12] = [
    // Top row
    (60.0, 60.0, "#FFD700"),
    (220.0, 60.0, "#8B4513"),
    (380.0, 60.0, "#654321"),
    (540.0, 60.0, "#696969"),
    // Middle row
    (120.0, 250.0, "#F5F5DC"),
    (320.0, 250.0, "#DAA520"),
    (520.0, 250.0, "#000000"),
    // Bottom row
    (60.0, 440.0, "#DEB887"),
    (220.0, 440.0, "#FF69B4"),
    (380.0, 440.0, "#00BFFF"),
    (540.0, 440.0, "#32CD32"),
    (320.0, 540.0, "#FFD700"),
];

/// Clamps a rectangle so it sits fully inside the arena margin.
fn clamped_rect(x: f32, y: f32, width: f32, height: f32) -> Rect {
    let max_x = (ARENA_WIDTH - width - LAYOUT_MARGIN).max(LAYOUT_MARGIN);
    let max_y = (ARENA_HEIGHT - height - LAYOUT_MARGIN).max(LAYOUT_MARGIN);
    Rect::new(x.clamp(LAYOUT_MARGIN, max_x), y.clamp(LAYOUT_MARGIN, max_y), width, height)
}

fn zone(x: f32, y: f32, width: f32, height: f32, color: &str) -> Zone {
    Zone {
        rect: clamped_rect(x, y, width, height),
        color: color.to_string(),
    }
}

fn landmark(x: f32, y: f32, width: f32, height: f32, kind: LandmarkKind, color: &str) -> Landmark {
    Landmark {
        rect: clamped_rect(x, y, width, height),
        kind,
        color: color.to_string(),
    }
}

/// Generates a fresh arena layout. Called exactly once per match cycle, on
/// the first join into an empty registry.
pub fn generate(rng: &mut impl Rng) -> ArenaLayout {
    let mut spots = HOUSE_SPOTS;
    spots.shuffle(rng);

    let houses = spots
        .iter()
        .enumerate()
        .map(|(id, (x, y, color))| House {
            id,
            rect: clamped_rect(*x, *y, HOUSE_SIZE, HOUSE_SIZE),
            color: color.to_string(),
        })
        .collect();

    let roads = vec![
        // Main horizontal road
        zone(LAYOUT_MARGIN, 300.0, ARENA_WIDTH - 2.0 * LAYOUT_MARGIN, 20.0, "#8B4513"),
        // Two vertical roads
        zone(200.0, LAYOUT_MARGIN, 20.0, ARENA_HEIGHT - 2.0 * LAYOUT_MARGIN, "#8B4513"),
        zone(600.0, LAYOUT_MARGIN, 20.0, ARENA_HEIGHT - 2.0 * LAYOUT_MARGIN, "#8B4513"),
        // Small connecting roads
        zone(LAYOUT_MARGIN, 100.0, 200.0 - LAYOUT_MARGIN, 10.0, "#A0522D"),
        zone(600.0, 100.0, ARENA_WIDTH - 600.0 - LAYOUT_MARGIN, 10.0, "#A0522D"),
        zone(LAYOUT_MARGIN, 500.0, 200.0 - LAYOUT_MARGIN, 10.0, "#A0522D"),
        zone(600.0, 500.0, ARENA_WIDTH - 600.0 - LAYOUT_MARGIN, 10.0, "#A0522D"),
    ];

    let landmarks = vec![
        landmark(375.0, 275.0, 50.0, 50.0, LandmarkKind::Fountain, "#87CEEB"),
        landmark(300.0, 50.0, 200.0, 100.0, LandmarkKind::Park, "#90EE90"),
        landmark(350.0, 450.0, 100.0, 60.0, LandmarkKind::Shop, "#FFB6C1"),
    ];

    let parks = vec![
        zone(300.0, 50.0, 200.0, 100.0, "#90EE90"),
        zone(50.0, 250.0, 100.0, 80.0, "#90EE90"),
        zone(650.0, 250.0, 100.0, 80.0, "#90EE90"),
    ];

    let shops = vec![zone(350.0, 450.0, 100.0, 60.0, "#FFB6C1")];

    ArenaLayout {
        houses,
        roads,
        landmarks,
        parks,
        shops,
    }
}
