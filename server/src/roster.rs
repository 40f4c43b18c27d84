//! Fake player rosters for the test-double server
//!
//! Real servers often report every player with index 0, so generated rosters
//! do the same. Order is whatever the roster was built with.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::PlayerInfo;

const NAMES: [&str; 12] = [
    "Heavy", "Scout", "Soldier", "Pyro", "Demoman", "Engineer", "Medic", "Sniper", "Spy",
    "Gordon", "Alyx", "Barney",
];

/// Builds `count` players with random names, scores and connection times.
pub fn generate_players<R: Rng>(count: usize, rng: &mut R) -> Vec<PlayerInfo> {
    (0..count)
        .map(|i| {
            let base = NAMES.choose(rng).copied().unwrap_or("Player");
            PlayerInfo {
                index: 0,
                name: format!("{}{}", base, i + 1),
                score: rng.gen_range(0..100),
                duration: rng.gen_range(5.0..7200.0),
            }
        })
        .collect()
}

/// Simple roster with predictable values, handy for demos and tests.
pub fn fixed_players(names: &[&str]) -> Vec<PlayerInfo> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| PlayerInfo {
            index: 0,
            name: name.to_string(),
            score: (i as u32 + 1) * 10,
            duration: (i as f32 + 1.0) * 60.0,
        })
        .collect()
}
