//! Default label pool
//!
//! Profiles and templates created without a label receive a random name from
//! this pool.

use rand::seq::SliceRandom;
use std::collections::BTreeSet;

pub const NAMES: &[&str] = &[
    "digital_dynamo",
    "futuristic_fusion",
    "optical_odyssey",
    "radiant_rocket",
    "super_sonic",
    "crystal_cruiser",
    "creative_cyber",
    "efficient_explorer",
    "virtual_venture",
    "nifty_navigator",
    "glorious_galaxy",
    "optimized_operations",
    "astonishing_adventure",
    "elegant_evolution",
    "smooth_symphony",
    "powerful_prodigy",
    "virtual_visionary",
    "sleek_sentinel",
    "energetic_explorer",
    "optimistic_odyssey",
    "fantastic_frontier",
    "digital_dominion",
    "efficient_evolution",
    "virtual_voyager",
    "nimble_navigator",
    "glorious_gateway",
    "astonishing_array",
    "elegant_enterprise",
    "sophisticated_symphony",
    "perfect_prodigy",
    "virtual_victory",
    "speedy_sentinel",
    "energetic_enterprise",
    "optimistic_optimizer",
    "futuristic_fortune",
    "dynamic_dynamo",
    "flawless_fusion",
    "optimal_odyssey",
    "radiant_realm",
    "superior_symphony",
    "crystal_crusader",
    "creative_computing",
    "efficient_exec",
    "virtual_vision",
    "nifty_network",
    "glorious_grid",
    "optimized_optimizer",
    "astonishing_accelerator",
    "elegant_explorer",
];

/// Picks a random name from the pool
pub fn random_label() -> String {
    let mut rng = rand::thread_rng();
    NAMES.choose(&mut rng).copied().unwrap_or(NAMES[0]).to_string()
}

/// Picks a random pool name not yet in `taken`
///
/// Once every pool name is taken, a numeric suffix is appended to a random
/// name, starting at `_2`.
pub fn pick_label(taken: &BTreeSet<String>) -> String {
    let mut rng = rand::thread_rng();
    let free: Vec<&str> = NAMES
        .iter()
        .copied()
        .filter(|name| !taken.contains(*name))
        .collect();

    if let Some(name) = free.choose(&mut rng) {
        return name.to_string();
    }

    let base = NAMES.choose(&mut rng).copied().unwrap_or(NAMES[0]);
    (2..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_label_from_pool() {
        let label = random_label();
        assert!(NAMES.contains(&label.as_str()));
    }

    #[test]
    fn test_pick_label_skips_taken() {
        let taken: BTreeSet<String> = NAMES[1..].iter().map(|s| s.to_string()).collect();
        assert_eq!(pick_label(&taken), NAMES[0]);
    }

    #[test]
    fn test_pick_label_when_pool_exhausted() {
        let taken: BTreeSet<String> = NAMES.iter().map(|s| s.to_string()).collect();
        let label = pick_label(&taken);
        assert!(label.ends_with("_2"));
        assert!(!taken.contains(&label));
    }

    #[test]
    fn test_pool_has_no_duplicates() {
        let unique: BTreeSet<&str> = NAMES.iter().copied().collect();
        assert_eq!(unique.len(), NAMES.len());
    }
}
