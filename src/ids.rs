//! Id allocation for images and placements.
//!
//! When a client omits an id the server must invent one that can't collide
//! with the small, dense ids the Unicode-placeholder encoding reserves
//! (spec.md §9 "Id allocation"). Both generators loop until the candidate
//! clears the exclusion bands and isn't already in use.

use rand::Rng;

pub type ImageId = u32;
pub type PlacementId = u32;

/// Generates a random 32-bit image id with the top byte nonzero and at
/// least one of the middle two bytes nonzero, retrying against `taken`.
pub fn generate_image_id(mut taken: impl FnMut(ImageId) -> bool) -> ImageId {
    let mut rng = rand::rng();
    loop {
        let id: u32 = rng.random();
        let degenerate = (id & 0xFF00_0000) == 0 || (id & 0x00FF_FF00) == 0;
        if !degenerate && !taken(id) {
            return id;
        }
    }
}

/// Generates a random 24-bit placement id, excluding ids that need only
/// one byte, retrying against `taken`.
pub fn generate_placement_id(mut taken: impl FnMut(PlacementId) -> bool) -> PlacementId {
    let mut rng = rand::rng();
    loop {
        let id: u32 = rng.random::<u32>() & 0x00FF_FFFF;
        let degenerate = (id & 0x00FF_FF00) == 0;
        if !degenerate && !taken(id) {
            return id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn image_ids_avoid_degenerate_bands() {
        for _ in 0..500 {
            let id = generate_image_id(|_| false);
            assert_ne!(id & 0xFF00_0000, 0);
            assert_ne!(id & 0x00FF_FF00, 0);
        }
    }

    #[test]
    fn placement_ids_stay_in_24_bits_and_avoid_degenerate_band() {
        for _ in 0..500 {
            let id = generate_placement_id(|_| false);
            assert_eq!(id & 0xFF00_0000, 0);
            assert_ne!(id & 0x00FF_FF00, 0);
        }
    }

    #[test]
    fn generator_skips_taken_ids() {
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let id = generate_image_id(|candidate| seen.contains(&candidate));
            assert!(seen.insert(id), "generator returned a duplicate id");
        }
    }
}
