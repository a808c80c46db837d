// src/biometrics/pattern_pruner.rs - Bounded, diversity-preserving pattern history
use log::debug;
use rand::Rng;

use crate::models::KeystrokePattern;

/// Share of the budget always given to the newest patterns
const RECENT_SHARE: f64 = 0.7;

/// Number of newest patterns that always survive pruning
pub fn recent_quota(max_patterns: usize) -> usize {
    (max_patterns as f64 * RECENT_SHARE).floor() as usize
}

/// Trim `patterns` to at most `max_patterns`.
///
/// The newest 70% of the budget is kept as-is. The remaining slots go to older
/// patterns chosen greedily for diversity: one random seed, then whichever
/// candidate is farthest on average from everything selected so far. The result
/// is in ascending timestamp order.
pub fn prune<R: Rng + ?Sized>(
    mut patterns: Vec<KeystrokePattern>,
    max_patterns: usize,
    rng: &mut R,
) -> Vec<KeystrokePattern> {
    if patterns.len() <= max_patterns {
        return patterns;
    }
    let original = patterns.len();

    // newest first; ties broken by id so the order never depends on input order
    patterns.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.pattern_id.cmp(&b.pattern_id))
    });

    let keep = recent_quota(max_patterns);
    let older = patterns.split_off(keep);
    let mut kept = patterns;

    let diverse = select_diverse(older, max_patterns - keep, rng);
    kept.extend(diverse);
    kept.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.pattern_id.cmp(&b.pattern_id))
    });

    debug!("Pruned pattern history from {} to {}", original, kept.len());
    kept
}

fn select_diverse<R: Rng + ?Sized>(
    candidates: Vec<KeystrokePattern>,
    quota: usize,
    rng: &mut R,
) -> Vec<KeystrokePattern> {
    if quota == 0 || candidates.is_empty() {
        return Vec::new();
    }
    if candidates.len() <= quota {
        return candidates;
    }

    let features: Vec<PatternFeatures> = candidates.iter().map(PatternFeatures::from).collect();
    let mut selected: Vec<usize> = vec![rng.gen_range(0..candidates.len())];
    let mut remaining: Vec<usize> = (0..candidates.len()).filter(|i| *i != selected[0]).collect();

    while selected.len() < quota && !remaining.is_empty() {
        let mut best_position = 0;
        let mut best_distance = f64::MIN;

        for (position, candidate) in remaining.iter().enumerate() {
            let average = selected
                .iter()
                .map(|chosen| features[*candidate].distance(&features[*chosen]))
                .sum::<f64>()
                / selected.len() as f64;
            if average > best_distance {
                best_distance = average;
                best_position = position;
            }
        }

        selected.push(remaining.remove(best_position));
    }

    let mut slots: Vec<Option<KeystrokePattern>> = candidates.into_iter().map(Some).collect();
    selected
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect()
}

/// Speed and rhythm summary used for the diversity distance
struct PatternFeatures {
    words_per_minute: f64,
    rhythm: Vec<f64>,
}

impl From<&KeystrokePattern> for PatternFeatures {
    fn from(pattern: &KeystrokePattern) -> Self {
        PatternFeatures {
            words_per_minute: pattern.words_per_minute(),
            rhythm: pattern.rhythm_vector(),
        }
    }
}

impl PatternFeatures {
    /// Speed difference plus mean absolute rhythm difference over the overlap
    fn distance(&self, other: &PatternFeatures) -> f64 {
        let speed = (self.words_per_minute - other.words_per_minute).abs();
        let overlap = self.rhythm.len().min(other.rhythm.len());
        let rhythm = if overlap == 0 {
            0.0
        } else {
            self.rhythm
                .iter()
                .zip(&other.rhythm)
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / overlap as f64
        };
        speed + rhythm
    }
}
