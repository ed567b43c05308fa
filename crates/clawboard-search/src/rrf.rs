//! Reciprocal-rank fusion across the vector, BM25, and lexical rankings.

use std::collections::HashMap;

/// Standard RRF constant.
pub const RRF_K: f32 = 60.0;

/// Fuse rankings: each list contributes `1/(k + rank)` for every candidate
/// it contains (rank is 1-based). The fused map is normalized to [0, 1] by
/// the best fused score.
pub fn fuse(rankings: &[Vec<(String, f32)>]) -> HashMap<String, f32> {
    let mut fused: HashMap<String, f32> = HashMap::new();
    for ranking in rankings {
        let mut ordered: Vec<&(String, f32)> = ranking.iter().collect();
        ordered.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (id, _)) in ordered.iter().enumerate() {
            *fused.entry(id.clone()).or_default() += 1.0 / (RRF_K + rank as f32 + 1.0);
        }
    }
    let max = fused.values().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for value in fused.values_mut() {
            *value /= max;
        }
    }
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(pairs: &[(&str, f32)]) -> Vec<(String, f32)> {
        pairs.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn candidate_in_all_rankings_wins() {
        let fused = fuse(&[
            ranking(&[("a", 0.9), ("b", 0.5)]),
            ranking(&[("a", 3.1), ("c", 1.0)]),
            ranking(&[("a", 0.2), ("b", 0.1)]),
        ]);
        assert!((fused["a"] - 1.0).abs() < 1e-6);
        assert!(fused["a"] > fused["b"]);
        assert!(fused["b"] > fused["c"]);
    }

    #[test]
    fn normalization_bounds_scores() {
        let fused = fuse(&[ranking(&[("a", 1.0), ("b", 0.9), ("c", 0.8)])]);
        for value in fused.values() {
            assert!(*value > 0.0 && *value <= 1.0);
        }
    }

    #[test]
    fn empty_rankings_fuse_to_empty() {
        assert!(fuse(&[]).is_empty());
        assert!(fuse(&[vec![]]).is_empty());
    }
}
