use std::cmp::Ordering;

pub fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Top-Mean-Max normalization: rescale a score list onto [0,1] using the
/// minimum as the floor and the mean of the top three scores as the
/// ceiling.
///
/// Averaging the top of the distribution instead of taking the single max
/// damps the influence of one outlier score, which matters when two
/// differently-scaled ranking systems are fused afterwards. Scores above
/// the ceiling clamp to 1.0.
pub fn tmm_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min_score = scores
        .iter()
        .copied()
        .filter(|s| s.is_finite())
        .fold(f32::INFINITY, f32::min);
    if !min_score.is_finite() {
        return vec![0.0; scores.len()];
    }

    let mut sorted: Vec<f32> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
    let k = sorted.len().min(3);
    let ceiling = sorted.iter().take(k).sum::<f32>() / k as f32;

    // Degenerate spread: every score is the same (or close enough that the
    // division would explode). Everything is maximally relevant.
    if (ceiling - min_score).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|s| {
            if s.is_finite() {
                clamp_unit((s - min_score) / (ceiling - min_score))
            } else {
                0.0
            }
        })
        .collect()
}

/// Synthesized relevance scores for a list that only carries rank order:
/// the document at 1-indexed rank `r` gets `1/r`.
pub fn reciprocal_rank_scores(len: usize) -> Vec<f32> {
    (1..=len).map(|rank| 1.0 / rank as f32).collect()
}

/// Convex combination of the two normalized retrieval signals:
/// `alpha * vector + (1 - alpha) * keyword`.
pub fn convex_combine(alpha: f32, vector_score: f32, keyword_score: f32) -> f32 {
    vector_score.mul_add(alpha, keyword_score * (1.0 - alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmm_empty_input_yields_empty_output() {
        assert!(tmm_normalize(&[]).is_empty());
    }

    #[test]
    fn tmm_outputs_stay_in_unit_interval() {
        let scores = [12.5, -3.0, 0.0, 7.1, 100.0, 42.0];
        let normalized = tmm_normalize(&scores);
        assert_eq!(normalized.len(), scores.len());
        for value in normalized {
            assert!((0.0..=1.0).contains(&value), "out of bounds: {value}");
        }
    }

    #[test]
    fn tmm_equal_scores_all_become_one() {
        let normalized = tmm_normalize(&[4.2, 4.2, 4.2]);
        assert_eq!(normalized, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn tmm_single_score_becomes_one() {
        assert_eq!(tmm_normalize(&[0.37]), vec![1.0]);
    }

    #[test]
    fn tmm_ceiling_is_mean_of_top_three() {
        // min = 0, top-3 mean = (10 + 8 + 6) / 3 = 8; score 4 maps to 0.5.
        let normalized = tmm_normalize(&[10.0, 8.0, 6.0, 4.0, 0.0]);
        assert!((normalized[3] - 0.5).abs() < 1e-6);
        // The top score exceeds the ceiling and clamps to 1.
        assert!((normalized[0] - 1.0).abs() < 1e-6);
        assert!((normalized[4] - 0.0).abs() < 1e-6);
    }

    #[test]
    fn tmm_preserves_relative_order() {
        let scores = [3.0, 9.0, 1.0, 5.0];
        let normalized = tmm_normalize(&scores);
        assert!(normalized[1] > normalized[3]);
        assert!(normalized[3] > normalized[0]);
        assert!(normalized[0] > normalized[2]);
    }

    #[test]
    fn reciprocal_rank_scores_decay_by_rank() {
        let scores = reciprocal_rank_scores(4);
        assert_eq!(scores, vec![1.0, 0.5, 1.0 / 3.0, 0.25]);
        assert!(reciprocal_rank_scores(0).is_empty());
    }

    #[test]
    fn convex_combine_respects_extremes() {
        assert!((convex_combine(1.0, 0.9, 0.1) - 0.9).abs() < 1e-6);
        assert!((convex_combine(0.0, 0.9, 0.1) - 0.1).abs() < 1e-6);
        assert!((convex_combine(0.5, 1.0, 0.0) - 0.5).abs() < 1e-6);
    }
}
