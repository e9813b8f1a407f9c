//! # Adjusted p-values
//!
//! Step-up false discovery rate adjustment: `adj = p * n / rank(p)`, capped at 1.
//! Ranks are 1-based with ties sharing their average rank. Negative entries
//! (the undefined sentinel) are copied through unchanged and do not count
//! towards `n`.

/// Adjust `pvalues` for multiple testing.
pub fn adjust_pvalues(pvalues: &[f32]) -> Vec<f32> {
    let mut defined: Vec<usize> = (0..pvalues.len()).filter(|&k| pvalues[k] >= 0.0).collect();
    defined.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));

    let n = defined.len() as f64;
    let mut adjusted = pvalues.to_vec();

    let mut start = 0;
    while start < defined.len() {
        let value = pvalues[defined[start]];
        let mut end = start + 1;
        while end < defined.len() && pvalues[defined[end]] == value {
            end += 1;
        }
        // positions start..end share the average of ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &k in &defined[start..end] {
            adjusted[k] = (value as f64 * n / rank).min(1.0) as f32;
        }
        start = end;
    }
    adjusted
}

/// Adjusted p-values plus the row order sorting by `(adjusted, raw)`.
///
/// The sort is stable, so fully tied rows keep their input order.
pub fn fdr_order(pvalues: &[f32]) -> (Vec<f32>, Vec<usize>) {
    let adjusted = adjust_pvalues(pvalues);
    let mut order: Vec<usize> = (0..pvalues.len()).collect();
    order.sort_by(|&a, &b| {
        adjusted[a]
            .total_cmp(&adjusted[b])
            .then(pvalues[a].total_cmp(&pvalues[b]))
    });
    (adjusted, order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_distinct() {
        let adj = adjust_pvalues(&[0.01, 0.04, 0.03, 0.5]);
        let expected = [0.04, 0.16 / 3.0, 0.06, 0.5];
        for (a, e) in adj.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{} vs {}", a, e);
        }
    }

    #[test]
    fn test_adjust_ties_and_cap() {
        let adj = adjust_pvalues(&[0.02, 0.02, 0.9]);
        // tied ranks 1 and 2 average to 1.5
        assert!((adj[0] - 0.04).abs() < 1e-6);
        assert_eq!(adj[0], adj[1]);
        assert!((adj[2] - 0.9).abs() < 1e-6);

        let capped = adjust_pvalues(&[0.8, 0.9]);
        assert_eq!(capped[0], 1.0);
    }

    #[test]
    fn test_sentinels_pass_through() {
        let adj = adjust_pvalues(&[-2.0, 0.01, 0.02]);
        assert_eq!(adj[0], -2.0);
        assert!((adj[1] - 0.02).abs() < 1e-6);
        assert!((adj[2] - 0.02).abs() < 1e-6);
        assert!(adjust_pvalues(&[]).is_empty());
    }

    #[test]
    fn test_fdr_order() {
        let (adjusted, order) = fdr_order(&[0.5, 0.125, 0.25, -2.0]);
        // sentinels sort first under total ordering
        assert_eq!(order, vec![3, 1, 2, 0]);
        assert_eq!(adjusted[1], adjusted[2]);
        assert_eq!(adjusted[0], 0.5);
    }
}
