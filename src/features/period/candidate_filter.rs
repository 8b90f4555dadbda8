//! BPM candidate merging
//!
//! Pools the candidates of the autocorrelation and comb filterbank estimators.
//! Candidates closer than a tolerance (in cents) are clustered; a cluster's
//! confidence is the mean of its best confidence per method, so tempos both
//! methods agree on outrank tempos only one method reports.

use super::{BpmCandidate, BpmEstimate};

/// Number of methods pooled by [`merge_bpm_candidates`]
const METHOD_COUNT: usize = 2;

struct Cluster {
    bpm_weighted: f32,
    weight: f32,
    best_per_method: [f32; METHOD_COUNT],
}

/// Merge BPM candidates from the two period estimators
///
/// # Arguments
///
/// * `autocorr` - Candidates from autocorrelation
/// * `comb` - Candidates from the comb filterbank
/// * `tolerance_cents` - Maximum distance for two candidates to agree (50 cents ≈ 3%)
///
/// # Returns
///
/// Merged estimates, highest confidence first. The BPM of an estimate is the
/// confidence-weighted mean of its members.
pub fn merge_bpm_candidates(
    autocorr: &[BpmCandidate],
    comb: &[BpmCandidate],
    tolerance_cents: f32,
) -> Vec<BpmEstimate> {
    log::debug!(
        "Merging BPM candidates: {} autocorr, {} comb",
        autocorr.len(),
        comb.len()
    );

    let mut clusters: Vec<Cluster> = Vec::new();
    let sources: [&[BpmCandidate]; METHOD_COUNT] = [autocorr, comb];

    for (method, candidates) in sources.iter().enumerate() {
        for candidate in candidates.iter().filter(|c| c.bpm > 0.0 && c.confidence > 0.0) {
            let existing = clusters.iter_mut().find(|cluster| {
                let center = cluster.bpm_weighted / cluster.weight;
                (1200.0 * (candidate.bpm / center).log2()).abs() <= tolerance_cents
            });

            match existing {
                Some(cluster) => {
                    cluster.bpm_weighted += candidate.bpm * candidate.confidence;
                    cluster.weight += candidate.confidence;
                    let best = &mut cluster.best_per_method[method];
                    *best = best.max(candidate.confidence);
                }
                None => {
                    let mut best_per_method = [0.0; METHOD_COUNT];
                    best_per_method[method] = candidate.confidence;
                    clusters.push(Cluster {
                        bpm_weighted: candidate.bpm * candidate.confidence,
                        weight: candidate.confidence,
                        best_per_method,
                    });
                }
            }
        }
    }

    let mut estimates: Vec<BpmEstimate> = clusters
        .into_iter()
        .map(|cluster| BpmEstimate {
            bpm: cluster.bpm_weighted / cluster.weight,
            confidence: cluster.best_per_method.iter().sum::<f32>() / METHOD_COUNT as f32,
            method_agreement: cluster.best_per_method.iter().filter(|c| **c > 0.0).count() as u32,
        })
        .collect();

    estimates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    if let Some(best) = estimates.first() {
        log::debug!(
            "Merged to {} estimates, best {:.2} BPM (confidence {:.3}, {} methods)",
            estimates.len(),
            best.bpm,
            best.confidence,
            best.method_agreement
        );
    }

    estimates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(bpm: f32, confidence: f32) -> BpmCandidate {
        BpmCandidate { bpm, confidence }
    }

    #[test]
    fn test_agreement_beats_single_method() {
        let autocorr = vec![candidate(120.2, 0.9), candidate(60.1, 1.0)];
        let comb = vec![candidate(120.0, 1.0), candidate(180.0, 0.4)];

        let merged = merge_bpm_candidates(&autocorr, &comb, 50.0);
        assert!((merged[0].bpm - 120.1).abs() < 0.2);
        assert_eq!(merged[0].method_agreement, 2);
        assert!((merged[0].confidence - 0.95).abs() < 1e-6);
        assert_eq!(merged[1].method_agreement, 1);
    }

    #[test]
    fn test_distinct_tempos_not_clustered() {
        let merged = merge_bpm_candidates(&[candidate(100.0, 1.0)], &[candidate(110.0, 1.0)], 50.0);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge_bpm_candidates(&[], &[], 50.0).is_empty());
        let merged = merge_bpm_candidates(&[], &[candidate(90.0, 0.8)], 50.0);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.4).abs() < 1e-6);
    }
}
