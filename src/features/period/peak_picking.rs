//! Peak picking on 1D detection functions
//!
//! Used to turn a novelty curve into discrete onset frames.

const EPSILON: f32 = 1e-10;

/// Find peaks in a signal
///
/// A peak is a local maximum (strictly above both neighbours; the end points
/// need only exceed their single neighbour) at or above the threshold. A flat
/// run of equal values is one peak, reported at its middle index. When two
/// peaks are closer than `min_distance`, the higher one is kept.
///
/// # Arguments
///
/// * `signal` - Signal to search
/// * `threshold` - Values in (0, 1) are relative to the signal maximum,
///   anything else is absolute
/// * `min_distance` - Minimum index distance between kept peaks
///
/// # Returns
///
/// (index, value) pairs sorted by value, highest first
///
/// # Example
///
/// ```
/// use cratedig::features::period::peak_picking::find_peaks;
///
/// let signal = vec![0.0, 0.5, 1.0, 0.7, 0.3, 0.9, 0.2];
/// let peaks = find_peaks(&signal, 0.5, 2);
/// assert_eq!(peaks[0].0, 2);
/// assert_eq!(peaks[1].0, 5);
/// ```
pub fn find_peaks(signal: &[f32], threshold: f32, min_distance: usize) -> Vec<(usize, f32)> {
    if signal.len() < 3 {
        return vec![];
    }

    let max_value = signal.iter().copied().fold(0.0f32, f32::max);
    if max_value < EPSILON {
        return vec![];
    }
    let threshold = if threshold > 0.0 && threshold < 1.0 {
        max_value * threshold
    } else {
        threshold
    };

    let last = signal.len() - 1;
    let mut peaks: Vec<(usize, f32)> = Vec::new();
    let mut start = 0;
    while start <= last {
        // Runs of equal values (smoothed curves) form one flat-topped peak
        let v = signal[start];
        let run = signal[start..].iter().take_while(|&&x| x == v).count().max(1);
        let end = start + run - 1;
        let left_ok = start == 0 || v > signal[start - 1];
        let right_ok = end == last || v > signal[end + 1];
        if left_ok && right_ok && v >= threshold {
            peaks.push(((start + end) / 2, v));
        }
        start = end + 1;
    }

    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));

    if min_distance > 0 && peaks.len() > 1 {
        let mut kept: Vec<(usize, f32)> = Vec::with_capacity(peaks.len());
        for (idx, value) in peaks {
            if kept.iter().all(|(k, _)| idx.abs_diff(*k) >= min_distance) {
                kept.push((idx, value));
            }
        }
        peaks = kept;
    }

    log::debug!(
        "Found {} peaks in {} values (threshold={:.3}, min_distance={})",
        peaks.len(),
        signal.len(),
        threshold,
        min_distance
    );

    peaks
}
