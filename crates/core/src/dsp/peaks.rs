//! Peak detection with height, spacing and prominence constraints.
//!
//! Mirrors the classic find-peaks contract: local maxima (plateaus resolve to
//! their midpoint) are kept only if they rise above a per-sample height
//! threshold, are at least `min_distance` samples apart (taller peaks win),
//! and have a prominence — evaluated inside a window centered on the peak —
//! that also clears the per-sample threshold.

/// Find peak indices in `signal`, ascending.
///
/// `heights` supplies the per-sample threshold used for both the height and
/// the prominence constraint; it must be the same length as `signal`.
/// `prominence_window` is the full window width, in samples, over which a
/// peak's prominence is evaluated (0 means the whole signal).
pub fn find_peaks(
    signal: &[f64],
    heights: &[f64],
    min_distance: usize,
    prominence_window: usize,
) -> Vec<usize> {
    debug_assert_eq!(signal.len(), heights.len());

    let candidates = local_maxima(signal);

    let tall: Vec<usize> = candidates
        .into_iter()
        .filter(|&p| signal[p] >= heights[p])
        .collect();

    let spaced = enforce_distance(&tall, signal, min_distance);

    spaced
        .into_iter()
        .filter(|&p| prominence(signal, p, prominence_window) >= heights[p])
        .collect()
}

/// Strict local maxima; a flat plateau counts once, at its midpoint.
fn local_maxima(signal: &[f64]) -> Vec<usize> {
    let n = signal.len();
    let mut peaks = Vec::new();
    let mut i = 1;
    while n >= 3 && i < n - 1 {
        if signal[i] > signal[i - 1] {
            let mut j = i;
            while j + 1 < n && signal[j + 1] == signal[i] {
                j += 1;
            }
            if j + 1 < n && signal[j + 1] < signal[i] {
                peaks.push((i + j) / 2);
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    peaks
}

/// Greedy spacing filter: highest peaks claim their neighbourhood first.
fn enforce_distance(peaks: &[usize], signal: &[f64], min_distance: usize) -> Vec<usize> {
    if min_distance <= 1 || peaks.len() < 2 {
        return peaks.to_vec();
    }
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| signal[peaks[b]].total_cmp(&signal[peaks[a]]));

    let mut keep = vec![true; peaks.len()];
    for &rank in &order {
        if !keep[rank] {
            continue;
        }
        for (other, flag) in keep.iter_mut().enumerate() {
            if other != rank && peaks[other].abs_diff(peaks[rank]) < min_distance {
                *flag = false;
            }
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, kept)| kept.then_some(p))
        .collect()
}

/// Prominence of the peak at `p`: its height above the higher of the two
/// bases, where each base is the minimum between the peak and the nearest
/// sample that exceeds it, searched no further than half the window.
fn prominence(signal: &[f64], p: usize, window: usize) -> f64 {
    let n = signal.len();
    let (lo, hi) = if window == 0 {
        (0, n - 1)
    } else {
        let half = window / 2;
        (p.saturating_sub(half), (p + half).min(n - 1))
    };

    let mut left_min = signal[p];
    let mut i = p;
    loop {
        if signal[i] > signal[p] {
            break;
        }
        left_min = left_min.min(signal[i]);
        if i == lo {
            break;
        }
        i -= 1;
    }

    let mut right_min = signal[p];
    let mut i = p;
    loop {
        if signal[i] > signal[p] {
            break;
        }
        right_min = right_min.min(signal[i]);
        if i == hi {
            break;
        }
        i += 1;
    }

    signal[p] - left_min.max(right_min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorentzian(n: usize, center: f64, width: f64, height: f64) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = (i as f64 - center) / width;
                height / (1.0 + x * x)
            })
            .collect()
    }

    #[test]
    fn finds_two_separated_peaks() {
        let mut signal = lorentzian(1000, 250.0, 10.0, 1.0);
        for (s, extra) in signal.iter_mut().zip(lorentzian(1000, 700.0, 10.0, 0.8)) {
            *s += extra;
        }
        let heights = vec![0.3; 1000];
        let peaks = find_peaks(&signal, &heights, 50, 0);
        assert_eq!(peaks, vec![250, 700]);
    }

    #[test]
    fn height_threshold_drops_small_peaks() {
        let mut signal = lorentzian(1000, 250.0, 5.0, 1.0);
        for (s, extra) in signal.iter_mut().zip(lorentzian(1000, 700.0, 5.0, 0.1)) {
            *s += extra;
        }
        let heights = vec![0.3; 1000];
        let peaks = find_peaks(&signal, &heights, 50, 0);
        assert_eq!(peaks, vec![250]);
    }

    #[test]
    fn distance_keeps_the_taller_of_close_peaks() {
        let mut signal = vec![0.0; 200];
        signal[90] = 1.0;
        signal[100] = 2.0;
        signal[160] = 1.5;
        let heights = vec![0.5; 200];
        let peaks = find_peaks(&signal, &heights, 30, 0);
        assert_eq!(peaks, vec![100, 160]);
    }

    #[test]
    fn plateau_resolves_to_midpoint() {
        let mut signal = vec![0.0; 50];
        for s in &mut signal[20..25] {
            *s = 1.0;
        }
        let heights = vec![0.5; 50];
        let peaks = find_peaks(&signal, &heights, 1, 0);
        assert_eq!(peaks, vec![22]);
    }

    #[test]
    fn narrow_window_suppresses_wide_bumps() {
        // A wide bump barely falls off inside a narrow window, so its
        // windowed prominence stays below the threshold.
        let signal = lorentzian(1000, 500.0, 100.0, 1.0);
        let heights = vec![0.5; 1000];
        assert_eq!(find_peaks(&signal, &heights, 1, 20), Vec::<usize>::new());
        assert_eq!(find_peaks(&signal, &heights, 1, 0), vec![500]);
    }

    #[test]
    fn peaks_on_flat_signal_are_none() {
        let signal = vec![1.0; 100];
        let heights = vec![0.0; 100];
        assert!(find_peaks(&signal, &heights, 1, 0).is_empty());
    }
}
