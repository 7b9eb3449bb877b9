//! Savitzky–Golay smoothing.
//!
//! The filter replaces each sample with the value at the window center of the
//! least-squares polynomial fitted to the surrounding window. For a uniform
//! axis the fit reduces to a fixed convolution kernel; the edges, where the
//! window no longer fits, are filled by evaluating the polynomial fitted to
//! the first and last full window.

/// Convolution coefficients for the central sample of a window.
///
/// `window` must be odd and `order < window`.
pub fn savgol_coeffs(window: usize, order: usize) -> Vec<f64> {
    assert!(window % 2 == 1, "window length must be odd");
    assert!(order < window, "polynomial order must be below window length");

    let half = (window / 2) as isize;
    let terms = order + 1;

    // Normal-equation (moment) matrix G[j][k] = sum_i x_i^(j+k).
    let mut moments = vec![0.0; 2 * order + 1];
    for i in -half..=half {
        let x = i as f64;
        let mut p = 1.0;
        for m in moments.iter_mut() {
            *m += p;
            p *= x;
        }
    }
    let mut g = vec![vec![0.0; terms]; terms];
    for j in 0..terms {
        for k in 0..terms {
            g[j][k] = moments[j + k];
        }
    }

    // Solve G y = e0; the kernel weight at offset x is then sum_j y_j x^j.
    let mut rhs = vec![0.0; terms];
    rhs[0] = 1.0;
    let y = solve(g, rhs);

    (-half..=half)
        .map(|i| {
            let x = i as f64;
            let mut p = 1.0;
            let mut w = 0.0;
            for &c in &y {
                w += c * p;
                p *= x;
            }
            w
        })
        .collect()
}

/// Smooth `data` with a Savitzky–Golay filter.
///
/// Inputs shorter than the window are returned unchanged.
pub fn savgol_filter(data: &[f64], window: usize, order: usize) -> Vec<f64> {
    let n = data.len();
    if n < window {
        log::debug!(
            "savgol: input of {} samples shorter than window {}, skipping",
            n,
            window
        );
        return data.to_vec();
    }

    let half = window / 2;
    let kernel = savgol_coeffs(window, order);
    let mut out = vec![0.0; n];

    for c in half..n - half {
        let mut acc = 0.0;
        for (i, &w) in kernel.iter().enumerate() {
            acc += w * data[c - half + i];
        }
        out[c] = acc;
    }

    // Edge samples from the polynomial fitted to the first and last window.
    let head = polyfit(&data[..window], order);
    for (i, slot) in out.iter_mut().take(half).enumerate() {
        *slot = polyval(&head, i as f64);
    }
    let tail = polyfit(&data[n - window..], order);
    for (offset, slot) in out.iter_mut().skip(n - half).enumerate() {
        *slot = polyval(&tail, (window - half + offset) as f64);
    }

    out
}

/// Least-squares polynomial coefficients (ascending powers) for samples at
/// x = 0, 1, ..., len-1.
fn polyfit(data: &[f64], order: usize) -> Vec<f64> {
    let terms = order + 1;
    let mut moments = vec![0.0; 2 * order + 1];
    let mut rhs = vec![0.0; terms];
    for (i, &d) in data.iter().enumerate() {
        let x = i as f64;
        let mut p = 1.0;
        for m in moments.iter_mut() {
            *m += p;
            p *= x;
        }
        let mut p = 1.0;
        for r in rhs.iter_mut() {
            *r += d * p;
            p *= x;
        }
    }
    let mut g = vec![vec![0.0; terms]; terms];
    for j in 0..terms {
        for k in 0..terms {
            g[j][k] = moments[j + k];
        }
    }
    solve(g, rhs)
}

fn polyval(coeffs: &[f64], x: f64) -> f64 {
    let mut acc = 0.0;
    for &c in coeffs.iter().rev() {
        acc = acc * x + c;
    }
    acc
}

/// Gaussian elimination with partial pivoting; systems here are at most
/// (order+1) x (order+1).
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap();
        a.swap(col, pivot);
        b.swap(col, pivot);

        let diag = a[col][col];
        for row in col + 1..n {
            let factor = a[row][col] / diag;
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row + 1..n {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_weights_sum_to_one() {
        let coeffs = savgol_coeffs(101, 3);
        let sum: f64 = coeffs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cubic_signals_pass_through_unchanged() {
        // A degree-3 fit reproduces any cubic exactly, edges included.
        let data: Vec<f64> = (0..200)
            .map(|i| {
                let x = i as f64 * 0.1;
                0.5 * x * x * x - 2.0 * x * x + x - 3.0
            })
            .collect();
        let filtered = savgol_filter(&data, 21, 3);
        for (f, d) in filtered.iter().zip(&data) {
            assert!((f - d).abs() < 1e-6, "expected {} got {}", d, f);
        }
    }

    #[test]
    fn smooths_alternating_noise() {
        let data: Vec<f64> = (0..100)
            .map(|i| 1.0 + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect();
        let filtered = savgol_filter(&data, 11, 2);
        for f in &filtered[5..95] {
            assert!((f - 1.0).abs() < 0.05);
        }
    }

    #[test]
    fn short_input_is_returned_unchanged() {
        let data = vec![1.0, 2.0, 3.0];
        assert_eq!(savgol_filter(&data, 101, 3), data);
    }
}
