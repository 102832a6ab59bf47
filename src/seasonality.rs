use chrono::{Datelike, NaiveDate};

/// Months of history needed before a yearly seasonal profile is estimated.
pub const MIN_POINTS_FOR_YEARLY: usize = 12;

/// Estimates one additive offset per calendar month (index 0 = January) from detrended
/// residuals.
///
/// Each month's offset is the mean residual for that month, shrunk toward zero by
/// `count / (count + 1 / prior_scale)`; offsets are then centred so they sum to zero over
/// the months that were observed. Months with no observations get 0.
pub fn estimate_yearly_offsets(residuals: &[(NaiveDate, f64)], prior_scale: f64) -> [f64; 12] {
    let mut sums = [0.0; 12];
    let mut counts = [0usize; 12];

    for (period, residual) in residuals {
        let idx = period.month0() as usize;
        sums[idx] += residual;
        counts[idx] += 1;
    }

    let penalty = if prior_scale > 0.0 {
        1.0 / prior_scale
    } else {
        f64::INFINITY
    };

    let mut offsets = [0.0; 12];
    for idx in 0..12 {
        if counts[idx] == 0 {
            continue;
        }
        let n = counts[idx] as f64;
        let mean = sums[idx] / n;
        let shrink = if penalty.is_finite() {
            n / (n + penalty)
        } else {
            0.0
        };
        offsets[idx] = mean * shrink;
    }

    center_offsets(&mut offsets, &counts);
    offsets
}

fn center_offsets(offsets: &mut [f64; 12], counts: &[usize; 12]) {
    let observed: Vec<usize> = (0..12).filter(|&i| counts[i] > 0).collect();
    if observed.is_empty() {
        return;
    }

    let mean = observed.iter().map(|&i| offsets[i]).sum::<f64>() / observed.len() as f64;
    for i in observed {
        offsets[i] -= mean;
    }
}

pub fn offset_for(offsets: &[f64; 12], period: NaiveDate) -> f64 {
    offsets[period.month0() as usize]
}
