//! Fixed-width histograms of site counts.

use serde::Serialize;
use shared::StatsScan;

use super::ThresholdError;

/// Binned counts; `bins[i]` is the left border of bin `i`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Histogram {
    pub bins: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn counts_f64(&self) -> Vec<f64> {
        self.counts.iter().map(|&c| c as f64).collect()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Bin `data` into bins of `bin_width`.
///
/// Borders start at `min(data)` and step by `bin_width` while they stay
/// below `max(data)`. Every bin is half-open except the last, which also
/// holds its right border. Values beyond the last border are not counted.
pub fn bin_counts(data: &[f64], bin_width: f64) -> Result<Histogram, ThresholdError> {
    if !(bin_width.is_finite() && bin_width > 0.0) {
        return Err(ThresholdError::InvalidBinWidth(bin_width));
    }
    let scan = StatsScan::new(data);
    let (min, max) = (scan.min()?, scan.max()?);

    let border_count = ((max - min) / bin_width).ceil() as usize;
    let borders: Vec<f64> = (0..border_count)
        .map(|k| min + k as f64 * bin_width)
        .filter(|&b| b < max)
        .collect();
    if borders.len() < 2 {
        return Err(ThresholdError::DegenerateHistogram {
            min,
            max,
            bin_width,
        });
    }

    let bins_len = borders.len() - 1;
    let last = borders[bins_len];
    let mut counts = vec![0usize; bins_len];
    for &value in data {
        if value > last {
            continue;
        }
        let mut index = (((value - min) / bin_width).floor() as usize).min(bins_len - 1);
        // guard against rounding at the borders
        while index > 0 && value < borders[index] {
            index -= 1;
        }
        while index + 1 < bins_len && value >= borders[index + 1] {
            index += 1;
        }
        counts[index] += 1;
    }

    Ok(Histogram {
        bins: borders[..bins_len].to_vec(),
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borders_and_counts() {
        // borders 0, 5, 10, 15 (20 is not below the maximum)
        let data = [0.0, 1.0, 4.9, 5.0, 12.0, 15.0, 20.0];
        let hist = bin_counts(&data, 5.0).unwrap();

        assert_eq!(hist.bins, vec![0.0, 5.0, 10.0]);
        // last bin [10, 15] is closed; 20 falls outside
        assert_eq!(hist.counts, vec![3, 1, 2]);
        assert_eq!(hist.total(), 6);
    }

    #[test]
    fn test_degenerate_data() {
        assert!(matches!(
            bin_counts(&[3.0, 3.0, 3.0], 5.0),
            Err(ThresholdError::DegenerateHistogram { .. })
        ));
        assert!(matches!(
            bin_counts(&[0.0, 4.0], 5.0),
            Err(ThresholdError::DegenerateHistogram { .. })
        ));
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            bin_counts(&[0.0, 10.0], 0.0),
            Err(ThresholdError::InvalidBinWidth(_))
        ));
        assert!(matches!(bin_counts(&[], 5.0), Err(ThresholdError::Stats(_))));
        assert!(matches!(
            bin_counts(&[1.0, f64::NAN], 5.0),
            Err(ThresholdError::Stats(_))
        ));
    }
}
