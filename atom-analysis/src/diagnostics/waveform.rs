//! Two-channel waveform dumps from the arbitrary waveform generator.
//!
//! Samples of both channels are written interleaved, `c1 c2 c1 c2 ...`,
//! separated by whitespace across any number of lines.

use num_complex::Complex;
use rustfft::FftPlanner;
use serde::Serialize;

use super::{parse_number, DiagnosticsError};

/// Output rate of the waveform generator in samples per second
pub const DEFAULT_SAMPLE_RATE: f64 = 320e6;

/// Centred amplitude spectrum, normalised by the number of points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrum {
    /// Ascending frequencies in Hz, zero in the middle
    pub frequencies: Vec<f64>,
    pub amplitudes: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Waveform {
    /// Sample times in seconds
    pub times: Vec<f64>,
    pub channel1: Vec<f64>,
    pub channel2: Vec<f64>,
    pub spectrum1: Spectrum,
    pub spectrum2: Spectrum,
}

/// FFT of real samples taken at `sample_rate`
pub fn spectrum(samples: &[f64], sample_rate: f64) -> Spectrum {
    let n = samples.len();
    if n == 0 {
        return Spectrum {
            frequencies: Vec::new(),
            amplitudes: Vec::new(),
        };
    }
    let mut buffer: Vec<Complex<f64>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    FftPlanner::<f64>::new()
        .plan_fft_forward(n)
        .process(&mut buffer);
    buffer.rotate_right(n / 2);

    let step = sample_rate / n as f64;
    Spectrum {
        frequencies: (0..n)
            .map(|i| (i as f64 - (n / 2) as f64) * step)
            .collect(),
        amplitudes: buffer.iter().map(|c| c.norm() / n as f64).collect(),
    }
}

/// Split an interleaved dump into channels and their spectra.
///
/// # Arguments
/// * `text` - Whitespace-separated interleaved samples
/// * `sample_rate` - Samples per second per channel
/// * `fft_points` - Only transform the first this many points of each channel
pub fn waveform(
    text: &str,
    sample_rate: f64,
    fft_points: Option<usize>,
) -> Result<Waveform, DiagnosticsError> {
    let mut samples = Vec::new();
    for (index, line) in text.lines().enumerate() {
        for token in line.split_whitespace() {
            samples.push(parse_number(token, index + 1)?);
        }
    }
    if samples.is_empty() {
        return Err(DiagnosticsError::NoSamples);
    }

    let channel1: Vec<f64> = samples.iter().step_by(2).copied().collect();
    let channel2: Vec<f64> = samples.iter().skip(1).step_by(2).copied().collect();
    let times: Vec<f64> = (0..channel1.len()).map(|t| t as f64 / sample_rate).collect();

    let first = |channel: &[f64]| -> Vec<f64> {
        let n = fft_points.map_or(channel.len(), |p| p.min(channel.len()));
        channel[..n].to_vec()
    };
    let spectrum1 = spectrum(&first(&channel1), sample_rate);
    let spectrum2 = spectrum(&first(&channel2), sample_rate);

    log::info!(
        "waveform: {} samples per channel at {:.3e} S/s",
        channel1.len(),
        sample_rate
    );

    Ok(Waveform {
        times,
        channel1,
        channel2,
        spectrum1,
        spectrum2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_channels_are_deinterleaved() {
        let wave = waveform("1 10 2 20\n3 30 ", 4.0, None).unwrap();
        assert_eq!(wave.channel1, vec![1.0, 2.0, 3.0]);
        assert_eq!(wave.channel2, vec![10.0, 20.0, 30.0]);
        assert_relative_eq!(wave.times[2], 0.5);
    }

    #[test]
    fn test_tone_peak() {
        let n = 64;
        let rate = 64.0;
        let tone: Vec<f64> = (0..n).map(|i| (2.0 * PI * 8.0 * i as f64 / rate).cos()).collect();
        let tone_spectrum = spectrum(&tone, rate);

        assert_relative_eq!(tone_spectrum.frequencies[0], -32.0);
        assert_relative_eq!(tone_spectrum.frequencies[32], 0.0);
        // a cosine splits evenly between +f and -f
        assert_relative_eq!(tone_spectrum.amplitudes[40], 0.5, epsilon = 1e-12);
        assert_relative_eq!(tone_spectrum.amplitudes[24], 0.5, epsilon = 1e-12);
        assert!(tone_spectrum.amplitudes[32].abs() < 1e-12);
    }

    #[test]
    fn test_truncated_transform() {
        let wave = waveform("1 0 1 0 1 0 1 0", DEFAULT_SAMPLE_RATE, Some(2)).unwrap();
        assert_eq!(wave.spectrum1.amplitudes.len(), 2);
        assert_eq!(wave.times.len(), 4);
    }

    #[test]
    fn test_bad_sample() {
        assert!(matches!(
            waveform("1 x", DEFAULT_SAMPLE_RATE, None),
            Err(DiagnosticsError::Parse { line: 1, .. })
        ));
    }
}
