//! Audio measurement primitives
//!
//! Pure functions over normalized sample buffers: RMS/peak levels, SNR,
//! Welch spectrum estimation, and frequency band classification.
//! All level measurements are in dBFS (decibels relative to full scale).

use rustfft::{FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Level reported for silent or empty input instead of -inf.
pub const SILENCE_FLOOR_DBFS: f64 = -96.0;

/// Speech band limits used for the energy-ratio metric (Hz).
pub const SPEECH_BAND_LOW_HZ: f64 = 300.0;
pub const SPEECH_BAND_HIGH_HZ: f64 = 3000.0;

/// Largest Welch segment length. Shorter signals use their full length.
const MAX_SEGMENT_LEN: usize = 4096;

/// Frequency band classification for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreqBand {
    #[serde(rename = "Sub-bass (20-60 Hz)")]
    SubBass,
    #[serde(rename = "Bass (60-250 Hz)")]
    Bass,
    #[serde(rename = "Low-mid (250-500 Hz)")]
    LowMid,
    #[serde(rename = "Mid (500-2kHz)")]
    Mid,
    #[serde(rename = "Upper-mid (2-4 kHz)")]
    UpperMid,
    #[serde(rename = "Presence (4-6 kHz)")]
    Presence,
    #[serde(rename = "Brilliance (6-20 kHz)")]
    Brilliance,
    #[serde(rename = "silence")]
    Silence,
}

/// The seven measurable bands, in ascending frequency order.
pub const FREQ_BANDS: [FreqBand; 7] = [
    FreqBand::SubBass,
    FreqBand::Bass,
    FreqBand::LowMid,
    FreqBand::Mid,
    FreqBand::UpperMid,
    FreqBand::Presence,
    FreqBand::Brilliance,
];

impl FreqBand {
    /// Band edges in Hz. The lower edge is inclusive, the upper exclusive.
    pub fn range(self) -> (f64, f64) {
        match self {
            FreqBand::SubBass => (20.0, 60.0),
            FreqBand::Bass => (60.0, 250.0),
            FreqBand::LowMid => (250.0, 500.0),
            FreqBand::Mid => (500.0, 2000.0),
            FreqBand::UpperMid => (2000.0, 4000.0),
            FreqBand::Presence => (4000.0, 6000.0),
            FreqBand::Brilliance => (6000.0, 20000.0),
            FreqBand::Silence => (0.0, 0.0),
        }
    }
}

impl fmt::Display for FreqBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FreqBand::SubBass => "Sub-bass (20-60 Hz)",
            FreqBand::Bass => "Bass (60-250 Hz)",
            FreqBand::LowMid => "Low-mid (250-500 Hz)",
            FreqBand::Mid => "Mid (500-2kHz)",
            FreqBand::UpperMid => "Upper-mid (2-4 kHz)",
            FreqBand::Presence => "Presence (4-6 kHz)",
            FreqBand::Brilliance => "Brilliance (6-20 kHz)",
            FreqBand::Silence => "silence",
        };
        write!(f, "{label}")
    }
}

/// RMS level in dBFS. Returns the silence floor for empty or all-zero input.
pub fn rms_dbfs(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return SILENCE_FLOOR_DBFS;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms > 0.0 {
        20.0 * rms.log10()
    } else {
        SILENCE_FLOOR_DBFS
    }
}

/// Peak level in dBFS. Returns the silence floor for empty or all-zero input.
pub fn peak_dbfs(samples: &[f32]) -> f64 {
    let peak = samples
        .iter()
        .fold(0.0f64, |acc, &s| acc.max((s as f64).abs()));
    if peak > 0.0 {
        20.0 * peak.log10()
    } else {
        SILENCE_FLOOR_DBFS
    }
}

/// Signal-to-noise ratio as a plain dB difference.
pub fn snr_db(signal_rms_dbfs: f64, noise_floor_dbfs: f64) -> f64 {
    signal_rms_dbfs - noise_floor_dbfs
}

/// Convert a dBFS level to linear amplitude.
///
/// Any ratio between two stored levels must go through this conversion
/// before dividing; raw dB values only subtract.
pub fn db_to_linear(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// Convert a linear amplitude back to dBFS.
pub fn linear_to_db(linear: f64) -> f64 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        SILENCE_FLOOR_DBFS
    }
}

/// Linear RMS ratio between two signals. Returns 0.0 when `b` is silent.
pub fn energy_ratio(a: &[f32], b: &[f32]) -> f64 {
    let rms = |s: &[f32]| -> f64 {
        if s.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = s.iter().map(|&x| (x as f64) * (x as f64)).sum();
        (sum_sq / s.len() as f64).sqrt()
    };
    let rms_b = rms(b);
    if rms_b == 0.0 {
        return 0.0;
    }
    rms(a) / rms_b
}

/// Power spectral density via Welch's method.
///
/// Hann-windowed segments of min(4096, len) samples, 50% overlap, mean
/// detrend per segment, one-sided output. Returns (frequencies, psd).
pub fn compute_spectrum(samples: &[f32], sample_rate: u32) -> (Vec<f64>, Vec<f64>) {
    if samples.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let nperseg = samples.len().min(MAX_SEGMENT_LEN);
    let step = (nperseg / 2).max(1);
    let n_bins = nperseg / 2 + 1;

    // Hann window and its power, for density scaling
    let window: Vec<f64> = (0..nperseg)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / nperseg as f64).cos()))
        .collect();
    let win_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sample_rate as f64 * win_power);

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);

    let mut psd = vec![0.0f64; n_bins];
    let mut segments = 0usize;
    let mut start = 0usize;

    while start + nperseg <= samples.len() {
        let seg = &samples[start..start + nperseg];
        let mean = seg.iter().map(|&s| s as f64).sum::<f64>() / nperseg as f64;

        let mut buf: Vec<Complex<f64>> = seg
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new((s as f64 - mean) * w, 0.0))
            .collect();
        fft.process(&mut buf);

        for (k, acc) in psd.iter_mut().enumerate() {
            let mut p = buf[k].norm_sqr() * scale;
            // One-sided spectrum: double everything except DC and Nyquist
            let is_nyquist = nperseg % 2 == 0 && k == n_bins - 1;
            if k != 0 && !is_nyquist {
                p *= 2.0;
            }
            *acc += p;
        }
        segments += 1;
        start += step;
    }

    for p in psd.iter_mut() {
        *p /= segments as f64;
    }

    let freqs = (0..n_bins)
        .map(|k| k as f64 * sample_rate as f64 / nperseg as f64)
        .collect();
    (freqs, psd)
}

/// Fraction of spectral energy in the 300 Hz - 3 kHz speech band.
pub fn speech_band_energy_ratio(samples: &[f32], sample_rate: u32) -> f64 {
    let (freqs, psd) = compute_spectrum(samples, sample_rate);
    let total: f64 = psd.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    let speech: f64 = freqs
        .iter()
        .zip(psd.iter())
        .filter(|(f, _)| **f >= SPEECH_BAND_LOW_HZ && **f <= SPEECH_BAND_HIGH_HZ)
        .map(|(_, p)| p)
        .sum();
    speech / total
}

/// The band with the most spectral energy, or `Silence` for silent input.
pub fn dominant_freq_band(samples: &[f32], sample_rate: u32) -> FreqBand {
    let (freqs, psd) = compute_spectrum(samples, sample_rate);

    let mut max_energy = 0.0f64;
    let mut dominant = FreqBand::Silence;
    for band in FREQ_BANDS {
        let (low, high) = band.range();
        let energy: f64 = freqs
            .iter()
            .zip(psd.iter())
            .filter(|(f, _)| **f >= low && **f < high)
            .map(|(_, p)| p)
            .sum();
        if energy > max_energy {
            max_energy = energy;
            dominant = band;
        }
    }
    dominant
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48000;

    fn sine(freq: f64, amplitude: f64, secs: f64) -> Vec<f32> {
        let n = (secs * SR as f64) as usize;
        (0..n)
            .map(|i| (amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / SR as f64).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_db_linear_roundtrip() {
        for level in [-96.0, -55.0, -20.0, -3.0, 0.0] {
            let back = linear_to_db(db_to_linear(level));
            assert!((back - level).abs() < 1e-9, "roundtrip {level} -> {back}");
        }
    }

    #[test]
    fn test_rms_of_full_scale_sine() {
        let signal = sine(1000.0, 1.0, 1.0);
        // Full-scale sine RMS is 1/sqrt(2) = -3.01 dBFS
        let rms = rms_dbfs(&signal);
        assert!((rms - (-3.0103)).abs() < 0.05, "got {rms}");
        let peak = peak_dbfs(&signal);
        assert!(peak.abs() < 0.01, "got {peak}");
    }

    #[test]
    fn test_silence_returns_floor() {
        assert_eq!(rms_dbfs(&[]), SILENCE_FLOOR_DBFS);
        assert_eq!(rms_dbfs(&[0.0; 480]), SILENCE_FLOOR_DBFS);
        assert_eq!(peak_dbfs(&[0.0; 480]), SILENCE_FLOOR_DBFS);
    }

    #[test]
    fn test_snr_is_db_difference() {
        assert_eq!(snr_db(-30.0, -60.0), 30.0);
        assert_eq!(snr_db(-60.0, -60.0), 0.0);
    }

    #[test]
    fn test_energy_ratio() {
        let a = sine(440.0, 0.8, 0.5);
        let b = sine(440.0, 0.4, 0.5);
        let ratio = energy_ratio(&a, &b);
        assert!((ratio - 2.0).abs() < 0.01, "got {ratio}");
        assert_eq!(energy_ratio(&a, &[0.0; 100]), 0.0);
    }

    #[test]
    fn test_speech_band_ratio_tone_inside_band() {
        let signal = sine(1000.0, 0.5, 1.0);
        let ratio = speech_band_energy_ratio(&signal, SR);
        assert!(ratio > 0.9, "1 kHz tone should sit in the speech band: {ratio}");
    }

    #[test]
    fn test_speech_band_ratio_tone_outside_band() {
        let signal = sine(5000.0, 0.5, 1.0);
        let ratio = speech_band_energy_ratio(&signal, SR);
        assert!(ratio < 0.1, "5 kHz tone should fall outside: {ratio}");
    }

    #[test]
    fn test_speech_band_ratio_silence() {
        assert_eq!(speech_band_energy_ratio(&[0.0; 4800], SR), 0.0);
        assert_eq!(speech_band_energy_ratio(&[], SR), 0.0);
    }

    #[test]
    fn test_dominant_band_classification() {
        assert_eq!(dominant_freq_band(&sine(100.0, 0.5, 1.0), SR), FreqBand::Bass);
        assert_eq!(dominant_freq_band(&sine(1000.0, 0.5, 1.0), SR), FreqBand::Mid);
        assert_eq!(dominant_freq_band(&sine(3000.0, 0.5, 1.0), SR), FreqBand::UpperMid);
        assert_eq!(dominant_freq_band(&sine(5000.0, 0.5, 1.0), SR), FreqBand::Presence);
    }

    #[test]
    fn test_dominant_band_silence() {
        assert_eq!(dominant_freq_band(&[0.0; 4800], SR), FreqBand::Silence);
        assert_eq!(dominant_freq_band(&[], SR), FreqBand::Silence);
    }

    #[test]
    fn test_spectrum_peak_near_tone() {
        let signal = sine(2000.0, 0.5, 1.0);
        let (freqs, psd) = compute_spectrum(&signal, SR);
        let (max_idx, _) = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap();
        assert!((freqs[max_idx] - 2000.0).abs() < 50.0, "peak at {}", freqs[max_idx]);
    }
}
