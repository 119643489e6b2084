//! Calibration session controller
//!
//! The phase state machine: sequences captures, derives cross-phase metrics,
//! and supports partial re-execution. Level ratios cross from the log domain
//! to linear amplitude before dividing; SNR stays a plain dB difference.

use crate::analysis::{self, FreqBand, SILENCE_FLOOR_DBFS};
use crate::audio::{CaptureOutcome, Recorder};
use crate::console;
use crate::playback::{self, PlaybackGuard};
use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Operator cancelled the session (EOF on a prompt).
///
/// Callers catch this to unwind to report generation over whatever phases
/// already completed.
#[derive(Error, Debug)]
#[error("session cancelled by operator")]
pub struct Cancelled;

pub const READING_PASSAGE: &str = "\"The quarterly results show strong momentum across all \
business units. We're seeing particular growth in the enterprise segment, with several \
Fortune 500 clients expanding their deployments. I want to highlight three key metrics \
that demonstrate our value acceleration framework is working. First, time-to-value has \
decreased by forty percent. Second, customer expansion revenue is up thirty-two percent \
quarter over quarter. And third, our NPS score among enterprise accounts has hit an \
all-time high of seventy-eight.\"";

/// The five calibration phases, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Baseline,
    Voice,
    ReferenceSource,
    Combined,
    Interference,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Baseline,
        Phase::Voice,
        Phase::ReferenceSource,
        Phase::Combined,
        Phase::Interference,
    ];

    /// Capture length for this phase.
    pub fn capture_duration(self) -> Duration {
        let secs = match self {
            Phase::Baseline => 10,
            Phase::Voice => 15,
            Phase::ReferenceSource => 30,
            Phase::Combined => 30,
            Phase::Interference => 15,
        };
        Duration::from_secs(secs)
    }

    /// Capture file label (also the serialized phase key).
    pub fn label(self) -> &'static str {
        match self {
            Phase::Baseline => "baseline",
            Phase::Voice => "voice",
            Phase::ReferenceSource => "reference_source",
            Phase::Combined => "combined",
            Phase::Interference => "interference",
        }
    }

    /// Banner title shown to the operator.
    pub fn title(self) -> &'static str {
        match self {
            Phase::Baseline => "Phase 1: Silence Baseline",
            Phase::Voice => "Phase 2: Voice Only",
            Phase::ReferenceSource => "Phase 3: Reference Speaker Only",
            Phase::Combined => "Phase 4: Voice + Reference Speaker",
            Phase::Interference => "Phase 5: Music Isolation",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub freqs: Vec<f64>,
    pub psd: Vec<f64>,
}

/// One completed phase measurement.
///
/// Levels are in dBFS (silence sentinel -96.0); ratios are linear and
/// non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub rms_dbfs: f64,
    pub peak_dbfs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snr_db: Option<f64>,
    pub dominant_band: FreqBand,
    pub speech_band_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_dominance_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_energy_ratio: Option<f64>,
    /// True when this record was derived from other phases, not captured.
    #[serde(default)]
    pub inferred: bool,
    pub spectrum: Spectrum,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<PathBuf>,
}

/// Accumulated results for one calibration session.
///
/// One optional record per phase; `None` means the phase has not run.
/// Only the session controller mutates this; the diagnostic engine reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionResults {
    pub baseline: Option<MeasurementRecord>,
    pub voice: Option<MeasurementRecord>,
    pub reference_source: Option<MeasurementRecord>,
    pub combined: Option<MeasurementRecord>,
    pub interference: Option<MeasurementRecord>,
}

impl SessionResults {
    pub fn get(&self, phase: Phase) -> Option<&MeasurementRecord> {
        match phase {
            Phase::Baseline => self.baseline.as_ref(),
            Phase::Voice => self.voice.as_ref(),
            Phase::ReferenceSource => self.reference_source.as_ref(),
            Phase::Combined => self.combined.as_ref(),
            Phase::Interference => self.interference.as_ref(),
        }
    }

    /// Baseline noise floor, or the silence sentinel before phase 1 has run.
    pub fn noise_floor(&self) -> f64 {
        self.baseline
            .as_ref()
            .map(|r| r.rms_dbfs)
            .unwrap_or(SILENCE_FLOOR_DBFS)
    }

    /// Derive voice dominance from the voice and reference captures without
    /// a joint take.
    ///
    /// Approximation: treats the two independently measured levels as if the
    /// sources were independent and additive, dividing their linear
    /// amplitudes. The explicit combined phase replaces this with a ratio
    /// from a real simultaneous capture.
    pub fn infer_dominance(&mut self) {
        let (Some(voice), Some(reference)) = (&self.voice, &self.reference_source) else {
            return;
        };
        let reference_linear = analysis::db_to_linear(reference.rms_dbfs);
        let dominance = if reference_linear > 0.0 {
            analysis::db_to_linear(voice.rms_dbfs) / reference_linear
        } else {
            0.0
        };

        self.combined = Some(MeasurementRecord {
            rms_dbfs: voice.rms_dbfs,
            peak_dbfs: voice.peak_dbfs,
            snr_db: voice.snr_db,
            dominant_band: voice.dominant_band,
            speech_band_ratio: voice.speech_band_ratio,
            voice_dominance_ratio: Some(dominance),
            music_energy_ratio: None,
            inferred: true,
            spectrum: voice.spectrum.clone(),
            capture_path: None,
        });
    }
}

pub struct SessionController {
    recorder: Recorder,
    source_wav: Option<PathBuf>,
    music_wav: Option<PathBuf>,
    pub results: SessionResults,
}

impl SessionController {
    pub fn new(
        recorder: Recorder,
        source_wav: Option<PathBuf>,
        music_wav: Option<PathBuf>,
    ) -> Self {
        Self {
            recorder,
            source_wav,
            music_wav,
            results: SessionResults::default(),
        }
    }

    pub fn device_name(&self) -> &str {
        self.recorder.device_name()
    }

    /// Baseline + voice + reference, with dominance inferred from the pair.
    pub fn run_core(&mut self, run_dir: &Path) -> Result<()> {
        self.run_baseline(run_dir)?;
        self.run_voice(run_dir)?;
        self.run_reference(run_dir)?;
        self.results.infer_dominance();
        self.print_inferred_dominance();
        Ok(())
    }

    /// All five phases; the explicit combined capture replaces the inferred
    /// dominance record.
    pub fn run_full(&mut self, run_dir: &Path) -> Result<()> {
        self.run_baseline(run_dir)?;
        self.run_voice(run_dir)?;
        self.run_reference(run_dir)?;
        self.results.infer_dominance();
        self.run_combined(run_dir)?;
        self.run_interference(run_dir)?;
        Ok(())
    }

    /// Quick re-test of the two key measurements, keeping the existing
    /// baseline.
    pub fn quick_pair(&mut self, run_dir: &Path) -> Result<()> {
        self.run_voice(run_dir)?;
        self.run_reference(run_dir)?;
        self.results.infer_dominance();
        self.print_inferred_dominance();
        Ok(())
    }

    pub fn run_baseline(&mut self, run_dir: &Path) -> Result<()> {
        console::banner(Phase::Baseline.title());
        println!("  Stay silent. Don't touch anything. No typing, no talking.");
        println!("  Measuring noise floor for 10 seconds.");
        println!();
        self.wait("  Press Enter when the room is quiet...")?;
        println!();
        console::countdown(3);

        let Some(capture) =
            self.capture_phase(Phase::Baseline.capture_duration(), "baseline", run_dir)
        else {
            return Ok(());
        };
        let record = self.measure(&capture, None);

        println!();
        println!(
            "  Noise floor: {}",
            console::bold(&format!("{:.1} dBFS", record.rms_dbfs))
        );
        println!("  Peak: {:.1} dBFS", record.peak_dbfs);
        println!("  Dominant band: {}", record.dominant_band);

        if record.rms_dbfs > -50.0 {
            println!(
                "{}",
                console::yellow("  >>> Noise floor is high. Consider reducing gain.")
            );
        } else if record.rms_dbfs < -70.0 {
            println!(
                "{}",
                console::green("  >>> Very quiet. Headroom to increase gain if needed.")
            );
        } else {
            println!("{}", console::green("  >>> Noise floor looks good."));
        }

        self.results.baseline = Some(record);
        Ok(())
    }

    pub fn run_voice(&mut self, run_dir: &Path) -> Result<()> {
        console::banner(Phase::Voice.title());
        println!("  You'll speak naturally at meeting volume for 15 seconds.");
        println!("  Read this passage when recording starts:");
        println!();
        println!("{}", console::cyan(&format!("  {READING_PASSAGE}")));
        println!();
        println!(
            "{}",
            console::dim("  (The passage is a guide — just speak naturally for 15 seconds)")
        );
        println!();
        self.wait("  Press Enter when ready to speak...")?;
        println!();
        console::countdown(3);

        let Some(capture) = self.capture_phase(Phase::Voice.capture_duration(), "voice", run_dir)
        else {
            return Ok(());
        };
        let record = self.measure(&capture, Some(self.results.noise_floor()));
        let snr = record.snr_db.unwrap_or(0.0);

        println!();
        println!(
            "  Voice RMS: {}",
            console::bold(&format!("{:.1} dBFS", record.rms_dbfs))
        );
        println!("  Peak: {:.1} dBFS", record.peak_dbfs);
        println!(
            "  SNR vs noise floor: {}",
            console::bold(&format!("{snr:.1} dB"))
        );
        println!("  Dominant band: {}", record.dominant_band);

        if record.peak_dbfs > -3.0 {
            println!(
                "{}",
                console::red("  >>> CLIPPING RISK! Reduce gain or move back.")
            );
        }
        if snr < 15.0 {
            println!(
                "{}",
                console::yellow("  >>> Voice too quiet. Increase gain or move closer.")
            );
        } else if snr > 40.0 {
            println!("{}", console::green("  >>> Excellent voice isolation."));
        }

        self.results.voice = Some(record);
        Ok(())
    }

    pub fn run_reference(&mut self, run_dir: &Path) -> Result<()> {
        console::banner(Phase::ReferenceSource.title());
        if self.source_wav.is_none() {
            println!(
                "{}",
                console::yellow("  No source clip available. Skipping playback.")
            );
            println!("  Recording room audio only...");
        } else {
            println!("  A reference clip will play through your speakers for 30 seconds.");
            println!("  Stay SILENT — measuring speaker pickup only.");
        }
        println!();
        self.wait("  Press Enter when ready (stay silent during this phase)...")?;
        println!();
        console::countdown(3);

        let playback = self.start_source_playback();
        let capture = self.capture_phase(
            Phase::ReferenceSource.capture_duration(),
            "reference_source",
            run_dir,
        );
        drop(playback);
        let Some(capture) = capture else {
            return Ok(());
        };

        let record = self.measure(&capture, Some(self.results.noise_floor()));
        let snr = record.snr_db.unwrap_or(0.0);

        println!();
        println!(
            "  Speaker pickup RMS: {}",
            console::bold(&format!("{:.1} dBFS", record.rms_dbfs))
        );
        println!(
            "  SNR vs noise floor: {}",
            console::bold(&format!("{snr:.1} dB"))
        );
        println!(
            "  Speech band ratio: {:.1}%",
            record.speech_band_ratio * 100.0
        );

        if snr < 6.0 {
            println!(
                "{}",
                console::yellow(
                    "  >>> Speaker barely audible. Try the omnidirectional pattern or raise the volume."
                )
            );
        } else if snr > 25.0 {
            println!(
                "{}",
                console::green("  >>> Speaker pickup is clear. Cardioid works.")
            );
        }

        self.results.reference_source = Some(record);
        Ok(())
    }

    pub fn run_combined(&mut self, run_dir: &Path) -> Result<()> {
        let Some(reference) = self.results.reference_source.clone() else {
            warn!("combined phase skipped: reference phase has not run");
            println!(
                "{}",
                console::yellow("  Run the reference phase before the combined test.")
            );
            return Ok(());
        };

        console::banner(Phase::Combined.title());
        if self.source_wav.is_none() {
            println!(
                "{}",
                console::yellow("  No source clip. Recording voice only (no speaker comparison).")
            );
        } else {
            println!("  The reference clip will play through your speakers.");
        }
        println!("  Speak naturally while the clip plays (30 seconds).");
        println!("  React as you would in a real call — talk, pause, respond.");
        println!();
        self.wait("  Press Enter when ready to speak...")?;
        println!();
        console::countdown(3);

        let playback = self.start_source_playback();
        let capture = self.capture_phase(Phase::Combined.capture_duration(), "combined", run_dir);
        drop(playback);
        let Some(capture) = capture else {
            return Ok(());
        };

        let mut record = self.measure(&capture, Some(self.results.noise_floor()));
        let reference_linear = analysis::db_to_linear(reference.rms_dbfs);
        let dominance = if reference_linear > 0.0 {
            analysis::db_to_linear(record.rms_dbfs) / reference_linear
        } else {
            0.0
        };
        record.voice_dominance_ratio = Some(dominance);

        println!();
        println!(
            "  Combined RMS: {}",
            console::bold(&format!("{:.1} dBFS", record.rms_dbfs))
        );
        println!(
            "  Voice dominance ratio: {} over speaker-only",
            console::bold(&format!("{dominance:.1}x"))
        );
        self.print_dominance_feedback(dominance);

        self.results.combined = Some(record);
        Ok(())
    }

    pub fn run_interference(&mut self, run_dir: &Path) -> Result<()> {
        let Some(voice) = self.results.voice.clone() else {
            warn!("interference phase skipped: voice phase has not run");
            println!(
                "{}",
                console::yellow("  Run the voice phase before the music isolation test.")
            );
            return Ok(());
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let suffix = if attempt > 1 {
                format!(" (attempt {attempt})")
            } else {
                String::new()
            };
            console::banner(&format!("{}{suffix}", Phase::Interference.title()));

            println!("  Measuring whether background music bleeds into the recording.");
            println!("  No reference clip. No speaking. Just music playing.");
            println!();
            if self.music_wav.is_some() {
                println!("  Music will play through the background speaker when you press Enter.");
            } else {
                println!("{}", console::bold("  Before pressing Enter:"));
                println!("  1. Start music on the background speaker at your normal listening volume");
                println!("  2. Make sure the reference speaker is quiet (no clip playback)");
            }
            println!();
            self.wait("  Press Enter when ready (stay silent)...")?;
            println!();
            console::countdown(3);

            let label = if attempt > 1 {
                format!("interference_{attempt}")
            } else {
                "interference".to_string()
            };
            let playback = self.start_music_playback();
            let capture =
                self.capture_phase(Phase::Interference.capture_duration(), &label, run_dir);
            drop(playback);
            let Some(capture) = capture else {
                break;
            };

            let noise_floor = self.results.noise_floor();
            let mut record = self.measure(&capture, Some(noise_floor));
            let snr = record.snr_db.unwrap_or(0.0);

            // Music contribution = linear energy above the baseline,
            // expressed against the voice level
            let voice_linear = analysis::db_to_linear(voice.rms_dbfs);
            let contribution = (analysis::db_to_linear(record.rms_dbfs)
                - analysis::db_to_linear(noise_floor))
            .max(0.0);
            let ratio = if voice_linear > 0.0 {
                contribution / voice_linear
            } else {
                0.0
            };
            record.music_energy_ratio = Some(ratio);

            // Record before deciding, so even an auto-pass shows up in reports
            self.results.interference = Some(record.clone());

            println!();
            println!(
                "  Music pickup RMS: {}",
                console::bold(&format!("{:.1} dBFS", record.rms_dbfs))
            );
            println!("  Noise floor was: {noise_floor:.1} dBFS");
            println!(
                "  Music above floor: {}",
                console::bold(&format!("{snr:.1} dB"))
            );
            println!(
                "  Music as % of voice energy: {}",
                console::bold(&format!("{:.0}%", ratio * 100.0))
            );

            if snr < 2.0 {
                println!(
                    "{}",
                    console::green(
                        "  >>> Music is not being picked up. Virtually indistinguishable from silence."
                    )
                );
                break;
            } else if ratio <= 0.10 {
                println!(
                    "{}",
                    console::green(&format!(
                        "  >>> Music bleed is minimal ({:.0}% of voice). Good music volume.",
                        ratio * 100.0
                    ))
                );
                break;
            } else if ratio <= 0.25 {
                println!(
                    "{}",
                    console::yellow(&format!(
                        "  >>> Some music pickup ({:.0}% of voice), but within tolerance.",
                        ratio * 100.0
                    ))
                );
                println!(
                    "{}",
                    console::dim("     You could lower the music a bit for a cleaner recording, or keep it.")
                );
            } else {
                println!(
                    "{}",
                    console::yellow(&format!(
                        "  >>> Music is bleeding into the recording ({:.0}% of voice energy).",
                        ratio * 100.0
                    ))
                );
                println!(
                    "{}",
                    console::yellow("  >>> Lower the music volume and re-test.")
                );
            }

            println!();
            println!(
                "  {} Re-test — adjust the music volume and try again",
                console::cyan("[R]")
            );
            println!("  {} Keep this result and continue", console::cyan("[K]"));
            let choice = console::prompt("  Choice: ").ok_or(Cancelled)?;
            if !choice.eq_ignore_ascii_case("r") {
                break;
            }
            println!();
            println!("{}", console::dim("  Adjust the music volume now..."));
        }
        Ok(())
    }

    /// Run one capture. A device failure skips the phase instead of ending
    /// the session; the phase simply stays absent downstream.
    fn capture_phase(&self, duration: Duration, label: &str, run_dir: &Path) -> Option<CaptureOutcome> {
        match self.recorder.capture(duration, label, run_dir) {
            Ok(capture) => {
                if capture.interrupted {
                    warn!("capture '{label}' ended early, keeping partial data");
                }
                Some(capture)
            }
            Err(e) => {
                warn!("capture '{label}' failed: {e:#}");
                println!(
                    "{}",
                    console::yellow(&format!("  Capture failed: {e:#}. Skipping this phase."))
                );
                None
            }
        }
    }

    fn measure(&self, capture: &CaptureOutcome, noise_floor: Option<f64>) -> MeasurementRecord {
        let sr = self.recorder.sample_rate();
        let rms = analysis::rms_dbfs(&capture.samples);
        let (freqs, psd) = analysis::compute_spectrum(&capture.samples, sr);
        MeasurementRecord {
            rms_dbfs: rms,
            peak_dbfs: analysis::peak_dbfs(&capture.samples),
            snr_db: noise_floor.map(|floor| analysis::snr_db(rms, floor)),
            dominant_band: analysis::dominant_freq_band(&capture.samples, sr),
            speech_band_ratio: analysis::speech_band_energy_ratio(&capture.samples, sr),
            voice_dominance_ratio: None,
            music_energy_ratio: None,
            inferred: false,
            spectrum: Spectrum { freqs, psd },
            capture_path: Some(capture.path.clone()),
        }
    }

    fn start_source_playback(&self) -> Option<PlaybackGuard> {
        let path = self.source_wav.as_ref()?;
        match playback::play_wav(path) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("source playback failed: {e}");
                println!(
                    "{}",
                    console::yellow("  Playback failed — recording room audio only.")
                );
                None
            }
        }
    }

    fn start_music_playback(&self) -> Option<PlaybackGuard> {
        let path = self.music_wav.as_ref()?;
        match playback::play_wav(path) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!("music playback failed: {e}");
                None
            }
        }
    }

    fn print_inferred_dominance(&self) {
        let Some(dominance) = self
            .results
            .combined
            .as_ref()
            .and_then(|r| r.voice_dominance_ratio)
        else {
            return;
        };
        println!();
        console::separator();
        println!(
            "  Voice dominance (inferred): {} voice over speaker",
            console::bold(&format!("{dominance:.1}x"))
        );
        self.print_dominance_feedback(dominance);
        println!();
    }

    fn print_dominance_feedback(&self, dominance: f64) {
        if dominance < 1.5 {
            println!(
                "{}",
                console::yellow("  >>> Voice not dominant enough over speaker audio.")
            );
        } else if dominance > 10.0 {
            println!(
                "{}",
                console::yellow("  >>> Speaker too quiet relative to voice.")
            );
        } else if (2.0..=5.0).contains(&dominance) {
            println!("{}", console::green("  >>> Good voice/speaker balance."));
        }
    }

    fn wait(&self, message: &str) -> Result<()> {
        if !console::wait_for_enter(message) {
            return Err(Cancelled.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rms: f64) -> MeasurementRecord {
        MeasurementRecord {
            rms_dbfs: rms,
            peak_dbfs: rms + 6.0,
            snr_db: Some(30.0),
            dominant_band: FreqBand::Mid,
            speech_band_ratio: 0.7,
            voice_dominance_ratio: None,
            music_energy_ratio: None,
            inferred: false,
            spectrum: Spectrum {
                freqs: vec![0.0, 100.0],
                psd: vec![0.0, 1.0e-6],
            },
            capture_path: Some(PathBuf::from("/tmp/voice.wav")),
        }
    }

    #[test]
    fn test_inferred_dominance_is_linear_ratio() {
        let mut results = SessionResults {
            voice: Some(record(-20.0)),
            reference_source: Some(record(-32.0)),
            ..Default::default()
        };
        results.infer_dominance();

        let combined = results.combined.as_ref().unwrap();
        let expected =
            analysis::db_to_linear(-20.0) / analysis::db_to_linear(-32.0);
        let dominance = combined.voice_dominance_ratio.unwrap();
        assert!((dominance - expected).abs() < 1e-12);
        // 12 dB difference is a 3.98x amplitude ratio
        assert!((dominance - 3.981).abs() < 0.01, "got {dominance}");
    }

    #[test]
    fn test_equal_levels_give_unit_dominance() {
        let mut results = SessionResults {
            voice: Some(record(-25.0)),
            reference_source: Some(record(-25.0)),
            ..Default::default()
        };
        results.infer_dominance();
        let dominance = results
            .combined
            .as_ref()
            .unwrap()
            .voice_dominance_ratio
            .unwrap();
        assert!((dominance - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inferred_record_is_marked_and_uncaptured() {
        let mut results = SessionResults {
            voice: Some(record(-20.0)),
            reference_source: Some(record(-30.0)),
            ..Default::default()
        };
        results.infer_dominance();
        let combined = results.combined.as_ref().unwrap();
        assert!(combined.inferred);
        assert!(combined.capture_path.is_none());
    }

    #[test]
    fn test_infer_leaves_baseline_untouched() {
        let baseline = record(-62.5);
        let mut results = SessionResults {
            baseline: Some(baseline.clone()),
            voice: Some(record(-20.0)),
            reference_source: Some(record(-30.0)),
            ..Default::default()
        };
        results.infer_dominance();
        assert_eq!(results.baseline, Some(baseline));
    }

    #[test]
    fn test_infer_requires_both_phases() {
        let mut results = SessionResults {
            voice: Some(record(-20.0)),
            ..Default::default()
        };
        results.infer_dominance();
        assert!(results.combined.is_none());
    }

    #[test]
    fn test_noise_floor_defaults_to_sentinel() {
        let results = SessionResults::default();
        assert_eq!(results.noise_floor(), SILENCE_FLOOR_DBFS);

        let results = SessionResults {
            baseline: Some(record(-60.0)),
            ..Default::default()
        };
        assert_eq!(results.noise_floor(), -60.0);
    }

    #[test]
    fn test_phase_lookup() {
        let results = SessionResults {
            voice: Some(record(-20.0)),
            ..Default::default()
        };
        assert!(results.get(Phase::Voice).is_some());
        assert!(results.get(Phase::Baseline).is_none());
        assert!(results.get(Phase::Interference).is_none());
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let original = record(-41.2);
        let json = serde_json::to_string(&original).unwrap();
        let back: MeasurementRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, original);
        // Absent options stay absent in the serialized form
        assert!(!json.contains("voice_dominance_ratio"));
    }

    #[test]
    fn test_phase_durations() {
        assert_eq!(Phase::Baseline.capture_duration(), Duration::from_secs(10));
        assert_eq!(Phase::Voice.capture_duration(), Duration::from_secs(15));
        assert_eq!(
            Phase::ReferenceSource.capture_duration(),
            Duration::from_secs(30)
        );
        assert_eq!(Phase::Interference.capture_duration(), Duration::from_secs(15));
    }
}
