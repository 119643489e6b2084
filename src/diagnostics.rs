//! Diagnostic engine
//!
//! Stateless functions mapping accumulated session results to prioritized
//! recommendations, the success criteria table, pattern/positioning advice,
//! and run-over-run comparisons. Deterministic given the same input; phases
//! with no data contribute nothing.

use crate::session::{MeasurementRecord, Phase, SessionResults};
use std::fmt;

// Success criteria thresholds. These are fixed for compatibility with
// previously recorded runs.
pub const NOISE_FLOOR_MAX_DBFS: f64 = -55.0;
pub const VOICE_SNR_MIN_DB: f64 = 20.0;
pub const REFERENCE_SNR_MIN_DB: f64 = 6.0;
pub const DOMINANCE_MIN: f64 = 2.0;
pub const DOMINANCE_MAX: f64 = 5.0;
pub const PEAK_MAX_DBFS: f64 = -3.0;
pub const INTERFERENCE_RATIO_MAX: f64 = 0.25;

/// Recommendation severity, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Pass,
    Info,
    Warning,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Pass => "pass",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        };
        write!(f, "{label}")
    }
}

/// One actionable finding.
#[derive(Debug, Clone)]
pub struct Recommendation {
    /// The measurement that triggered this, human readable.
    pub condition: String,
    pub severity: Severity,
    /// Imperative guidance for the operator.
    pub action: String,
}

/// One row of the success criteria table.
#[derive(Debug, Clone)]
pub struct Criterion {
    pub name: &'static str,
    /// Formatted measured value, "—" when the backing phase has not run.
    pub measured: String,
    pub target: String,
    pub passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupPattern {
    Cardioid,
    Omnidirectional,
}

impl fmt::Display for PickupPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PickupPattern::Cardioid => write!(f, "Cardioid"),
            PickupPattern::Omnidirectional => write!(f, "Omnidirectional"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternAdvice {
    pub pattern: PickupPattern,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improved,
    Regressed,
    Unchanged,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Improved => "improved",
            Trend::Regressed => "regressed",
            Trend::Unchanged => "same",
        };
        write!(f, "{label}")
    }
}

/// One compared (phase, metric) pair between two runs.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    pub phase: Phase,
    pub metric: &'static str,
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
    pub trend: Trend,
}

/// The fixed (phase, metric) pairs tracked across runs.
pub const COMPARISON_METRICS: [(Phase, &str); 4] = [
    (Phase::Baseline, "rms_dbfs"),
    (Phase::Voice, "snr_db"),
    (Phase::ReferenceSource, "snr_db"),
    (Phase::Combined, "voice_dominance_ratio"),
];

/// Evaluate the fixed rule list, in order. Each rule yields at most one
/// recommendation from a first-match-wins conditional ladder.
pub fn recommendations(results: &SessionResults) -> Vec<Recommendation> {
    [
        noise_floor_rule(results),
        voice_peak_rule(results),
        voice_snr_rule(results),
        reference_snr_rule(results),
        dominance_rule(results),
        interference_rule(results),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn noise_floor_rule(results: &SessionResults) -> Option<Recommendation> {
    let floor = results.baseline.as_ref()?.rms_dbfs;
    let rec = if floor > -50.0 {
        Recommendation {
            condition: format!("Noise floor too high ({floor:.1} dBFS > -50 dBFS)"),
            severity: Severity::Warning,
            action: "Reduce gain. Turn the gain knob on the back of the microphone \
                     counter-clockwise."
                .to_string(),
        }
    } else if floor > -55.0 {
        Recommendation {
            condition: format!("Noise floor marginal ({floor:.1} dBFS)"),
            severity: Severity::Info,
            action: "Noise floor is borderline. Consider reducing gain slightly (back knob, CCW)."
                .to_string(),
        }
    } else if floor < -70.0 {
        Recommendation {
            condition: format!("Noise floor very low ({floor:.1} dBFS)"),
            severity: Severity::Info,
            action: "Gain is conservative. You have headroom to increase gain (back knob, CW) \
                     for a stronger signal."
                .to_string(),
        }
    } else {
        Recommendation {
            condition: format!("Noise floor good ({floor:.1} dBFS)"),
            severity: Severity::Pass,
            action: "Noise floor is within target range.".to_string(),
        }
    };
    Some(rec)
}

fn voice_peak_rule(results: &SessionResults) -> Option<Recommendation> {
    let peak = results.voice.as_ref()?.peak_dbfs;
    if peak > -3.0 {
        Some(Recommendation {
            condition: format!("Clipping risk! Voice peak at {peak:.1} dBFS"),
            severity: Severity::Danger,
            action: "Reduce gain (back knob, CCW) or move back from the mic. Peaks should be \
                     below -3 dBFS."
                .to_string(),
        })
    } else if peak > -6.0 {
        Some(Recommendation {
            condition: format!("Voice peak high ({peak:.1} dBFS)"),
            severity: Severity::Info,
            action: "Voice peaks are a bit hot. Monitor for clipping during loud speech."
                .to_string(),
        })
    } else {
        None
    }
}

fn voice_snr_rule(results: &SessionResults) -> Option<Recommendation> {
    let snr = results.voice.as_ref()?.snr_db.unwrap_or(0.0);
    let rec = if snr < 15.0 {
        Recommendation {
            condition: format!("Voice too quiet (SNR {snr:.1} dB < 15 dB)"),
            severity: Severity::Warning,
            action: "Voice too quiet. Increase gain (back knob, CW) or move mic closer \
                     (6-10 inches)."
                .to_string(),
        }
    } else if snr < 20.0 {
        Recommendation {
            condition: format!("Voice SNR marginal ({snr:.1} dB)"),
            severity: Severity::Info,
            action: "Voice SNR is borderline. Consider moving mic slightly closer or \
                     increasing gain."
                .to_string(),
        }
    } else if snr > 40.0 {
        Recommendation {
            condition: format!("Excellent voice isolation (SNR {snr:.1} dB)"),
            severity: Severity::Pass,
            action: "Excellent voice isolation.".to_string(),
        }
    } else {
        Recommendation {
            condition: format!("Voice SNR good ({snr:.1} dB)"),
            severity: Severity::Pass,
            action: "Voice signal-to-noise ratio is within target.".to_string(),
        }
    };
    Some(rec)
}

fn reference_snr_rule(results: &SessionResults) -> Option<Recommendation> {
    let snr = results.reference_source.as_ref()?.snr_db.unwrap_or(0.0);
    let rec = if snr < 6.0 {
        Recommendation {
            condition: format!("Reference speaker barely audible (SNR {snr:.1} dB < 6 dB)"),
            severity: Severity::Warning,
            action: "Reference speaker barely audible. Try switching to the omnidirectional \
                     pattern or increase the speaker volume."
                .to_string(),
        }
    } else if snr > 25.0 {
        Recommendation {
            condition: format!("Reference pickup very clear (SNR {snr:.1} dB)"),
            severity: Severity::Pass,
            action: "Reference speaker pickup is clear. Cardioid pattern works well.".to_string(),
        }
    } else {
        Recommendation {
            condition: format!("Reference pickup adequate (SNR {snr:.1} dB)"),
            severity: Severity::Pass,
            action: "Reference speaker audio is being captured adequately.".to_string(),
        }
    };
    Some(rec)
}

fn dominance_rule(results: &SessionResults) -> Option<Recommendation> {
    let dominance = results.combined.as_ref()?.voice_dominance_ratio?;
    let rec = if dominance < 1.5 {
        Recommendation {
            condition: format!("Voice not dominant enough (ratio {dominance:.1}x < 1.5x)"),
            severity: Severity::Warning,
            action: "Voice not dominant enough. Move the mic closer to your mouth or increase \
                     gain."
                .to_string(),
        }
    } else if dominance > 10.0 {
        Recommendation {
            condition: format!("Speaker too quiet relative to voice (ratio {dominance:.1}x > 10x)"),
            severity: Severity::Warning,
            action: "Reference speaker is too quiet relative to voice. Try the omnidirectional \
                     pattern or increase the speaker volume."
                .to_string(),
        }
    } else if (DOMINANCE_MIN..=DOMINANCE_MAX).contains(&dominance) {
        Recommendation {
            condition: format!("Good voice/speaker balance (ratio {dominance:.1}x)"),
            severity: Severity::Pass,
            action: "Good balance between voice and reference speaker audio.".to_string(),
        }
    } else {
        let direction = if dominance < DOMINANCE_MIN {
            "slightly low"
        } else {
            "slightly high"
        };
        Recommendation {
            condition: format!("Voice dominance ratio: {dominance:.1}x"),
            severity: Severity::Info,
            action: format!("Voice dominance is {direction} but acceptable."),
        }
    };
    Some(rec)
}

fn interference_rule(results: &SessionResults) -> Option<Recommendation> {
    let ratio = results.interference.as_ref()?.music_energy_ratio.unwrap_or(0.0);
    if ratio > INTERFERENCE_RATIO_MAX {
        Some(Recommendation {
            condition: format!(
                "Music too prominent ({:.0}% of voice energy)",
                ratio * 100.0
            ),
            severity: Severity::Warning,
            action: "Background music is too prominent. Use the cardioid pattern and position \
                     the mic closer to your mouth."
                .to_string(),
        })
    } else {
        None
    }
}

fn criterion(
    name: &'static str,
    target: String,
    value: Option<(String, bool)>,
) -> Criterion {
    match value {
        Some((measured, passed)) => Criterion {
            name,
            measured,
            target,
            passed,
        },
        None => Criterion {
            name,
            measured: "—".to_string(),
            target,
            passed: false,
        },
    }
}

/// The six fixed success checks. A phase that has not run fails its
/// criterion with a "—" measurement.
pub fn success_criteria(results: &SessionResults) -> Vec<Criterion> {
    vec![
        criterion(
            "Noise floor",
            format!("< {NOISE_FLOOR_MAX_DBFS:.1} dBFS"),
            results.baseline.as_ref().map(|r| {
                (
                    format!("{:.1} dBFS", r.rms_dbfs),
                    r.rms_dbfs < NOISE_FLOOR_MAX_DBFS,
                )
            }),
        ),
        criterion(
            "Voice SNR",
            format!("> {VOICE_SNR_MIN_DB:.1} dB"),
            results
                .voice
                .as_ref()
                .and_then(|r| r.snr_db)
                .map(|snr| (format!("{snr:.1} dB"), snr > VOICE_SNR_MIN_DB)),
        ),
        criterion(
            "Reference speaker SNR",
            format!("> {REFERENCE_SNR_MIN_DB:.1} dB"),
            results
                .reference_source
                .as_ref()
                .and_then(|r| r.snr_db)
                .map(|snr| (format!("{snr:.1} dB"), snr > REFERENCE_SNR_MIN_DB)),
        ),
        criterion(
            "Voice dominance",
            format!("{DOMINANCE_MIN}x - {DOMINANCE_MAX}x"),
            results
                .combined
                .as_ref()
                .and_then(|r| r.voice_dominance_ratio)
                .map(|d| {
                    (
                        format!("{d:.1}x"),
                        (DOMINANCE_MIN..=DOMINANCE_MAX).contains(&d),
                    )
                }),
        ),
        criterion(
            "No clipping",
            format!("< {PEAK_MAX_DBFS:.1} dBFS"),
            results.voice.as_ref().map(|r| {
                (
                    format!("{:.1} dBFS", r.peak_dbfs),
                    r.peak_dbfs < PEAK_MAX_DBFS,
                )
            }),
        ),
        criterion(
            "Music level",
            format!("< {:.0}% of voice energy", INTERFERENCE_RATIO_MAX * 100.0),
            results
                .interference
                .as_ref()
                .and_then(|r| r.music_energy_ratio)
                .map(|m| {
                    (
                        format!("{:.0}%", m * 100.0),
                        m < INTERFERENCE_RATIO_MAX,
                    )
                }),
        ),
    ]
}

/// A session is complete iff every criterion passes.
pub fn all_passed(criteria: &[Criterion]) -> bool {
    criteria.iter().all(|c| c.passed)
}

/// Recommend a pickup pattern from reference pickup and voice dominance.
pub fn pattern_advice(results: &SessionResults) -> PatternAdvice {
    let reference_snr = results
        .reference_source
        .as_ref()
        .and_then(|r| r.snr_db)
        .unwrap_or(0.0);
    let dominance = results
        .combined
        .as_ref()
        .and_then(|r| r.voice_dominance_ratio)
        .unwrap_or(0.0);

    if reference_snr < REFERENCE_SNR_MIN_DB {
        return PatternAdvice {
            pattern: PickupPattern::Omnidirectional,
            reasoning: format!(
                "Reference speaker SNR is low ({reference_snr:.1} dB). The omnidirectional \
                 pattern picks up sound equally from all directions, which will improve \
                 speaker audio capture."
            ),
        };
    }
    if dominance > 10.0 {
        return PatternAdvice {
            pattern: PickupPattern::Omnidirectional,
            reasoning: format!(
                "Voice is too dominant ({dominance:.1}x over the speaker). The omnidirectional \
                 pattern will balance the pickup between voice and room audio."
            ),
        };
    }
    PatternAdvice {
        pattern: PickupPattern::Cardioid,
        reasoning: "Cardioid provides the best voice isolation while still picking up \
                    sufficient speaker audio. This is the recommended default."
            .to_string(),
    }
}

/// Positioning guidance from voice SNR and peak.
pub fn positioning_advice(results: &SessionResults) -> Vec<String> {
    let voice_snr = results
        .voice
        .as_ref()
        .and_then(|r| r.snr_db)
        .unwrap_or(0.0);
    let voice_peak = results
        .voice
        .as_ref()
        .map(|r| r.peak_dbfs)
        .unwrap_or(-96.0);

    let distance = if voice_peak > PEAK_MAX_DBFS {
        "- Move back from the mic slightly (10-12 inches) to prevent clipping."
    } else if voice_snr < 15.0 {
        "- Move mic closer to your mouth (6-8 inches) for a stronger voice signal."
    } else if voice_snr < VOICE_SNR_MIN_DB {
        "- Position mic 6-10 inches from your mouth for optimal voice capture."
    } else {
        "- Current distance is good. Keep mic 8-12 inches from your mouth."
    };

    vec![
        distance.to_string(),
        "- Angle the mic slightly toward your mouth (not straight on) to reduce plosives."
            .to_string(),
        "- Keep the mic between you and the reference speakers so it captures both sources."
            .to_string(),
        "- Ensure the front of the mic faces you.".to_string(),
    ]
}

fn metric_value(record: &MeasurementRecord, metric: &str) -> Option<f64> {
    match metric {
        "rms_dbfs" => Some(record.rms_dbfs),
        "snr_db" => record.snr_db,
        "voice_dominance_ratio" => record.voice_dominance_ratio,
        _ => None,
    }
}

// Polarity table: the baseline noise floor improves downward; every SNR and
// dominance metric improves upward.
fn is_improvement(phase: Phase, delta: f64) -> bool {
    match phase {
        Phase::Baseline => delta < 0.0,
        _ => delta > 0.0,
    }
}

/// Compare one tracked (phase, metric) pair between two runs.
/// Returns None unless both runs carry the value.
pub fn compare_metric(
    phase: Phase,
    metric: &'static str,
    current: &SessionResults,
    previous: &SessionResults,
) -> Option<ComparisonRow> {
    let prev = previous.get(phase).and_then(|r| metric_value(r, metric))?;
    let curr = current.get(phase).and_then(|r| metric_value(r, metric))?;
    let delta = curr - prev;
    let trend = if delta == 0.0 {
        Trend::Unchanged
    } else if is_improvement(phase, delta) {
        Trend::Improved
    } else {
        Trend::Regressed
    };
    Some(ComparisonRow {
        phase,
        metric,
        previous: prev,
        current: curr,
        delta,
        trend,
    })
}

/// Deltas for every tracked pair present in both runs.
pub fn compare_runs(current: &SessionResults, previous: &SessionResults) -> Vec<ComparisonRow> {
    COMPARISON_METRICS
        .iter()
        .filter_map(|&(phase, metric)| compare_metric(phase, metric, current, previous))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FreqBand;
    use crate::session::Spectrum;

    fn record(rms: f64, peak: f64, snr: Option<f64>) -> MeasurementRecord {
        MeasurementRecord {
            rms_dbfs: rms,
            peak_dbfs: peak,
            snr_db: snr,
            dominant_band: FreqBand::Mid,
            speech_band_ratio: 0.6,
            voice_dominance_ratio: None,
            music_energy_ratio: None,
            inferred: false,
            spectrum: Spectrum {
                freqs: Vec::new(),
                psd: Vec::new(),
            },
            capture_path: None,
        }
    }

    fn baseline_only(floor: f64) -> SessionResults {
        SessionResults {
            baseline: Some(record(floor, floor + 4.0, None)),
            ..Default::default()
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Pass < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Danger);
    }

    #[test]
    fn test_noise_floor_boundary_is_strict() {
        let criteria = success_criteria(&baseline_only(-55.0));
        assert!(!criteria[0].passed, "-55.0 exactly must not pass");

        let criteria = success_criteria(&baseline_only(-55.01));
        assert!(criteria[0].passed, "-55.01 must pass");
    }

    #[test]
    fn test_baseline_only_criteria_and_recommendations() {
        let results = baseline_only(-60.0);
        let criteria = success_criteria(&results);
        assert_eq!(criteria.len(), 6);
        assert!(criteria[0].passed);
        for c in &criteria[1..] {
            assert!(!c.passed, "criterion '{}' must fail without its phase", c.name);
            assert_eq!(c.measured, "—");
        }
        assert!(!all_passed(&criteria));

        let recs = recommendations(&results);
        assert_eq!(recs.len(), 1, "only the baseline rule should fire");
        assert_eq!(recs[0].severity, Severity::Pass);
    }

    #[test]
    fn test_empty_results_produce_nothing() {
        let results = SessionResults::default();
        assert!(recommendations(&results).is_empty());
        let criteria = success_criteria(&results);
        assert_eq!(criteria.len(), 6);
        assert!(criteria.iter().all(|c| !c.passed));
    }

    #[test]
    fn test_noise_floor_ladder() {
        let severity = |floor: f64| recommendations(&baseline_only(floor))[0].severity;
        assert_eq!(severity(-45.0), Severity::Warning);
        assert_eq!(severity(-52.0), Severity::Info);
        assert_eq!(severity(-60.0), Severity::Pass);
        assert_eq!(severity(-75.0), Severity::Info);
    }

    #[test]
    fn test_voice_rules() {
        let with_voice = |peak: f64, snr: f64| SessionResults {
            voice: Some(record(-20.0, peak, Some(snr))),
            ..Default::default()
        };

        // Hot peak: danger rec first, then the SNR rec
        let recs = recommendations(&with_voice(-1.5, 30.0));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].severity, Severity::Danger);
        assert_eq!(recs[1].severity, Severity::Pass);

        // Warm peak is only informational
        let recs = recommendations(&with_voice(-4.0, 30.0));
        assert_eq!(recs[0].severity, Severity::Info);

        // Quiet voice
        let recs = recommendations(&with_voice(-10.0, 12.0));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].severity, Severity::Warning);

        // Marginal SNR
        let recs = recommendations(&with_voice(-10.0, 17.0));
        assert_eq!(recs[0].severity, Severity::Info);

        // Excellent isolation
        let recs = recommendations(&with_voice(-10.0, 45.0));
        assert_eq!(recs[0].severity, Severity::Pass);
        assert!(recs[0].condition.contains("Excellent"));
    }

    #[test]
    fn test_dominance_ladder() {
        let with_dominance = |ratio: f64| {
            let mut combined = record(-18.0, -10.0, Some(30.0));
            combined.voice_dominance_ratio = Some(ratio);
            SessionResults {
                combined: Some(combined),
                ..Default::default()
            }
        };
        let severity = |ratio: f64| recommendations(&with_dominance(ratio))[0].severity;

        assert_eq!(severity(1.0), Severity::Warning);
        assert_eq!(severity(1.7), Severity::Info);
        assert_eq!(severity(3.0), Severity::Pass);
        assert_eq!(severity(7.0), Severity::Info);
        assert_eq!(severity(12.0), Severity::Warning);
    }

    #[test]
    fn test_interference_kept_above_ceiling_is_warning() {
        let mut interference = record(-40.0, -30.0, Some(10.0));
        interference.music_energy_ratio = Some(0.40);
        let results = SessionResults {
            interference: Some(interference),
            ..Default::default()
        };
        let recs = recommendations(&results);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].severity, Severity::Warning, "0.40 is a warning, not danger");
    }

    #[test]
    fn test_interference_within_ceiling_contributes_nothing() {
        let mut interference = record(-50.0, -40.0, Some(3.0));
        interference.music_energy_ratio = Some(0.10);
        let results = SessionResults {
            interference: Some(interference),
            ..Default::default()
        };
        assert!(recommendations(&results).is_empty());
    }

    #[test]
    fn test_interference_criterion_boundary() {
        let with_ratio = |ratio: f64| {
            let mut interference = record(-40.0, -30.0, Some(10.0));
            interference.music_energy_ratio = Some(ratio);
            SessionResults {
                interference: Some(interference),
                ..Default::default()
            }
        };
        assert!(success_criteria(&with_ratio(0.20))[5].passed);
        assert!(!success_criteria(&with_ratio(0.25))[5].passed, "strict <");
    }

    #[test]
    fn test_pattern_advice_tree() {
        // Weak reference pickup -> omni
        let mut results = SessionResults {
            reference_source: Some(record(-50.0, -40.0, Some(3.0))),
            ..Default::default()
        };
        assert_eq!(
            pattern_advice(&results).pattern,
            PickupPattern::Omnidirectional
        );

        // Healthy pickup, extreme dominance -> omni
        results.reference_source = Some(record(-35.0, -25.0, Some(15.0)));
        let mut combined = record(-18.0, -8.0, Some(35.0));
        combined.voice_dominance_ratio = Some(12.0);
        results.combined = Some(combined);
        assert_eq!(
            pattern_advice(&results).pattern,
            PickupPattern::Omnidirectional
        );

        // Balanced -> cardioid
        results.combined.as_mut().unwrap().voice_dominance_ratio = Some(3.0);
        assert_eq!(pattern_advice(&results).pattern, PickupPattern::Cardioid);
    }

    #[test]
    fn test_positioning_advice_tree() {
        let with_voice = |peak: f64, snr: f64| SessionResults {
            voice: Some(record(-20.0, peak, Some(snr))),
            ..Default::default()
        };
        assert!(positioning_advice(&with_voice(-1.0, 30.0))[0].contains("Move back"));
        assert!(positioning_advice(&with_voice(-10.0, 10.0))[0].contains("Move mic closer"));
        assert!(positioning_advice(&with_voice(-10.0, 18.0))[0].contains("6-10 inches"));
        assert!(positioning_advice(&with_voice(-10.0, 30.0))[0].contains("distance is good"));
        assert_eq!(positioning_advice(&with_voice(-10.0, 30.0)).len(), 4);
    }

    #[test]
    fn test_comparison_polarity() {
        let voice_snr = |snr: f64| SessionResults {
            voice: Some(record(-20.0, -10.0, Some(snr))),
            ..Default::default()
        };
        let rows = compare_runs(&voice_snr(30.0), &voice_snr(20.0));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delta, 10.0);
        assert_eq!(rows[0].trend, Trend::Improved);

        // Baseline rising by 10 dB is a regression
        let rows = compare_runs(&baseline_only(-50.0), &baseline_only(-60.0));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delta, 10.0);
        assert_eq!(rows[0].trend, Trend::Regressed);

        let rows = compare_runs(&baseline_only(-60.0), &baseline_only(-60.0));
        assert_eq!(rows[0].trend, Trend::Unchanged);
    }

    #[test]
    fn test_comparison_skips_missing_pairs() {
        let current = SessionResults {
            baseline: Some(record(-60.0, -50.0, None)),
            voice: Some(record(-20.0, -10.0, Some(25.0))),
            ..Default::default()
        };
        let previous = baseline_only(-58.0);
        let rows = compare_runs(&current, &previous);
        // Voice exists only in the current run, so only baseline compares
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].phase, Phase::Baseline);
    }
}
