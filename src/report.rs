//! Report rendering and persistence
//!
//! Markdown report assembly, the accumulating JSON results log, run
//! numbering, and the final calibration config artifact.

use crate::console;
use crate::diagnostics::{self, Severity};
use crate::plots;
use crate::session::{Phase, SessionResults};
use anyhow::{Context, Result, anyhow};
use jiff::Zoned;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a session writes its artifacts.
pub struct OutputLayout {
    pub recordings_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub results_log: PathBuf,
}

impl OutputLayout {
    pub fn new(recordings_dir: PathBuf, reports_dir: PathBuf) -> Self {
        let results_log = recordings_dir
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
            .join("calibration_results.json");
        Self {
            recordings_dir,
            reports_dir,
            results_log,
        }
    }

    pub fn run_dir(&self, run_number: u32) -> PathBuf {
        self.recordings_dir.join(run_dir_name(run_number))
    }
}

pub fn run_dir_name(run_number: u32) -> String {
    format!("run_{run_number:03}")
}

/// Next run number for the output directory.
///
/// Derived by scanning existing `run_NNN` directories, never stored
/// separately. Malformed names are skipped.
pub fn next_run_number(recordings_dir: &Path) -> u32 {
    let Ok(entries) = fs::read_dir(recordings_dir) else {
        return 1;
    };
    let mut highest = 0u32;
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let parsed = name
            .to_string_lossy()
            .strip_prefix("run_")
            .and_then(|s| s.parse::<u32>().ok());
        if let Some(num) = parsed {
            highest = highest.max(num);
        }
    }
    highest + 1
}

pub fn measurements_table(results: &SessionResults) -> String {
    let mut lines = vec![
        "| Phase | RMS (dBFS) | Peak (dBFS) | SNR (dB) | Dominant Band |".to_string(),
        "|-------|-----------|-------------|----------|---------------|".to_string(),
    ];
    for phase in Phase::ALL {
        match results.get(phase) {
            Some(r) => {
                let snr = r
                    .snr_db
                    .map(|s| format!("{s:.1}"))
                    .unwrap_or_else(|| "—".to_string());
                lines.push(format!(
                    "| {} | {:.1} | {:.1} | {} | {} |",
                    phase.title(),
                    r.rms_dbfs,
                    r.peak_dbfs,
                    snr,
                    r.dominant_band
                ));
            }
            None => lines.push(format!("| {} | — | — | — | — |", phase.title())),
        }
    }
    lines.join("\n")
}

pub fn comparison_table(current: &SessionResults, previous: Option<&SessionResults>) -> String {
    let Some(previous) = previous else {
        return measurements_table(current);
    };

    let mut lines = vec![
        "| Phase | Metric | Previous | Current | Change |".to_string(),
        "|-------|--------|----------|---------|--------|".to_string(),
    ];
    for (phase, metric) in diagnostics::COMPARISON_METRICS {
        match diagnostics::compare_metric(phase, metric, current, previous) {
            Some(row) => lines.push(format!(
                "| {} | {} | {:.1} | {:.1} | {:+.1} ({}) |",
                phase.title(),
                metric,
                row.previous,
                row.current,
                row.delta,
                row.trend
            )),
            None => lines.push(format!("| {} | {} | — | — | — |", phase.title(), metric)),
        }
    }
    lines.join("\n")
}

/// Assemble the full markdown calibration report for one run.
pub fn report_markdown(
    results: &SessionResults,
    run_number: u32,
    previous: Option<&SessionResults>,
) -> String {
    let mut lines = vec![
        format!("# Calibration Report — Run {run_number:03}"),
        format!(
            "**Date**: {}",
            Zoned::now().strftime("%Y-%m-%d %H:%M:%S")
        ),
        String::new(),
        "## Measurements".to_string(),
        String::new(),
        measurements_table(results),
        String::new(),
    ];

    if previous.is_some() {
        lines.extend([
            "## Comparison with Previous Run".to_string(),
            String::new(),
            comparison_table(results, previous),
            String::new(),
        ]);
    }

    let criteria = diagnostics::success_criteria(results);
    lines.extend([
        "## Success Criteria".to_string(),
        String::new(),
        "| Criterion | Value | Target | Status |".to_string(),
        "|-----------|-------|--------|--------|".to_string(),
    ]);
    for c in &criteria {
        let status = if c.passed { "PASS" } else { "FAIL" };
        lines.push(format!("| {} | {} | {} | {} |", c.name, c.measured, c.target, status));
    }
    lines.push(String::new());

    if diagnostics::all_passed(&criteria) {
        lines.push("**All criteria met! Calibration complete.**".to_string());
    } else {
        let failed: Vec<&str> = criteria
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name)
            .collect();
        lines.push(format!("**Failed criteria**: {}", failed.join(", ")));
    }

    lines.extend(["".to_string(), "## Recommendations".to_string(), String::new()]);
    for rec in diagnostics::recommendations(results) {
        let icon = match rec.severity {
            Severity::Danger | Severity::Warning => "[!]",
            Severity::Info => "[i]",
            Severity::Pass => "[+]",
        };
        lines.push(format!("- {icon} **{}**: {}", rec.condition, rec.action));
    }

    let pattern = diagnostics::pattern_advice(results);
    lines.extend([
        String::new(),
        "## Recommended Pattern".to_string(),
        String::new(),
        format!("**{}** — {}", pattern.pattern, pattern.reasoning),
        String::new(),
        "## Positioning".to_string(),
        String::new(),
    ]);
    lines.extend(diagnostics::positioning_advice(results));
    lines.extend([
        String::new(),
        "## Spectral Analysis".to_string(),
        String::new(),
        "See the `plots/` directory for per-phase spectrum plots and the overlay comparison."
            .to_string(),
        String::new(),
    ]);

    lines.join("\n")
}

/// Render plots, write the markdown report, and append to the results log.
///
/// Plot or log failures degrade to warnings; measurement data is never
/// discarded over a persistence problem.
pub fn generate_run_report(
    results: &SessionResults,
    run_number: u32,
    previous: Option<&SessionResults>,
    layout: &OutputLayout,
) -> Result<PathBuf> {
    let report_dir = layout.reports_dir.join(run_dir_name(run_number));
    let plots_dir = report_dir.join("plots");
    fs::create_dir_all(&plots_dir)
        .with_context(|| format!("creating {}", plots_dir.display()))?;

    println!("{}", console::dim("  Generating spectral plots..."));
    if let Err(e) = plots::generate_spectral_plots(results, &plots_dir) {
        warn!("plot generation failed: {e}");
        println!(
            "{}",
            console::yellow(&format!("  Plot generation failed (report continues): {e}"))
        );
    }

    let report_path = report_dir.join(format!("{}_report.md", run_dir_name(run_number)));
    fs::write(&report_path, report_markdown(results, run_number, previous))
        .with_context(|| format!("writing {}", report_path.display()))?;

    if let Err(e) = append_results_log(results, run_number, &layout.results_log) {
        warn!("could not update results log: {e}");
        println!(
            "{}",
            console::yellow(&format!("  Results log not updated: {e}"))
        );
    }

    println!(
        "{}",
        console::green(&format!("  Report saved: {}", report_path.display()))
    );
    Ok(report_path)
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultsLog {
    runs: Vec<RunEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RunEntry {
    run_number: u32,
    timestamp: String,
    results: SessionResults,
}

/// Append this run to the accumulated results log (one growing array).
pub fn append_results_log(
    results: &SessionResults,
    run_number: u32,
    path: &Path,
) -> Result<()> {
    let mut log: ResultsLog = match fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!("results log unreadable, starting fresh: {e}");
            ResultsLog { runs: Vec::new() }
        }),
        Err(_) => ResultsLog { runs: Vec::new() },
    };

    log.runs.push(RunEntry {
        run_number,
        timestamp: Zoned::now().strftime("%Y-%m-%dT%H:%M:%S").to_string(),
        results: results.clone(),
    });

    fs::write(path, serde_json::to_string_pretty(&log)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("results log updated ({} runs)", log.runs.len());
    Ok(())
}

/// Final calibration config consumed by downstream recording tools.
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalConfig {
    pub input_device: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub recommended_gain_percent: u32,
    pub recommended_pattern: String,
    pub recommended_distance_inches: u32,
    pub noise_floor_dbfs: f64,
    pub voice_snr_db: f64,
    pub calibrated_at: String,
}

pub fn final_config_path() -> Result<PathBuf> {
    let dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow!("could not find home directory"))?;
    Ok(dirs.config_dir().join("mic_calibration.json"))
}

/// Write the final config snapshot, overwriting any previous one.
pub fn save_final_config(
    results: &SessionResults,
    device_name: &str,
    pattern: &str,
    path: &Path,
) -> Result<()> {
    let round1 = |v: f64| (v * 10.0).round() / 10.0;
    let config = FinalConfig {
        input_device: device_name.to_string(),
        sample_rate: crate::audio::SAMPLE_RATE,
        channels: 1,
        recommended_gain_percent: 35,
        recommended_pattern: pattern.to_string(),
        recommended_distance_inches: 8,
        noise_floor_dbfs: round1(
            results
                .baseline
                .as_ref()
                .map(|r| r.rms_dbfs)
                .unwrap_or(-60.0),
        ),
        voice_snr_db: round1(
            results
                .voice
                .as_ref()
                .and_then(|r| r.snr_db)
                .unwrap_or(0.0),
        ),
        calibrated_at: Zoned::now().strftime("%Y-%m-%dT%H:%M:%S").to_string(),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("final config saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FreqBand;
    use crate::session::{MeasurementRecord, Spectrum};

    fn record(rms: f64, snr: Option<f64>) -> MeasurementRecord {
        MeasurementRecord {
            rms_dbfs: rms,
            peak_dbfs: rms + 8.0,
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

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("miccal_test_{name}"));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_next_run_number_empty_and_missing() {
        let dir = temp_dir("runs_empty");
        assert_eq!(next_run_number(&dir), 1);
        assert_eq!(next_run_number(&dir.join("does_not_exist")), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_next_run_number_skips_malformed() {
        let dir = temp_dir("runs_scan");
        fs::create_dir_all(dir.join("run_001")).unwrap();
        fs::create_dir_all(dir.join("run_007")).unwrap();
        fs::create_dir_all(dir.join("run_abc")).unwrap();
        fs::create_dir_all(dir.join("notes")).unwrap();
        fs::write(dir.join("run_099"), b"a file, not a dir").unwrap();
        assert_eq!(next_run_number(&dir), 8);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_measurements_table_renders_absent_phases() {
        let results = SessionResults {
            baseline: Some(record(-60.0, None)),
            ..Default::default()
        };
        let table = measurements_table(&results);
        assert!(table.contains("Phase 1: Silence Baseline | -60.0"));
        assert!(table.contains("Phase 2: Voice Only | — | — | — | — |"));
        // Baseline has no SNR column value
        let baseline_row = table
            .lines()
            .find(|l| l.contains("Silence Baseline"))
            .unwrap();
        assert!(baseline_row.contains("| — |"));
    }

    #[test]
    fn test_comparison_table_falls_back_without_previous() {
        let results = SessionResults {
            baseline: Some(record(-60.0, None)),
            ..Default::default()
        };
        let table = comparison_table(&results, None);
        assert!(table.contains("Dominant Band"), "should render measurements");
    }

    #[test]
    fn test_comparison_table_marks_changes() {
        let current = SessionResults {
            voice: Some(record(-20.0, Some(30.0))),
            ..Default::default()
        };
        let previous = SessionResults {
            voice: Some(record(-22.0, Some(20.0))),
            ..Default::default()
        };
        let table = comparison_table(&current, Some(&previous));
        assert!(table.contains("+10.0 (improved)"));
        assert!(table.contains("| Phase 1: Silence Baseline | rms_dbfs | — | — | — |"));
    }

    #[test]
    fn test_report_markdown_sections() {
        let results = SessionResults {
            baseline: Some(record(-60.0, None)),
            ..Default::default()
        };
        let md = report_markdown(&results, 3, None);
        assert!(md.contains("# Calibration Report — Run 003"));
        assert!(md.contains("## Measurements"));
        assert!(md.contains("## Success Criteria"));
        assert!(md.contains("**Failed criteria**"));
        assert!(md.contains("## Recommendations"));
        assert!(!md.contains("## Comparison"), "no previous run given");
    }

    #[test]
    fn test_results_log_accumulates() {
        let dir = temp_dir("results_log");
        let log_path = dir.join("calibration_results.json");
        let results = SessionResults {
            baseline: Some(record(-58.0, None)),
            ..Default::default()
        };

        append_results_log(&results, 1, &log_path).unwrap();
        append_results_log(&results, 2, &log_path).unwrap();

        let parsed: ResultsLog =
            serde_json::from_str(&fs::read_to_string(&log_path).unwrap()).unwrap();
        assert_eq!(parsed.runs.len(), 2);
        assert_eq!(parsed.runs[0].run_number, 1);
        assert_eq!(parsed.runs[1].run_number, 2);
        assert_eq!(
            parsed.runs[0].results.baseline.as_ref().unwrap().rms_dbfs,
            -58.0
        );
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_final_config_overwrites() {
        let dir = temp_dir("final_config");
        let path = dir.join("mic_calibration.json");
        let results = SessionResults {
            baseline: Some(record(-61.27, None)),
            voice: Some(record(-20.0, Some(33.44))),
            ..Default::default()
        };

        save_final_config(&results, "USB Microphone", "Cardioid", &path).unwrap();
        save_final_config(&results, "USB Microphone", "Omnidirectional", &path).unwrap();

        let config: FinalConfig =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.recommended_pattern, "Omnidirectional");
        assert_eq!(config.noise_floor_dbfs, -61.3);
        assert_eq!(config.voice_snr_db, 33.4);
        assert_eq!(config.sample_rate, 48_000);
        fs::remove_dir_all(&dir).ok();
    }
}
