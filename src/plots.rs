//! Spectrum plot rendering
//!
//! Per-phase PSD plots plus an all-phase overlay, with the speech band
//! shaded. Rendering failures are reported to the caller, which degrades
//! them to a warning.

use crate::session::{Phase, SessionResults, Spectrum};
use anyhow::{Result, anyhow};
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const PLOT_SIZE: (u32, u32) = (1000, 420);
const X_MIN_HZ: f64 = 20.0;
const X_MAX_HZ: f64 = 20_000.0;
const SPEECH_BAND_HZ: (f64, f64) = (300.0, 3000.0);

/// Floor for the log-scaled power axis; zero bins clamp to this.
const PSD_FLOOR: f64 = 1e-14;

fn phase_color(phase: Phase) -> RGBColor {
    match phase {
        Phase::Baseline => RGBColor(136, 136, 136),
        Phase::Voice => RGBColor(33, 150, 243),
        Phase::ReferenceSource => RGBColor(255, 152, 0),
        Phase::Combined => RGBColor(76, 175, 80),
        Phase::Interference => RGBColor(156, 39, 176),
    }
}

/// Render one PNG per measured phase and an overlay comparison.
/// Returns the generated paths.
pub fn generate_spectral_plots(
    results: &SessionResults,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut generated = Vec::new();

    let series: Vec<(Phase, &Spectrum)> = Phase::ALL
        .iter()
        .filter_map(|&phase| {
            results
                .get(phase)
                .filter(|r| !r.spectrum.freqs.is_empty())
                .map(|r| (phase, &r.spectrum))
        })
        .collect();

    for &(phase, spectrum) in &series {
        let path = output_dir.join(format!("{}_spectrum.png", phase.label()));
        draw_spectrum(&path, phase.title(), &[(phase, spectrum)])?;
        generated.push(path);
    }

    if !series.is_empty() {
        let path = output_dir.join("all_phases_overlay.png");
        draw_spectrum(&path, "All Phases - Spectral Comparison", &series)?;
        generated.push(path);
    }

    Ok(generated)
}

fn draw_spectrum(path: &Path, title: &str, series: &[(Phase, &Spectrum)]) -> Result<()> {
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("plot fill: {e}"))?;

    let y_max = series
        .iter()
        .flat_map(|(_, s)| s.psd.iter())
        .fold(PSD_FLOOR, |acc, &p| acc.max(p))
        * 2.0;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(X_MIN_HZ..X_MAX_HZ, (PSD_FLOOR..y_max).log_scale())
        .map_err(|e| anyhow!("plot axes: {e}"))?;

    chart
        .configure_mesh()
        .x_desc("Frequency (Hz)")
        .y_desc("Power Spectral Density")
        .draw()
        .map_err(|e| anyhow!("plot mesh: {e}"))?;

    chart
        .draw_series(std::iter::once(Rectangle::new(
            [(SPEECH_BAND_HZ.0, PSD_FLOOR), (SPEECH_BAND_HZ.1, y_max)],
            GREEN.mix(0.08).filled(),
        )))
        .map_err(|e| anyhow!("plot band: {e}"))?;

    for &(phase, spectrum) in series {
        let color = phase_color(phase);
        let points = spectrum
            .freqs
            .iter()
            .zip(spectrum.psd.iter())
            .filter(|(f, _)| **f >= X_MIN_HZ && **f <= X_MAX_HZ)
            .map(|(&f, &p)| (f, p.max(PSD_FLOOR)));
        chart
            .draw_series(LineSeries::new(points, &color))
            .map_err(|e| anyhow!("plot series: {e}"))?
            .label(phase.title())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 16, y)], color)
            });
    }

    if series.len() > 1 {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| anyhow!("plot legend: {e}"))?;
    }

    root.present().map_err(|e| anyhow!("plot write: {e}"))?;
    Ok(())
}
