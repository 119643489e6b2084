mod analysis;
mod audio;
mod console;
mod diagnostics;
mod playback;
mod plots;
mod report;
mod session;

use crate::audio::Recorder;
use crate::audio::recorder;
use crate::report::OutputLayout;
use crate::session::{Cancelled, SessionController};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use log::warn;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "miccal")]
#[command(about = "Interactive microphone calibration suite")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a calibration session
    Run(RunArgs),

    /// List available audio input devices
    Devices,
}

#[derive(Args)]
struct RunArgs {
    /// Input device name filter (substring match)
    #[arg(long)]
    device: Option<String>,

    /// Directory for raw captures
    #[arg(long, default_value = "recordings")]
    recordings_dir: PathBuf,

    /// Directory for generated reports
    #[arg(long, default_value = "reports")]
    reports_dir: PathBuf,

    /// Reference clip played through the speakers during phases 3-4
    #[arg(long)]
    source: Option<PathBuf>,

    /// Directory searched for a reference clip when --source is not given
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Seconds to skip into the reference clip
    #[arg(long, default_value = "120")]
    source_offset: u32,

    /// Run all five phases, including the explicit combined capture
    #[arg(long)]
    full: bool,

    /// Skip playback entirely and record room audio only
    #[arg(long)]
    no_playback: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            if let Err(e) = run_session(args) {
                eprintln!("Calibration failed: {e:#}");
                std::process::exit(1);
            }
        }

        Commands::Devices => match Recorder::list_devices() {
            Ok(devices) => {
                println!("Available Audio Input Devices:");
                println!("{:<40} {:<10} {:<10} Max Rate", "Name", "Default", "Channels");
                println!("{}", "-".repeat(75));
                for device in devices {
                    let default_str = if device.is_default { "YES" } else { "NO" };
                    println!(
                        "{:<40} {:<10} {:<10} {}",
                        &device.name[..device.name.len().min(40)],
                        default_str,
                        device.channels,
                        device.max_sample_rate
                    );
                }
            }
            Err(e) => {
                eprintln!("Failed to list audio devices: {e}");
                std::process::exit(1);
            }
        },
    }
}

fn run_session(args: RunArgs) -> Result<()> {
    println!();
    println!(
        "{}",
        console::bold(&console::cyan("  Microphone Calibration Suite"))
    );
    println!("{}", console::dim("  ----------------------------"));
    println!();

    // Preflight
    println!("{}", console::bold("  Preflight Checks"));
    console::separator();
    println!();
    let recorder = Recorder::new(args.device.as_deref())?;
    println!("  Input device: {}", console::bold(recorder.device_name()));

    if recorder::output_is_input_device(recorder.device_name()) {
        println!(
            "{}",
            console::red(&console::bold(
                "  WARNING: The system output device is the calibration microphone!"
            ))
        );
        println!(
            "{}",
            console::red("  This will cause feedback during the playback phases.")
        );
        println!(
            "{}",
            console::red("  Change the output device in your sound settings before continuing.")
        );
        if !console::confirm("  Continue anyway? (y/N): ") {
            return Ok(());
        }
    }
    println!(
        "{}",
        console::dim("  Tip: set the system input volume to ~80% and fine-tune with the gain knob.")
    );

    println!();
    println!("{}", console::bold("  Microphone Checklist:"));
    println!("  - Mute button: LED should show unmuted");
    println!("  - Gain knob: start at ~30%");
    println!("  - Pickup pattern: start with cardioid");
    println!("  - Headphone volume on the mic does NOT affect recordings");
    println!();
    println!("{}", console::bold("  Reference Speaker:"));
    println!("  - Set a moderate volume and make sure it is the active output");
    println!();
    println!("{}", console::bold("  Background Music (phase 5 only):"));
    println!("  - Have music ready on the background speaker but don't start it yet");
    println!();
    if !console::wait_for_enter("  Press Enter when ready to begin...") {
        return Ok(());
    }

    // Source clip
    println!();
    println!("{}", console::bold("  Source Clip Setup"));
    console::separator();
    let source_wav = if args.no_playback {
        None
    } else {
        println!("{}", console::dim("  Preparing reference clip..."));
        playback::prepare_source_clip(
            args.source.as_deref(),
            args.source_dir.as_deref(),
            args.source_offset,
        )
    };
    match &source_wav {
        Some(path) => println!("{}", console::green(&format!("  Ready: {}", path.display()))),
        None => {
            println!("{}", console::yellow("  Could not prepare a reference clip."));
            println!(
                "{}",
                console::yellow("  Playback phases will record room audio only.")
            );
        }
    }

    let music_wav = if args.no_playback {
        None
    } else {
        match playback::music_source() {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("no music source for the interference phase: {e}");
                None
            }
        }
    };

    let layout = OutputLayout::new(args.recordings_dir, args.reports_dir);
    let run_number = report::next_run_number(&layout.recordings_dir);
    let mut controller = SessionController::new(recorder, source_wav, music_wav);

    // Initial run
    let run_dir = layout.run_dir(run_number);
    let outcome = if args.full {
        controller.run_full(&run_dir)
    } else {
        controller.run_core(&run_dir)
    };
    if let Err(e) = outcome {
        if e.downcast_ref::<Cancelled>().is_some() {
            println!();
            println!(
                "{}",
                console::yellow("  Recording interrupted. Saving partial results...")
            );
        } else {
            return Err(e);
        }
    }

    println!();
    println!("{}", console::bold("  Generating Report"));
    console::separator();
    if let Err(e) = report::generate_run_report(&controller.results, run_number, None, &layout) {
        warn!("report generation failed: {e:#}");
        println!(
            "{}",
            console::yellow(&format!(
                "  Report generation failed: {e:#}. Measurements stay in memory."
            ))
        );
    }

    display_recommendations(&controller.results);
    let mut all_passed = display_success_criteria(&controller.results);

    if !all_passed {
        refine_loop(&mut controller, &layout, run_number)?;
        let criteria = diagnostics::success_criteria(&controller.results);
        all_passed = diagnostics::all_passed(&criteria);
    }

    // Final config
    let pattern = diagnostics::pattern_advice(&controller.results);
    if all_passed {
        save_config(&controller, &pattern.pattern.to_string())?;
        println!(
            "{}",
            console::green("  Downstream recording tools will pick this config up.")
        );
    } else {
        println!();
        println!(
            "{}",
            console::yellow("  Calibration not yet complete. Run again to fine-tune settings.")
        );
        if console::confirm("  Save current config anyway? (y/N): ") {
            save_config(&controller, &pattern.pattern.to_string())?;
        }
    }

    println!();
    println!(
        "{}",
        console::dim("  Done. See the reports directory for detailed analysis.")
    );
    println!();
    Ok(())
}

/// Refine-and-repeat menu. Each chosen re-run bumps the run number,
/// regenerates the report, and compares against the previous snapshot.
fn refine_loop(
    controller: &mut SessionController,
    layout: &OutputLayout,
    mut run_number: u32,
) -> Result<u32> {
    loop {
        println!();
        console::separator();
        println!("{}", console::bold("  What would you like to do?"));
        println!();
        println!(
            "  {} Re-test Voice + Reference (quick — the two key measurements)",
            console::cyan("[T]")
        );
        println!("  {} Re-run Voice Only (Phase 2)", console::cyan("[V]"));
        println!(
            "  {} Re-run Reference Speaker Only (Phase 3)",
            console::cyan("[S]")
        );
        println!(
            "  {} Re-run Music Isolation (Phase 5) — music volume check",
            console::cyan("[M]")
        );
        println!("  {} Run ALL phases (full suite)", console::cyan("[A]"));
        println!("  {} Quit — happy with settings", console::cyan("[Q]"));
        println!();

        let Some(choice) = console::prompt("  Choice: ") else {
            return Ok(run_number);
        };
        let choice = choice.to_uppercase();
        if choice == "Q" {
            return Ok(run_number);
        }

        let previous = controller.results.clone();
        run_number += 1;
        let run_dir = layout.run_dir(run_number);

        let outcome = match choice.as_str() {
            "T" => controller.quick_pair(&run_dir),
            "V" => {
                let result = controller.run_voice(&run_dir);
                if result.is_ok() {
                    controller.results.infer_dominance();
                }
                result
            }
            "S" => {
                let result = controller.run_reference(&run_dir);
                if result.is_ok() {
                    controller.results.infer_dominance();
                }
                result
            }
            "M" => controller.run_interference(&run_dir),
            "A" => controller.run_full(&run_dir),
            _ => {
                println!("{}", console::yellow("  Invalid choice. Please try again."));
                run_number -= 1;
                continue;
            }
        };
        if let Err(e) = outcome {
            if e.downcast_ref::<Cancelled>().is_some() {
                println!();
                println!(
                    "{}",
                    console::yellow("  Recording interrupted. Saving partial results...")
                );
            } else {
                return Err(e);
            }
        }

        if let Err(e) =
            report::generate_run_report(&controller.results, run_number, Some(&previous), layout)
        {
            warn!("report generation failed: {e:#}");
            println!(
                "{}",
                console::yellow(&format!("  Report generation failed: {e:#}"))
            );
        }

        println!();
        console::banner("Comparison with Previous Run");
        for line in report::comparison_table(&controller.results, Some(&previous)).lines() {
            println!("  {line}");
        }

        display_recommendations(&controller.results);
        display_success_criteria(&controller.results);
    }
}

fn display_recommendations(results: &session::SessionResults) {
    let recs = diagnostics::recommendations(results);
    let pattern = diagnostics::pattern_advice(results);
    let positioning = diagnostics::positioning_advice(results);

    println!();
    console::banner("Recommendations");

    for rec in &recs {
        let tag = match rec.severity {
            diagnostics::Severity::Danger => console::red("[!]"),
            diagnostics::Severity::Warning => console::yellow("[!]"),
            diagnostics::Severity::Pass => console::green("[+]"),
            diagnostics::Severity::Info => console::dim("[i]"),
        };
        println!("  {tag} {}", rec.action);
    }

    println!();
    println!(
        "  {}: {}",
        console::bold("Recommended pattern"),
        console::cyan(&pattern.pattern.to_string())
    );
    println!("  {}", console::dim(&pattern.reasoning));

    println!();
    println!("  {}:", console::bold("Positioning advice"));
    for line in positioning {
        println!("  {line}");
    }
}

fn display_success_criteria(results: &session::SessionResults) -> bool {
    let criteria = diagnostics::success_criteria(results);
    let all_passed = diagnostics::all_passed(&criteria);

    println!();
    console::banner("Success Criteria");

    for c in &criteria {
        let status = if c.passed {
            console::green("PASS")
        } else {
            console::red("FAIL")
        };
        println!("  {status}  {}: {} (target: {})", c.name, c.measured, c.target);
    }

    println!();
    if all_passed {
        println!("{}", console::green(&console::bold("  CALIBRATION COMPLETE")));
        println!("{}", console::green("  All success criteria met!"));
    } else {
        let failed: Vec<&str> = criteria
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name)
            .collect();
        println!(
            "{}",
            console::yellow(&format!("  Some criteria not met: {}", failed.join(", ")))
        );
        println!(
            "{}",
            console::yellow("  Consider running another calibration pass.")
        );
    }

    all_passed
}

fn save_config(controller: &SessionController, pattern: &str) -> Result<()> {
    let path = report::final_config_path()?;
    report::save_final_config(&controller.results, controller.device_name(), pattern, &path)?;
    println!();
    println!(
        "{}",
        console::green(&format!(
            "{}{}",
            console::bold("  Final config saved to: "),
            path.display()
        ))
    );
    Ok(())
}
