//! Recording buffer with live metering
//!
//! Captures a fixed-duration take from a cpal input stream into a
//! preallocated buffer. The stream callback is the single writer and only
//! ever advances a monotonic frame cursor; the meter poll on the calling
//! thread reads completed frames below the cursor, so a poll never observes
//! torn or unwritten data. On stream error the capture keeps whatever was
//! written instead of failing.

use super::SAMPLE_RATE;
use crate::analysis;
use crate::console;
use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};
use hound::{WavSpec, WavWriter};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Meter refresh cadence.
const METER_TICK: Duration = Duration::from_millis(100);

/// Meter display range: -60 dBFS maps to empty, 0 dBFS to full.
const METER_RANGE_DB: f64 = 60.0;

/// Extra time allowed past the nominal duration before the capture is
/// treated as stalled and trimmed to whatever arrived.
const STALL_GRACE: Duration = Duration::from_secs(2);

/// Information about an available audio input device
#[derive(Debug)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub channels: u16,
    pub max_sample_rate: u32,
}

/// A completed (possibly truncated) capture.
pub struct CaptureOutcome {
    pub samples: Vec<f32>,
    pub path: PathBuf,
    /// True when the stream stopped before the full duration was captured.
    pub interrupted: bool,
}

/// Shared between the stream callback (writer) and the meter poll (reader).
struct CaptureShared {
    buffer: Mutex<Vec<f32>>,
    /// Frames written so far. Advances monotonically, never rewinds.
    frames_written: AtomicUsize,
    stopped: AtomicBool,
}

pub struct Recorder {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    sample_rate: u32,
    device_name: String,
}

impl Recorder {
    /// Open an input device, preferring one whose name contains `name_filter`.
    ///
    /// Falls back to an interactive pick when the filter matches nothing,
    /// and to the default input device when no filter is given.
    pub fn new(name_filter: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match name_filter {
            Some(filter) => find_device(&host, filter)?,
            None => match host.default_input_device() {
                Some(device) => device,
                None => {
                    println!(
                        "{}",
                        console::yellow("  No default input device. Available input devices:")
                    );
                    select_device_interactive(&host)?
                }
            },
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let (config, sample_format) = pick_config(&device, SAMPLE_RATE)?;
        debug!(
            "input device '{}': {} Hz, {} ch, {:?}",
            device_name, config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            sample_rate: config.sample_rate.0,
            device,
            config,
            sample_format,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// List all available audio input devices
    pub fn list_devices() -> Result<Vec<AudioDeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let mut infos = Vec::new();
        for device in host.input_devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let mut channels = 0u16;
            let mut max_sample_rate = 0u32;
            if let Ok(ranges) = device.supported_input_configs() {
                for range in ranges {
                    channels = channels.max(range.channels());
                    max_sample_rate = max_sample_rate.max(range.max_sample_rate().0);
                }
            }
            infos.push(AudioDeviceInfo {
                is_default: name == default_name,
                name,
                channels,
                max_sample_rate,
            });
        }
        Ok(infos)
    }

    /// Record `duration` of audio with a live VU meter, then persist to
    /// `<run_dir>/<label>.wav`.
    ///
    /// Returns the in-memory samples alongside the saved path. A device that
    /// disappears mid-capture yields the partial take rather than an error.
    pub fn capture(&self, duration: Duration, label: &str, run_dir: &Path) -> Result<CaptureOutcome> {
        if let Err(e) = std::fs::create_dir_all(run_dir) {
            warn!("could not create {}: {e}", run_dir.display());
        }
        let path = run_dir.join(format!("{label}.wav"));
        let total_frames = (duration.as_secs_f64() * self.sample_rate as f64) as usize;

        let shared = Arc::new(CaptureShared {
            buffer: Mutex::new(vec![0.0f32; total_frames]),
            frames_written: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        });

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(shared.clone()),
            SampleFormat::I16 => self.build_stream::<i16>(shared.clone()),
            SampleFormat::U16 => self.build_stream::<u16>(shared.clone()),
            fmt => Err(anyhow!("unsupported input sample format {fmt:?}")),
        }?;
        stream.play()?;

        let meter_window = (self.sample_rate / 4) as usize;
        let pb = ProgressBar::new(METER_RANGE_DB as u64);
        pb.set_style(
            ProgressStyle::with_template("  {prefix} [{bar:30}] {msg}")?.progress_chars("█░"),
        );
        pb.set_prefix(format!("{} {label}", console::red("REC")));

        let start = Instant::now();
        loop {
            let written = shared.frames_written.load(Ordering::Acquire);
            if written >= total_frames || shared.stopped.load(Ordering::Acquire) {
                break;
            }
            if start.elapsed() > duration + STALL_GRACE {
                warn!("input stream stalled at {written}/{total_frames} frames");
                break;
            }

            let level = match shared.buffer.lock() {
                Ok(buffer) => meter_level(&buffer, written, meter_window),
                Err(_) => -METER_RANGE_DB,
            };
            let remaining = duration.as_secs_f64() - start.elapsed().as_secs_f64();
            pb.set_position((level + METER_RANGE_DB).clamp(0.0, METER_RANGE_DB) as u64);
            pb.set_message(format!(
                "{}  {:4.1}s left",
                console::level_readout(level),
                remaining.max(0.0)
            ));

            thread::sleep(METER_TICK);
        }
        drop(stream);
        pb.finish_and_clear();

        let frames = shared
            .frames_written
            .load(Ordering::Acquire)
            .min(total_frames);
        let interrupted = frames < total_frames;
        let samples = {
            let buffer = shared
                .buffer
                .lock()
                .map_err(|_| anyhow!("capture buffer poisoned"))?;
            buffer[..frames].to_vec()
        };

        // A failed save is surfaced but never discards the in-memory take
        if let Err(e) = write_wav(&path, &samples, self.sample_rate) {
            warn!("could not save capture: {e:#}");
            println!(
                "{}",
                console::yellow(&format!(
                    "  Could not save {}: {e:#}. Keeping samples in memory.",
                    path.display()
                ))
            );
        } else {
            println!("{}", console::dim(&format!("  Saved: {}", path.display())));
        }

        Ok(CaptureOutcome {
            samples,
            path,
            interrupted,
        })
    }

    fn build_stream<T>(&self, shared: Arc<CaptureShared>) -> Result<cpal::Stream>
    where
        T: cpal::SizedSample + Send + 'static,
        f32: cpal::FromSample<T>,
    {
        let channels = self.config.channels.max(1) as usize;
        let err_shared = shared.clone();
        let mut mono: Vec<f32> = Vec::new();

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if shared.stopped.load(Ordering::Acquire) {
                    return;
                }
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame
                        .iter()
                        .map(|&s| {
                            let v: f32 = cpal::Sample::from_sample(s);
                            v
                        })
                        .sum::<f32>()
                        / channels as f32
                }));

                let Ok(mut buffer) = shared.buffer.lock() else {
                    return;
                };
                // Single writer: only this callback advances the cursor.
                let cursor = shared.frames_written.load(Ordering::Relaxed);
                let end = write_block(&mut buffer, cursor, &mono);
                shared.frames_written.store(end, Ordering::Release);
                if end == buffer.len() {
                    shared.stopped.store(true, Ordering::Release);
                }
            },
            move |err| {
                warn!("input stream error: {err}");
                eprintln!(
                    "{}",
                    console::yellow(&format!(
                        "  Input device error: {err}. Keeping partial capture."
                    ))
                );
                err_shared.stopped.store(true, Ordering::Release);
            },
            None,
        )?;
        Ok(stream)
    }
}

/// Copy an arriving block into the next unfilled region of the buffer.
///
/// Returns the new cursor. A block that would overflow the buffer is
/// truncated; already-written regions are never touched.
fn write_block(buffer: &mut [f32], cursor: usize, block: &[f32]) -> usize {
    if cursor >= buffer.len() {
        return buffer.len();
    }
    let end = (cursor + block.len()).min(buffer.len());
    buffer[cursor..end].copy_from_slice(&block[..end - cursor]);
    end
}

/// Level over the most recently written quarter-second window.
///
/// Reads only `[cursor - window, cursor)`, which the writer has already
/// completed. Reports the meter floor until a full window exists.
fn meter_level(buffer: &[f32], cursor: usize, window: usize) -> f64 {
    if cursor < window || window == 0 {
        return -METER_RANGE_DB;
    }
    analysis::rms_dbfs(&buffer[cursor - window..cursor])
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn find_device(host: &cpal::Host, filter: &str) -> Result<Device> {
    let needle = filter.to_lowercase();
    for device in host.input_devices()? {
        if let Ok(name) = device.name() {
            if name.to_lowercase().contains(&needle) {
                println!("{}", console::green(&format!("  Auto-detected: {name}")));
                return Ok(device);
            }
        }
    }
    println!(
        "{}",
        console::yellow(&format!(
            "  No input device matching \"{filter}\". Available input devices:"
        ))
    );
    select_device_interactive(host)
}

fn select_device_interactive(host: &cpal::Host) -> Result<Device> {
    let devices: Vec<Device> = host.input_devices()?.collect();
    if devices.is_empty() {
        return Err(anyhow!("no audio input devices available"));
    }
    for (i, device) in devices.iter().enumerate() {
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
        println!("    [{i}] {name}");
    }
    let choice = console::prompt("  Enter device number: ")
        .ok_or_else(|| anyhow!("device selection aborted"))?;
    let index: usize = choice.parse().context("invalid device number")?;
    devices
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow!("device number {index} out of range"))
}

/// True when the default output device appears to be the capture device,
/// which risks a feedback loop during playback phases.
pub fn output_is_input_device(input_name: &str) -> bool {
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.name().ok())
        .map(|out| out.eq_ignore_ascii_case(input_name))
        .unwrap_or(false)
}

/// Pick an input configuration for the target rate.
///
/// Prefers a range covering the target (f32, fewest channels); otherwise
/// falls back to the closest the device offers at its maximum rate.
fn pick_config(device: &Device, target_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    let ranges: Vec<SupportedStreamConfigRange> = device.supported_input_configs()?.collect();
    let best = ranges
        .into_iter()
        .max_by_key(|r| {
            let covers =
                r.min_sample_rate().0 <= target_rate && target_rate <= r.max_sample_rate().0;
            (
                covers,
                r.sample_format() == SampleFormat::F32,
                std::cmp::Reverse(r.channels()),
            )
        })
        .ok_or_else(|| anyhow!("device reports no input configurations"))?;

    let covers =
        best.min_sample_rate().0 <= target_rate && target_rate <= best.max_sample_rate().0;
    let supported = if covers {
        best.with_sample_rate(SampleRate(target_rate))
    } else {
        warn!("device does not support {target_rate} Hz; using its maximum rate");
        best.with_max_sample_rate()
    };
    Ok((supported.config(), supported.sample_format()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_block_advances_cursor() {
        let mut buffer = vec![0.0f32; 10];
        let cursor = write_block(&mut buffer, 0, &[1.0, 2.0, 3.0]);
        assert_eq!(cursor, 3);
        let cursor = write_block(&mut buffer, cursor, &[4.0, 5.0]);
        assert_eq!(cursor, 5);
        assert_eq!(&buffer[..5], &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_write_block_drops_overflow() {
        let mut buffer = vec![0.0f32; 4];
        let cursor = write_block(&mut buffer, 2, &[7.0, 8.0, 9.0, 10.0]);
        assert_eq!(cursor, 4);
        assert_eq!(buffer, vec![0.0, 0.0, 7.0, 8.0]);
        // Fully written buffer ignores further blocks
        let cursor = write_block(&mut buffer, cursor, &[11.0]);
        assert_eq!(cursor, 4);
        assert_eq!(buffer, vec![0.0, 0.0, 7.0, 8.0]);
    }

    #[test]
    fn test_write_block_never_touches_written_region() {
        let mut buffer = vec![1.0f32; 8];
        write_block(&mut buffer, 4, &[2.0, 2.0]);
        assert_eq!(&buffer[..4], &[1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_meter_level_waits_for_full_window() {
        let buffer = vec![0.5f32; 100];
        assert_eq!(meter_level(&buffer, 10, 50), -METER_RANGE_DB);
        let level = meter_level(&buffer, 100, 50);
        // 0.5 amplitude DC block: 20*log10(0.5) = -6.02
        assert!((level - (-6.02)).abs() < 0.1, "got {level}");
    }
}
