//! External playback and source clip preparation
//!
//! Plays reference audio through the system speakers as a separate child
//! process, discovers and prepares source clips with ffmpeg, and falls back
//! to a synthesized chord progression when no music file is available.

use hound::{SampleFormat, WavSpec, WavWriter};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Player binaries tried in order; the first one on PATH wins.
const PLAYER_CANDIDATES: [&str; 3] = ["ffplay", "aplay", "afplay"];

/// How long a terminated player gets to exit before being killed.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Source files smaller than this are skipped during discovery.
const MIN_SOURCE_SIZE: u64 = 5_000_000;

const SOURCE_EXTENSIONS: [&str; 4] = ["opus", "wav", "m4a", "mp3"];
const MUSIC_EXTENSIONS: [&str; 6] = ["mp3", "m4a", "wav", "flac", "aac", "ogg"];

/// Playback error types
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("no audio player found (tried {0})")]
    PlayerNotFound(String),
    #[error("ffmpeg not found on PATH")]
    FfmpegMissing,
    #[error("ffmpeg conversion failed: {0}")]
    ConversionFailed(String),
    #[error("playback I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to a running playback child.
///
/// Dropping the guard stops playback: terminate, wait out a bounded grace
/// period, then kill. Every phase exit path, including unwinds, goes
/// through this.
pub struct PlaybackGuard {
    child: Option<Child>,
}

impl PlaybackGuard {
    pub fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }

        #[cfg(unix)]
        {
            // SIGTERM first so the player can release the output device
            let _ = Command::new("kill").arg(child.id().to_string()).status();
            let deadline = Instant::now() + STOP_GRACE;
            while Instant::now() < deadline {
                if matches!(child.try_wait(), Ok(Some(_))) {
                    return;
                }
                thread::sleep(Duration::from_millis(50));
            }
        }

        let _ = child.kill();
        let _ = child.wait();
    }
}

impl Drop for PlaybackGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

fn find_player() -> Result<PathBuf, PlaybackError> {
    for candidate in PLAYER_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            return Ok(path);
        }
    }
    Err(PlaybackError::PlayerNotFound(PLAYER_CANDIDATES.join(", ")))
}

/// Start playing a WAV through the system speakers.
pub fn play_wav(wav_path: &Path) -> Result<PlaybackGuard, PlaybackError> {
    let player = find_player()?;
    let mut cmd = Command::new(&player);
    match player.file_stem().and_then(|s| s.to_str()) {
        Some("ffplay") => {
            cmd.args(["-nodisp", "-autoexit", "-loglevel", "quiet"]).arg(wav_path);
        }
        Some("aplay") => {
            cmd.arg("-q").arg(wav_path);
        }
        _ => {
            cmd.arg(wav_path);
        }
    }
    debug!("starting playback: {:?}", cmd);
    let child = cmd.stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;
    Ok(PlaybackGuard { child: Some(child) })
}

fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}

/// Extract a playable mono 44.1 kHz WAV segment from an audio file.
pub fn convert_to_wav(
    input: &Path,
    offset_secs: Option<u32>,
    duration_secs: Option<u32>,
) -> Result<PathBuf, PlaybackError> {
    if !ffmpeg_available() {
        return Err(PlaybackError::FfmpegMissing);
    }
    let output = std::env::temp_dir().join("calibration_source.wav");

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y");
    if let Some(offset) = offset_secs {
        cmd.args(["-ss", &offset.to_string()]);
    }
    cmd.arg("-i").arg(input);
    if let Some(duration) = duration_secs {
        cmd.args(["-t", &duration.to_string()]);
    }
    cmd.args(["-ar", "44100", "-ac", "1"]).arg(&output);

    let result = cmd.output()?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        let tail: String = stderr.chars().take(500).collect();
        return Err(PlaybackError::ConversionFailed(tail));
    }
    Ok(output)
}

/// Discover candidate source files under `dir`: known audio extensions,
/// above the size floor, newest first.
pub fn find_source_files(dir: &Path, limit: usize) -> Vec<PathBuf> {
    let mut found = collect_audio_files(dir, &SOURCE_EXTENSIONS);
    found.retain(|(_, size, _)| *size > MIN_SOURCE_SIZE);
    found.sort_by(|a, b| b.2.cmp(&a.2));
    found.into_iter().take(limit).map(|(p, _, _)| p).collect()
}

fn collect_audio_files(dir: &Path, extensions: &[&str]) -> Vec<(PathBuf, u64, std::time::SystemTime)> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(collect_audio_files(&path, extensions));
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            let mtime = meta.modified().unwrap_or(std::time::UNIX_EPOCH);
            out.push((path, meta.len(), mtime));
        }
    }
    out
}

/// Prepare the reference clip for playback phases.
///
/// Uses the preferred file when given and present, otherwise the newest
/// discovered file under `search_dir`. Returns None (with a warning) when
/// nothing can be prepared; phases then degrade to room-audio-only.
pub fn prepare_source_clip(
    preferred: Option<&Path>,
    search_dir: Option<&Path>,
    offset_secs: u32,
) -> Option<PathBuf> {
    let source = match preferred {
        Some(path) if path.is_file() => path.to_path_buf(),
        Some(path) => {
            warn!("preferred source {} not found", path.display());
            search_dir.and_then(|dir| find_source_files(dir, 1).into_iter().next())?
        }
        None => search_dir.and_then(|dir| find_source_files(dir, 1).into_iter().next())?,
    };

    // A WAV needs no conversion unless we are skipping into it
    if offset_secs == 0 && source.extension().and_then(|e| e.to_str()) == Some("wav") {
        return Some(source);
    }

    match convert_to_wav(&source, Some(offset_secs), None) {
        Ok(wav) => {
            info!("prepared source clip from {}", source.display());
            Some(wav)
        }
        Err(e) => {
            warn!("could not prepare source clip: {e}");
            None
        }
    }
}

/// Find a music file for the interference phase: largest match in
/// `~/Music`, else a synthesized progression.
pub fn music_source() -> Result<PathBuf, PlaybackError> {
    if let Some(found) = find_music_file() {
        return Ok(found);
    }
    let path = std::env::temp_dir().join("calibration_music.wav");
    generate_synthetic_music(&path, 32.0, 44_100)?;
    Ok(path)
}

fn find_music_file() -> Option<PathBuf> {
    let home = directories::BaseDirs::new()?.home_dir().join("Music");
    let mut found = collect_audio_files(&home, &MUSIC_EXTENSIONS);
    // Largest file is most likely a real song
    found.sort_by(|a, b| b.1.cmp(&a.1));
    found.into_iter().next().map(|(p, _, _)| p)
}

/// Synthesize a C-F-G-Am sine-chord progression.
///
/// Two seconds per chord with a 50 ms attack/release envelope, looped to
/// fill `duration`, peak-normalized to 0.8.
pub fn generate_synthetic_music(
    output: &Path,
    duration: f64,
    sample_rate: u32,
) -> Result<(), PlaybackError> {
    // Root + third + fifth per chord
    const CHORDS: [[f64; 3]; 4] = [
        [261.63, 329.63, 392.00], // C4 E4 G4
        [349.23, 440.00, 523.25], // F4 A4 C5
        [392.00, 493.88, 587.33], // G4 B4 D5
        [440.00, 523.25, 659.25], // A4 C5 E5
    ];
    const CHORD_SECS: f64 = 2.0;

    let sr = sample_rate as f64;
    let total = (duration * sr) as usize;
    let chord_len = (CHORD_SECS * sr) as usize;
    let ramp = (0.05 * sr) as usize;

    let mut signal = vec![0.0f64; total];
    let mut written = 0usize;
    let mut chord_idx = 0usize;
    while written < total {
        let freqs = CHORDS[chord_idx % CHORDS.len()];
        let take = chord_len.min(total - written);
        for i in 0..take {
            let t = i as f64 / sr;
            let mut sample = 0.0;
            for freq in freqs {
                sample += 0.3 * (2.0 * std::f64::consts::PI * freq * t).sin();
            }
            // Envelope avoids clicks at chord boundaries
            let env = if i < ramp {
                i as f64 / ramp as f64
            } else if i >= chord_len.saturating_sub(ramp) {
                (chord_len - i) as f64 / ramp as f64
            } else {
                1.0
            };
            signal[written + i] = sample * env;
        }
        written += take;
        chord_idx += 1;
    }

    let peak = signal.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        for s in signal.iter_mut() {
            *s = *s / peak * 0.8;
        }
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output, spec).map_err(|e| {
        PlaybackError::Io(std::io::Error::other(e))
    })?;
    for s in &signal {
        writer
            .write_sample((s * i16::MAX as f64) as i16)
            .map_err(|e| PlaybackError::Io(std::io::Error::other(e)))?;
    }
    writer
        .finalize()
        .map_err(|e| PlaybackError::Io(std::io::Error::other(e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_music_duration_and_peak() {
        let dir = std::env::temp_dir().join("miccal_test_music");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("progression.wav");
        generate_synthetic_music(&path, 5.0, 8000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 8000);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 5 * 8000);

        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        // Normalized to 0.8 full scale
        let expected = (0.8 * i16::MAX as f64) as u16;
        assert!(peak <= expected + 1 && peak > expected - 200, "peak {peak}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_find_source_files_filters_small_and_sorts() {
        let dir = std::env::temp_dir().join("miccal_test_sources");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("small.opus"), vec![0u8; 16]).unwrap();
        let found = find_source_files(&dir, 10);
        assert!(found.is_empty(), "size floor should drop tiny files");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_guard_noop_without_child() {
        let mut guard = PlaybackGuard { child: None };
        guard.stop();
        guard.stop();
    }
}
