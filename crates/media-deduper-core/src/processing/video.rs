//! Video support through the ffmpeg/ffprobe command line tools
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;
use std::io;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use crate::error::{Error, Result};

/// Duration and dimensions of the first video stream
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoProbe {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    // ffprobe prints durations as strings
    duration: Option<String>,
}

/// Check that the ffmpeg binary can be executed
pub fn ensure_ffmpeg_available(ffmpeg: &Path) -> Result<()> {
    let out = run(Command::new(ffmpeg).arg("-version"), ffmpeg)?;
    if !out.status.success() {
        return Err(Error::FfmpegUnavailable(format!(
            "{} returned non-zero on -version",
            ffmpeg.display()
        )));
    }
    Ok(())
}

/// Read duration and dimensions with ffprobe
pub fn probe(ffprobe: &Path, video: &Path) -> Result<VideoProbe> {
    let out = run(
        Command::new(ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height:format=duration")
            .arg("-of")
            .arg("json")
            .arg(video),
        ffprobe,
    )?;

    if !out.status.success() {
        return Err(Error::decode(video, stderr_text(&out)));
    }

    parse_probe(&out.stdout).map_err(|e| Error::decode(video, e))
}

fn parse_probe(stdout: &[u8]) -> core::result::Result<VideoProbe, serde_json::Error> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout)?;
    let stream = parsed.streams.first();

    Ok(VideoProbe {
        width: stream.and_then(|s| s.width),
        height: stream.and_then(|s| s.height),
        duration_secs: parsed
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0),
    })
}

/// Read the duration from the banner `ffmpeg -i` prints.
///
/// Used when ffprobe is missing or reports nothing. ffmpeg exits non-zero
/// without an output file, so only the stderr text matters.
pub fn ffmpeg_duration(ffmpeg: &Path, video: &Path) -> Result<Option<f64>> {
    let out = run(
        Command::new(ffmpeg)
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-i")
            .arg(video),
        ffmpeg,
    )?;
    Ok(parse_duration_banner(&String::from_utf8_lossy(&out.stderr)))
}

/// `Duration: HH:MM:SS.ss,` from ffmpeg's input summary
fn parse_duration_banner(stderr: &str) -> Option<f64> {
    let rest = stderr.split("Duration:").nth(1)?;
    let stamp = rest.split(',').next()?.trim();

    let mut parts = stamp.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total.is_finite() && total >= 0.0).then_some(total)
}

/// Seek offset for a frame at `position` (0.0..=1.0) of the duration.
///
/// Seeking to the exact end yields no frame, so the offset stays a little
/// before it.
pub fn seek_offset(duration_secs: Option<f64>, position: f64) -> f64 {
    match duration_secs {
        Some(duration) if duration > 0.0 => {
            let latest = (duration - 0.1).max(0.0);
            (duration * position).min(latest)
        }
        _ => 0.0,
    }
}

/// Decode exactly one frame at `offset_secs` as an image
pub fn extract_frame(ffmpeg: &Path, video: &Path, offset_secs: f64) -> Result<DynamicImage> {
    let out = run(
        Command::new(ffmpeg)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-nostdin")
            .arg("-ss")
            .arg(format!("{:.3}", offset_secs))
            .arg("-i")
            .arg(video)
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("png")
            .arg("pipe:1"),
        ffmpeg,
    )?;

    if !out.status.success() {
        return Err(Error::decode(video, stderr_text(&out)));
    }
    if out.stdout.is_empty() {
        return Err(Error::decode(
            video,
            format!("no frame at {:.3}s", offset_secs),
        ));
    }

    image::load_from_memory_with_format(&out.stdout, ImageFormat::Png)
        .map_err(|e| Error::decode(video, e))
}

fn run(command: &mut Command, program: &Path) -> Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                Error::FfmpegUnavailable(format!("{}: {}", program.display(), e))
            }
            _ => Error::Io(e),
        })
}

fn stderr_text(out: &Output) -> String {
    let text = String::from_utf8_lossy(&out.stderr).trim().to_string();
    if text.is_empty() {
        format!("exited with {}", out.status)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_reads_stream_and_duration() {
        let json = br#"{
            "programs": [],
            "streams": [{ "width": 1920, "height": 1080 }],
            "format": { "duration": "12.480000" }
        }"#;

        let probe = parse_probe(json).unwrap();
        assert_eq!(probe.width, Some(1920));
        assert_eq!(probe.height, Some(1080));
        assert_eq!(probe.duration_secs, Some(12.48));
    }

    #[test]
    fn test_parse_probe_tolerates_missing_fields() {
        let probe = parse_probe(br#"{ "streams": [] }"#).unwrap();
        assert_eq!(probe, VideoProbe::default());

        let probe = parse_probe(br#"{ "format": { "duration": "N/A" } }"#).unwrap();
        assert_eq!(probe.duration_secs, None);
    }

    #[test]
    fn test_parse_duration_banner() {
        let stderr = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':\n  \
                      Duration: 00:01:02.50, start: 0.000000, bitrate: 812 kb/s\n\
                      At least one output file must be specified\n";
        assert_eq!(parse_duration_banner(stderr), Some(62.5));
        assert_eq!(
            parse_duration_banner("  Duration: N/A, start: 0.000000, bitrate: N/A"),
            None
        );
        assert_eq!(parse_duration_banner("clip.mp4: Invalid data found"), None);
    }

    #[test]
    fn test_seek_offset() {
        assert_eq!(seek_offset(Some(10.0), 0.5), 5.0);
        assert_eq!(seek_offset(Some(10.0), 0.0), 0.0);
        assert!((seek_offset(Some(10.0), 1.0) - 9.9).abs() < 1e-9);
        assert_eq!(seek_offset(None, 0.5), 0.0);
        assert_eq!(seek_offset(Some(0.05), 0.5), 0.0);
    }

    #[test]
    fn test_missing_binary_is_reported_as_unavailable() {
        let missing = Path::new("/nonexistent/bin/ffmpeg-for-tests");
        assert!(matches!(
            ensure_ffmpeg_available(missing),
            Err(Error::FfmpegUnavailable(_))
        ));
        assert!(matches!(
            extract_frame(missing, Path::new("clip.mp4"), 0.0),
            Err(Error::FfmpegUnavailable(_))
        ));
    }
}
