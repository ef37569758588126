//! Joining synthesized segments into one MP3 file using FFmpeg.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Default silence between consecutive segments.
pub const DEFAULT_PAUSE_MS: u64 = 500;

/// How the final audio file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyMode {
    /// One segment, written as is
    Single,
    /// Re-encoded by FFmpeg with silence between segments
    Ffmpeg,
    /// Bytes appended without silence or re-encoding (FFmpeg unavailable or failing)
    RawConcat,
}

/// Concatenates segment audio with a fixed pause.
#[derive(Debug, Clone)]
pub struct AudioAssembler {
    ffmpeg: String,
    pause_ms: u64,
}

impl AudioAssembler {
    pub fn new(ffmpeg: impl Into<String>, pause_ms: u64) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            pause_ms,
        }
    }

    fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        cmd
    }

    /// Check if FFmpeg can be run.
    pub fn is_ffmpeg_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Write `parts` to `output` in order, silence between consecutive parts
    /// and none after the last.
    pub fn assemble(&self, parts: &[Vec<u8>], output: &Path) -> Result<AssemblyMode> {
        match parts {
            [] => anyhow::bail!("No audio segments provided"),
            [single] => {
                std::fs::write(output, single)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                return Ok(AssemblyMode::Single);
            }
            _ => {}
        }

        if self.is_ffmpeg_available() {
            match self.concat_with_silence(parts, output) {
                Ok(()) => return Ok(AssemblyMode::Ffmpeg),
                Err(e) => log::warn!("ffmpeg concatenation failed: {:#}", e),
            }
        } else {
            log::warn!("{} not found", self.ffmpeg);
        }

        log::warn!(
            "Degraded audio assembly: raw byte concatenation of {} segments, no pauses",
            parts.len()
        );
        raw_concat(parts, output)?;
        Ok(AssemblyMode::RawConcat)
    }

    fn concat_with_silence(&self, parts: &[Vec<u8>], output: &Path) -> Result<()> {
        let temp_dir = TempDir::new()?;

        let silence = temp_dir.path().join("silence.mp3");
        let status = self
            .ffmpeg_command()
            .args(["-y", "-f", "lavfi", "-i", "anullsrc=r=24000:cl=mono", "-t"])
            .arg(format!("{:.3}", self.pause_ms as f64 / 1000.0))
            .args(["-c:a", "libmp3lame", "-q:a", "4"])
            .arg(&silence)
            .output()
            .context("Failed to run ffmpeg silence generation")?;
        if !status.status.success() {
            anyhow::bail!(
                "ffmpeg silence generation failed: {}",
                String::from_utf8_lossy(&status.stderr)
            );
        }

        let mut list_content = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 && self.pause_ms > 0 {
                list_content.push_str(&concat_entry(&silence));
            }
            let segment = temp_dir.path().join(format!("segment_{:03}.mp3", i));
            std::fs::write(&segment, part)?;
            list_content.push_str(&concat_entry(&segment));
        }
        let list_file = temp_dir.path().join("concat_list.txt");
        std::fs::write(&list_file, &list_content)?;

        let out = self
            .ffmpeg_command()
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_file)
            .args(["-c:a", "libmp3lame", "-b:a", "128k"])
            .arg(output)
            .output()
            .context("Failed to run ffmpeg concat")?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            anyhow::bail!("ffmpeg concat failed: {}", stderr);
        }

        Ok(())
    }
}

impl Default for AudioAssembler {
    fn default() -> Self {
        Self::new("ffmpeg", DEFAULT_PAUSE_MS)
    }
}

fn concat_entry(path: &Path) -> String {
    // Escape single quotes in path
    let path_str = path.to_string_lossy().replace('\'', "'\\''");
    format!("file '{}'\n", path_str)
}

fn raw_concat(parts: &[Vec<u8>], output: &Path) -> Result<()> {
    let bytes: Vec<u8> = parts.concat();
    std::fs::write(output, bytes)
        .with_context(|| format!("Failed to write {}", output.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_segments_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = AudioAssembler::default();
        assert!(assembler.assemble(&[], &dir.path().join("out.mp3")).is_err());
    }

    #[test]
    fn test_single_segment_written_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp3");
        let mode = AudioAssembler::default()
            .assemble(&[b"ID3abc".to_vec()], &output)
            .unwrap();
        assert_eq!(mode, AssemblyMode::Single);
        assert_eq!(std::fs::read(&output).unwrap(), b"ID3abc");
    }

    #[test]
    fn test_raw_concat_without_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp3");
        let assembler = AudioAssembler::new("/nonexistent/ffmpeg", 500);
        assert!(!assembler.is_ffmpeg_available());

        let mode = assembler
            .assemble(&[b"one".to_vec(), b"two".to_vec(), b"three".to_vec()], &output)
            .unwrap();
        assert_eq!(mode, AssemblyMode::RawConcat);
        assert_eq!(std::fs::read(&output).unwrap(), b"onetwothree");
    }

    #[test]
    fn test_concat_entry_escapes_quotes() {
        assert_eq!(
            concat_entry(Path::new("/tmp/it's.mp3")),
            "file '/tmp/it'\\''s.mp3'\n"
        );
    }
}
