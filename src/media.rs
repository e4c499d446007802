//! Работа с медиаконтейнером видео через ffmpeg/ffprobe
//!
//! Движку нужно три операции: узнать длительность видео, извлечь звуковую
//! дорожку и заменить ее итоговой, не перекодируя видеопоток.

use std::path::Path;

use async_trait::async_trait;
use log::{debug, info};
use tokio::process::Command;

use crate::error::{DubSyncError, Result};

/// Медиаконтейнер исходного видео
#[async_trait]
pub trait MediaContainer: Send + Sync {
    /// Длительность видео в секундах
    async fn probe_duration(&self, video: &Path) -> Result<f64>;

    /// Извлекает звук в моно WAV с заданной частотой
    async fn extract_audio(&self, video: &Path, output: &Path, sample_rate: u32) -> Result<()>;

    /// Копирует видеопоток и подставляет новую звуковую дорожку
    async fn replace_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// Реализация на внешних `ffmpeg` и `ffprobe`
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegMedia {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfmpegMedia {
    /// Использовать бинарники по указанным путям
    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Проверка наличия FFmpeg
    pub async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<String> {
        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program).args(args).output().await.map_err(|e| {
            DubSyncError::MediaTool(format!("Failed to start {}: {}", program, e))
        })?;

        if !output.status.success() {
            return Err(DubSyncError::MediaTool(format!(
                "{} failed with status {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl MediaContainer for FfmpegMedia {
    async fn probe_duration(&self, video: &Path) -> Result<f64> {
        let stdout = self.run(&self.ffprobe, &probe_duration_args(video)).await?;
        parse_duration(&stdout)
    }

    async fn extract_audio(&self, video: &Path, output: &Path, sample_rate: u32) -> Result<()> {
        self.run(&self.ffmpeg, &extract_audio_args(video, output, sample_rate))
            .await?;
        info!("Extracted audio from {} to {}", video.display(), output.display());
        Ok(())
    }

    async fn replace_audio(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        self.run(&self.ffmpeg, &replace_audio_args(video, audio, output))
            .await?;
        info!("Dubbed video written to {}", output.display());
        Ok(())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn probe_duration_args(video: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-show_entries".into(),
        "format=duration".into(),
        "-of".into(),
        "default=noprint_wrappers=1:nokey=1".into(),
        path_arg(video),
    ]
}

fn extract_audio_args(video: &Path, output: &Path, sample_rate: u32) -> Vec<String> {
    vec![
        "-i".into(),
        path_arg(video),
        "-vn".into(),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        sample_rate.to_string(),
        "-c:a".into(),
        "pcm_f32le".into(),
        "-y".into(),
        path_arg(output),
    ]
}

fn replace_audio_args(video: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-i".into(),
        path_arg(video),
        "-i".into(),
        path_arg(audio),
        "-map".into(),
        "0:v".into(), // видео из первого входа
        "-map".into(),
        "1:a".into(), // звук из второго
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-y".into(),
        path_arg(output),
    ]
}

fn parse_duration(stdout: &str) -> Result<f64> {
    let duration = stdout.trim().parse::<f64>().map_err(|_| {
        DubSyncError::MediaTool(format!("Failed to parse duration: {:?}", stdout.trim()))
    })?;
    if !(duration.is_finite() && duration > 0.0) {
        return Err(DubSyncError::AssemblyBoundary(format!(
            "Video reports non-positive duration {}",
            duration
        )));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_audio_copies_video_stream() {
        let args = replace_audio_args(Path::new("in.mp4"), Path::new("track.wav"), Path::new("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-map 0:v -map 1:a -c:v copy -c:a aac"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_extract_audio_is_mono_at_rate() {
        let args = extract_audio_args(Path::new("in.mp4"), Path::new("a.wav"), 44100);
        let joined = args.join(" ");
        assert!(joined.contains("-vn -ac 1 -ar 44100"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("12.480000\n").unwrap(), 12.48);
        assert!(matches!(parse_duration("N/A"), Err(DubSyncError::MediaTool(_))));
        assert!(matches!(parse_duration("0.0"), Err(DubSyncError::AssemblyBoundary(_))));
    }

    #[tokio::test]
    async fn test_missing_binary_is_media_error() {
        let media = FfmpegMedia::with_binaries("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(!media.is_available().await);
        let result = media.probe_duration(Path::new("video.mp4")).await;
        assert!(matches!(result, Err(DubSyncError::MediaTool(_))));
    }
}
