//! # Silence-Adjusted Segmenter
//!
//! Корректирует начало каждого распознанного предложения по ведущей тишине
//! в его аудиоклипе. Клип сканируется кусками фиксированной длины в пределах
//! окна просмотра; первый кусок громче порога содержит первый озвученный семпл.
//!
//! Если речь в окне не найдена, смещение равно нулю.

use log::{debug, info};

use crate::audio::format::{compute_rms, db_to_amplitude, to_dbfs, Waveform};
use crate::config::EngineConfig;
use crate::error::{DubSyncError, Result};
use crate::timeline::validate_slots;
use crate::types::{secs_to_samples, samples_to_secs, RecognizedSentence, TimeSlot};

/// Детектор ведущей тишины
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceDetector {
    /// Порог в dBFS
    pub threshold_db: f32,
    /// Длина куска в миллисекундах
    pub chunk_ms: u32,
    /// Окно просмотра в секундах
    pub lookahead_secs: f64,
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for SilenceDetector {
    fn from(config: &EngineConfig) -> Self {
        Self {
            threshold_db: config.silence_threshold_db,
            chunk_ms: config.silence_chunk_ms,
            lookahead_secs: config.silence_lookahead_secs,
        }
    }
}

impl SilenceDetector {
    /// Индекс первого семпла, превышающего порог, в пределах окна просмотра
    pub fn first_voiced_sample(&self, clip: &Waveform) -> Option<usize> {
        if clip.is_empty() || clip.sample_rate == 0 {
            return None;
        }

        let window = secs_to_samples(self.lookahead_secs, clip.sample_rate).min(clip.len());
        let chunk = secs_to_samples(self.chunk_ms as f64 / 1000.0, clip.sample_rate).max(1);
        let amplitude = db_to_amplitude(self.threshold_db);

        let mut chunk_start = 0;
        while chunk_start < window {
            let chunk_end = (chunk_start + chunk).min(window);
            let samples = &clip.samples[chunk_start..chunk_end];
            if to_dbfs(compute_rms(samples)) > self.threshold_db {
                let offset = samples
                    .iter()
                    .position(|s| s.abs() > amplitude)
                    .unwrap_or(0);
                return Some(chunk_start + offset);
            }
            chunk_start = chunk_end;
        }
        None
    }

    /// Длительность ведущей тишины в секундах (0, если речь не найдена)
    pub fn leading_silence(&self, clip: &Waveform) -> f64 {
        self.first_voiced_sample(clip)
            .map(|sample| samples_to_secs(sample, clip.sample_rate))
            .unwrap_or(0.0)
    }
}

/// Строит слоты из распознанных предложений с поправкой на тишину
#[derive(Debug, Clone, Default)]
pub struct SilenceAdjustedSegmenter {
    detector: SilenceDetector,
}

impl SilenceAdjustedSegmenter {
    pub fn new(detector: SilenceDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &SilenceDetector {
        &self.detector
    }

    /// Вырезает клип каждого предложения из исходной дорожки и корректирует слоты
    pub fn segment(&self, sentences: &[RecognizedSentence], source: &Waveform) -> Result<Vec<TimeSlot>> {
        let clips: Vec<Waveform> = sentences
            .iter()
            .map(|sentence| source.slice(sentence.start, sentence.end))
            .collect();
        self.segment_clips(sentences, &clips)
    }

    /// Корректирует слоты по заранее нарезанным клипам (по одному на предложение)
    pub fn segment_clips(&self, sentences: &[RecognizedSentence], clips: &[Waveform]) -> Result<Vec<TimeSlot>> {
        if sentences.len() != clips.len() {
            return Err(DubSyncError::MalformedTimeline(format!(
                "{} sentences but {} audio clips",
                sentences.len(),
                clips.len()
            )));
        }

        let slots = sentences
            .iter()
            .zip(clips)
            .enumerate()
            .map(|(index, (sentence, clip))| self.adjust(index, sentence, clip))
            .collect::<Result<Vec<_>>>()?;

        validate_slots(&slots)?;
        info!("Segmented {} slots", slots.len());
        Ok(slots)
    }

    fn adjust(&self, index: usize, sentence: &RecognizedSentence, clip: &Waveform) -> Result<TimeSlot> {
        if !(sentence.start.is_finite() && sentence.end.is_finite()) || sentence.end <= sentence.start {
            return Err(DubSyncError::MalformedTimeline(format!(
                "Sentence {} has invalid bounds [{}, {}]",
                index, sentence.start, sentence.end
            )));
        }

        let offset = self.detector.leading_silence(clip).min(clip.duration());
        let one_sample = 1.0 / clip.sample_rate.max(1) as f64;
        let latest_start = (sentence.end - one_sample).max(sentence.start);
        let start = (sentence.start + offset).min(latest_start);

        if offset > 0.0 {
            debug!(
                "Slot {}: leading silence {:.3}s, start {:.3} -> {:.3}",
                index, offset, sentence.start, start
            );
        }

        Ok(TimeSlot {
            index,
            start,
            end: sentence.end,
        })
    }
}
