//! # Track Assembler
//!
//! Раскладывает согласованные клипы по смещениям слотов на общей шкале.
//!
//! - Промежутки до первого слота, между клипами и после последнего заполняются тишиной
//! - Клип, чей хвост залезает на начало следующего слота, обрезается на этой границе
//! - Длина дорожки ровно `total_duration`, хвост последнего клипа обрезается по ней
//! - Сборка однопроходная и детерминированная: одинаковый вход дает побайтно
//!   одинаковую дорожку

use std::path::Path;

use log::{debug, info, warn};

use crate::assembly::report::{SlotOutcome, SlotStatus, SyncReport};
use crate::audio::format::{apply_fade_out, encode_wav, Waveform};
use crate::config::{EngineConfig, OverlapPolicy};
use crate::error::{DubSyncError, Result};
use crate::timeline::validate_slots;
use crate::types::{samples_to_secs, secs_to_samples, AdjustedClip, TimeSlot, TranslatedSlot};

/// Звук, подготовленный для слота
#[derive(Debug, Clone, PartialEq)]
pub enum SlotAudio {
    /// Клип после согласования длительности
    Matched(AdjustedClip),
    /// Синтез или согласование не удались: слот будет заполнен тишиной
    Unavailable { reason: String },
}

/// Слот вместе с его звуком
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedSlot {
    pub slot: TranslatedSlot,
    pub audio: SlotAudio,
}

impl PlacedSlot {
    pub fn matched(slot: TranslatedSlot, clip: AdjustedClip) -> Self {
        Self { slot, audio: SlotAudio::Matched(clip) }
    }

    pub fn unavailable(slot: TranslatedSlot, reason: impl Into<String>) -> Self {
        Self {
            slot,
            audio: SlotAudio::Unavailable { reason: reason.into() },
        }
    }
}

/// Итоговая дорожка на всю длительность видео. После сборки не меняется.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterTrack {
    waveform: Waveform,
}

impl MasterTrack {
    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn samples(&self) -> &[f32] {
        &self.waveform.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.waveform.sample_rate
    }

    pub fn duration(&self) -> f64 {
        self.waveform.duration()
    }

    pub fn into_waveform(self) -> Waveform {
        self.waveform
    }

    pub fn save_wav<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        encode_wav(&self.waveform, path)
    }
}

/// Сборщик итоговой дорожки
#[derive(Debug, Clone)]
pub struct TrackAssembler {
    sample_rate: u32,
    overlap_policy: OverlapPolicy,
    fade_ms: u32,
}

impl TrackAssembler {
    pub fn new(sample_rate: u32, overlap_policy: OverlapPolicy, fade_ms: u32) -> Self {
        Self {
            sample_rate,
            overlap_policy,
            fade_ms,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sample_rate, config.overlap_policy, config.overlap_fade_ms)
    }

    /// Собирает дорожку и отчет
    ///
    /// # Аргументы
    ///
    /// * `slots` - Слоты в порядке возрастания `start`, с клипом или без него
    /// * `total_duration` - Длительность видео в секундах
    ///
    /// # Возвращает
    ///
    /// Дорожку ровно из `round(total_duration * sample_rate)` семплов и отчет
    /// с одной записью на слот в порядке слотов. Хвост клипа обрезается на начале
    /// следующего слота и на конце видео.
    ///
    /// # Ошибки
    ///
    /// * `AssemblyBoundary` - длительность видео не положительна
    /// * `MalformedTimeline` - слоты перекрываются, идут не по порядку или клип
    ///   относится к другому слоту
    /// * `AudioProcessing` - частота клипа не совпадает с частотой дорожки
    pub fn assemble(&self, slots: &[PlacedSlot], total_duration: f64) -> Result<(MasterTrack, SyncReport)> {
        if !(total_duration.is_finite() && total_duration > 0.0) {
            return Err(DubSyncError::AssemblyBoundary(format!(
                "Total duration must be positive, got {}",
                total_duration
            )));
        }
        let total_samples = secs_to_samples(total_duration, self.sample_rate);
        if total_samples == 0 {
            return Err(DubSyncError::AssemblyBoundary(format!(
                "Total duration {}s is shorter than one sample at {} Hz",
                total_duration, self.sample_rate
            )));
        }

        let time_slots: Vec<TimeSlot> = slots.iter().map(|p| p.slot.slot).collect();
        validate_slots(&time_slots)?;

        let mut track: Vec<f32> = Vec::with_capacity(total_samples);
        let mut report = SyncReport::new(total_duration, self.sample_rate);

        for (position, placed) in slots.iter().enumerate() {
            let slot = &placed.slot.slot;
            let start = secs_to_samples(slot.start, self.sample_rate);
            let next_start = time_slots
                .get(position + 1)
                .map(|next| secs_to_samples(next.start, self.sample_rate));
            let boundary = next_start.unwrap_or(total_samples).min(total_samples);

            let outcome = match &placed.audio {
                SlotAudio::Matched(clip) => {
                    self.check_clip(slot, clip)?;
                    self.place_clip(&mut track, placed, clip, start, boundary, next_start, total_samples)
                }
                SlotAudio::Unavailable { reason } => {
                    warn!("Slot {}: substituting silence ({})", slot.index, reason);
                    SlotOutcome {
                        slot_index: slot.index,
                        start: slot.start,
                        target_duration: placed.slot.target_duration,
                        achieved_duration: 0.0,
                        placed_duration: 0.0,
                        applied_ratio: 1.0,
                        clamped: false,
                        overlap_resolved: false,
                        truncated_at_end: false,
                        status: SlotStatus::SilenceSubstituted { reason: reason.clone() },
                    }
                }
            };
            report.slots.push(outcome);
        }

        // Тишина после последнего клипа до конца видео
        track.resize(total_samples, 0.0);

        let master = MasterTrack {
            waveform: Waveform::new(track, self.sample_rate),
        };
        info!(
            "Assembled master track: {:.3}s ({} samples at {} Hz), {} slots",
            master.duration(),
            total_samples,
            self.sample_rate,
            slots.len()
        );
        Ok((master, report))
    }

    fn check_clip(&self, slot: &TimeSlot, clip: &AdjustedClip) -> Result<()> {
        if clip.slot_index != slot.index {
            return Err(DubSyncError::MalformedTimeline(format!(
                "Clip for slot {} placed into slot {}",
                clip.slot_index, slot.index
            )));
        }
        if clip.sample_rate != self.sample_rate {
            return Err(DubSyncError::AudioProcessing(format!(
                "Clip for slot {} is {} Hz, track is {} Hz",
                clip.slot_index, clip.sample_rate, self.sample_rate
            )));
        }
        Ok(())
    }

    /// Дописывает тишину до начала слота и сам клип (не дальше `boundary`)
    #[allow(clippy::too_many_arguments)]
    fn place_clip(
        &self,
        track: &mut Vec<f32>,
        placed: &PlacedSlot,
        clip: &AdjustedClip,
        start: usize,
        boundary: usize,
        next_start: Option<usize>,
        total_samples: usize,
    ) -> SlotOutcome {
        let slot = &placed.slot.slot;
        let available = boundary.saturating_sub(start);
        let written = clip.samples.len().min(available);
        let cut = written < clip.samples.len();
        let overlap_resolved = cut && next_start.map_or(false, |next| next <= total_samples && boundary == next);
        let truncated_at_end = cut && !overlap_resolved;

        if start < total_samples {
            if track.len() < start {
                track.resize(start, 0.0);
            }
            if overlap_resolved && self.overlap_policy == OverlapPolicy::TruncateWithFade {
                let mut tail = clip.samples[..written].to_vec();
                apply_fade_out(&mut tail, self.fade_ms, self.sample_rate);
                track.extend_from_slice(&tail);
            } else {
                track.extend_from_slice(&clip.samples[..written]);
            }
        }

        if overlap_resolved {
            debug!(
                "Slot {}: clip of {:.3}s truncated to {:.3}s at next slot start",
                slot.index,
                clip.achieved_duration(),
                samples_to_secs(written, self.sample_rate)
            );
        }
        if truncated_at_end {
            debug!("Slot {}: clip truncated at the end of the video", slot.index);
        }

        let status = if clip.clamped {
            SlotStatus::Clamped
        } else if clip.passthrough {
            SlotStatus::Passthrough
        } else {
            SlotStatus::Matched
        };

        SlotOutcome {
            slot_index: slot.index,
            start: slot.start,
            target_duration: placed.slot.target_duration,
            achieved_duration: clip.achieved_duration(),
            placed_duration: samples_to_secs(written, self.sample_rate),
            applied_ratio: clip.applied_ratio,
            clamped: clip.clamped,
            overlap_resolved,
            truncated_at_end,
            status,
        }
    }
}
