//! # Duration Matcher
//!
//! Приводит длительность синтезированного клипа к длительности слота.
//!
//! - Требуемый коэффициент `ratio = clip / target` (>1: клип надо ускорить)
//! - Если коэффициент вне `[min_ratio, max_ratio]`, применяется ближайшая граница
//!   и клип помечается `clamped`: расхождение попадает в отчет, а не скрывается
//! - Незначительные поправки (`|ratio - 1| < tolerance_ratio` и ошибка в пределах ε)
//!   пропускаются: клип вставляется как есть

use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::audio::stretch::{TimeStretcher, WsolaStretcher};
use crate::config::EngineConfig;
use crate::error::{DubSyncError, Result};
use crate::types::{AdjustedClip, SynthesizedClip};

/// Границы и допуски согласования длительности
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchBounds {
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub tolerance_ratio: f64,
    pub epsilon_secs: f64,
}

impl Default for MatchBounds {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MatchBounds {
    fn from(config: &EngineConfig) -> Self {
        Self {
            min_ratio: config.min_ratio,
            max_ratio: config.max_ratio,
            tolerance_ratio: config.tolerance_ratio,
            epsilon_secs: config.epsilon_secs,
        }
    }
}

/// Согласует клипы со слотами с помощью подключаемого алгоритма растяжения
#[derive(Clone)]
pub struct DurationMatcher {
    bounds: MatchBounds,
    stretcher: Arc<dyn TimeStretcher>,
}

impl DurationMatcher {
    pub fn new(bounds: MatchBounds) -> Self {
        Self::with_stretcher(bounds, Arc::new(WsolaStretcher::default()))
    }

    pub fn with_stretcher(bounds: MatchBounds, stretcher: Arc<dyn TimeStretcher>) -> Self {
        Self { bounds, stretcher }
    }

    pub fn bounds(&self) -> &MatchBounds {
        &self.bounds
    }

    /// Согласует один клип с целевой длительностью
    ///
    /// # Аргументы
    ///
    /// * `clip` - Синтезированный клип слота
    /// * `target_duration` - Длительность слота в секундах
    ///
    /// # Возвращает
    ///
    /// Клип длиной `round(len / applied_ratio)` семплов. Коэффициент вне
    /// `[min_ratio, max_ratio]` ограничивается границей и клип помечается `clamped`;
    /// клип в пределах допуска возвращается без изменений (`passthrough`).
    ///
    /// # Ошибки
    ///
    /// * `MalformedTimeline` - целевая длительность не положительна или не конечна
    /// * `TimeStretching` - ошибка растяжения
    pub fn match_clip(&self, clip: &SynthesizedClip, target_duration: f64) -> Result<AdjustedClip> {
        if !(target_duration.is_finite() && target_duration > 0.0) {
            return Err(DubSyncError::MalformedTimeline(format!(
                "Slot {} has invalid target duration {}",
                clip.slot_index, target_duration
            )));
        }

        if clip.samples.is_empty() {
            warn!("Slot {}: synthesized clip is empty, nothing to stretch", clip.slot_index);
            return Ok(passthrough(clip));
        }

        let natural_ratio = clip.duration() / target_duration;
        let bounds = &self.bounds;

        // Клип за границами всегда `clamped`, даже в пределах допуска
        let clamped = natural_ratio < bounds.min_ratio || natural_ratio > bounds.max_ratio;

        if !clamped
            && (natural_ratio - 1.0).abs() < bounds.tolerance_ratio
            && (clip.duration() - target_duration).abs() <= bounds.epsilon_secs
        {
            debug!(
                "Slot {}: ratio {:.3} within tolerance, passing through",
                clip.slot_index, natural_ratio
            );
            return Ok(passthrough(clip));
        }

        let applied_ratio = natural_ratio.clamp(bounds.min_ratio, bounds.max_ratio);
        if clamped {
            warn!(
                "Slot {}: required ratio {:.3} outside [{:.2}, {:.2}], clamped to {:.3}",
                clip.slot_index, natural_ratio, bounds.min_ratio, bounds.max_ratio, applied_ratio
            );
        }

        let output_len = ((clip.samples.len() as f64 / applied_ratio).round() as usize).max(1);
        let samples = self
            .stretcher
            .stretch(&clip.samples, clip.sample_rate, applied_ratio, output_len)?;

        let adjusted = AdjustedClip {
            slot_index: clip.slot_index,
            samples,
            sample_rate: clip.sample_rate,
            applied_ratio,
            clamped,
            passthrough: false,
        };

        debug!(
            "Slot {}: {:.3}s -> target {:.3}s -> achieved {:.3}s ({}, ratio {:.3})",
            clip.slot_index,
            clip.duration(),
            target_duration,
            adjusted.achieved_duration(),
            self.stretcher.name(),
            applied_ratio
        );
        Ok(adjusted)
    }

    /// Согласует набор независимых клипов параллельно (CPU-bound).
    ///
    /// Порядок результатов совпадает с порядком входа; ошибка одного клипа
    /// не влияет на остальные.
    pub fn match_all(&self, jobs: &[(SynthesizedClip, f64)]) -> Vec<Result<AdjustedClip>> {
        info!("Matching {} clips on {} threads", jobs.len(), rayon::current_num_threads());
        jobs.par_iter()
            .map(|(clip, target)| self.match_clip(clip, *target))
            .collect()
    }
}

fn passthrough(clip: &SynthesizedClip) -> AdjustedClip {
    AdjustedClip {
        slot_index: clip.slot_index,
        samples: clip.samples.clone(),
        sample_rate: clip.sample_rate,
        applied_ratio: 1.0,
        clamped: false,
        passthrough: true,
    }
}
