//! # Sync Report
//!
//! Итог по каждому слоту: достигнутая длительность, примененный коэффициент,
//! обрезка и замена тишиной. Отчет сохраняется рядом с дорожкой для ручной проверки.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Что произошло со слотом
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotStatus {
    /// Клип растянут точно под слот
    Matched,
    /// Поправка пренебрежимо мала, клип вставлен как есть
    Passthrough,
    /// Коэффициент ограничен границей, точность тайминга снижена
    Clamped,
    /// Клипа нет, слот заполнен тишиной
    SilenceSubstituted { reason: String },
}

/// Итог по одному слоту
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotOutcome {
    pub slot_index: usize,
    pub start: f64,
    pub target_duration: f64,
    /// Длительность клипа после согласования
    pub achieved_duration: f64,
    /// Длительность, реально записанная в дорожку (после обрезки)
    pub placed_duration: f64,
    pub applied_ratio: f64,
    pub clamped: bool,
    /// Хвост клипа обрезан на начале следующего слота
    pub overlap_resolved: bool,
    /// Хвост клипа обрезан на конце видео
    pub truncated_at_end: bool,
    pub status: SlotStatus,
}

impl SlotOutcome {
    /// Расхождение достигнутой длительности с целевой
    pub fn drift(&self) -> f64 {
        self.achieved_duration - self.target_duration
    }
}

/// Отчет о синхронизации одного запуска
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_duration: f64,
    pub sample_rate: u32,
    pub slots: Vec<SlotOutcome>,
}

impl SyncReport {
    pub fn new(total_duration: f64, sample_rate: u32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            total_duration,
            sample_rate,
            slots: Vec::new(),
        }
    }

    pub fn clamped_count(&self) -> usize {
        self.slots.iter().filter(|s| s.clamped).count()
    }

    pub fn silent_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.status, SlotStatus::SilenceSubstituted { .. }))
            .count()
    }

    pub fn overlap_count(&self) -> usize {
        self.slots.iter().filter(|s| s.overlap_resolved).count()
    }

    /// Все слоты озвучены без ограничений и обрезок
    pub fn is_clean(&self) -> bool {
        self.slots.iter().all(|s| {
            !s.clamped
                && !s.overlap_resolved
                && !s.truncated_at_end
                && !matches!(s.status, SlotStatus::SilenceSubstituted { .. })
        })
    }

    /// Слоты, требующие внимания пользователя
    pub fn degraded_slots(&self) -> impl Iterator<Item = &SlotOutcome> {
        self.slots.iter().filter(|s| {
            s.clamped || s.overlap_resolved || matches!(s.status, SlotStatus::SilenceSubstituted { .. })
        })
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), data)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn log_summary(&self) {
        info!(
            "Sync report {}: {} slots, {} clamped, {} truncated at next slot, {} silent",
            self.run_id,
            self.slots.len(),
            self.clamped_count(),
            self.overlap_count(),
            self.silent_count()
        );
        for slot in self.degraded_slots() {
            warn!(
                "Slot {} at {:.3}s: target {:.3}s, achieved {:.3}s, placed {:.3}s, ratio {:.3}, status {:?}",
                slot.slot_index,
                slot.start,
                slot.target_duration,
                slot.achieved_duration,
                slot.placed_duration,
                slot.applied_ratio,
                slot.status
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(index: usize, status: SlotStatus, clamped: bool, overlap: bool) -> SlotOutcome {
        SlotOutcome {
            slot_index: index,
            start: index as f64 * 2.0,
            target_duration: 2.0,
            achieved_duration: 2.3,
            placed_duration: 2.0,
            applied_ratio: 2.0,
            clamped,
            overlap_resolved: overlap,
            truncated_at_end: false,
            status,
        }
    }

    #[test]
    fn test_counters() {
        let mut report = SyncReport::new(10.0, 16000);
        report.slots.push(outcome(0, SlotStatus::Matched, false, false));
        report.slots.push(outcome(1, SlotStatus::Clamped, true, true));
        report.slots.push(outcome(
            2,
            SlotStatus::SilenceSubstituted { reason: "backend down".to_string() },
            false,
            false,
        ));

        assert_eq!(report.clamped_count(), 1);
        assert_eq!(report.overlap_count(), 1);
        assert_eq!(report.silent_count(), 1);
        assert_eq!(report.degraded_slots().count(), 2);
        assert!(!report.is_clean());
        assert!((report.slots[1].drift() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_report.json");

        let mut report = SyncReport::new(4.0, 16000);
        report.slots.push(outcome(
            0,
            SlotStatus::SilenceSubstituted { reason: "empty text".to_string() },
            false,
            false,
        ));
        report.save_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"kind\": \"silence_substituted\""));

        let loaded = SyncReport::load_json(&path).unwrap();
        assert_eq!(loaded, report);
    }
}
