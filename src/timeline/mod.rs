//! Модуль временной шкалы
//!
//! Коррекция временных меток по тишине, сборка предложений из слов
//! и сопоставление слотов с переводом.

pub mod sentences;
pub mod segmenter;
pub mod pairer;

use crate::error::{DubSyncError, Result};
use crate::types::TimeSlot;

/// Проверяет, что слоты упорядочены, не перекрываются и имеют корректные границы
pub fn validate_slots(slots: &[TimeSlot]) -> Result<()> {
    for (position, slot) in slots.iter().enumerate() {
        if !(slot.start.is_finite() && slot.end.is_finite()) {
            return Err(DubSyncError::MalformedTimeline(format!(
                "Slot {} has non-finite bounds [{}, {}]",
                slot.index, slot.start, slot.end
            )));
        }
        if slot.start < 0.0 {
            return Err(DubSyncError::MalformedTimeline(format!(
                "Slot {} starts before zero ({})",
                slot.index, slot.start
            )));
        }
        if slot.end <= slot.start {
            return Err(DubSyncError::MalformedTimeline(format!(
                "Slot {} ends at {} which is not after its start {}",
                slot.index, slot.end, slot.start
            )));
        }
        if position > 0 {
            let prev = &slots[position - 1];
            if slot.index <= prev.index {
                return Err(DubSyncError::MalformedTimeline(format!(
                    "Slot index {} does not follow {}",
                    slot.index, prev.index
                )));
            }
            if slot.start <= prev.start {
                return Err(DubSyncError::MalformedTimeline(format!(
                    "Slot {} starts at {} which is not after slot {} start {}",
                    slot.index, slot.start, prev.index, prev.start
                )));
            }
            if prev.end > slot.start {
                return Err(DubSyncError::MalformedTimeline(format!(
                    "Slot {} [{:.3}, {:.3}] overlaps slot {} starting at {:.3}",
                    prev.index, prev.start, prev.end, slot.index, slot.start
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(index: usize, start: f64, end: f64) -> TimeSlot {
        TimeSlot { index, start, end }
    }

    #[test]
    fn test_valid_touching_slots() {
        assert!(validate_slots(&[slot(0, 0.0, 2.0), slot(1, 2.0, 4.0)]).is_ok());
        assert!(validate_slots(&[]).is_ok());
    }

    #[test]
    fn test_rejects_overlap_and_disorder() {
        let overlap = [slot(0, 0.0, 2.5), slot(1, 2.0, 4.0)];
        assert!(matches!(validate_slots(&overlap), Err(DubSyncError::MalformedTimeline(_))));

        let disorder = [slot(0, 3.0, 4.0), slot(1, 1.0, 2.0)];
        assert!(validate_slots(&disorder).is_err());

        let empty_slot = [slot(0, 1.0, 1.0)];
        assert!(validate_slots(&empty_slot).is_err());

        let nan = [slot(0, f64::NAN, 1.0)];
        assert!(validate_slots(&nan).is_err());
    }
}
