//! # Slot-Translation Pairer
//!
//! Сопоставляет слоты с переведенными строками один к одному по порядку.
//! Целевая длительность берется только из интервала слота, длина текста
//! на нее не влияет.

use log::{info, warn};

use crate::error::{DubSyncError, Result};
use crate::timeline::validate_slots;
use crate::types::{TimeSlot, TranslatedSlot};

/// Пары слот + перевод; количество строк должно совпадать с количеством слотов
pub fn pair<S: AsRef<str>>(slots: &[TimeSlot], texts: &[S]) -> Result<Vec<TranslatedSlot>> {
    if slots.len() != texts.len() {
        return Err(DubSyncError::PairingCountMismatch {
            slots: slots.len(),
            texts: texts.len(),
        });
    }
    validate_slots(slots)?;

    let paired: Vec<TranslatedSlot> = slots
        .iter()
        .zip(texts)
        .map(|(slot, text)| {
            let text = text.as_ref().trim();
            if text.is_empty() {
                warn!("Slot {} has an empty translation", slot.index);
            }
            TranslatedSlot::new(*slot, text)
        })
        .collect();

    info!("Paired {} slots with translated text", paired.len());
    Ok(paired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots() -> Vec<TimeSlot> {
        vec![
            TimeSlot { index: 0, start: 0.5, end: 2.8 },
            TimeSlot { index: 1, start: 3.0, end: 5.2 },
        ]
    }

    #[test]
    fn test_pairs_in_order() {
        let texts = ["नमस्ते, मेरा नाम जॉन है।", "  मैं चौबीस साल का हूँ। "];
        let paired = pair(&slots(), &texts).unwrap();
        assert_eq!(paired.len(), 2);
        assert_eq!(paired[1].text, "मैं चौबीस साल का हूँ।");
        assert!((paired[0].target_duration - 2.3).abs() < 1e-9);
        assert!((paired[1].target_duration - 2.2).abs() < 1e-9);
    }

    #[test]
    fn test_count_mismatch_is_fatal() {
        let texts = vec!["one".to_string()];
        match pair(&slots(), &texts) {
            Err(DubSyncError::PairingCountMismatch { slots, texts }) => {
                assert_eq!((slots, texts), (2, 1));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_duration_ignores_text_length() {
        let short = pair(&slots()[..1], &["a"]).unwrap();
        let long = pair(&slots()[..1], &["a much much longer translated sentence"]).unwrap();
        assert_eq!(short[0].target_duration, long[0].target_duration);
    }
}
