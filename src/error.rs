//! Модуль обработки ошибок библиотеки dub-sync
//!
//! Фатальные ошибки (нарушенная временная шкала, несовпадение количества
//! слотов и переводов, неизвестная длительность видео) прерывают запуск до сборки.
//! Ошибки отдельного слота деградируют только этот слот и попадают в отчет.

use thiserror::Error;

/// Ошибки библиотеки dub-sync
#[derive(Debug, Error)]
pub enum DubSyncError {
    /// Слоты не упорядочены, перекрываются или имеют некорректные границы
    #[error("Malformed timeline: {0}")]
    MalformedTimeline(String),

    /// Количество слотов не совпадает с количеством переведенных строк
    #[error("Pairing count mismatch: {slots} slots, {texts} translated texts")]
    PairingCountMismatch { slots: usize, texts: usize },

    /// Синтез речи для слота недоступен (слот заменяется тишиной)
    #[error("Synthesis unavailable for slot {slot}: {reason}")]
    SynthesisUnavailable { slot: usize, reason: String },

    /// Общая длительность видео неизвестна или не положительна
    #[error("Assembly boundary error: {0}")]
    AssemblyBoundary(String),

    /// Ошибка обработки аудио
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),

    /// Ошибка time-stretching
    #[error("Time-stretching error: {0}")]
    TimeStretching(String),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ошибка внешнего инструмента (ffmpeg/ffprobe)
    #[error("Media tool error: {0}")]
    MediaTool(String),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка чтения или записи WAV
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl DubSyncError {
    /// Прерывает ли ошибка весь запуск.
    ///
    /// `SynthesisUnavailable` локальна для слота: запуск продолжается с тишиной.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SynthesisUnavailable { .. })
    }
}

/// Тип Result для библиотеки dub-sync
pub type Result<T> = std::result::Result<T, DubSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DubSyncError::MalformedTimeline("x".into()).is_fatal());
        assert!(DubSyncError::PairingCountMismatch { slots: 2, texts: 3 }.is_fatal());
        assert!(DubSyncError::AssemblyBoundary("x".into()).is_fatal());
        assert!(!DubSyncError::SynthesisUnavailable { slot: 1, reason: "x".into() }.is_fatal());
    }

    #[test]
    fn test_mismatch_message() {
        let err = DubSyncError::PairingCountMismatch { slots: 2, texts: 3 };
        assert_eq!(err.to_string(), "Pairing count mismatch: 2 slots, 3 translated texts");
    }
}
