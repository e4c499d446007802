//! # Типы данных
//!
//! Общие типы временной шкалы и аудиоклипов, которые проходят через
//! сегментацию, сопоставление, растяжение и сборку.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use crate::audio::format::Waveform;

/// Слово из распознавателя с временными метками в секундах
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedWord {
    pub start: f64,
    pub end: f64,
    /// Текст слова, как его вернул распознаватель (может начинаться с пробела)
    pub word: String,
}

/// Предложение из распознавателя: `{start, end, text}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSentence {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Временной слот исходного видео, в котором звучало одно предложение.
///
/// Создается сегментатором и больше не меняется.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub index: usize,
    pub start: f64,
    pub end: f64,
}

impl TimeSlot {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Слот вместе с переведенным текстом
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSlot {
    pub slot: TimeSlot,
    pub text: String,
    /// Всегда `end - start`; длина текста на длительность не влияет
    pub target_duration: f64,
}

impl TranslatedSlot {
    pub fn new(slot: TimeSlot, text: impl Into<String>) -> Self {
        Self {
            target_duration: slot.duration(),
            slot,
            text: text.into(),
        }
    }

    pub fn index(&self) -> usize {
        self.slot.index
    }
}

/// Синтезированная речь для одного слота (уже в каноническом виде: моно, f32)
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedClip {
    pub slot_index: usize,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedClip {
    pub fn new(slot_index: usize, waveform: Waveform) -> Self {
        Self {
            slot_index,
            samples: waveform.samples,
            sample_rate: waveform.sample_rate,
        }
    }

    /// Длительность в секундах
    pub fn duration(&self) -> f64 {
        samples_to_secs(self.samples.len(), self.sample_rate)
    }
}

/// Клип после согласования длительности со слотом
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedClip {
    pub slot_index: usize,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Примененный коэффициент скорости (>1 ускорение, <1 замедление)
    pub applied_ratio: f64,
    /// Требуемый коэффициент вышел за допустимые границы
    pub clamped: bool,
    /// Растяжение пропущено из-за пренебрежимо малой поправки
    pub passthrough: bool,
}

impl AdjustedClip {
    pub fn achieved_duration(&self) -> f64 {
        samples_to_secs(self.samples.len(), self.sample_rate)
    }
}

/// Переводит количество семплов в секунды
pub fn samples_to_secs(samples: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    samples as f64 / sample_rate as f64
}

/// Переводит секунды в ближайший индекс семпла (отрицательные значения дают 0)
pub fn secs_to_samples(secs: f64, sample_rate: u32) -> usize {
    (secs * sample_rate as f64).round().max(0.0) as usize
}

/// Обновление прогресса выполнения запуска
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// Запуск начат
    Started,
    /// Коррекция временных меток по тишине
    Segmenting,
    /// Сопоставление слотов с переводом
    Pairing { slots: usize },
    /// Синтез речи для слота завершен (успешно или нет)
    Synthesized { current: usize, total: usize },
    /// Согласование длительностей
    Matching { total: usize },
    /// Сборка итоговой дорожки
    Assembling,
    /// Запуск завершен
    Finished,
}

/// Асинхронно отправляет обновление прогресса
pub async fn send_progress(sender: &Option<Sender<ProgressUpdate>>, update: ProgressUpdate) {
    if let Some(sender) = sender {
        let _ = sender.send(update).await;
    }
}
