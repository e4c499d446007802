//! Модуль синтеза речи
//!
//! Движок не реализует TTS сам: бэкенд подключается через трейт [`SpeechSynthesizer`].
//! Хэндл бэкенда создается один раз, передается в запуск явно и освобождается
//! по его завершении.

pub mod queue;
pub mod text;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{SynthesizedClip, TranslatedSlot};

pub use queue::SynthesisQueue;
pub use text::prepare_for_synthesis;

/// Запрос на синтез речи для одного слота
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub slot_index: usize,
    /// Текст, уже подготовленный к озвучиванию
    pub text: String,
    /// Идентификатор языка, например "hi"
    pub language: String,
    /// Образец голоса для клонирования
    pub reference_voice: Option<PathBuf>,
}

impl SynthesisRequest {
    pub fn for_slot(slot: &TranslatedSlot, language: &str, reference_voice: Option<PathBuf>) -> Self {
        Self {
            slot_index: slot.index(),
            text: prepare_for_synthesis(&slot.text, language),
            language: language.to_string(),
            reference_voice,
        }
    }
}

/// Бэкенд синтеза речи
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Синтезирует речь для запроса. Частота клипа может быть любой:
    /// очередь приводит ее к канонической.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedClip>;

    /// Можно ли вызывать `synthesize` из нескольких задач одновременно
    fn supports_concurrency(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "synthesizer"
    }
}
