//! Основной файл библиотеки dub-sync
//!
//! Движок синхронизации тайминга для дубляжа: переведенная и синтезированная
//! речь укладывается во временные слоты исходных предложений видео, чтобы
//! дублированный звук начинался и заканчивался там же, где оригинальный.
//!
//! Распознавание, перевод и синтез речи сюда не входят: движок получает
//! предложения с временными метками, переводы и бэкенд синтеза
//! ([`synthesis::SpeechSynthesizer`]) и возвращает итоговую дорожку и отчет.

pub mod artifacts;
pub mod assembly;
pub mod audio;
pub mod config;
pub mod error;
pub mod logger;
pub mod media;
pub mod pipeline;
pub mod synthesis;
pub mod timeline;
pub mod types;

#[cfg(test)]
mod tests {
    mod test_assembler;
    mod test_pipeline;
}

pub use artifacts::ArtifactStore;
pub use assembly::assembler::{MasterTrack, PlacedSlot, SlotAudio, TrackAssembler};
pub use assembly::report::{SlotOutcome, SlotStatus, SyncReport};
pub use audio::format::Waveform;
pub use audio::matcher::{DurationMatcher, MatchBounds};
pub use audio::stretch::{TimeStretcher, WsolaStretcher};
pub use config::{EngineConfig, OverlapPolicy};
pub use error::{DubSyncError, Result};
pub use media::{FfmpegMedia, MediaContainer};
pub use pipeline::{DubOutput, RunInput, RunOutput, SyncEngine};
pub use synthesis::{SpeechSynthesizer, SynthesisRequest};
pub use timeline::pairer::pair;
pub use timeline::segmenter::{SilenceAdjustedSegmenter, SilenceDetector};
pub use timeline::sentences::group_words_into_sentences;
pub use types::{
    AdjustedClip, ProgressUpdate, RecognizedSentence, RecognizedWord, SynthesizedClip, TimeSlot,
    TranslatedSlot,
};
