//! Модуль конфигурации библиотеки dub-sync
//!
//! Содержит значения, управляющие детекцией тишины, растяжением и сборкой дорожки.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DubSyncError, Result};

/// Политика разрешения остаточного перекрытия клипа со следующим слотом
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Жесткая обрезка хвоста на начале следующего слота
    Truncate,
    /// Обрезка на той же границе с коротким затуханием хвоста
    TruncateWithFade,
}

impl Default for OverlapPolicy {
    fn default() -> Self {
        Self::Truncate
    }
}

/// Конфигурация движка синхронизации
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Порог тишины в dBFS: кусок громче порога считается речью
    pub silence_threshold_db: f32,
    /// Размер куска для детекции тишины в миллисекундах
    pub silence_chunk_ms: u32,
    /// Окно просмотра в начале клипа в секундах
    pub silence_lookahead_secs: f64,
    /// Минимальный коэффициент растяжения (замедление не сильнее 2x)
    pub min_ratio: f64,
    /// Максимальный коэффициент растяжения (ускорение не сильнее 2x)
    pub max_ratio: f64,
    /// Отклонение коэффициента от 1, при котором растяжение пропускается
    pub tolerance_ratio: f64,
    /// Допустимая погрешность длительности в секундах
    pub epsilon_secs: f64,
    /// Частота дискретизации внутреннего представления и итоговой дорожки
    pub sample_rate: u32,
    /// Идентификатор целевого языка (например, "hi")
    pub target_language: String,
    /// Политика обрезки перекрытий
    pub overlap_policy: OverlapPolicy,
    /// Длительность затухания при `TruncateWithFade`, мс
    pub overlap_fade_ms: u32,
    /// Максимальное число параллельных задач синтеза
    pub max_workers: usize,
    /// Повторно использовать сохраненные клипы слотов
    pub reuse_artifacts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: -40.0,
            silence_chunk_ms: 10,
            silence_lookahead_secs: 1.0,
            min_ratio: 0.5,
            max_ratio: 2.0,
            tolerance_ratio: 0.02,
            epsilon_secs: 0.05,
            sample_rate: 44100,
            target_language: "hi".to_string(),
            overlap_policy: OverlapPolicy::default(),
            overlap_fade_ms: 10,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            reuse_artifacts: false,
        }
    }
}

impl EngineConfig {
    /// Загрузить конфигурацию из JSON-файла (отсутствующие поля берутся по умолчанию)
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Сохранить конфигурацию в JSON-файл
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), data)?;
        Ok(())
    }

    /// Проверить согласованность значений
    pub fn validate(&self) -> Result<()> {
        if !(self.min_ratio > 0.0 && self.min_ratio <= 1.0) {
            return Err(DubSyncError::Configuration(format!(
                "min_ratio must be in (0, 1], got {}",
                self.min_ratio
            )));
        }
        if !(self.max_ratio >= 1.0 && self.max_ratio.is_finite()) {
            return Err(DubSyncError::Configuration(format!(
                "max_ratio must be a finite value >= 1, got {}",
                self.max_ratio
            )));
        }
        if !(0.0..1.0).contains(&self.tolerance_ratio) {
            return Err(DubSyncError::Configuration(format!(
                "tolerance_ratio must be in [0, 1), got {}",
                self.tolerance_ratio
            )));
        }
        if !(self.epsilon_secs > 0.0) {
            return Err(DubSyncError::Configuration(format!(
                "epsilon_secs must be positive, got {}",
                self.epsilon_secs
            )));
        }
        if self.sample_rate == 0 {
            return Err(DubSyncError::Configuration("sample_rate must be non-zero".to_string()));
        }
        if self.silence_chunk_ms == 0 {
            return Err(DubSyncError::Configuration("silence_chunk_ms must be non-zero".to_string()));
        }
        if self.silence_lookahead_secs < 0.0 {
            return Err(DubSyncError::Configuration(format!(
                "silence_lookahead_secs must not be negative, got {}",
                self.silence_lookahead_secs
            )));
        }
        if self.max_workers == 0 {
            return Err(DubSyncError::Configuration("max_workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_ratio, 0.5);
        assert_eq!(config.max_ratio, 2.0);
        assert_eq!(config.overlap_policy, OverlapPolicy::Truncate);
    }

    #[test]
    fn test_invalid_ratio_bounds() {
        let config = EngineConfig {
            max_ratio: 0.8,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(DubSyncError::Configuration(_))));
    }

    #[test]
    fn test_json_roundtrip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "max_ratio": 1.5, "overlap_policy": "truncate_with_fade" }"#).unwrap();

        let config = EngineConfig::load_json(&path).unwrap();
        assert_eq!(config.max_ratio, 1.5);
        assert_eq!(config.overlap_policy, OverlapPolicy::TruncateWithFade);
        assert_eq!(config.sample_rate, 44100);
    }
}
