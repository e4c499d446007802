//! # Time-Stretching
//!
//! Изменение длительности речи без изменения высоты тона.
//!
//! Контракт растяжения фиксирован: на вход подаются семплы и требуемая длина
//! результата, на выходе ровно столько семплов на той же частоте дискретизации.
//! Алгоритм спрятан за трейтом [`TimeStretcher`], реализация по умолчанию:
//! WSOLA (waveform-similarity overlap-add).

use log::debug;

use crate::error::{DubSyncError, Result};

/// Растяжение/сжатие сигнала по времени без сдвига высоты тона
pub trait TimeStretcher: Send + Sync {
    /// Растягивает `input` до `output_len` семплов.
    ///
    /// `ratio`: коэффициент скорости воспроизведения (>1 ускорение, <1 замедление),
    /// `output_len` обычно равен `round(input.len() / ratio)`.
    fn stretch(&self, input: &[f32], sample_rate: u32, ratio: f64, output_len: usize) -> Result<Vec<f32>>;

    /// Название алгоритма для логов
    fn name(&self) -> &'static str;
}

/// WSOLA: кадры с окном Ханна и 50% перекрытием, позиция каждого следующего
/// кадра уточняется поиском максимального сходства с естественным продолжением
/// предыдущего кадра. Это сохраняет период основного тона.
#[derive(Debug, Clone)]
pub struct WsolaStretcher {
    /// Длина кадра в миллисекундах
    pub frame_ms: f64,
    /// Полуширина окна поиска сходства в миллисекундах
    pub search_ms: f64,
}

impl Default for WsolaStretcher {
    fn default() -> Self {
        Self {
            frame_ms: 20.0,
            search_ms: 5.0,
        }
    }
}

impl WsolaStretcher {
    fn frame_len(&self, sample_rate: u32) -> usize {
        let len = ((self.frame_ms / 1000.0) * sample_rate as f64).round() as usize;
        // четная длина, чтобы шаг был ровно половиной кадра
        (len.max(8)) & !1
    }

    fn search_radius(&self, sample_rate: u32) -> isize {
        ((self.search_ms / 1000.0) * sample_rate as f64).round() as isize
    }
}

impl TimeStretcher for WsolaStretcher {
    fn stretch(&self, input: &[f32], sample_rate: u32, ratio: f64, output_len: usize) -> Result<Vec<f32>> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(DubSyncError::TimeStretching(format!("Invalid stretch ratio: {}", ratio)));
        }
        if sample_rate == 0 {
            return Err(DubSyncError::TimeStretching("Sample rate must be non-zero".to_string()));
        }
        if output_len == 0 || input.is_empty() {
            return Ok(vec![0.0; output_len]);
        }

        let frame_len = self.frame_len(sample_rate);
        if input.len() < frame_len * 2 || output_len < frame_len * 2 {
            // Слишком коротко для кадров: хватит линейной интерполяции
            return Ok(linear_stretch(input, output_len));
        }

        let hop_out = frame_len / 2;
        let overlap = frame_len - hop_out;
        // Шаг по входу берется из точных длин, чтобы вход был пройден целиком
        let hop_in = hop_out as f64 * input.len() as f64 / output_len as f64;
        let search = self.search_radius(sample_rate);
        let max_pos = (input.len() - frame_len) as isize;
        let window = hann_window(frame_len);

        let mut output = vec![0.0f32; output_len + frame_len];
        let mut norm = vec![0.0f32; output_len + frame_len];
        let mut prev_pos: isize = 0;
        let mut frame = 0usize;

        loop {
            let out_pos = frame * hop_out;
            if out_pos >= output_len {
                break;
            }

            let nominal = (frame as f64 * hop_in).round() as isize;
            let pos = if frame == 0 {
                0
            } else {
                best_match(input, prev_pos + hop_out as isize, nominal, search, overlap, max_pos)
            };
            let pos = pos.clamp(0, max_pos) as usize;

            for i in 0..frame_len {
                output[out_pos + i] += input[pos + i] * window[i];
                norm[out_pos + i] += window[i];
            }

            prev_pos = pos as isize;
            frame += 1;
        }

        for (sample, weight) in output.iter_mut().zip(norm.iter()).take(output_len) {
            if *weight > 1e-6 {
                *sample /= *weight;
            }
        }
        output.truncate(output_len);

        debug!(
            "WSOLA: {} -> {} samples (ratio {:.3}, {} frames)",
            input.len(),
            output_len,
            ratio,
            frame
        );
        Ok(output)
    }

    fn name(&self) -> &'static str {
        "wsola"
    }
}

/// Периодическое окно Ханна: при 50% перекрытии сумма окон равна единице
fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / len as f32).cos())
        .collect()
}

/// Ищет около `nominal` позицию, участок которой больше всего похож на
/// естественное продолжение предыдущего кадра (`natural`).
fn best_match(input: &[f32], natural: isize, nominal: isize, search: isize, overlap: usize, max_pos: isize) -> isize {
    if natural < 0 || natural as usize + overlap > input.len() {
        return nominal.clamp(0, max_pos);
    }
    let reference = &input[natural as usize..natural as usize + overlap];

    let from = (nominal - search).max(0);
    let to = (nominal + search).min(max_pos);
    if from > to {
        return nominal.clamp(0, max_pos);
    }

    let mut best = nominal.clamp(from, to);
    let mut best_score = f32::NEG_INFINITY;
    for candidate in from..=to {
        let start = candidate as usize;
        let segment = &input[start..start + overlap];
        let mut dot = 0.0f32;
        let mut energy = 0.0f32;
        for (a, b) in reference.iter().zip(segment.iter()) {
            dot += a * b;
            energy += b * b;
        }
        let score = dot / (energy.sqrt() + 1e-9);
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

/// Линейная интерполяция до заданной длины
fn linear_stretch(input: &[f32], output_len: usize) -> Vec<f32> {
    if input.len() == 1 || output_len == 1 {
        return vec![input[0]; output_len];
    }
    let step = (input.len() - 1) as f64 / (output_len - 1) as f64;
    (0..output_len)
        .map(|i| {
            let position = i as f64 * step;
            let left = position.floor() as usize;
            let right = (left + 1).min(input.len() - 1);
            let frac = (position - left as f64) as f32;
            input[left] * (1.0 - frac) + input[right] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, duration: f32, sample_rate: u32) -> Vec<f32> {
        let n = (duration * sample_rate as f32) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.8)
            .collect()
    }

    /// Оценка частоты по количеству переходов через ноль
    fn zero_crossing_freq(samples: &[f32], sample_rate: u32) -> f32 {
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] < 0.0 && w[1] >= 0.0) || (w[0] >= 0.0 && w[1] < 0.0))
            .count();
        crossings as f32 / 2.0 / (samples.len() as f32 / sample_rate as f32)
    }

    #[test]
    fn test_exact_output_length() {
        let stretcher = WsolaStretcher::default();
        let input = sine(300.0, 1.0, 16000);
        for &(ratio, len) in &[(2.0, 8000usize), (0.5, 32000), (1.3, 12308)] {
            let out = stretcher.stretch(&input, 16000, ratio, len).unwrap();
            assert_eq!(out.len(), len, "ratio {}", ratio);
        }
    }

    #[test]
    fn test_pitch_is_preserved() {
        let stretcher = WsolaStretcher::default();
        let input = sine(440.0, 1.0, 16000);

        let slowed = stretcher.stretch(&input, 16000, 0.6, 26667).unwrap();
        let sped_up = stretcher.stretch(&input, 16000, 1.6, 10000).unwrap();

        let original = zero_crossing_freq(&input, 16000);
        for out in [&slowed, &sped_up] {
            let freq = zero_crossing_freq(&out[800..out.len() - 800], 16000);
            assert!(
                (freq - original).abs() / original < 0.05,
                "Частота должна сохраниться: {} vs {}",
                freq,
                original
            );
        }
    }

    #[test]
    fn test_amplitude_is_kept() {
        let stretcher = WsolaStretcher::default();
        let input = sine(200.0, 1.0, 16000);
        let out = stretcher.stretch(&input, 16000, 0.75, 21333).unwrap();
        let peak = out.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak > 0.7 && peak < 0.9, "peak = {}", peak);
    }

    #[test]
    fn test_short_input_uses_interpolation() {
        let stretcher = WsolaStretcher::default();
        let out = stretcher.stretch(&[0.0, 1.0], 16000, 0.5, 3).unwrap();
        assert_eq!(out, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_invalid_ratio() {
        let stretcher = WsolaStretcher::default();
        assert!(stretcher.stretch(&[0.1; 100], 16000, 0.0, 10).is_err());
        assert!(stretcher.stretch(&[0.1; 100], 16000, f64::NAN, 10).is_err());
    }

    #[test]
    fn test_deterministic() {
        let stretcher = WsolaStretcher::default();
        let input = sine(330.0, 0.5, 8000);
        let a = stretcher.stretch(&input, 8000, 1.4, 2857).unwrap();
        let b = stretcher.stretch(&input, 8000, 1.4, 2857).unwrap();
        assert_eq!(a, b);
    }
}
