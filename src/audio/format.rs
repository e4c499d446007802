//! # Audio Format Handling
//!
//! Каноническое внутреннее представление сигнала и его ввод/вывод.
//!
//! Любой звук, попадающий в движок (исходная дорожка видео, синтезированная речь),
//! сначала приводится к одному виду: моно, f32, фиксированная частота дискретизации.
//! Только после этого на нем работают сегментатор, растяжение и сборщик.
//!
//! ## Основные возможности
//!
//! - Декодирование WAV (hound) и MP3/M4A/AAC/FLAC/OGG (symphonia)
//! - Сведение многоканального звука в моно
//! - Ресемплинг к канонической частоте (rubato)
//! - Запись 32-битного float WAV

use std::fs::File;
use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info, warn};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{DubSyncError, Result};
use crate::types::{samples_to_secs, secs_to_samples};

/// Размер блока, подаваемого в ресемплер
const RESAMPLE_CHUNK: usize = 1024;

/// Моно-сигнал с плавающей точкой
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Тишина заданной длительности
    pub fn silence(duration: f64, sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; secs_to_samples(duration, sample_rate)],
            sample_rate,
        }
    }

    /// Сводит чередующиеся каналы в моно усреднением
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        if channels <= 1 {
            return Self::new(samples.to_vec(), sample_rate);
        }
        let mono = samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::new(mono, sample_rate)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Длительность в секундах
    pub fn duration(&self) -> f64 {
        samples_to_secs(self.samples.len(), self.sample_rate)
    }

    /// Вырезает интервал `[start, end)` в секундах, границы прижимаются к сигналу
    pub fn slice(&self, start: f64, end: f64) -> Waveform {
        let from = secs_to_samples(start, self.sample_rate).min(self.samples.len());
        let to = secs_to_samples(end, self.sample_rate).min(self.samples.len()).max(from);
        Waveform::new(self.samples[from..to].to_vec(), self.sample_rate)
    }

    /// Приводит сигнал к заданной частоте дискретизации
    pub fn normalize_to(self, sample_rate: u32) -> Result<Waveform> {
        if self.sample_rate == sample_rate {
            return Ok(self);
        }
        self.resample(sample_rate)
    }

    /// Ресемплинг с помощью Rubato (sinc-интерполяция).
    ///
    /// Длина результата равна `round(len * target / source)`: задержка фильтра
    /// компенсируется, а хвост добивается нулями или обрезается.
    pub fn resample(&self, target_rate: u32) -> Result<Waveform> {
        if self.sample_rate == 0 || target_rate == 0 {
            return Err(DubSyncError::AudioProcessing(format!(
                "Cannot resample {} Hz -> {} Hz",
                self.sample_rate, target_rate
            )));
        }
        if self.sample_rate == target_rate {
            return Ok(self.clone());
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let expected_len = (self.samples.len() as f64 * ratio).round() as usize;
        if self.samples.is_empty() {
            return Ok(Waveform::new(Vec::new(), target_rate));
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
            .map_err(|e| DubSyncError::AudioProcessing(format!("Rubato initialisation failed: {}", e)))?;

        let input = &self.samples;
        let mut output = Vec::with_capacity(expected_len + RESAMPLE_CHUNK);
        let mut pos = 0;

        while pos + resampler.input_frames_next() <= input.len() {
            let frames = resampler.input_frames_next();
            let chunk = [&input[pos..pos + frames]];
            let out = resampler
                .process(&chunk[..], None)
                .map_err(|e| DubSyncError::AudioProcessing(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&out[0]);
            pos += frames;
        }

        if pos < input.len() {
            let chunk = [&input[pos..]];
            let out = resampler
                .process_partial(Some(&chunk[..]), None)
                .map_err(|e| DubSyncError::AudioProcessing(format!("Resampling failed: {}", e)))?;
            output.extend_from_slice(&out[0]);
        }

        // Выталкиваем задержку фильтра, пока не наберем нужную длину
        let delay = resampler.output_delay();
        while output.len() < expected_len + delay {
            let out = resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| DubSyncError::AudioProcessing(format!("Resampling flush failed: {}", e)))?;
            if out[0].is_empty() {
                break;
            }
            output.extend_from_slice(&out[0]);
        }

        let mut samples: Vec<f32> = output.into_iter().skip(delay).collect();
        samples.resize(expected_len, 0.0);

        debug!(
            "Resampled {} samples {} Hz -> {} samples {} Hz",
            self.samples.len(),
            self.sample_rate,
            samples.len(),
            target_rate
        );
        Ok(Waveform::new(samples, target_rate))
    }
}

/// Декодирует аудиофайл в моно-сигнал.
///
/// WAV читается через hound, остальные форматы через symphonia.
/// Формат определяется по расширению файла.
pub fn decode_audio_file<P: AsRef<Path>>(file_path: P) -> Result<Waveform> {
    let file_path = file_path.as_ref();
    let extension = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "wav" => decode_wav_file(file_path),
        "mp3" | "m4a" | "aac" | "flac" | "ogg" => {
            let mut buffer = Vec::new();
            File::open(file_path)?.read_to_end(&mut buffer)?;
            let waveform = decode_with_symphonia(buffer, Some(&extension))?;
            info!(
                "Decoded {} samples from {} at {} Hz",
                waveform.len(),
                file_path.display(),
                waveform.sample_rate
            );
            Ok(waveform)
        }
        _ => Err(DubSyncError::AudioProcessing(format!(
            "Unsupported audio format: {}",
            extension
        ))),
    }
}

/// Декодирует сжатые данные (MP3, AAC/M4A, FLAC, Ogg Vorbis) из памяти
pub fn decode_with_symphonia(data: Vec<u8>, extension: Option<&str>) -> Result<Waveform> {
    let cursor = std::io::Cursor::new(data);
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: false,
        ..Default::default()
    };

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &MetadataOptions::default())
        .map_err(|e| DubSyncError::AudioProcessing(format!("Unable to probe audio format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DubSyncError::AudioProcessing("No audio track found".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DubSyncError::AudioProcessing(format!("Unable to create decoder: {}", e)))?;

    let track_id = track.id;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let mut interleaved = Vec::new();

    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                channels = decoded.spec().channels.count().max(1);
                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                sample_buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(sample_buf.samples());
            }
            Err(e) => {
                // Битый пакет пропускаем, декодирование продолжается
                warn!("Failed to decode packet: {}", e);
                continue;
            }
        }
    }

    Ok(Waveform::from_interleaved(&interleaved, channels, sample_rate))
}

/// Декодирует WAV-файл (8/16/24/32 бит int и 32 бит float) в моно
pub fn decode_wav_file<P: AsRef<Path>>(file_path: P) -> Result<Waveform> {
    let mut reader = WavReader::open(file_path.as_ref())?;
    let spec = reader.spec();

    let pcm_data: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        _ => {
            return Err(DubSyncError::AudioProcessing(format!(
                "Unsupported WAV format: {:?}, {} bits",
                spec.sample_format, spec.bits_per_sample
            )));
        }
    };

    Ok(Waveform::from_interleaved(&pcm_data, spec.channels as usize, spec.sample_rate))
}

/// Записывает сигнал в моно WAV (32 бит float)
pub fn encode_wav<P: AsRef<Path>>(waveform: &Waveform, output_path: P) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(output_path.as_ref(), spec)?;
    for &sample in &waveform.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    debug!(
        "Saved WAV file: {} ({} samples, {} Hz)",
        output_path.as_ref().display(),
        waveform.len(),
        waveform.sample_rate
    );
    Ok(())
}

/// Среднеквадратичное значение (RMS)
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Уровень в dBFS; для полной тишины возвращает минус бесконечность
pub fn to_dbfs(rms: f32) -> f32 {
    if rms <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

/// Линейная амплитуда, соответствующая уровню в dBFS
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Линейное затухание хвоста фрагмента (на месте).
///
/// Если фрагмент короче затухания, затухает весь фрагмент.
pub fn apply_fade_out(samples: &mut [f32], fade_ms: u32, sample_rate: u32) {
    let fade_samples = ((fade_ms as f64 / 1000.0) * sample_rate as f64) as usize;
    let fade_samples = fade_samples.min(samples.len());
    if fade_samples == 0 {
        return;
    }
    let offset = samples.len() - fade_samples;
    for (i, sample) in samples[offset..].iter_mut().enumerate() {
        let factor = 1.0 - (i + 1) as f32 / fade_samples as f32;
        *sample *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sine(freq: f32, duration: f64, sample_rate: u32) -> Vec<f32> {
        let n = secs_to_samples(duration, sample_rate);
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_downmix_interleaved() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = Waveform::from_interleaved(&stereo, 2, 8000);
        assert_eq!(mono.samples, vec![0.5, 0.5, 0.0]);
        assert_eq!(mono.sample_rate, 8000);
    }

    #[test]
    fn test_slice_is_clamped() {
        let wave = Waveform::new(vec![0.1; 1000], 1000);
        assert_eq!(wave.slice(0.5, 0.7).len(), 200);
        assert_eq!(wave.slice(0.9, 5.0).len(), 100);
        assert_eq!(wave.slice(2.0, 3.0).len(), 0);
    }

    #[test]
    fn test_resample_preserves_duration() {
        let wave = Waveform::new(sine(220.0, 1.3, 24000), 24000);
        let resampled = wave.resample(16000).unwrap();
        assert_eq!(resampled.sample_rate, 16000);
        assert_eq!(resampled.len(), (wave.len() as f64 * 16000.0 / 24000.0).round() as usize);
        assert!((resampled.duration() - wave.duration()).abs() < 1.0 / 16000.0 + 1e-9);
        // сигнал не должен превратиться в тишину
        assert!(compute_rms(&resampled.samples) > 0.2);
    }

    #[test]
    fn test_wav_encode_decode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let wave = Waveform::new(sine(440.0, 0.1, 16000), 16000);

        encode_wav(&wave, &path).unwrap();
        let decoded = decode_audio_file(&path).unwrap();

        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.len(), wave.len());
        for (a, b) in wave.samples.iter().zip(decoded.samples.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    fn crc8(data: &[u8]) -> u8 {
        let mut crc = 0u8;
        for &byte in data {
            crc ^= byte;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
            }
        }
        crc
    }

    fn crc16(data: &[u8]) -> u16 {
        let mut crc = 0u16;
        for &byte in data {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x8005 } else { crc << 1 };
            }
        }
        crc
    }

    /// Минимальный FLAC: моно, 16 бит, один кадр с VERBATIM-подкадром
    fn flac_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let block = samples.len() as u64;
        let mut out = b"fLaC".to_vec();

        // STREAMINFO, последний блок метаданных
        out.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
        out.extend_from_slice(&(block as u16).to_be_bytes());
        out.extend_from_slice(&(block as u16).to_be_bytes());
        out.extend_from_slice(&[0; 6]);
        let packed = (sample_rate as u64) << 44 | 15u64 << 36 | block;
        out.extend_from_slice(&packed.to_be_bytes());
        out.extend_from_slice(&[0; 16]);

        let mut frame = vec![0xFF, 0xF8, 0x70, 0x08, 0x00];
        frame.extend_from_slice(&((block - 1) as u16).to_be_bytes());
        frame.push(crc8(&frame));
        frame.push(0x02);
        for sample in samples {
            frame.extend_from_slice(&sample.to_be_bytes());
        }
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_be_bytes());

        out.extend_from_slice(&frame);
        out
    }

    #[test]
    fn test_flac_decoded_through_symphonia() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voice.flac");
        let samples: Vec<i16> = sine(440.0, 0.1, 16000)
            .iter()
            .map(|s| (s * 32767.0) as i16)
            .collect();
        std::fs::write(&path, flac_bytes(&samples, 16000)).unwrap();

        let decoded = decode_audio_file(&path).unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.samples.iter()) {
            assert!((*a as f32 / 32768.0 - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let result = decode_audio_file("clip.xyz");
        assert!(matches!(result, Err(DubSyncError::AudioProcessing(_))));
    }

    #[test]
    fn test_dbfs_helpers() {
        assert_eq!(to_dbfs(0.0), f32::NEG_INFINITY);
        assert!((to_dbfs(1.0)).abs() < 1e-6);
        assert!((db_to_amplitude(-40.0) - 0.01).abs() < 1e-6);
        assert!((compute_rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fade_out() {
        let mut samples = vec![1.0; 100];
        apply_fade_out(&mut samples, 10, 1000);
        assert_eq!(samples[89], 1.0);
        assert!(samples[95] < 1.0 && samples[95] > 0.0);
        assert_eq!(samples[99], 0.0);
    }
}
