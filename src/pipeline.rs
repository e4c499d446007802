//! # Sync Engine
//!
//! Проводит один запуск через все стадии:
//!
//! 1. Segmenter: коррекция начала предложений по ведущей тишине
//! 2. Pairer: слот + переведенная строка
//! 3. Synthesis: речь для каждого слота (ограниченная параллельность)
//! 4. Matcher: растяжение клипов под слоты (CPU, rayon)
//! 5. Assembler: одна итоговая дорожка и отчет
//!
//! Фатальные ошибки первых двух стадий прерывают запуск до сборки. Неудачный
//! синтез или растяжение отдельного слота дает тишину в этом слоте.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::mpsc::Sender;

use crate::artifacts::ArtifactStore;
use crate::assembly::assembler::{MasterTrack, PlacedSlot, TrackAssembler};
use crate::assembly::report::SyncReport;
use crate::audio::format::{decode_audio_file, Waveform};
use crate::audio::matcher::{DurationMatcher, MatchBounds};
use crate::config::EngineConfig;
use crate::error::{DubSyncError, Result};
use crate::media::MediaContainer;
use crate::synthesis::{SpeechSynthesizer, SynthesisQueue, SynthesisRequest};
use crate::timeline::pairer::pair;
use crate::timeline::segmenter::{SilenceAdjustedSegmenter, SilenceDetector};
use crate::types::{send_progress, ProgressUpdate, RecognizedSentence, SynthesizedClip, TranslatedSlot};

/// Входные данные запуска
#[derive(Debug, Clone)]
pub struct RunInput {
    /// Предложения распознавателя в порядке времени
    pub sentences: Vec<RecognizedSentence>,
    /// Переводы, по одному на предложение
    pub translations: Vec<String>,
    /// Звуковая дорожка исходного видео
    pub source_audio: Waveform,
    /// Длительность видео в секундах
    pub total_duration: f64,
    /// Образец голоса для клонирования
    pub reference_voice: Option<PathBuf>,
}

/// Результат запуска
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub track: MasterTrack,
    pub report: SyncReport,
}

/// Результат дубляжа видеофайла
#[derive(Debug, Clone)]
pub struct DubOutput {
    pub video: PathBuf,
    pub report: SyncReport,
}

pub struct SyncEngine {
    config: EngineConfig,
    progress: Option<Sender<ProgressUpdate>>,
}

impl SyncEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, progress: None })
    }

    pub fn with_progress(mut self, progress: Sender<ProgressUpdate>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Выполняет запуск над уже извлеченной дорожкой.
    ///
    /// Если передано хранилище, промежуточные клипы, итоговая дорожка и отчет
    /// сохраняются в нем.
    ///
    /// # Аргументы
    ///
    /// * `input` - Предложения, переводы, исходный звук и длительность видео
    /// * `synthesizer` - Бэкенд синтеза речи
    /// * `store` - Хранилище артефактов (необязательно)
    ///
    /// # Возвращает
    ///
    /// Итоговую дорожку и отчет синхронизации. Слоты с неудачным синтезом или
    /// растяжением заполнены тишиной и отмечены в отчете.
    ///
    /// # Ошибки
    ///
    /// * `MalformedTimeline` - предложения неупорядочены или перекрываются
    /// * `PairingCountMismatch` - число переводов не совпадает с числом предложений
    /// * `AssemblyBoundary` - длительность видео не положительна
    /// * `Io`, `AudioProcessing` - ошибки записи артефактов или обработки звука
    pub async fn run(
        &self,
        input: RunInput,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        store: Option<&ArtifactStore>,
    ) -> Result<RunOutput> {
        send_progress(&self.progress, ProgressUpdate::Started).await;
        let total_duration = input.total_duration;
        if !(total_duration.is_finite() && total_duration > 0.0) {
            return Err(DubSyncError::AssemblyBoundary(format!(
                "Total duration must be positive, got {}",
                total_duration
            )));
        }

        // Stage 1: segmentation
        send_progress(&self.progress, ProgressUpdate::Segmenting).await;
        let source = input.source_audio.normalize_to(self.config.sample_rate)?;
        let segmenter = SilenceAdjustedSegmenter::new(SilenceDetector::from(&self.config));
        let slots = segmenter.segment(&input.sentences, &source)?;

        // Stage 2: pairing
        send_progress(&self.progress, ProgressUpdate::Pairing { slots: slots.len() }).await;
        let translated = pair(&slots, &input.translations)?;

        // Stage 3: synthesis
        let requests: Vec<SynthesisRequest> = translated
            .iter()
            .map(|slot| {
                SynthesisRequest::for_slot(slot, &self.config.target_language, input.reference_voice.clone())
            })
            .collect();
        let clips = self.synthesize(synthesizer, &requests, store).await?;

        // Stage 4: duration matching
        send_progress(&self.progress, ProgressUpdate::Matching { total: translated.len() }).await;
        let placed = self.match_durations(&translated, clips, store).await?;

        // Stage 5: assembly
        send_progress(&self.progress, ProgressUpdate::Assembling).await;
        let assembler = TrackAssembler::from_config(&self.config);
        let (track, report) = assembler.assemble(&placed, total_duration)?;

        if let Some(store) = store {
            track.save_wav(store.master_track_path())?;
            report.save_json(store.report_path())?;
        }
        report.log_summary();
        send_progress(&self.progress, ProgressUpdate::Finished).await;

        Ok(RunOutput { track, report })
    }

    /// Полный дубляж: длительность, извлечение звука, запуск, замена дорожки
    #[allow(clippy::too_many_arguments)]
    pub async fn dub_video(
        &self,
        video: &Path,
        sentences: Vec<RecognizedSentence>,
        translations: Vec<String>,
        reference_voice: Option<PathBuf>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        media: &dyn MediaContainer,
        store: &ArtifactStore,
    ) -> Result<DubOutput> {
        info!("Dubbing {}", video.display());
        let total_duration = media.probe_duration(video).await?;

        let source_path = store.source_audio_path();
        if !(self.config.reuse_artifacts && source_path.exists()) {
            media
                .extract_audio(video, &source_path, self.config.sample_rate)
                .await?;
        }
        let source_audio = decode_audio_file(&source_path)?;

        let input = RunInput {
            sentences,
            translations,
            source_audio,
            total_duration,
            reference_voice,
        };
        let output = self.run(input, synthesizer, Some(store)).await?;

        let extension = video
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let output_video = store.output_path(extension);
        media
            .replace_audio(video, &store.master_track_path(), &output_video)
            .await?;

        Ok(DubOutput {
            video: output_video,
            report: output.report,
        })
    }

    /// Синтез с повторным использованием сохраненных клипов
    async fn synthesize(
        &self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        requests: &[SynthesisRequest],
        store: Option<&ArtifactStore>,
    ) -> Result<Vec<Result<SynthesizedClip>>> {
        let mut manifest = match store {
            Some(store) => store.load_manifest()?,
            None => Default::default(),
        };

        let mut results: Vec<Option<Result<SynthesizedClip>>> = Vec::with_capacity(requests.len());
        let mut pending = Vec::new();
        for request in requests {
            let reused = match store {
                Some(store) if self.config.reuse_artifacts => {
                    match store.reusable_clip(&manifest, request, self.config.sample_rate) {
                        Ok(clip) => clip,
                        Err(e) => {
                            warn!("Slot {}: saved clip unusable, synthesizing again: {}", request.slot_index, e);
                            None
                        }
                    }
                }
                _ => None,
            };
            if reused.is_none() {
                pending.push(request.clone());
            }
            results.push(reused.map(Ok));
        }
        let reused = requests.len() - pending.len();
        if reused > 0 {
            info!("Reusing {} synthesized clips", reused);
            for current in 1..=reused {
                let update = ProgressUpdate::Synthesized { current, total: requests.len() };
                send_progress(&self.progress, update).await;
            }
        }

        let queue = SynthesisQueue::new(self.config.max_workers, self.config.sample_rate)
            .with_progress(self.progress.clone())
            .with_done_before(reused);
        let synthesized = queue.run(synthesizer, &pending).await;

        let mut synthesized = pending.iter().zip(synthesized);
        let mut clips = Vec::with_capacity(requests.len());
        for result in results {
            let result = match result {
                Some(reused) => reused,
                None => match synthesized.next() {
                    Some((request, result)) => {
                        if let (Some(store), Ok(clip)) = (store, &result) {
                            store.save_synthesized(&mut manifest, request, clip)?;
                        }
                        result
                    }
                    None => {
                        return Err(DubSyncError::Other(anyhow::anyhow!(
                            "Synthesis queue returned fewer results than requested"
                        )))
                    }
                },
            };
            clips.push(result);
        }

        if let Some(store) = store {
            store.save_manifest(&manifest)?;
        }
        Ok(clips)
    }

    /// Согласование длительностей на пуле rayon вне асинхронного рантайма
    async fn match_durations(
        &self,
        translated: &[TranslatedSlot],
        clips: Vec<Result<SynthesizedClip>>,
        store: Option<&ArtifactStore>,
    ) -> Result<Vec<PlacedSlot>> {
        let mut jobs = Vec::new();
        let mut failures = Vec::with_capacity(translated.len());
        for (slot, clip) in translated.iter().zip(clips) {
            match clip {
                Ok(clip) => {
                    jobs.push((clip, slot.target_duration));
                    failures.push(None);
                }
                Err(e) if !e.is_fatal() => failures.push(Some(e.to_string())),
                Err(e) => return Err(e),
            }
        }

        let matcher = DurationMatcher::new(MatchBounds::from(&self.config));
        let matched = tokio::task::spawn_blocking(move || matcher.match_all(&jobs))
            .await
            .map_err(|e| DubSyncError::Other(anyhow::anyhow!("Matching task failed: {}", e)))?;

        let mut matched = matched.into_iter();
        let mut placed = Vec::with_capacity(translated.len());
        for (slot, failure) in translated.iter().zip(failures) {
            let slot = slot.clone();
            let entry = match failure {
                Some(reason) => PlacedSlot::unavailable(slot, reason),
                None => match matched.next() {
                    Some(Ok(clip)) => {
                        if let Some(store) = store {
                            store.save_adjusted(&clip)?;
                        }
                        PlacedSlot::matched(slot, clip)
                    }
                    Some(Err(e)) => {
                        warn!("Slot {}: duration matching failed: {}", slot.index(), e);
                        PlacedSlot::unavailable(slot, e.to_string())
                    }
                    None => {
                        return Err(DubSyncError::Other(anyhow::anyhow!(
                            "Matcher returned fewer clips than requested"
                        )))
                    }
                },
            };
            placed.push(entry);
        }
        Ok(placed)
    }
}
