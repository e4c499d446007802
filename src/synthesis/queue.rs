//! Очередь синтеза с ограниченной параллельностью
//!
//! Количество одновременных вызовов бэкенда ограничено семафором: один permit,
//! если бэкенд не допускает параллельных вызовов, иначе `max_workers`.
//! Ошибка одного слота не прерывает остальные.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::mpsc::Sender;
use tokio::sync::Semaphore;

use crate::audio::format::Waveform;
use crate::error::{DubSyncError, Result};
use crate::synthesis::{SpeechSynthesizer, SynthesisRequest};
use crate::types::{send_progress, ProgressUpdate, SynthesizedClip};

pub struct SynthesisQueue {
    max_workers: usize,
    sample_rate: u32,
    progress: Option<Sender<ProgressUpdate>>,
    // Слоты, готовые до запуска очереди (например, взятые из хранилища)
    done_before: usize,
}

impl SynthesisQueue {
    pub fn new(max_workers: usize, sample_rate: u32) -> Self {
        Self {
            max_workers: max_workers.max(1),
            sample_rate,
            progress: None,
            done_before: 0,
        }
    }

    pub fn with_progress(mut self, progress: Option<Sender<ProgressUpdate>>) -> Self {
        self.progress = progress;
        self
    }

    /// Прогресс считается поверх `done` уже готовых слотов
    pub fn with_done_before(mut self, done: usize) -> Self {
        self.done_before = done;
        self
    }

    /// Число одновременных вызовов для данного бэкенда
    pub fn permits_for(&self, synthesizer: &dyn SpeechSynthesizer) -> usize {
        if synthesizer.supports_concurrency() {
            self.max_workers
        } else {
            1
        }
    }

    /// Синтезирует все запросы. Результаты идут в порядке запросов;
    /// каждая ошибка приводится к `SynthesisUnavailable` своего слота.
    pub async fn run(
        &self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        requests: &[SynthesisRequest],
    ) -> Vec<Result<SynthesizedClip>> {
        let permits = self.permits_for(synthesizer.as_ref());
        info!(
            "Synthesizing {} slots with {} (max {} concurrent)",
            requests.len(),
            synthesizer.name(),
            permits
        );

        let semaphore = Arc::new(Semaphore::new(permits));
        let completed = Arc::new(AtomicUsize::new(self.done_before));
        let total = self.done_before + requests.len();

        let tasks = requests.iter().map(|request| {
            let semaphore = semaphore.clone();
            let synthesizer = synthesizer.clone();
            let completed = completed.clone();
            async move {
                let result = self.synthesize_one(synthesizer.as_ref(), &semaphore, request).await;
                let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
                send_progress(&self.progress, ProgressUpdate::Synthesized { current, total }).await;
                result
            }
        });

        join_all(tasks).await
    }

    async fn synthesize_one(
        &self,
        synthesizer: &dyn SpeechSynthesizer,
        semaphore: &Semaphore,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedClip> {
        let slot = request.slot_index;
        if request.text.is_empty() {
            warn!("Slot {}: nothing to synthesize", slot);
            return Err(DubSyncError::SynthesisUnavailable {
                slot,
                reason: "empty text".to_string(),
            });
        }

        let _permit = semaphore.acquire().await.map_err(|e| DubSyncError::SynthesisUnavailable {
            slot,
            reason: format!("synthesis queue closed: {}", e),
        })?;

        debug!("Slot {}: synthesizing \"{}\" ({})", slot, request.text, request.language);
        let clip = synthesizer.synthesize(request).await.map_err(|e| {
            warn!("Slot {}: synthesis failed: {}", slot, e);
            unavailable(slot, e)
        })?;

        if clip.slot_index != slot {
            return Err(DubSyncError::SynthesisUnavailable {
                slot,
                reason: format!("backend returned clip for slot {}", clip.slot_index),
            });
        }

        let waveform = Waveform::new(clip.samples, clip.sample_rate)
            .normalize_to(self.sample_rate)
            .map_err(|e| unavailable(slot, e))?;
        Ok(SynthesizedClip::new(slot, waveform))
    }
}

fn unavailable(slot: usize, error: DubSyncError) -> DubSyncError {
    match error {
        DubSyncError::SynthesisUnavailable { .. } => error,
        other => DubSyncError::SynthesisUnavailable {
            slot,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ToneSynthesizer {
        rate: u32,
    }

    #[async_trait]
    impl SpeechSynthesizer for ToneSynthesizer {
        async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesizedClip> {
            if request.text.contains("fail") {
                return Err(DubSyncError::AudioProcessing("model crashed".to_string()));
            }
            let samples = vec![0.2; self.rate as usize / 2];
            Ok(SynthesizedClip::new(request.slot_index, Waveform::new(samples, self.rate)))
        }

        fn supports_concurrency(&self) -> bool {
            true
        }
    }

    fn request(index: usize, text: &str) -> SynthesisRequest {
        SynthesisRequest {
            slot_index: index,
            text: text.to_string(),
            language: "hi".to_string(),
            reference_voice: None,
        }
    }

    #[tokio::test]
    async fn test_failures_stay_local() {
        let queue = SynthesisQueue::new(4, 8000);
        let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(ToneSynthesizer { rate: 8000 });
        let results = queue
            .run(synthesizer, &[request(0, "ok"), request(1, "fail"), request(2, ""), request(3, "ok")])
            .await;

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DubSyncError::SynthesisUnavailable { slot: 1, .. })));
        assert!(matches!(results[2], Err(DubSyncError::SynthesisUnavailable { slot: 2, .. })));
        assert_eq!(results[3].as_ref().unwrap().slot_index, 3);
    }

    #[tokio::test]
    async fn test_clips_normalized_to_canonical_rate() {
        let queue = SynthesisQueue::new(2, 16000);
        let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(ToneSynthesizer { rate: 8000 });
        let results = queue.run(synthesizer, &[request(0, "ok")]).await;
        let clip = results[0].as_ref().unwrap();
        assert_eq!(clip.sample_rate, 16000);
        assert!((clip.duration() - 0.5).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_progress_reported_per_slot() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let queue = SynthesisQueue::new(2, 8000).with_progress(Some(tx));
        let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(ToneSynthesizer { rate: 8000 });
        queue.run(synthesizer, &[request(0, "a"), request(1, "b")]).await;
        drop(queue);

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1], ProgressUpdate::Synthesized { current: 2, total: 2 });
    }

    #[tokio::test]
    async fn test_progress_counts_slots_done_before() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let queue = SynthesisQueue::new(2, 8000)
            .with_progress(Some(tx))
            .with_done_before(3);
        let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(ToneSynthesizer { rate: 8000 });
        queue.run(synthesizer, &[request(3, "a")]).await;
        drop(queue);

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }
        assert_eq!(updates, vec![ProgressUpdate::Synthesized { current: 4, total: 4 }]);
    }
}
