//! Хранилище промежуточных файлов запуска
//!
//! Все файлы адресуются индексом слота, а не временными метками, поэтому
//! повторный запуск может подхватить уже синтезированные клипы.
//!
//! ```text
//! <root>/
//!   source_audio.wav
//!   synthesized/slot_0000.wav
//!   adjusted/slot_0000.wav
//!   master_track.wav
//!   sync_report.json
//!   manifest.json
//!   output.<ext>
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::audio::format::{decode_wav_file, encode_wav, Waveform};
use crate::error::Result;
use crate::synthesis::SynthesisRequest;
use crate::types::{AdjustedClip, SynthesizedClip};

/// Ключи текстов, по которым были синтезированы клипы слотов
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotManifest {
    pub slots: BTreeMap<usize, String>,
}

/// Каталог с артефактами одного запуска
pub struct ArtifactStore {
    root: PathBuf,
    // Держит временный каталог живым до конца запуска
    _temp_dir: Option<TempDir>,
}

impl ArtifactStore {
    /// Открыть (или создать) каталог артефактов
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("synthesized"))?;
        fs::create_dir_all(root.join("adjusted"))?;
        debug!("Artifact store at {}", root.display());
        Ok(Self { root, _temp_dir: None })
    }

    /// Временное хранилище, удаляется вместе с объектом
    pub fn temporary() -> Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("dub-sync-").tempdir()?;
        let mut store = Self::open(temp_dir.path())?;
        store._temp_dir = Some(temp_dir);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_audio_path(&self) -> PathBuf {
        self.root.join("source_audio.wav")
    }

    pub fn synthesized_path(&self, slot_index: usize) -> PathBuf {
        self.root.join("synthesized").join(slot_file_name(slot_index))
    }

    pub fn adjusted_path(&self, slot_index: usize) -> PathBuf {
        self.root.join("adjusted").join(slot_file_name(slot_index))
    }

    pub fn master_track_path(&self) -> PathBuf {
        self.root.join("master_track.wav")
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join("sync_report.json")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    pub fn output_path(&self, extension: &str) -> PathBuf {
        self.root.join(format!("output.{}", extension.trim_start_matches('.')))
    }

    /// Ключ запроса: md5 от текста, языка и образца голоса
    pub fn request_key(request: &SynthesisRequest) -> String {
        let mut hasher = md5::Context::new();
        hasher.consume(request.text.as_bytes());
        hasher.consume(request.language.as_bytes());
        if let Some(voice) = &request.reference_voice {
            hasher.consume(voice.to_string_lossy().as_bytes());
        }
        format!("{:x}", hasher.compute())
    }

    pub fn load_manifest(&self) -> Result<SlotManifest> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(SlotManifest::default());
        }
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save_manifest(&self, manifest: &SlotManifest) -> Result<()> {
        let data = serde_json::to_string_pretty(manifest)?;
        fs::write(self.manifest_path(), data)?;
        Ok(())
    }

    /// Ранее синтезированный клип слота, если он сделан по тому же запросу.
    ///
    /// Клип приводится к частоте `sample_rate` текущего запуска: файл мог быть
    /// сохранен запуском с другой частотой.
    pub fn reusable_clip(
        &self,
        manifest: &SlotManifest,
        request: &SynthesisRequest,
        sample_rate: u32,
    ) -> Result<Option<SynthesizedClip>> {
        let slot = request.slot_index;
        let path = self.synthesized_path(slot);
        match manifest.slots.get(&slot) {
            Some(key) if *key == Self::request_key(request) && path.exists() => {
                let waveform = decode_wav_file(&path)?.normalize_to(sample_rate)?;
                debug!("Slot {}: reusing {}", slot, path.display());
                Ok(Some(SynthesizedClip::new(slot, waveform)))
            }
            _ => Ok(None),
        }
    }

    pub fn save_synthesized(
        &self,
        manifest: &mut SlotManifest,
        request: &SynthesisRequest,
        clip: &SynthesizedClip,
    ) -> Result<()> {
        let waveform = Waveform::new(clip.samples.clone(), clip.sample_rate);
        encode_wav(&waveform, self.synthesized_path(clip.slot_index))?;
        manifest.slots.insert(clip.slot_index, Self::request_key(request));
        Ok(())
    }

    pub fn save_adjusted(&self, clip: &AdjustedClip) -> Result<()> {
        let waveform = Waveform::new(clip.samples.clone(), clip.sample_rate);
        encode_wav(&waveform, self.adjusted_path(clip.slot_index))
    }

    pub fn save_source_audio(&self, waveform: &Waveform) -> Result<()> {
        encode_wav(waveform, self.source_audio_path())?;
        info!("Source audio saved to {}", self.source_audio_path().display());
        Ok(())
    }
}

fn slot_file_name(slot_index: usize) -> String {
    format!("slot_{:04}.wav", slot_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            slot_index: 2,
            text: text.to_string(),
            language: "hi".to_string(),
            reference_voice: None,
        }
    }

    #[test]
    fn test_layout() {
        let store = ArtifactStore::temporary().unwrap();
        assert!(store.synthesized_path(7).ends_with("synthesized/slot_0007.wav"));
        assert!(store.adjusted_path(12).ends_with("adjusted/slot_0012.wav"));
        assert!(store.output_path(".mp4").ends_with("output.mp4"));
        assert!(store.root().join("synthesized").is_dir());
    }

    #[test]
    fn test_reuse_requires_same_request() {
        let store = ArtifactStore::temporary().unwrap();
        let mut manifest = store.load_manifest().unwrap();
        assert!(manifest.slots.is_empty());

        let clip = SynthesizedClip::new(2, Waveform::new(vec![0.25; 800], 16000));
        store.save_synthesized(&mut manifest, &request("नमस्ते"), &clip).unwrap();
        store.save_manifest(&manifest).unwrap();

        let manifest = store.load_manifest().unwrap();
        let reused = store.reusable_clip(&manifest, &request("नमस्ते"), 16000).unwrap();
        assert_eq!(reused, Some(clip));
        assert_eq!(store.reusable_clip(&manifest, &request("अलविदा"), 16000).unwrap(), None);
    }

    #[test]
    fn test_reused_clip_follows_current_rate() {
        let store = ArtifactStore::temporary().unwrap();
        let mut manifest = SlotManifest::default();
        let clip = SynthesizedClip::new(2, Waveform::new(vec![0.25; 16000], 16000));
        store.save_synthesized(&mut manifest, &request("नमस्ते"), &clip).unwrap();

        let reused = store
            .reusable_clip(&manifest, &request("नमस्ते"), 22050)
            .unwrap()
            .unwrap();
        assert_eq!(reused.sample_rate, 22050);
        assert_eq!(reused.samples.len(), 22050);
    }

    #[test]
    fn test_temporary_store_removed_on_drop() {
        let store = ArtifactStore::temporary().unwrap();
        let root = store.root().to_path_buf();
        drop(store);
        assert!(!root.exists());
    }
}
