//! Bounded pool of live voices.
//!
//! The pool is the sole owner of every voice and the only component that
//! talks to the [`SynthBackend`]. It guarantees:
//!
//! - at most one live voice per [`VoiceKey`]; starting a key that is already
//!   live stops the old voice first,
//! - never more than `max_voices` live voices (pending onsets included),
//! - every started voice is released, either explicitly, by its scheduled
//!   auto-release, by [`VoicePool::stop_all`], or on disposal.
//!
//! Time is logical: callers advance the pool's [`PlaybackClock`] and due
//! deferred tasks fire in order during [`VoicePool::advance`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::color::Hsv;
use crate::config::VoiceConfig;
use crate::mapping::{AudioParameters, SoundMapper};
use crate::timeline::{PlaybackClock, ScheduledTask, Scheduler, TaskKind};

mod backend;
pub mod mock;
pub mod offline;

pub use backend::{SynthBackend, VoiceId};
pub use mock::{BackendCommand, RecordingBackend};
pub use offline::{OfflineRenderer, StereoBuffer};

/// Interaction mode of the instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// A press plays one transient note.
    #[default]
    Single,
    /// Dragging across the image sustains a chord per column.
    Scan,
}

impl PlayMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "single" => Some(PlayMode::Single),
            "scan" => Some(PlayMode::Scan),
            _ => None,
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayMode::Single => f.write_str("single"),
            PlayMode::Scan => f.write_str("scan"),
        }
    }
}

/// Caller-visible identity of a voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoiceKey {
    /// Sustained voice for one grid cell.
    Cell { column: u32, row: u32 },
    /// Transient note under a freshly generated key.
    Note(u64),
}

impl VoiceKey {
    pub fn cell(column: u32, row: u32) -> Self {
        VoiceKey::Cell { column, row }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePhase {
    /// Onset deferred by chord staggering; nothing audible yet.
    Pending,
    Sounding,
}

#[derive(Debug, Clone)]
struct Voice {
    id: VoiceId,
    params: AudioParameters,
    phase: VoicePhase,
}

/// Indices of an evenly spaced subset of `count` items holding at most
/// `cap` entries: every `ceil(count / cap)`-th item starting from the first.
///
/// When `count` is not a multiple of the stride the subset is smaller than
/// `cap`; e.g. 12 items with a cap of 5 use a stride of 3 and keep 4.
pub fn strided_indices(count: usize, cap: usize) -> Vec<usize> {
    if count == 0 || cap == 0 {
        return Vec::new();
    }
    let stride = count.div_ceil(cap);
    (0..count).step_by(stride).take(cap).collect()
}

/// Owner of all live voices.
pub struct VoicePool<B: SynthBackend> {
    config: VoiceConfig,
    mapper: SoundMapper,
    backend: B,
    backend_ok: bool,
    disposed: bool,
    mode: PlayMode,
    clock: PlaybackClock,
    scheduler: Scheduler,
    voices: BTreeMap<VoiceKey, Voice>,
    next_id: u64,
    next_note: u64,
}

impl<B: SynthBackend> VoicePool<B> {
    /// Creates the pool and initialises the backend once. A failing backend
    /// is logged and the pool keeps working as a silent no-op.
    pub fn new(config: VoiceConfig, mapper: SoundMapper, mut backend: B) -> Self {
        let backend_ok = match backend.initialize() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "audio backend failed to start; playback disabled");
                false
            }
        };
        Self {
            config: config.sanitized(),
            mapper,
            backend,
            backend_ok,
            disposed: false,
            mode: PlayMode::default(),
            clock: PlaybackClock::default(),
            scheduler: Scheduler::new(),
            voices: BTreeMap::new(),
            next_id: 0,
            next_note: 0,
        }
    }

    /// Always true: a broken backend must not block the caller.
    pub fn is_ready(&self) -> bool {
        true
    }

    /// Whether commands actually reach a working backend.
    pub fn is_audio_available(&self) -> bool {
        self.backend_ok && !self.disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    pub fn mapper(&self) -> &SoundMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut SoundMapper {
        &mut self.mapper
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    /// Current logical time in seconds.
    pub fn now(&self) -> f64 {
        self.clock.time_seconds
    }

    pub fn live_count(&self) -> usize {
        self.voices.len()
    }

    pub fn sounding_count(&self) -> usize {
        self.voices
            .values()
            .filter(|voice| voice.phase == VoicePhase::Sounding)
            .count()
    }

    pub fn live_keys(&self) -> Vec<VoiceKey> {
        self.voices.keys().copied().collect()
    }

    pub fn is_live(&self, key: &VoiceKey) -> bool {
        self.voices.contains_key(key)
    }

    pub fn phase(&self, key: &VoiceKey) -> Option<VoicePhase> {
        self.voices.get(key).map(|voice| voice.phase)
    }

    /// Deferred tasks not yet fired.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.pending()
    }

    /// Length of a one-shot note: brighter colours play shorter.
    pub fn note_duration(&self, value: f32) -> f32 {
        let brightness = if value.is_finite() {
            (value / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.config.note_duration_range.lerp(1.0 - brightness)
    }

    /// Plays a transient note that releases itself after its duration.
    pub fn play_once(&mut self, hsv: Hsv) -> Option<VoiceKey> {
        self.play_once_for(hsv, None)
    }

    /// Like [`VoicePool::play_once`] with an explicit duration in seconds.
    pub fn play_once_for(&mut self, hsv: Hsv, duration: Option<f32>) -> Option<VoiceKey> {
        if !self.is_audio_available() {
            return None;
        }
        if self.voices.len() >= self.config.max_voices {
            tracing::debug!(live = self.voices.len(), "voice cap reached; note dropped");
            return None;
        }

        let key = VoiceKey::Note(self.next_note);
        self.next_note += 1;
        let duration = duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or_else(|| self.note_duration(hsv.v));

        let params = self.mapper.map_hsv_to_audio(hsv);
        let id = self.allocate_id();
        let now = self.now();
        self.backend.start_voice(id, &params, now);
        self.voices.insert(
            key,
            Voice {
                id,
                params,
                phase: VoicePhase::Sounding,
            },
        );
        self.scheduler
            .schedule(now + f64::from(duration), key, id, TaskKind::AutoRelease);
        tracing::debug!(?key, ?id, duration, "one-shot started");
        Some(key)
    }

    /// Starts a voice held until [`VoicePool::stop`]. An existing voice
    /// under `key` is stopped first. Returns `false` when the request is
    /// dropped by the voice cap or playback is unavailable.
    pub fn start_sustained(&mut self, hsv: Hsv, key: VoiceKey) -> bool {
        self.start_keyed(key, hsv, 0.0)
    }

    /// Starts sustained voices for a whole chord. The requests are
    /// down-sampled to an evenly spaced subset within the voice cap and
    /// their onsets staggered by the configured spacing. Returns the keys
    /// that were accepted (some may still be pending).
    pub fn start_chord(&mut self, requests: &[(VoiceKey, Hsv)]) -> Vec<VoiceKey> {
        if !self.is_audio_available() || requests.is_empty() {
            return Vec::new();
        }
        let selected = strided_indices(requests.len(), self.config.max_voices);
        if selected.len() < requests.len() {
            tracing::debug!(
                requested = requests.len(),
                kept = selected.len(),
                "chord down-sampled to voice cap"
            );
        }

        let stagger = f64::from(self.config.stagger_seconds);
        let mut accepted = Vec::with_capacity(selected.len());
        for (slot, index) in selected.into_iter().enumerate() {
            let (key, hsv) = requests[index];
            if self.start_keyed(key, hsv, slot as f64 * stagger) {
                accepted.push(key);
            }
        }
        accepted
    }

    /// Releases the voice under `key` and cancels its deferred tasks.
    /// Returns `false` when nothing was live.
    pub fn stop(&mut self, key: &VoiceKey) -> bool {
        let cancelled = self.scheduler.cancel_key(key);
        let Some(voice) = self.voices.remove(key) else {
            return false;
        };
        if voice.phase == VoicePhase::Sounding {
            let now = self.now();
            self.backend.release_voice(voice.id, now);
        }
        tracing::debug!(?key, id = ?voice.id, cancelled, "voice stopped");
        true
    }

    /// Stops every live voice and cancels all deferred tasks.
    pub fn stop_all(&mut self) -> usize {
        self.scheduler.cancel_all();
        let now = self.now();
        let voices = std::mem::take(&mut self.voices);
        let stopped = voices.len();
        for voice in voices.into_values() {
            if voice.phase == VoicePhase::Sounding {
                self.backend.release_voice(voice.id, now);
            }
        }
        if stopped > 0 {
            tracing::debug!(stopped, "all voices stopped");
        }
        stopped
    }

    /// Switches mode; entering single mode silences any scan voices.
    pub fn set_mode(&mut self, mode: PlayMode) {
        if mode == PlayMode::Single {
            self.stop_all();
        }
        if mode != self.mode {
            tracing::info!(%mode, "play mode changed");
        }
        self.mode = mode;
    }

    /// Moves logical time forward by `delta` seconds, firing due tasks.
    pub fn advance(&mut self, delta: f64) {
        let target = self.now() + delta.max(0.0);
        self.advance_to(target);
    }

    /// Moves logical time forward to `time`, firing due tasks in order.
    pub fn advance_to(&mut self, time: f64) {
        self.clock.advance_to(time);
        let now = self.now();
        for task in self.scheduler.drain_due(now) {
            self.run_task(task);
        }
    }

    /// Stops everything and tears down the backend's shared output stage.
    /// Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.stop_all();
        if self.backend_ok {
            self.backend.shutdown();
        }
        self.disposed = true;
        tracing::debug!("voice pool disposed");
    }

    fn start_keyed(&mut self, key: VoiceKey, hsv: Hsv, delay: f64) -> bool {
        if !self.is_audio_available() {
            return false;
        }
        self.stop(&key);
        if self.voices.len() >= self.config.max_voices {
            tracing::debug!(?key, live = self.voices.len(), "voice cap reached; request dropped");
            return false;
        }

        let params = self.mapper.map_hsv_to_audio(hsv);
        let id = self.allocate_id();
        let now = self.now();
        let phase = if delay > 0.0 {
            self.scheduler.schedule(now + delay, key, id, TaskKind::Onset);
            VoicePhase::Pending
        } else {
            self.backend.start_voice(id, &params, now);
            VoicePhase::Sounding
        };
        self.voices.insert(key, Voice { id, params, phase });
        tracing::debug!(?key, ?id, delay, "sustained voice started");
        true
    }

    fn run_task(&mut self, task: ScheduledTask) {
        let current = self
            .voices
            .get(&task.key)
            .filter(|voice| voice.id == task.voice)
            .map(|voice| voice.phase);

        match (task.kind, current) {
            (TaskKind::Onset, Some(VoicePhase::Pending)) => {
                if let Some(voice) = self.voices.get_mut(&task.key) {
                    self.backend.start_voice(voice.id, &voice.params, task.due);
                    voice.phase = VoicePhase::Sounding;
                }
            }
            (TaskKind::AutoRelease, Some(phase)) => {
                self.voices.remove(&task.key);
                if phase == VoicePhase::Sounding {
                    self.backend.release_voice(task.voice, task.due);
                }
                tracing::debug!(key = ?task.key, id = ?task.voice, "one-shot expired");
            }
            _ => {
                tracing::debug!(key = ?task.key, kind = ?task.kind, "stale task ignored");
            }
        }
    }

    fn allocate_id(&mut self) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<B: SynthBackend> Drop for VoicePool<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<B: SynthBackend> fmt::Debug for VoicePool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePool")
            .field("mode", &self.mode)
            .field("now", &self.clock.time_seconds)
            .field("live", &self.voices.len())
            .field("pending_tasks", &self.scheduler.pending())
            .field("backend_ok", &self.backend_ok)
            .field("disposed", &self.disposed)
            .finish()
    }
}
