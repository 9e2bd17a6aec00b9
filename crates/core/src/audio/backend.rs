//! The seam between the voice pool and whatever actually produces sound.

use serde::{Deserialize, Serialize};

use crate::{AudioParameters, Result};

/// Identity of one voice instance. Unlike a [`super::VoiceKey`], an id is
/// never reused, so commands for a replaced voice cannot hit its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

/// Sound-producing side of the pool. Only the pool issues commands to a
/// backend, one at a time, with the logical time they take effect at.
pub trait SynthBackend {
    /// Brings up the output stage. Called once when the pool is created.
    fn initialize(&mut self) -> Result<()>;

    /// Begins a voice: the attack starts at `at` seconds.
    fn start_voice(&mut self, id: VoiceId, params: &AudioParameters, at: f64);

    /// Triggers the release envelope of a started voice at `at` seconds.
    /// Unknown or already released ids are ignored.
    fn release_voice(&mut self, id: VoiceId, at: f64);

    /// Tears down the shared output stage (master gain, reverb).
    fn shutdown(&mut self);
}

impl<B: SynthBackend + ?Sized> SynthBackend for Box<B> {
    fn initialize(&mut self) -> Result<()> {
        (**self).initialize()
    }

    fn start_voice(&mut self, id: VoiceId, params: &AudioParameters, at: f64) {
        (**self).start_voice(id, params, at)
    }

    fn release_voice(&mut self, id: VoiceId, at: f64) {
        (**self).release_voice(id, at)
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
