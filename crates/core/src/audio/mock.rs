//! Recording backend for tests and dry runs
//!
//! Captures every command the pool issues instead of producing sound, so
//! voice-pool behaviour can be checked without audio hardware.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{SynthBackend, VoiceId};
use crate::{AudioParameters, InstrumentError, Result};

/// A command received by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    Start {
        id: VoiceId,
        params: AudioParameters,
        at: f64,
    },
    Release {
        id: VoiceId,
        at: f64,
    },
    Shutdown,
}

/// Cloneable handle; clones share one command log.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    commands: Arc<Mutex<Vec<BackendCommand>>>,
    fail_initialize: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose initialisation always fails.
    pub fn failing() -> Self {
        Self {
            fail_initialize: true,
            ..Self::default()
        }
    }

    /// All captured commands, oldest first.
    pub fn commands(&self) -> Vec<BackendCommand> {
        self.lock().clone()
    }

    pub fn clear_commands(&self) {
        self.lock().clear();
    }

    pub fn started(&self) -> usize {
        self.lock()
            .iter()
            .filter(|cmd| matches!(cmd, BackendCommand::Start { .. }))
            .count()
    }

    pub fn released(&self) -> usize {
        self.lock()
            .iter()
            .filter(|cmd| matches!(cmd, BackendCommand::Release { .. }))
            .count()
    }

    /// Ids that were started and not yet released.
    pub fn sounding(&self) -> BTreeSet<VoiceId> {
        let mut sounding = BTreeSet::new();
        for cmd in self.lock().iter() {
            match cmd {
                BackendCommand::Start { id, .. } => {
                    sounding.insert(*id);
                }
                BackendCommand::Release { id, .. } => {
                    sounding.remove(id);
                }
                BackendCommand::Shutdown => {}
            }
        }
        sounding
    }

    pub fn was_shut_down(&self) -> bool {
        self.lock()
            .iter()
            .any(|cmd| matches!(cmd, BackendCommand::Shutdown))
    }

    fn push(&self, cmd: BackendCommand) {
        self.lock().push(cmd);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BackendCommand>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SynthBackend for RecordingBackend {
    fn initialize(&mut self) -> Result<()> {
        if self.fail_initialize {
            Err(InstrumentError::Backend("no output device".to_string()))
        } else {
            Ok(())
        }
    }

    fn start_voice(&mut self, id: VoiceId, params: &AudioParameters, at: f64) {
        self.push(BackendCommand::Start {
            id,
            params: params.clone(),
            at,
        });
    }

    fn release_voice(&mut self, id: VoiceId, at: f64) {
        self.push(BackendCommand::Release { id, at });
    }

    fn shutdown(&mut self) {
        self.push(BackendCommand::Shutdown);
    }
}
