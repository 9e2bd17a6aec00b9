//! Top-level façade wiring the grid, the voice pool and pointer handling.

use crate::audio::{PlayMode, SynthBackend, VoicePool};
use crate::config::AppConfig;
use crate::grid::{Cell, PixelGrid, PixelSource};
use crate::interaction::InteractionController;
use crate::mapping::SoundMapper;

/// An image turned into a playable surface.
#[derive(Debug)]
pub struct Instrument<B: SynthBackend> {
    config: AppConfig,
    grid: PixelGrid,
    pool: VoicePool<B>,
    controller: InteractionController,
}

impl<B: SynthBackend> Instrument<B> {
    pub fn new(config: AppConfig, backend: B) -> Self {
        let config = config.sanitized();
        let grid = PixelGrid::new(&config.grid);
        let mapper = SoundMapper::new(config.sound.clone());
        let pool = VoicePool::new(config.voices, mapper, backend);
        tracing::info!(
            cell_size = grid.cell_size(),
            max_voices = pool.config().max_voices,
            scale = %pool.mapper().scale(),
            audio = pool.is_audio_available(),
            "instrument ready"
        );
        Self {
            config,
            grid,
            pool,
            controller: InteractionController::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn grid(&self) -> &PixelGrid {
        &self.grid
    }

    pub fn pool(&self) -> &VoicePool<B> {
        &self.pool
    }

    pub fn backend(&self) -> &B {
        self.pool.backend()
    }

    pub fn mapper_mut(&mut self) -> &mut SoundMapper {
        self.pool.mapper_mut()
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn mode(&self) -> PlayMode {
        self.controller.mode()
    }

    pub fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }

    /// Replaces the image. Voices tied to the old cells are released.
    pub fn load_image<S: PixelSource + ?Sized>(&mut self, source: &S) {
        self.controller.pointer_leave(&mut self.pool);
        self.pool.stop_all();
        self.grid.load(source);
    }

    pub fn set_cell_size(&mut self, size: u32) {
        self.controller.pointer_leave(&mut self.pool);
        self.pool.stop_all();
        self.grid.set_cell_size(size);
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.controller.set_mode(mode, &mut self.pool);
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.controller.set_playing(playing, &mut self.pool);
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) -> Option<Cell> {
        self.controller
            .pointer_down(x, y, &self.grid, &mut self.pool)
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> Option<Cell> {
        self.controller
            .pointer_move(x, y, &self.grid, &mut self.pool)
    }

    pub fn pointer_up(&mut self) {
        self.controller.pointer_up(&mut self.pool);
    }

    pub fn pointer_leave(&mut self) {
        self.controller.pointer_leave(&mut self.pool);
    }

    /// Advances logical time by `delta` seconds.
    pub fn advance(&mut self, delta: f64) {
        self.pool.advance(delta);
    }

    pub fn now(&self) -> f64 {
        self.pool.now()
    }

    /// Silences everything and shuts the backend down.
    pub fn dispose(&mut self) {
        self.controller.set_playing(false, &mut self.pool);
        self.pool.dispose();
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;
    use crate::audio::RecordingBackend;
    use crate::config::GridConfig;

    fn instrument() -> (Instrument<RecordingBackend>, RecordingBackend) {
        let backend = RecordingBackend::new();
        let config = AppConfig {
            grid: GridConfig {
                cell_size: 20,
                canvas_width: 200,
                canvas_height: 100,
            },
            ..AppConfig::default()
        };
        let mut instrument = Instrument::new(config, backend.clone());
        let image = RgbImage::from_fn(100, 100, |x, _| {
            if x < 50 {
                image::Rgb([255, 0, 0])
            } else {
                image::Rgb([0, 0, 255])
            }
        });
        instrument.load_image(&image);
        (instrument, backend)
    }

    #[test]
    fn centres_the_image_and_maps_pointer_events() {
        let (mut instrument, backend) = instrument();
        assert_eq!(instrument.grid().offset(), (50, 0));
        assert_eq!(instrument.grid().columns(), 5);

        // left margin of the canvas is outside the image
        assert!(instrument.pointer_down(10.0, 10.0).is_none());
        instrument.pointer_up();

        instrument.set_playing(true);
        let cell = instrument.pointer_down(55.0, 10.0).unwrap();
        assert_eq!((cell.column, cell.row), (0, 0));
        assert_eq!(cell.rgb.r, 255);
        assert_eq!(backend.started(), 1);
    }

    #[test]
    fn scan_gesture_sweeps_columns() {
        let (mut instrument, backend) = instrument();
        instrument.set_playing(true);
        instrument.set_mode(PlayMode::Scan);

        instrument.pointer_down(51.0, 50.0);
        assert_eq!(instrument.controller().active_column(), Some(0));
        instrument.advance(0.5);
        assert_eq!(instrument.pool().sounding_count(), 5);

        instrument.pointer_move(75.0, 50.0);
        assert_eq!(instrument.controller().active_column(), Some(1));
        assert_eq!(instrument.pool().live_count(), 5);

        instrument.pointer_up();
        assert_eq!(instrument.pool().live_count(), 0);
        instrument.advance(1.0);
        assert!(backend.sounding().is_empty());
    }

    #[test]
    fn resizing_cells_releases_voices_and_rebuilds() {
        let (mut instrument, backend) = instrument();
        instrument.set_playing(true);
        instrument.set_mode(PlayMode::Scan);
        instrument.pointer_down(60.0, 50.0);
        assert!(instrument.pool().live_count() > 0);

        instrument.set_cell_size(50);
        assert_eq!(instrument.pool().live_count(), 0);
        assert_eq!(instrument.grid().columns(), 2);
        instrument.advance(1.0);
        assert!(backend.sounding().is_empty());
    }

    #[test]
    fn dispose_stops_playback_and_backend() {
        let (mut instrument, backend) = instrument();
        instrument.set_playing(true);
        instrument.pointer_down(60.0, 10.0);

        instrument.dispose();
        instrument.dispose();
        assert!(!instrument.is_playing());
        assert!(backend.sounding().is_empty());
        assert!(backend.was_shut_down());
    }
}
