//! Translates pointer events into grid lookups and voice-pool commands.
//!
//! In single mode a press plays one note for the cell under the pointer.
//! In scan mode, while the pointer is held, the column under it sounds as a
//! chord; crossing into a new column stops the previous chord before the
//! next one starts, so two columns are never live together. Nothing sounds
//! unless playback is switched on; pointer events then only report the
//! hovered cell.

use crate::audio::{PlayMode, SynthBackend, VoiceKey, VoicePool};
use crate::grid::{Cell, PixelGrid};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanState {
    #[default]
    Idle,
    Scanning {
        column: u32,
        keys: Vec<VoiceKey>,
    },
}

#[derive(Debug, Default)]
pub struct InteractionController {
    mode: PlayMode,
    playing: bool,
    pressed: bool,
    scan: ScanState,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn scan_state(&self) -> &ScanState {
        &self.scan
    }

    /// Column currently sounding in scan mode.
    pub fn active_column(&self) -> Option<u32> {
        match self.scan {
            ScanState::Scanning { column, .. } => Some(column),
            ScanState::Idle => None,
        }
    }

    /// Turns playback on or off. Turning it off silences everything.
    pub fn set_playing<B: SynthBackend>(&mut self, playing: bool, pool: &mut VoicePool<B>) {
        if self.playing && !playing {
            self.pressed = false;
            self.scan = ScanState::Idle;
            pool.stop_all();
        }
        if self.playing != playing {
            tracing::info!(playing, "playback toggled");
        }
        self.playing = playing;
    }

    pub fn set_mode<B: SynthBackend>(&mut self, mode: PlayMode, pool: &mut VoicePool<B>) {
        self.release_scan(pool);
        pool.set_mode(mode);
        self.mode = mode;
    }

    /// Pointer pressed at canvas coordinates.
    pub fn pointer_down<B: SynthBackend>(
        &mut self,
        x: f32,
        y: f32,
        grid: &PixelGrid,
        pool: &mut VoicePool<B>,
    ) -> Option<Cell> {
        self.pressed = true;
        let cell = hovered(x, y, grid);
        if !self.playing {
            return cell;
        }
        match self.mode {
            PlayMode::Single => {
                if let Some(cell) = &cell {
                    pool.play_once(cell.hsv);
                }
            }
            PlayMode::Scan => self.scan_to(x, y, grid, pool),
        }
        cell
    }

    /// Pointer moved to canvas coordinates.
    pub fn pointer_move<B: SynthBackend>(
        &mut self,
        x: f32,
        y: f32,
        grid: &PixelGrid,
        pool: &mut VoicePool<B>,
    ) -> Option<Cell> {
        if self.playing && self.pressed && self.mode == PlayMode::Scan {
            self.scan_to(x, y, grid, pool);
        }
        hovered(x, y, grid)
    }

    pub fn pointer_up<B: SynthBackend>(&mut self, pool: &mut VoicePool<B>) {
        self.pressed = false;
        self.release_scan(pool);
    }

    pub fn pointer_leave<B: SynthBackend>(&mut self, pool: &mut VoicePool<B>) {
        self.pressed = false;
        self.release_scan(pool);
    }

    fn scan_to<B: SynthBackend>(
        &mut self,
        x: f32,
        y: f32,
        grid: &PixelGrid,
        pool: &mut VoicePool<B>,
    ) {
        let Some((image_x, column)) = grid
            .to_image_coords(x, y)
            .and_then(|(image_x, _)| grid.column_index(image_x).map(|column| (image_x, column)))
        else {
            self.release_scan(pool);
            return;
        };
        if self.active_column() == Some(column) {
            return;
        }

        self.release_scan(pool);
        let requests: Vec<(VoiceKey, _)> = grid
            .column_at(image_x)
            .into_iter()
            .map(|cell| (VoiceKey::cell(cell.column, cell.row), cell.hsv))
            .collect();
        let keys = pool.start_chord(&requests);
        tracing::debug!(column, voices = keys.len(), "scanning column");
        self.scan = ScanState::Scanning { column, keys };
    }

    fn release_scan<B: SynthBackend>(&mut self, pool: &mut VoicePool<B>) {
        if let ScanState::Scanning { keys, .. } = std::mem::take(&mut self.scan) {
            for key in &keys {
                pool.stop(key);
            }
        }
    }
}

fn hovered(x: f32, y: f32, grid: &PixelGrid) -> Option<Cell> {
    let (image_x, image_y) = grid.to_image_coords(x, y)?;
    grid.cell_at(image_x, image_y).cloned()
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;
    use crate::audio::{BackendCommand, RecordingBackend};
    use crate::config::{GridConfig, VoiceConfig};
    use crate::mapping::SoundMapper;

    /// 8 columns by 12 rows of 10 px cells, placed at the canvas origin.
    fn setup() -> (PixelGrid, VoicePool<RecordingBackend>, RecordingBackend) {
        let mut grid = PixelGrid::new(&GridConfig {
            cell_size: 10,
            canvas_width: 80,
            canvas_height: 120,
        });
        let image = RgbImage::from_fn(80, 120, |x, y| {
            image::Rgb([(x * 3) as u8, (y * 2) as u8, 128])
        });
        grid.load(&image);

        let backend = RecordingBackend::new();
        let pool = VoicePool::new(VoiceConfig::default(), SoundMapper::default(), backend.clone());
        (grid, pool, backend)
    }

    fn live_columns(pool: &VoicePool<RecordingBackend>) -> Vec<u32> {
        let mut columns: Vec<u32> = pool
            .live_keys()
            .into_iter()
            .filter_map(|key| match key {
                VoiceKey::Cell { column, .. } => Some(column),
                VoiceKey::Note(_) => None,
            })
            .collect();
        columns.dedup();
        columns
    }

    #[test]
    fn inert_until_playing() {
        let (grid, mut pool, backend) = setup();
        let mut controller = InteractionController::new();

        let hovered = controller.pointer_down(15.0, 15.0, &grid, &mut pool);
        assert_eq!(hovered.map(|cell| (cell.column, cell.row)), Some((1, 1)));
        controller.set_mode(PlayMode::Scan, &mut pool);
        controller.pointer_down(15.0, 15.0, &grid, &mut pool);
        controller.pointer_move(35.0, 15.0, &grid, &mut pool);

        assert!(backend.commands().is_empty());
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn single_mode_plays_the_cell_under_the_pointer() {
        let (grid, mut pool, backend) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);

        let cell = controller
            .pointer_down(25.0, 35.0, &grid, &mut pool)
            .unwrap();
        assert_eq!((cell.column, cell.row), (2, 3));
        assert_eq!(pool.live_count(), 1);
        match &backend.commands()[0] {
            BackendCommand::Start { params, .. } => {
                assert_eq!(params, &pool.mapper().map_hsv_to_audio(cell.hsv))
            }
            other => panic!("unexpected command {other:?}"),
        }

        // moving in single mode never plays
        controller.pointer_move(55.0, 35.0, &grid, &mut pool);
        assert_eq!(backend.started(), 1);
    }

    #[test]
    fn single_mode_outside_the_image_is_silent() {
        let (grid, mut pool, backend) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);

        assert!(controller.pointer_down(500.0, 5.0, &grid, &mut pool).is_none());
        assert!(controller.pointer_down(-1.0, 5.0, &grid, &mut pool).is_none());
        assert!(backend.commands().is_empty());
    }

    #[test]
    fn rapid_scan_keeps_a_single_capped_column_live() {
        let (grid, mut pool, backend) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);

        controller.pointer_down(5.0, 50.0, &grid, &mut pool);
        for column in 0..8u32 {
            let x = column as f32 * 10.0 + 5.0;
            controller.pointer_move(x, 50.0, &grid, &mut pool);
            assert_eq!(controller.active_column(), Some(column));
            assert_eq!(live_columns(&pool), vec![column]);
            // 12 rows with a cap of 5: stride 3 keeps rows 0, 3, 6, 9
            assert_eq!(pool.live_count(), 4);
            pool.advance(0.02);
            assert!(pool.live_count() <= pool.config().max_voices);
        }

        // moving within the same column does not retrigger
        let started = backend.started();
        controller.pointer_move(76.0, 90.0, &grid, &mut pool);
        assert_eq!(backend.started(), started);

        controller.pointer_up(&mut pool);
        assert_eq!(controller.active_column(), None);
        assert_eq!(pool.live_count(), 0);
        pool.advance(1.0);
        assert!(backend.sounding().is_empty());
    }

    #[test]
    fn scan_requires_the_pointer_to_be_held() {
        let (grid, mut pool, _) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);

        controller.pointer_move(15.0, 50.0, &grid, &mut pool);
        assert_eq!(pool.live_count(), 0);

        controller.pointer_down(15.0, 50.0, &grid, &mut pool);
        assert_eq!(controller.active_column(), Some(1));
    }

    #[test]
    fn leaving_the_canvas_stops_the_column() {
        let (grid, mut pool, _) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);

        controller.pointer_down(15.0, 50.0, &grid, &mut pool);
        assert!(pool.live_count() > 0);
        controller.pointer_leave(&mut pool);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(controller.scan_state(), &ScanState::Idle);

        // a move after leaving stays silent until the next press
        controller.pointer_move(35.0, 50.0, &grid, &mut pool);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn dragging_off_the_image_releases_the_chord() {
        let (grid, mut pool, _) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);

        controller.pointer_down(15.0, 50.0, &grid, &mut pool);
        controller.pointer_move(200.0, 50.0, &grid, &mut pool);
        assert_eq!(pool.live_count(), 0);
        controller.pointer_move(45.0, 50.0, &grid, &mut pool);
        assert_eq!(controller.active_column(), Some(4));
    }

    #[test]
    fn stopping_playback_silences_everything() {
        let (grid, mut pool, backend) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);
        controller.pointer_down(5.0, 5.0, &grid, &mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);
        controller.pointer_down(5.0, 5.0, &grid, &mut pool);
        assert!(pool.live_count() > 0);

        controller.set_playing(false, &mut pool);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(pool.pending_tasks(), 0);
        assert_eq!(controller.active_column(), None);
        pool.advance(1.0);
        assert!(backend.sounding().is_empty());
    }

    #[test]
    fn resuming_playback_mid_drag_waits_for_a_new_press() {
        let (grid, mut pool, _) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);
        controller.pointer_down(15.0, 50.0, &grid, &mut pool);

        controller.set_playing(false, &mut pool);
        controller.set_playing(true, &mut pool);
        controller.pointer_move(35.0, 50.0, &grid, &mut pool);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(controller.active_column(), None);

        controller.pointer_down(35.0, 50.0, &grid, &mut pool);
        assert_eq!(controller.active_column(), Some(3));
    }

    #[test]
    fn non_finite_pointer_is_silent() {
        let (grid, mut pool, backend) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);

        assert!(controller.pointer_down(f32::NAN, 5.0, &grid, &mut pool).is_none());
        controller.pointer_up(&mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);
        controller.pointer_down(15.0, 50.0, &grid, &mut pool);
        controller.pointer_move(f32::NAN, 50.0, &grid, &mut pool);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(backend.started(), 1);
    }

    #[test]
    fn switching_back_to_single_ends_the_scan() {
        let (grid, mut pool, _) = setup();
        let mut controller = InteractionController::new();
        controller.set_playing(true, &mut pool);
        controller.set_mode(PlayMode::Scan, &mut pool);
        controller.pointer_down(5.0, 5.0, &grid, &mut pool);

        controller.set_mode(PlayMode::Single, &mut pool);
        assert_eq!(pool.live_count(), 0);
        assert_eq!(controller.mode(), PlayMode::Single);
    }
}
