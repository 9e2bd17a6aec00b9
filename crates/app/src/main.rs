use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use pixel_instrument_core::{
    AppConfig, Instrument, InstrumentError, OfflineRenderer, PixelGrid, PlayMode, SoundMapper,
    SpectrumAnalyzer,
};
use tracing_subscriber::EnvFilter;

fn main() -> pixel_instrument_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            image,
            config,
            cell_size,
            x,
            y,
        } => run_inspect(&image, config.as_deref(), cell_size, x.zip(y)),
        Commands::Render {
            image,
            output,
            mode,
            duration,
            config,
            cell_size,
        } => run_render(&image, &output, mode, duration, config.as_deref(), cell_size),
    }
}

fn load_config(path: Option<&Path>) -> pixel_instrument_core::Result<AppConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading configuration");
            AppConfig::load(path)
        }
        None => Ok(AppConfig::default()),
    }
}

fn run_inspect(
    image: &Path,
    config: Option<&Path>,
    cell_size: Option<u32>,
    point: Option<(f32, f32)>,
) -> pixel_instrument_core::Result<()> {
    let config = load_config(config)?;
    let source = image::open(image)?;

    let mut grid = PixelGrid::new(&config.grid);
    grid.load(&source);
    if let Some(size) = cell_size {
        grid.set_cell_size(size);
    }
    let mapper = SoundMapper::new(config.sound.clone());

    let cells: Vec<_> = match point {
        Some((x, y)) => {
            grid.to_image_coords(x, y)
                .and_then(|(image_x, image_y)| grid.cell_at(image_x, image_y))
                .into_iter()
                .collect()
        }
        None => grid.cells().iter().collect(),
    };
    let entries: Vec<_> = cells
        .into_iter()
        .map(|cell| {
            serde_json::json!({
                "cell": cell,
                "audio": mapper.map_hsv_to_audio(cell.hsv),
            })
        })
        .collect();

    let report = serde_json::json!({
        "columns": grid.columns(),
        "rows": grid.rows(),
        "cell_size": grid.cell_size(),
        "layout": grid.layout().map(|layout| serde_json::json!({
            "width": layout.width,
            "height": layout.height,
            "offset_x": layout.offset_x,
            "offset_y": layout.offset_y,
            "scale": layout.scale,
        })),
        "cells": entries,
    });
    let text = serde_json::to_string_pretty(&report)
        .map_err(|err| InstrumentError::msg(format!("failed to encode report: {err}")))?;
    println!("{text}");
    Ok(())
}

fn run_render(
    image: &Path,
    output: &Path,
    mode: PlayMode,
    duration: f64,
    config: Option<&Path>,
    cell_size: Option<u32>,
) -> pixel_instrument_core::Result<()> {
    let config = load_config(config)?;
    let source = image::open(image)?;
    tracing::info!(?image, ?output, %mode, duration, "rendering performance");

    let renderer = OfflineRenderer::new(config.audio);
    let mut instrument = Instrument::new(config, renderer);
    instrument.load_image(&source);
    if let Some(size) = cell_size {
        instrument.set_cell_size(size);
    }
    if !instrument.grid().is_loaded() {
        return Err(InstrumentError::InvalidInput("image has no pixels"));
    }

    instrument.set_mode(mode);
    instrument.set_playing(true);
    let duration = if duration.is_finite() && duration > 0.0 {
        duration
    } else {
        DEFAULT_DURATION
    };
    match mode {
        PlayMode::Scan => perform_sweep(&mut instrument, duration),
        PlayMode::Single => perform_clicks(&mut instrument, duration),
    }
    instrument.dispose();

    let renderer = instrument.backend();
    let length = renderer.tail_end().max(duration);
    tracing::info!(notes = renderer.note_count(), length, "writing wav");
    let buffer = renderer.write_wav(output, length)?;

    let summary = SpectrumAnalyzer::new().summarize(&buffer)?;
    tracing::info!(
        duration = summary.duration_seconds,
        rms = summary.rms,
        peak = summary.peak,
        dominant_frequency = summary.dominant_frequency,
        "render complete"
    );
    Ok(())
}

/// Holds the pointer down and drags it left to right across the image.
fn perform_sweep(instrument: &mut Instrument<OfflineRenderer>, duration: f64) {
    let (offset_x, offset_y) = instrument.grid().offset();
    let (width, height) = instrument.grid().display_size();
    let steps = (instrument.grid().columns() * SWEEP_STEPS_PER_COLUMN).max(1);
    let dt = duration / f64::from(steps);
    let y = offset_y as f32 + height as f32 / 2.0;
    let x_at = |step: u32| offset_x as f32 + (step as f32 + 0.5) * width as f32 / steps as f32;

    instrument.pointer_down(x_at(0), y);
    for step in 0..steps {
        instrument.pointer_move(x_at(step), y);
        instrument.advance(dt);
    }
    instrument.pointer_up();
}

/// Clicks the centre of every cell in reading order.
fn perform_clicks(instrument: &mut Instrument<OfflineRenderer>, duration: f64) {
    let (offset_x, offset_y) = instrument.grid().offset();
    let centres: Vec<(f32, f32)> = instrument
        .grid()
        .cells()
        .iter()
        .map(|cell| {
            (
                (offset_x + cell.x) as f32 + cell.width as f32 / 2.0,
                (offset_y + cell.y) as f32 + cell.height as f32 / 2.0,
            )
        })
        .collect();
    if centres.is_empty() {
        return;
    }

    let dt = duration / centres.len() as f64;
    for (x, y) in centres {
        instrument.pointer_down(x, y);
        instrument.pointer_up();
        instrument.advance(dt);
    }
}

fn parse_mode(value: &str) -> Result<PlayMode, String> {
    PlayMode::from_name(value).ok_or_else(|| format!("unknown mode `{value}`, expected single or scan"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

const DEFAULT_DURATION: f64 = 4.0;
const SWEEP_STEPS_PER_COLUMN: u32 = 4;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play images as sound", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the cell grid of an image and the sound each cell maps to.
    Inspect {
        /// Image file to reduce.
        image: PathBuf,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Cell edge length in display pixels (10-100).
        #[arg(long)]
        cell_size: Option<u32>,
        /// Canvas x coordinate of a single point to inspect.
        #[arg(long, requires = "y")]
        x: Option<f32>,
        /// Canvas y coordinate of a single point to inspect.
        #[arg(long, requires = "x")]
        y: Option<f32>,
    },
    /// Perform a scripted gesture over an image and write the result to WAV.
    Render {
        /// Image file to play.
        image: PathBuf,
        /// Output path for the rendered WAV file.
        #[arg(short, long)]
        output: PathBuf,
        /// Interaction mode: `single` clicks every cell, `scan` sweeps columns.
        #[arg(short, long, default_value = "single", value_parser = parse_mode)]
        mode: PlayMode,
        /// Length of the gesture in seconds.
        #[arg(short, long, default_value_t = DEFAULT_DURATION)]
        duration: f64,
        /// Optional JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Cell edge length in display pixels (10-100).
        #[arg(long)]
        cell_size: Option<u32>,
    },
}
