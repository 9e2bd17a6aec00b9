//! Reduces a raster image to a grid of averaged colour cells.
//!
//! The image is fitted into a fixed canvas footprint (shrunk when larger,
//! never enlarged) and centred. The displayed area is then cut into square
//! cells; the last row and column are clipped to the image edge rather than
//! padded. Every cell reports the arithmetic mean of the source pixels that
//! project into it.
//!
//! The grid is rebuilt wholesale whenever the image or the cell size
//! changes. There are no partial updates, so a lookup never observes a mix
//! of stale and fresh cells.

use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::color::{Hsv, Rgb};
use crate::config::GridConfig;

pub const MIN_CELL_SIZE: u32 = 10;
pub const MAX_CELL_SIZE: u32 = 100;
pub const DEFAULT_CELL_SIZE: u32 = 50;

/// Any sampleable 2D colour source.
pub trait PixelSource {
    /// Width and height in pixels.
    fn dimensions(&self) -> (u32, u32);
    /// Colour at `(x, y)`; callers stay within [`PixelSource::dimensions`].
    fn pixel_rgb(&self, x: u32, y: u32) -> Rgb;
}

impl PixelSource for RgbImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbImage::dimensions(self)
    }

    fn pixel_rgb(&self, x: u32, y: u32) -> Rgb {
        let [r, g, b] = self.get_pixel(x, y).0;
        Rgb::new(r, g, b)
    }
}

impl PixelSource for RgbaImage {
    fn dimensions(&self) -> (u32, u32) {
        RgbaImage::dimensions(self)
    }

    fn pixel_rgb(&self, x: u32, y: u32) -> Rgb {
        let [r, g, b, _] = self.get_pixel(x, y).0;
        Rgb::new(r, g, b)
    }
}

impl PixelSource for DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        GenericImageView::dimensions(self)
    }

    fn pixel_rgb(&self, x: u32, y: u32) -> Rgb {
        let [r, g, b, _] = self.get_pixel(x, y).0;
        Rgb::new(r, g, b)
    }
}

/// One element of the pixelated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Grid column index.
    pub column: u32,
    /// Grid row index.
    pub row: u32,
    /// Left edge in display pixels, relative to the image's top-left corner.
    pub x: u32,
    /// Top edge in display pixels, relative to the image's top-left corner.
    pub y: u32,
    /// Width in display pixels; smaller than the cell size on the last column.
    pub width: u32,
    /// Height in display pixels; smaller than the cell size on the last row.
    pub height: u32,
    pub rgb: Rgb,
    pub hsv: Hsv,
}

/// Placement of the displayed image inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayLayout {
    pub width: u32,
    pub height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    /// Display pixels per source pixel, at most 1.
    pub scale: f64,
}

impl DisplayLayout {
    /// Fits `source` into `canvas` preserving the aspect ratio.
    pub fn fit(source: (u32, u32), canvas: (u32, u32)) -> Option<Self> {
        let (width, height) = source;
        if width == 0 || height == 0 {
            return None;
        }
        let canvas_w = canvas.0.max(1);
        let canvas_h = canvas.1.max(1);

        let scale = (canvas_w as f64 / width as f64)
            .min(canvas_h as f64 / height as f64)
            .min(1.0);
        let display_w = ((width as f64 * scale).round() as u32).clamp(1, canvas_w);
        let display_h = ((height as f64 * scale).round() as u32).clamp(1, canvas_h);

        Some(Self {
            width: display_w,
            height: display_h,
            offset_x: (canvas_w - display_w) / 2,
            offset_y: (canvas_h - display_h) / 2,
            scale,
        })
    }
}

/// Owner of the current image and its cell grid.
#[derive(Debug)]
pub struct PixelGrid {
    cell_size: u32,
    canvas: (u32, u32),
    image: Option<RgbImage>,
    layout: Option<DisplayLayout>,
    columns: u32,
    rows: u32,
    cells: Vec<Cell>,
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self::new(&GridConfig::default())
    }
}

impl PixelGrid {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            cell_size: clamp_cell_size(config.cell_size),
            canvas: (config.canvas_width.max(1), config.canvas_height.max(1)),
            image: None,
            layout: None,
            columns: 0,
            rows: 0,
            cells: Vec::new(),
        }
    }

    /// Takes a copy of `source` and rebuilds the grid from it.
    pub fn load<S: PixelSource + ?Sized>(&mut self, source: &S) {
        let (width, height) = source.dimensions();
        let image = RgbImage::from_fn(width, height, |x, y| {
            let Rgb { r, g, b } = source.pixel_rgb(x, y);
            image::Rgb([r, g, b])
        });
        self.image = Some(image);
        self.rebuild();
    }

    /// Drops the image and every cell.
    pub fn clear(&mut self) {
        self.image = None;
        self.layout = None;
        self.columns = 0;
        self.rows = 0;
        self.cells.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.layout.is_some()
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    /// Changes the cell size (clamped to the allowed range) and rebuilds the
    /// grid when an image is loaded.
    pub fn set_cell_size(&mut self, size: u32) {
        let clamped = clamp_cell_size(size);
        if clamped != size {
            tracing::debug!(requested = size, applied = clamped, "cell size clamped");
        }
        self.cell_size = clamped;
        if self.image.is_some() {
            self.rebuild();
        }
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn layout(&self) -> Option<DisplayLayout> {
        self.layout
    }

    /// Top-left corner of the displayed image inside the canvas.
    pub fn offset(&self) -> (u32, u32) {
        self.layout
            .map(|layout| (layout.offset_x, layout.offset_y))
            .unwrap_or((0, 0))
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.layout
            .map(|layout| (layout.width, layout.height))
            .unwrap_or((0, 0))
    }

    /// Converts a canvas coordinate into image-relative display pixels.
    /// Non-finite coordinates have no image position.
    pub fn to_image_coords(&self, canvas_x: f32, canvas_y: f32) -> Option<(i32, i32)> {
        if !(canvas_x.is_finite() && canvas_y.is_finite()) {
            return None;
        }
        let (offset_x, offset_y) = self.offset();
        Some((
            (canvas_x - offset_x as f32).floor() as i32,
            (canvas_y - offset_y as f32).floor() as i32,
        ))
    }

    pub fn cell(&self, column: u32, row: u32) -> Option<&Cell> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        self.cells.get((row * self.columns + column) as usize)
    }

    /// Cell containing the image-relative point `(x, y)`.
    pub fn cell_at(&self, x: i32, y: i32) -> Option<&Cell> {
        let column = self.column_index(x)?;
        let row = self.row_index(y)?;
        self.cell(column, row)
    }

    /// Every cell of the column containing image-relative `x`, top to bottom.
    pub fn column_at(&self, x: i32) -> Vec<&Cell> {
        match self.column_index(x) {
            Some(column) => (0..self.rows)
                .filter_map(|row| self.cell(column, row))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Column index for image-relative `x`, if it falls on the image.
    pub fn column_index(&self, x: i32) -> Option<u32> {
        let layout = self.layout?;
        let x = u32::try_from(x).ok()?;
        (x < layout.width).then(|| x / self.cell_size)
    }

    fn row_index(&self, y: i32) -> Option<u32> {
        let layout = self.layout?;
        let y = u32::try_from(y).ok()?;
        (y < layout.height).then(|| y / self.cell_size)
    }

    fn rebuild(&mut self) {
        let Some(image) = self.image.as_ref() else {
            return;
        };
        let Some(layout) = DisplayLayout::fit(PixelSource::dimensions(image), self.canvas) else {
            self.layout = None;
            self.columns = 0;
            self.rows = 0;
            self.cells.clear();
            return;
        };

        let (columns, rows, cells) = build_cells(image, &layout, self.cell_size);
        tracing::info!(
            columns,
            rows,
            cell_size = self.cell_size,
            display_width = layout.width,
            display_height = layout.height,
            "pixel grid rebuilt"
        );
        self.layout = Some(layout);
        self.columns = columns;
        self.rows = rows;
        self.cells = cells;
    }
}

pub fn clamp_cell_size(size: u32) -> u32 {
    size.clamp(MIN_CELL_SIZE, MAX_CELL_SIZE)
}

/// Partitions the display area into cells and averages each one.
pub fn build_cells<S: PixelSource + ?Sized>(
    source: &S,
    layout: &DisplayLayout,
    cell_size: u32,
) -> (u32, u32, Vec<Cell>) {
    let cell_size = cell_size.max(1);
    let columns = layout.width.div_ceil(cell_size);
    let rows = layout.height.div_ceil(cell_size);
    let mut cells = Vec::with_capacity((columns * rows) as usize);

    for row in 0..rows {
        for column in 0..columns {
            let x = column * cell_size;
            let y = row * cell_size;
            let width = cell_size.min(layout.width - x);
            let height = cell_size.min(layout.height - y);

            let rgb = average_region(source, layout, x, y, width, height);
            cells.push(Cell {
                column,
                row,
                x,
                y,
                width,
                height,
                rgb,
                hsv: rgb.to_hsv(),
            });
        }
    }

    (columns, rows, cells)
}

/// Mean colour of the source pixels that project onto a display rectangle.
fn average_region<S: PixelSource + ?Sized>(
    source: &S,
    layout: &DisplayLayout,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Rgb {
    let (source_w, source_h) = source.dimensions();
    let (display_w, display_h, scale) = (layout.width, layout.height, layout.scale);
    let (x0, x1) = source_span(x, width, display_w, scale, source_w);
    let (y0, y1) = source_span(y, height, display_h, scale, source_h);

    let mut sum_r = 0u64;
    let mut sum_g = 0u64;
    let mut sum_b = 0u64;
    for sy in y0..y1 {
        for sx in x0..x1 {
            let pixel = source.pixel_rgb(sx, sy);
            sum_r += u64::from(pixel.r);
            sum_g += u64::from(pixel.g);
            sum_b += u64::from(pixel.b);
        }
    }

    let count = u64::from(x1 - x0) * u64::from(y1 - y0);
    if count == 0 {
        return Rgb::default();
    }
    let mean = |sum: u64| ((sum + count / 2) / count) as u8;
    Rgb::new(mean(sum_r), mean(sum_g), mean(sum_b))
}

/// Source pixel range `[begin, end)` projecting onto display pixels
/// `[start, start + len)`. Adjacent cells share their boundary, so every
/// source pixel lands in exactly one cell; the last cell runs to the edge.
fn source_span(start: u32, len: u32, display_len: u32, scale: f64, limit: u32) -> (u32, u32) {
    let project = |display: u32| (display as f64 / scale).floor() as u32;
    let begin = project(start).min(limit.saturating_sub(1));
    let end = if start + len >= display_len {
        limit
    } else {
        project(start + len).min(limit)
    };
    (begin, end.max(begin + 1).min(limit.max(1)))
}
