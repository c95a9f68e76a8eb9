use std::fmt;

use serde::{Deserialize, Serialize};

use crate::background::Background;
use crate::components::colors::Color;
use crate::components::layers::LayerIndex;

/// Smallest accepted grid dimension (per axis).
pub const MIN_GRID_DIM: u32 = 8;
/// Largest accepted grid dimension (per axis).
pub const MAX_GRID_DIM: u32 = 1024;
/// Accepted range for the rendered size of one cell, in pixels.
pub const MIN_CELL_SIZE: u32 = 1;
pub const MAX_CELL_SIZE: u32 = 64;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    InvalidSize { width: u32, height: u32 },
    Empty,
    NotRectangular { row: usize, expected: usize, found: usize },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::InvalidSize { width, height } => write!(
                f,
                "Grid size {}x{} outside allowed range {}..={}",
                width, height, MIN_GRID_DIM, MAX_GRID_DIM
            ),
            GridError::Empty => write!(f, "Pixel data must be a non-empty 2D array"),
            GridError::NotRectangular { row, expected, found } => write!(
                f,
                "Pixel row {} has {} cells, expected {}",
                row, found, expected
            ),
        }
    }
}

impl std::error::Error for GridError {}

pub fn validate_dimensions(width: u32, height: u32) -> Result<(), GridError> {
    let range = MIN_GRID_DIM..=MAX_GRID_DIM;
    if range.contains(&width) && range.contains(&height) {
        Ok(())
    } else {
        Err(GridError::InvalidSize { width, height })
    }
}

/// Bring a cell size from a file or settings into the accepted range.
pub fn clamp_cell_size(size: u32) -> u32 {
    size.clamp(MIN_CELL_SIZE, MAX_CELL_SIZE)
}

// ============================================================================
// CELL CHANGE
// ============================================================================

/// One cell write, reversible in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellChange {
    pub x: u32,
    pub y: u32,
    pub old_color: Option<Color>,
    pub new_color: Option<Color>,
}

impl CellChange {
    pub fn target(&self, undo: bool) -> Option<Color> {
        if undo { self.old_color } else { self.new_color }
    }
}

// ============================================================================
// PIXEL GRID
// ============================================================================

/// Row-major store of per-cell colours. `None` is an empty (transparent) cell.
///
/// Writes through [`PixelGrid::set_cell`] do not touch the layer index; use
/// the [`CanvasState`] primitives for edits that must stay counted.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<Option<Color>>,
}

impl fmt::Debug for PixelGrid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelGrid")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("painted", &self.pixels.iter().filter(|p| p.is_some()).count())
            .finish()
    }
}

impl PixelGrid {
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        validate_dimensions(width, height)?;
        Ok(Self::blank(width, height))
    }

    fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![None; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn in_bounds(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Colour at (x, y); out-of-bounds reads are empty.
    pub fn get(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels[self.index(x, y)]
    }

    /// Raw write. Returns the previous value, or `None` when out of bounds.
    pub fn set_cell(&mut self, x: u32, y: u32, color: Option<Color>) -> Option<Option<Color>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.index(x, y);
        Some(std::mem::replace(&mut self.pixels[idx], color))
    }

    /// Flat row-major view of every cell.
    pub fn cells(&self) -> &[Option<Color>] {
        &self.pixels
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(Option::is_none)
    }

    /// Coordinates of every cell holding `color`, row-major.
    pub fn positions_of(&self, color: Color) -> Vec<(u32, u32)> {
        let w = self.width as usize;
        self.pixels
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Some(color))
            .map(|(i, _)| ((i % w) as u32, (i / w) as u32))
            .collect()
    }

    /// 4-connected flood fill from (x, y). Returns every change in visitation
    /// order; empty when the seed already holds `fill` or lies out of bounds.
    ///
    /// Neighbours are pushed unconditionally and filtered on pop, so the
    /// visitation order is that of a plain DFS over the four directions
    /// (+x, -x, +y, -y).
    pub fn flood_fill(&mut self, x: u32, y: u32, fill: Option<Color>) -> Vec<CellChange> {
        if x >= self.width || y >= self.height {
            return Vec::new();
        }
        let target = self.get(x, y);
        if target == fill {
            return Vec::new();
        }

        let mut changes = Vec::new();
        let mut visited = vec![false; self.pixels.len()];
        let mut stack: Vec<(i64, i64)> = Vec::with_capacity(1024);
        stack.push((x as i64, y as i64));

        while let Some((cx, cy)) = stack.pop() {
            if !self.in_bounds(cx, cy) {
                continue;
            }
            let idx = self.index(cx as u32, cy as u32);
            if visited[idx] || self.pixels[idx] != target {
                continue;
            }
            visited[idx] = true;

            changes.push(CellChange {
                x: cx as u32,
                y: cy as u32,
                old_color: target,
                new_color: fill,
            });
            self.pixels[idx] = fill;

            stack.push((cx + 1, cy));
            stack.push((cx - 1, cy));
            stack.push((cx, cy + 1));
            stack.push((cx, cy - 1));
        }

        changes
    }

    /// Reallocate to `new_width x new_height`, keeping the overlapping
    /// top-left region.
    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<(), GridError> {
        validate_dimensions(new_width, new_height)?;
        let mut next = Self::blank(new_width, new_height);
        next.copy_overlap_from(self);
        *self = next;
        Ok(())
    }

    /// Translate every cell by whole-cell offsets. Cells pushed past an edge
    /// are dropped.
    pub fn shift(&mut self, dx: i64, dy: i64) {
        let mut next = Self::blank(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if next.in_bounds(nx, ny) {
                    let src = self.pixels[self.index(x, y)];
                    let dst = next.index(nx as u32, ny as u32);
                    next.pixels[dst] = src;
                }
            }
        }
        *self = next;
    }

    pub fn clear(&mut self) {
        self.pixels.fill(None);
    }

    /// Whole-grid copy as `rows[y][x]`.
    pub fn get_all(&self) -> Vec<Vec<Option<Color>>> {
        self.pixels
            .chunks(self.width as usize)
            .map(|row| row.to_vec())
            .collect()
    }

    /// Replace the whole grid from `rows[y][x]`. Data must be a non-empty
    /// rectangle; a rectangle of another size is conformed to this grid's
    /// dimensions (overlap copied, the rest empty). Nothing is modified on
    /// error.
    pub fn set_all(&mut self, rows: &[Vec<Option<Color>>]) -> Result<(), GridError> {
        let row_len = validate_rows(rows)?;
        if rows.len() != self.height as usize || row_len != self.width as usize {
            log::warn!(
                "pixel data {}x{} does not match grid {}x{}, conforming",
                row_len,
                rows.len(),
                self.width,
                self.height
            );
        }
        let mut next = Self::blank(self.width, self.height);
        for (y, row) in rows.iter().enumerate().take(self.height as usize) {
            for (x, color) in row.iter().enumerate().take(self.width as usize) {
                let idx = next.index(x as u32, y as u32);
                next.pixels[idx] = *color;
            }
        }
        *self = next;
        Ok(())
    }

    /// Replace contents with `other`, conformed to this grid's dimensions.
    pub fn restore_from(&mut self, other: &PixelGrid) {
        if other.width == self.width && other.height == self.height {
            self.pixels.clone_from(&other.pixels);
            return;
        }
        let mut next = Self::blank(self.width, self.height);
        next.copy_overlap_from(other);
        *self = next;
    }

    fn copy_overlap_from(&mut self, other: &PixelGrid) {
        let w = self.width.min(other.width);
        let h = self.height.min(other.height);
        for y in 0..h {
            for x in 0..w {
                let dst = self.index(x, y);
                self.pixels[dst] = other.pixels[other.index(x, y)];
            }
        }
    }
}

/// Check that `rows` is a non-empty rectangle; returns the row length.
pub fn validate_rows(rows: &[Vec<Option<Color>>]) -> Result<usize, GridError> {
    let first = rows.first().ok_or(GridError::Empty)?;
    let expected = first.len();
    if expected == 0 {
        return Err(GridError::Empty);
    }
    for (row, cells) in rows.iter().enumerate() {
        if cells.len() != expected {
            return Err(GridError::NotRectangular {
                row,
                expected,
                found: cells.len(),
            });
        }
    }
    Ok(expected)
}

// ============================================================================
// CANVAS STATE - the document context every operation receives
// ============================================================================

/// Per-document display settings that travel with the project file.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplaySettings {
    pub show_grid: bool,
    pub zoom: f32,
    /// 0-100; 100 = full backdrop colour, 0 = black.
    pub fade_to_black: u8,
    /// Rendered size of one cell in pixels. Used by trace sampling and PNG export.
    pub cell_size: u32,
    pub grid_color: Color,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_grid: true,
            zoom: 1.0,
            fade_to_black: 100,
            cell_size: 10,
            grid_color: Color::from_rgb(0, 255, 255),
        }
    }
}

/// Everything one open document owns: the grid, its derived layer index,
/// the tracing background and document-level colours.
#[derive(Clone, Debug)]
pub struct CanvasState {
    pub grid: PixelGrid,
    pub layers: LayerIndex,
    pub background: Background,
    /// Backdrop colour behind the grid.
    pub background_color: Color,
    /// Brush colour.
    pub current_color: Color,
    pub display: DisplaySettings,
    /// Bumped on every mutation; renderers redraw when it changes.
    pub dirty_generation: u64,
}

impl CanvasState {
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        Ok(Self::from_grid(PixelGrid::new(width, height)?))
    }

    /// Wrap an existing grid, deriving the layer index from it.
    pub fn from_grid(grid: PixelGrid) -> Self {
        let layers = LayerIndex::from_grid(&grid);
        Self {
            grid,
            layers,
            background: Background::new(),
            background_color: Color::WHITE,
            current_color: Color::BLACK,
            display: DisplaySettings::default(),
            dirty_generation: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    /// Rendered cell size, clamped to the accepted range.
    pub fn cell_size(&self) -> u32 {
        clamp_cell_size(self.display.cell_size)
    }

    /// Request a redraw.
    pub fn mark_dirty(&mut self) {
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
    }

    /// Write one cell and account for it in the layer index. Returns the
    /// change, or `None` when out of bounds or unchanged.
    pub fn write_cell(&mut self, x: u32, y: u32, color: Option<Color>) -> Option<CellChange> {
        if self.grid.get(x, y) == color {
            return None;
        }
        let old = self.grid.set_cell(x, y, color)?;
        self.layers.note_cell_change(old, color);
        Some(CellChange {
            x,
            y,
            old_color: old,
            new_color: color,
        })
    }

    /// Replay `changes` backward (`undo`) or forward, keeping layers in step.
    pub fn apply_changes(&mut self, changes: &[CellChange], undo: bool) {
        if undo {
            for change in changes.iter().rev() {
                self.write_cell(change.x, change.y, change.old_color);
            }
        } else {
            for change in changes {
                self.write_cell(change.x, change.y, change.new_color);
            }
        }
    }

    /// Flood fill through the grid, then account for the filled cells.
    pub fn flood_fill(&mut self, x: u32, y: u32, fill: Option<Color>) -> Vec<CellChange> {
        let changes = self.grid.flood_fill(x, y, fill);
        for change in &changes {
            self.layers.note_cell_change(change.old_color, change.new_color);
        }
        changes
    }

    /// Bulk replacement: copy `snapshot` into the grid and rescan layers.
    pub fn replace_pixels(&mut self, snapshot: &PixelGrid) {
        self.grid.restore_from(snapshot);
        self.layers.rescan(&self.grid);
    }

    /// Empty every cell and drop every layer.
    pub fn clear_pixels(&mut self) {
        self.grid.clear();
        self.layers.clear();
    }

    /// Move `cells` from `from` to `to`. When `to` has no layer yet and the
    /// cells cover the whole `from` layer, the layer entry is renamed so its
    /// visibility carries over.
    pub fn recolor_cells(&mut self, cells: &[(u32, u32)], from: Color, to: Color) {
        let whole_layer = self.layers.count(from) == cells.len();
        if whole_layer && !self.layers.contains(to) {
            for &(x, y) in cells {
                self.grid.set_cell(x, y, Some(to));
            }
            self.layers.rename_color(from, to);
        } else {
            for &(x, y) in cells {
                if self.grid.get(x, y) == Some(from) {
                    self.write_cell(x, y, Some(to));
                }
            }
        }
    }

    /// Colours currently hidden.
    pub fn hidden_colors(&self) -> Vec<Color> {
        self.layers
            .iter()
            .filter(|(_, info)| !info.visible)
            .map(|(c, _)| *c)
            .collect()
    }

    /// Colours from `hidden_before` whose layer no longer exists. An entry
    /// that deleted them keeps this list so undo can hide them again.
    pub fn dropped_hidden(&self, hidden_before: &[Color]) -> Vec<Color> {
        hidden_before
            .iter()
            .copied()
            .filter(|c| !self.layers.contains(*c))
            .collect()
    }

    /// Re-hide `colors` that exist after an undo brought them back.
    pub fn restore_hidden(&mut self, colors: &[Color]) {
        for color in colors {
            self.layers.set_visibility(*color, false);
        }
    }

    /// True when the incremental layer counts match a fresh scan.
    pub fn layers_consistent(&self) -> bool {
        let scanned = LayerIndex::from_grid(&self.grid);
        scanned.len() == self.layers.len()
            && scanned
                .iter()
                .all(|(color, info)| self.layers.count(*color) == info.count)
    }

    /// Backdrop as rendered, after the fade-to-black setting.
    pub fn backdrop_color(&self) -> Color {
        self.background_color.faded_to_black(self.display.fade_to_black)
    }

    /// Colour shown at (x, y): `None` for empty or hidden cells.
    pub fn visible_color(&self, x: u32, y: u32) -> Option<Color> {
        let color = self.grid.get(x, y)?;
        self.layers.is_visible(Some(color)).then_some(color)
    }
}
