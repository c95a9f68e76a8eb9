use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::canvas::PixelGrid;
use crate::components::colors::Color;

/// Per-colour bookkeeping. A layer here is a colour group, not a stacking
/// level: every cell holding `color` belongs to the same layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    pub visible: bool,
    /// Number of grid cells currently holding the colour. Always > 0 while
    /// the entry exists.
    pub count: usize,
}

/// Flattened layer row, as stored in project files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub color: Color,
    pub visible: bool,
    pub count: usize,
}

/// Colour -> {visible, count} index kept in step with the pixel grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayerIndex {
    layers: BTreeMap<Color, LayerInfo>,
}

impl LayerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from scratch for `grid`.
    pub fn from_grid(grid: &PixelGrid) -> Self {
        let mut index = Self::new();
        index.rescan(grid);
        index
    }

    /// Adjust the count for `color`. Creates a visible entry on a positive
    /// delta, drops the entry once the count reaches zero.
    pub fn note_color_delta(&mut self, color: Color, delta: isize) {
        if delta == 0 {
            return;
        }
        match self.layers.get_mut(&color) {
            Some(info) => {
                let next = info.count as isize + delta;
                if next <= 0 {
                    self.layers.remove(&color);
                } else {
                    info.count = next as usize;
                }
            }
            None if delta > 0 => {
                self.layers.insert(
                    color,
                    LayerInfo {
                        visible: true,
                        count: delta as usize,
                    },
                );
            }
            None => {
                log::warn!("negative delta {} for untracked layer {}", delta, color);
            }
        }
    }

    /// Account for one cell changing from `old` to `new`.
    pub fn note_cell_change(&mut self, old: Option<Color>, new: Option<Color>) {
        if old == new {
            return;
        }
        if let Some(old) = old {
            self.note_color_delta(old, -1);
        }
        if let Some(new) = new {
            self.note_color_delta(new, 1);
        }
    }

    pub fn set_visibility(&mut self, color: Color, visible: bool) {
        if let Some(info) = self.layers.get_mut(&color) {
            info.visible = visible;
        }
    }

    /// Flip visibility. Returns the new state, or `None` if no such layer.
    pub fn toggle_visibility(&mut self, color: Color) -> Option<bool> {
        let info = self.layers.get_mut(&color)?;
        info.visible = !info.visible;
        Some(info.visible)
    }

    /// Empty cells and untracked colours are always visible.
    pub fn is_visible(&self, color: Option<Color>) -> bool {
        match color {
            None => true,
            Some(c) => self.layers.get(&c).is_none_or(|info| info.visible),
        }
    }

    /// Recount every colour in `grid`, keeping visibility flags for colours
    /// that survive.
    pub fn rescan(&mut self, grid: &PixelGrid) {
        let mut counts: BTreeMap<Color, usize> = BTreeMap::new();
        for color in grid.cells().iter().flatten() {
            *counts.entry(*color).or_insert(0) += 1;
        }

        let previous = std::mem::take(&mut self.layers);
        self.layers = counts
            .into_iter()
            .map(|(color, count)| {
                let visible = previous.get(&color).is_none_or(|info| info.visible);
                (color, LayerInfo { visible, count })
            })
            .collect();
    }

    /// Move `old`'s entry to `new` verbatim. If `new` already exists the
    /// counts merge and `new` keeps its own visibility.
    pub fn rename_color(&mut self, old: Color, new: Color) {
        if old == new {
            return;
        }
        let Some(info) = self.layers.remove(&old) else {
            return;
        };
        match self.layers.get_mut(&new) {
            Some(existing) => existing.count += info.count,
            None => {
                self.layers.insert(new, info);
            }
        }
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    pub fn get(&self, color: Color) -> Option<&LayerInfo> {
        self.layers.get(&color)
    }

    pub fn contains(&self, color: Color) -> bool {
        self.layers.contains_key(&color)
    }

    pub fn count(&self, color: Color) -> usize {
        self.layers.get(&color).map_or(0, |info| info.count)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Color, &LayerInfo)> {
        self.layers.iter()
    }

    pub fn entries(&self) -> Vec<LayerEntry> {
        self.layers
            .iter()
            .map(|(color, info)| LayerEntry {
                color: *color,
                visible: info.visible,
                count: info.count,
            })
            .collect()
    }

    /// Apply saved visibility flags to colours that currently exist.
    pub fn restore_visibility(&mut self, saved: &[LayerEntry]) {
        for entry in saved {
            self.set_visibility(entry.color, entry.visible);
        }
    }
}
