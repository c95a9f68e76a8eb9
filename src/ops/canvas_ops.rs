// ============================================================================
// CANVAS-LEVEL OPERATIONS - one user action, at most one history entry
// ============================================================================

use crate::background::BackgroundTransform;
use crate::canvas::{CanvasState, GridError};
use crate::components::colors::Color;
use crate::components::history::{HistoryEntry, HistoryManager, TransformKind};

/// Write `color` (or erase with `None`) at (x, y). Returns `true` when the
/// cell changed and an entry was recorded.
pub fn paint_color(
    state: &mut CanvasState,
    history: &mut HistoryManager,
    x: u32,
    y: u32,
    color: Option<Color>,
) -> bool {
    let hidden_before = state.hidden_colors();
    let Some(change) = state.write_cell(x, y, color) else {
        return false;
    };
    let hidden = state.dropped_hidden(&hidden_before);
    history.push(HistoryEntry::Paint { change, hidden });
    state.mark_dirty();
    true
}

/// Brush: paint the current colour.
pub fn paint(state: &mut CanvasState, history: &mut HistoryManager, x: u32, y: u32) -> bool {
    let color = state.current_color;
    paint_color(state, history, x, y, Some(color))
}

pub fn erase(state: &mut CanvasState, history: &mut HistoryManager, x: u32, y: u32) -> bool {
    paint_color(state, history, x, y, None)
}

/// Fill the region under (x, y) with `fill`. Returns the number of cells changed.
pub fn flood_fill(
    state: &mut CanvasState,
    history: &mut HistoryManager,
    x: u32,
    y: u32,
    fill: Option<Color>,
) -> usize {
    let hidden_before = state.hidden_colors();
    let changes = state.flood_fill(x, y, fill);
    if changes.is_empty() {
        return 0;
    }
    let count = changes.len();
    let hidden = state.dropped_hidden(&hidden_before);
    history.push(HistoryEntry::Fill { changes, hidden });
    state.mark_dirty();
    count
}

/// Empty the whole grid. Nothing is recorded when it is already blank.
pub fn clear_canvas(state: &mut CanvasState, history: &mut HistoryManager) -> bool {
    if state.grid.is_blank() {
        return false;
    }
    let entry = HistoryEntry::Clear {
        previous: state.grid.clone(),
        hidden: state.hidden_colors(),
    };
    state.clear_pixels();
    history.push(entry);
    state.mark_dirty();
    true
}

/// Empty every cell of `color`. Returns the number of cells cleared.
pub fn clear_layer(state: &mut CanvasState, history: &mut HistoryManager, color: Color) -> usize {
    let Some(info) = state.layers.get(color).copied() else {
        return 0;
    };
    let cells = state.grid.positions_of(color);
    for &(x, y) in &cells {
        state.write_cell(x, y, None);
    }
    let count = cells.len();
    history.push(HistoryEntry::ClearLayer {
        color,
        cells,
        was_visible: info.visible,
    });
    state.mark_dirty();
    count
}

/// Recolour the `old` layer to `new`. Merges into `new` when it already
/// exists; otherwise the layer entry moves with its visibility.
pub fn change_layer_color(state: &mut CanvasState, history: &mut HistoryManager, old: Color, new: Color) -> bool {
    let Some(info) = state.layers.get(old).copied() else {
        return false;
    };
    if old == new {
        return false;
    }
    let cells = state.grid.positions_of(old);
    state.recolor_cells(&cells, old, new);
    if state.current_color == old {
        state.current_color = new;
    }
    history.push(HistoryEntry::ChangeLayerColor {
        old_color: old,
        new_color: new,
        cells,
        was_visible: info.visible,
    });
    state.mark_dirty();
    true
}

/// Show or hide a layer. Not recorded in history.
pub fn toggle_layer_visibility(state: &mut CanvasState, color: Color) -> Option<bool> {
    let visible = state.layers.toggle_visibility(color)?;
    state.mark_dirty();
    Some(visible)
}

pub fn change_background_color(state: &mut CanvasState, history: &mut HistoryManager, color: Color) -> bool {
    let old = state.background_color;
    if old == color {
        return false;
    }
    state.background_color = color;
    history.push(HistoryEntry::ChangeBackgroundColor {
        old_color: old,
        new_color: color,
    });
    state.mark_dirty();
    true
}

/// Decode and install a reference image. Loading is not an undoable edit.
pub fn load_background(state: &mut CanvasState, bytes: &[u8]) -> Result<(), image::ImageError> {
    state.background.load_from_memory(bytes)?;
    state.mark_dirty();
    Ok(())
}

/// Drop the reference image. With `skip_history` the removal is not
/// recorded (used when resetting the document).
pub fn remove_background(state: &mut CanvasState, history: &mut HistoryManager, skip_history: bool) -> bool {
    let Some(saved) = state.background.remove() else {
        return false;
    };
    if !skip_history {
        history.push(HistoryEntry::RemoveBackground { saved });
    }
    state.mark_dirty();
    true
}

/// Set the background transform outright, recording the change.
pub fn transform_background(
    state: &mut CanvasState,
    history: &mut HistoryManager,
    kind: TransformKind,
    transform: BackgroundTransform,
) -> bool {
    let start = state.background.transform;
    state.background.transform = transform;
    commit_background_transform(state, history, kind, start)
}

/// Record a drag that has been updating the transform live since `start`.
/// Nothing is recorded when the transform ended where it began.
pub fn commit_background_transform(
    state: &mut CanvasState,
    history: &mut HistoryManager,
    kind: TransformKind,
    start: BackgroundTransform,
) -> bool {
    let end = state.background.transform;
    if !state.background.has_image() || start == end {
        return false;
    }
    history.push(HistoryEntry::BackgroundTransform {
        kind,
        old_transform: start,
        new_transform: end,
    });
    state.mark_dirty();
    true
}

/// Move every cell by (dx, dy) whole cells. Cells pushed off the grid are lost.
pub fn shift_pixels(state: &mut CanvasState, history: &mut HistoryManager, dx: i64, dy: i64) -> bool {
    if (dx == 0 && dy == 0) || state.grid.is_blank() {
        return false;
    }
    let old_pixels = state.grid.clone();
    let hidden = state.hidden_colors();
    state.grid.shift(dx, dy);
    state.layers.rescan(&state.grid);
    if state.grid == old_pixels {
        return false;
    }
    history.push(HistoryEntry::ShiftPixels {
        old_pixels,
        new_pixels: state.grid.clone(),
        hidden,
    });
    state.mark_dirty();
    true
}

/// Change the grid size, keeping the top-left overlap. Not undoable.
pub fn resize_canvas(state: &mut CanvasState, width: u32, height: u32) -> Result<(), GridError> {
    if width == state.width() && height == state.height() {
        return Ok(());
    }
    state.grid.resize(width, height)?;
    state.layers.rescan(&state.grid);
    log::info!("canvas resized to {}x{}", width, height);
    state.mark_dirty();
    Ok(())
}

/// Eyedropper: the painted colour at (x, y), else the background image
/// under the cell centre. A hit becomes the current colour.
pub fn pick_color(state: &mut CanvasState, x: u32, y: u32) -> Option<Color> {
    if x >= state.width() || y >= state.height() {
        return None;
    }
    let picked = state.grid.get(x, y).or_else(|| {
        state
            .background
            .color_at_cell(x, y, state.width(), state.height(), state.cell_size())
    })?;
    state.current_color = picked;
    Some(picked)
}

/// Reset the document in place: blank grid, no layers, no reference image,
/// default colours, empty history.
pub fn new_project(state: &mut CanvasState, history: &mut HistoryManager) {
    state.clear_pixels();
    remove_background(state, history, true);
    state.background.transform = BackgroundTransform::default();
    state.background_color = Color::WHITE;
    state.current_color = Color::BLACK;
    state.display.fade_to_black = 100;
    history.clear();
    log::info!("new project {}x{}", state.width(), state.height());
    state.mark_dirty();
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use test_log::test;

    fn red() -> Color {
        Color::from_rgb(255, 0, 0)
    }

    fn blue() -> Color {
        Color::from_rgb(0, 0, 255)
    }

    fn setup() -> (CanvasState, HistoryManager) {
        (CanvasState::new(8, 8).unwrap(), HistoryManager::new())
    }

    #[test]
    fn repeated_paint_records_once() {
        let (mut state, mut history) = setup();
        state.current_color = red();
        assert!(paint(&mut state, &mut history, 1, 1));
        assert!(!paint(&mut state, &mut history, 1, 1));
        assert!(!paint(&mut state, &mut history, 99, 1));
        assert_eq!(history.len(), 1);
        assert!(erase(&mut state, &mut history, 1, 1));
        assert!(state.layers.is_empty());
        assert_eq!(history.undo_description().as_deref(), Some("Erase (1, 1)"));
    }

    #[test]
    fn fill_and_undo_restore_grid() {
        let (mut state, mut history) = setup();
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        let before = state.grid.clone();
        assert_eq!(flood_fill(&mut state, &mut history, 4, 4, Some(blue())), 63);
        assert_eq!(state.layers.count(blue()), 63);
        history.undo(&mut state);
        assert_eq!(state.grid, before);
        assert!(!state.layers.contains(blue()));
        assert_eq!(flood_fill(&mut state, &mut history, 0, 0, Some(red())), 0);
    }

    #[test]
    fn clear_is_skipped_on_blank_canvas() {
        let (mut state, mut history) = setup();
        assert!(!clear_canvas(&mut state, &mut history));
        paint_color(&mut state, &mut history, 2, 2, Some(red()));
        assert!(clear_canvas(&mut state, &mut history));
        assert!(state.grid.is_blank());
        history.undo(&mut state);
        assert_eq!(state.grid.get(2, 2), Some(red()));
        assert!(state.layers_consistent());
    }

    #[test]
    fn clear_layer_undo_restores_visibility() {
        let (mut state, mut history) = setup();
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        paint_color(&mut state, &mut history, 5, 5, Some(red()));
        paint_color(&mut state, &mut history, 1, 0, Some(blue()));
        toggle_layer_visibility(&mut state, red());

        assert_eq!(clear_layer(&mut state, &mut history, red()), 2);
        assert!(!state.layers.contains(red()));
        assert_eq!(clear_layer(&mut state, &mut history, red()), 0);

        history.undo(&mut state);
        assert_eq!(state.layers.count(red()), 2);
        assert!(!state.layers.is_visible(Some(red())));
        history.redo(&mut state);
        assert_eq!(state.grid.get(5, 5), None);
        assert_eq!(state.layers.count(blue()), 1);
    }

    #[test]
    fn change_layer_color_renames_or_merges() {
        let (mut state, mut history) = setup();
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        paint_color(&mut state, &mut history, 1, 0, Some(red()));
        toggle_layer_visibility(&mut state, red());
        let green = Color::from_rgb(0, 255, 0);

        assert!(change_layer_color(&mut state, &mut history, red(), green));
        assert!(!state.layers.is_visible(Some(green)));
        assert_eq!(state.layers.count(green), 2);
        history.undo(&mut state);
        assert!(!state.layers.is_visible(Some(red())));
        assert_eq!(state.grid.get(1, 0), Some(red()));

        // Merge into an existing layer, then undo splits them again
        paint_color(&mut state, &mut history, 4, 4, Some(blue()));
        let before = state.grid.clone();
        assert!(change_layer_color(&mut state, &mut history, red(), blue()));
        assert_eq!(state.layers.count(blue()), 3);
        assert!(state.layers.is_visible(Some(blue())));
        history.undo(&mut state);
        assert_eq!(state.grid, before);
        assert_eq!(state.layers.count(red()), 2);
        assert!(state.layers_consistent());

        assert!(!change_layer_color(&mut state, &mut history, red(), red()));
        assert!(!change_layer_color(&mut state, &mut history, green, red()));
    }

    #[test]
    fn undo_restores_hidden_layer_overwritten_by_paint_or_fill() {
        let (mut state, mut history) = setup();
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        toggle_layer_visibility(&mut state, red());
        let before = state.layers.clone();

        assert!(paint_color(&mut state, &mut history, 0, 0, Some(blue())));
        assert!(!state.layers.contains(red()));
        history.undo(&mut state);
        assert_eq!(state.layers, before);

        // Fill over the lone hidden cell, then undo
        assert_eq!(flood_fill(&mut state, &mut history, 0, 0, Some(blue())), 1);
        history.undo(&mut state);
        assert_eq!(state.layers, before);
        assert!(!state.layers.is_visible(Some(red())));
        history.redo(&mut state);
        assert_eq!(state.grid.get(0, 0), Some(blue()));
    }

    #[test]
    fn merge_undo_restores_hidden_source_layer() {
        let (mut state, mut history) = setup();
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        paint_color(&mut state, &mut history, 1, 1, Some(blue()));
        toggle_layer_visibility(&mut state, red());
        let before = state.layers.clone();

        assert!(change_layer_color(&mut state, &mut history, red(), blue()));
        assert_eq!(state.layers.count(blue()), 2);
        history.undo(&mut state);
        assert_eq!(state.layers, before);
        assert!(!state.layers.is_visible(Some(red())));
    }

    #[test]
    fn shift_is_undoable() {
        let (mut state, mut history) = setup();
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        paint_color(&mut state, &mut history, 7, 0, Some(blue()));
        let before = state.grid.clone();

        assert!(shift_pixels(&mut state, &mut history, 1, 2));
        assert_eq!(state.grid.get(1, 2), Some(red()));
        assert!(!state.layers.contains(blue()));
        history.undo(&mut state);
        assert_eq!(state.grid, before);
        assert_eq!(state.layers.count(blue()), 1);
        assert!(!shift_pixels(&mut state, &mut history, 0, 0));
    }

    #[test]
    fn background_edits_round_trip() {
        let (mut state, mut history) = setup();
        let image = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        state.background.set_image(image);

        // No change, no entry
        assert!(!transform_background(&mut state, &mut history, TransformKind::Move, BackgroundTransform::default()));
        let moved = BackgroundTransform { x: 12.0, ..Default::default() };
        assert!(transform_background(&mut state, &mut history, TransformKind::Move, moved));
        assert!(change_background_color(&mut state, &mut history, blue()));
        assert!(remove_background(&mut state, &mut history, false));
        assert!(!state.background.has_image());

        history.undo(&mut state);
        assert!(state.background.has_image());
        assert_eq!(state.background.transform, moved);
        history.undo(&mut state);
        assert_eq!(state.background_color, Color::WHITE);
        history.undo(&mut state);
        assert_eq!(state.background.transform, BackgroundTransform::default());
        assert!(state.grid.is_blank());
    }

    #[test]
    fn resize_rescans_and_validates() {
        let (mut state, mut history) = setup();
        paint_color(&mut state, &mut history, 7, 7, Some(red()));
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        resize_canvas(&mut state, 16, 8).unwrap();
        assert_eq!(state.layers.count(red()), 2);
        assert!(resize_canvas(&mut state, 4, 8).is_err());
        assert_eq!(state.width(), 16);
        // Resizing is not an edit
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn eyedropper_prefers_painted_cells() {
        let (mut state, mut history) = setup();
        state.background.set_image(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255])));
        paint_color(&mut state, &mut history, 0, 0, Some(red()));

        assert_eq!(pick_color(&mut state, 0, 0), Some(red()));
        assert_eq!(pick_color(&mut state, 3, 3), Some(blue()));
        assert_eq!(state.current_color, blue());
        assert_eq!(pick_color(&mut state, 30, 3), None);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn new_project_resets_everything() {
        let (mut state, mut history) = setup();
        state.background.set_image(RgbaImage::new(2, 2));
        paint_color(&mut state, &mut history, 0, 0, Some(red()));
        change_background_color(&mut state, &mut history, blue());
        state.current_color = red();

        new_project(&mut state, &mut history);
        assert!(state.grid.is_blank());
        assert!(state.layers.is_empty());
        assert!(!state.background.has_image());
        assert_eq!(state.background_color, Color::WHITE);
        assert_eq!(state.current_color, Color::BLACK);
        assert!(history.is_empty());
        assert!(!history.can_undo());
    }
}
