use crate::background::{BackgroundSnapshot, BackgroundTransform};
use crate::canvas::{CanvasState, CellChange, PixelGrid};
use crate::components::colors::Color;

// ============================================================================
// HISTORY ENTRY - one undoable user action
// ============================================================================

/// Which background drag produced a transform entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    Move,
    Resize,
    Rotate,
}

/// One reversible action. Each variant carries everything needed to apply
/// it in either direction against the current canvas.
///
/// Entries that write cells also keep `hidden`: colours whose hidden layer
/// the edit deleted. Undo recreates those layers and hides them again.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoryEntry {
    Paint {
        change: CellChange,
        hidden: Vec<Color>,
    },
    Fill {
        changes: Vec<CellChange>,
        hidden: Vec<Color>,
    },
    /// Whole-canvas clear. Stores the full grid it replaced.
    Clear {
        previous: PixelGrid,
        hidden: Vec<Color>,
    },
    /// Every cell of one colour emptied.
    ClearLayer {
        color: Color,
        cells: Vec<(u32, u32)>,
        was_visible: bool,
    },
    ChangeLayerColor {
        old_color: Color,
        new_color: Color,
        cells: Vec<(u32, u32)>,
        /// Visibility of the `old_color` layer before the change.
        was_visible: bool,
    },
    ChangeBackgroundColor {
        old_color: Color,
        new_color: Color,
    },
    RemoveBackground {
        saved: BackgroundSnapshot,
    },
    ShiftPixels {
        old_pixels: PixelGrid,
        new_pixels: PixelGrid,
        hidden: Vec<Color>,
    },
    BackgroundTransform {
        kind: TransformKind,
        old_transform: BackgroundTransform,
        new_transform: BackgroundTransform,
    },
    Trace {
        changes: Vec<CellChange>,
        hidden: Vec<Color>,
    },
}

impl HistoryEntry {
    pub fn undo(&self, canvas: &mut CanvasState) {
        self.apply(canvas, true);
    }

    pub fn redo(&self, canvas: &mut CanvasState) {
        self.apply(canvas, false);
    }

    fn apply(&self, canvas: &mut CanvasState, undo: bool) {
        match self {
            HistoryEntry::Paint { change, hidden } => {
                canvas.write_cell(change.x, change.y, change.target(undo));
                if undo {
                    canvas.restore_hidden(hidden);
                }
            }
            HistoryEntry::Fill { changes, hidden } | HistoryEntry::Trace { changes, hidden } => {
                canvas.apply_changes(changes, undo);
                if undo {
                    canvas.restore_hidden(hidden);
                }
            }
            HistoryEntry::Clear { previous, hidden } => {
                if undo {
                    canvas.replace_pixels(previous);
                    canvas.restore_hidden(hidden);
                } else {
                    canvas.clear_pixels();
                }
            }
            HistoryEntry::ClearLayer { color, cells, was_visible } => {
                if undo {
                    for &(x, y) in cells {
                        canvas.write_cell(x, y, Some(*color));
                    }
                    canvas.layers.set_visibility(*color, *was_visible);
                } else {
                    for (x, y) in canvas.grid.positions_of(*color) {
                        canvas.write_cell(x, y, None);
                    }
                }
            }
            HistoryEntry::ChangeLayerColor { old_color, new_color, cells, was_visible } => {
                if undo {
                    canvas.recolor_cells(cells, *new_color, *old_color);
                    canvas.layers.set_visibility(*old_color, *was_visible);
                } else {
                    canvas.recolor_cells(cells, *old_color, *new_color);
                }
            }
            HistoryEntry::ChangeBackgroundColor { old_color, new_color } => {
                canvas.background_color = if undo { *old_color } else { *new_color };
            }
            HistoryEntry::RemoveBackground { saved } => {
                if undo {
                    canvas.background.restore(saved);
                } else {
                    canvas.background.remove();
                }
            }
            HistoryEntry::ShiftPixels { old_pixels, new_pixels, hidden } => {
                canvas.replace_pixels(if undo { old_pixels } else { new_pixels });
                canvas.restore_hidden(hidden);
            }
            HistoryEntry::BackgroundTransform { old_transform, new_transform, .. } => {
                canvas.background.transform = if undo { *old_transform } else { *new_transform };
            }
        }
        canvas.mark_dirty();
    }

    pub fn description(&self) -> String {
        match self {
            HistoryEntry::Paint { change, .. } => match change.new_color {
                Some(c) => format!("Paint {} at ({}, {})", c, change.x, change.y),
                None => format!("Erase ({}, {})", change.x, change.y),
            },
            HistoryEntry::Fill { changes, .. } => format!("Fill: {} cells", changes.len()),
            HistoryEntry::Clear { .. } => "Clear Canvas".to_string(),
            HistoryEntry::ClearLayer { color, cells, .. } => {
                format!("Clear Layer {}: {} cells", color, cells.len())
            }
            HistoryEntry::ChangeLayerColor { old_color, new_color, .. } => {
                format!("Layer Color: {} → {}", old_color, new_color)
            }
            HistoryEntry::ChangeBackgroundColor { new_color, .. } => {
                format!("Background Color: {}", new_color)
            }
            HistoryEntry::RemoveBackground { .. } => "Remove Background Image".to_string(),
            HistoryEntry::ShiftPixels { .. } => "Shift Pixels".to_string(),
            HistoryEntry::BackgroundTransform { kind, .. } => match kind {
                TransformKind::Move => "Move Background".to_string(),
                TransformKind::Resize => "Resize Background".to_string(),
                TransformKind::Rotate => "Rotate Background".to_string(),
            },
            HistoryEntry::Trace { changes, .. } => format!("Trace: {} cells", changes.len()),
        }
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_size(&self) -> usize {
        let cell = std::mem::size_of::<Option<Color>>();
        let change = std::mem::size_of::<CellChange>();
        let pos = std::mem::size_of::<(u32, u32)>();
        let base = std::mem::size_of::<HistoryEntry>();
        base + match self {
            HistoryEntry::Fill { changes, .. } | HistoryEntry::Trace { changes, .. } => changes.len() * change,
            HistoryEntry::Clear { previous, .. } => previous.cells().len() * cell,
            HistoryEntry::ClearLayer { cells, .. } | HistoryEntry::ChangeLayerColor { cells, .. } => {
                cells.len() * pos
            }
            HistoryEntry::ShiftPixels { old_pixels, new_pixels, .. } => {
                (old_pixels.cells().len() + new_pixels.cells().len()) * cell
            }
            // Image buffer is shared with the live background, count it once here
            HistoryEntry::RemoveBackground { saved } => saved.image.as_raw().len(),
            _ => 0,
        }
    }
}

// ============================================================================
// HISTORY MANAGER - action log with a cursor
// ============================================================================

/// Undo/redo availability, reported to the listener after every change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
}

type HistoryListener = Box<dyn FnMut(HistoryStatus) + Send>;

/// Unbounded undo/redo log. `cursor` is the index of the last applied entry,
/// `-1` before the first one.
pub struct HistoryManager {
    entries: Vec<HistoryEntry>,
    cursor: isize,
    /// Running memory total across all entries.
    total_memory: usize,
    listener: Option<HistoryListener>,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("len", &self.entries.len())
            .field("cursor", &self.cursor)
            .field("total_memory", &self.total_memory)
            .finish()
    }
}

impl HistoryManager {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: -1,
            total_memory: 0,
            listener: None,
        }
    }

    /// Register a callback run after every push/undo/redo/clear.
    pub fn set_listener(&mut self, listener: impl FnMut(HistoryStatus) + Send + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Append `entry`, discarding anything after the cursor.
    pub fn push(&mut self, entry: HistoryEntry) {
        let keep = (self.cursor + 1) as usize;
        for dropped in self.entries.drain(keep..) {
            self.total_memory = self.total_memory.saturating_sub(dropped.memory_size());
        }

        log::debug!("history push: {}", entry.description());
        self.total_memory += entry.memory_size();
        self.entries.push(entry);
        self.cursor = self.entries.len() as isize - 1;
        self.notify();
    }

    /// Undo the entry under the cursor. Returns its description, or `None`
    /// when there is nothing to undo.
    pub fn undo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        if self.cursor < 0 {
            return None;
        }
        let entry = &self.entries[self.cursor as usize];
        let description = entry.description();
        entry.undo(canvas);
        self.cursor -= 1;
        log::debug!("undo: {}", description);
        self.notify();
        Some(description)
    }

    pub fn redo(&mut self, canvas: &mut CanvasState) -> Option<String> {
        if self.cursor >= self.entries.len() as isize - 1 {
            return None;
        }
        self.cursor += 1;
        let entry = &self.entries[self.cursor as usize];
        let description = entry.description();
        entry.redo(canvas);
        log::debug!("redo: {}", description);
        self.notify();
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor >= 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len() as isize - 1
    }

    pub fn status(&self) -> HistoryStatus {
        HistoryStatus {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    pub fn undo_description(&self) -> Option<String> {
        self.current().map(|e| e.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.entries
            .get((self.cursor + 1) as usize)
            .map(|e| e.description())
    }

    /// Entry the next undo would revert.
    pub fn current(&self) -> Option<&HistoryEntry> {
        usize::try_from(self.cursor).ok().and_then(|i| self.entries.get(i))
    }

    /// Descriptions of undoable entries, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.entries[..(self.cursor + 1) as usize]
            .iter()
            .rev()
            .map(|e| e.description())
            .collect()
    }

    /// Undo `count` steps, stopping early at the start of the log.
    pub fn undo_to(&mut self, count: usize, canvas: &mut CanvasState) {
        for _ in 0..count {
            if self.undo(canvas).is_none() {
                break;
            }
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    /// Current memory usage of the log (cached total).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Forget everything; the listener stays registered.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = -1;
        self.total_memory = 0;
        self.notify();
    }

    fn notify(&mut self) {
        let status = self.status();
        if let Some(listener) = self.listener.as_mut() {
            listener(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use test_log::test;

    fn red() -> Color {
        Color::from_rgb(255, 0, 0)
    }

    fn paint(canvas: &mut CanvasState, history: &mut HistoryManager, x: u32, y: u32, color: Color) {
        let change = canvas.write_cell(x, y, Some(color)).unwrap();
        history.push(HistoryEntry::Paint { change, hidden: Vec::new() });
    }

    #[test]
    fn undo_and_redo_walk_the_cursor() {
        let mut canvas = CanvasState::new(8, 8).unwrap();
        let mut history = HistoryManager::new();
        assert!(history.undo(&mut canvas).is_none());
        assert!(history.redo(&mut canvas).is_none());

        paint(&mut canvas, &mut history, 0, 0, red());
        paint(&mut canvas, &mut history, 1, 0, red());
        assert_eq!(history.cursor(), 1);

        history.undo(&mut canvas);
        assert_eq!(canvas.grid.get(1, 0), None);
        assert_eq!(canvas.layers.count(red()), 1);
        history.undo(&mut canvas);
        assert!(canvas.layers.is_empty());
        assert_eq!(history.cursor(), -1);
        assert!(history.undo(&mut canvas).is_none());

        history.redo(&mut canvas);
        history.redo(&mut canvas);
        assert_eq!(canvas.layers.count(red()), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn push_after_undo_discards_the_branch() {
        let mut canvas = CanvasState::new(8, 8).unwrap();
        let mut history = HistoryManager::new();
        paint(&mut canvas, &mut history, 0, 0, red());
        paint(&mut canvas, &mut history, 1, 0, red());
        paint(&mut canvas, &mut history, 2, 0, red());
        history.undo(&mut canvas);
        history.undo(&mut canvas);

        paint(&mut canvas, &mut history, 5, 5, red());
        assert_eq!(history.len(), 2);
        assert_eq!(history.cursor(), 1);
        assert!(history.redo(&mut canvas).is_none());
        assert_eq!(canvas.grid.get(1, 0), None);
    }

    #[test]
    fn clear_undo_restores_hidden_layers() {
        let mut canvas = CanvasState::new(8, 8).unwrap();
        canvas.write_cell(3, 3, Some(red()));
        canvas.layers.set_visibility(red(), false);
        let before_grid = canvas.grid.clone();
        let before_layers = canvas.layers.clone();

        let entry = HistoryEntry::Clear {
            previous: canvas.grid.clone(),
            hidden: canvas.hidden_colors(),
        };
        canvas.clear_pixels();
        entry.undo(&mut canvas);
        assert_eq!(canvas.grid, before_grid);
        assert_eq!(canvas.layers, before_layers);

        entry.redo(&mut canvas);
        assert!(canvas.grid.is_blank());
        assert!(canvas.layers.is_empty());
    }

    #[test]
    fn paint_undo_hides_the_layer_it_brought_back() {
        let mut canvas = CanvasState::new(8, 8).unwrap();
        canvas.write_cell(0, 0, Some(red()));
        canvas.layers.set_visibility(red(), false);
        let before = canvas.layers.clone();

        let hidden = canvas.hidden_colors();
        let change = canvas.write_cell(0, 0, Some(Color::BLACK)).unwrap();
        let entry = HistoryEntry::Paint {
            change,
            hidden: canvas.dropped_hidden(&hidden),
        };
        entry.undo(&mut canvas);
        assert_eq!(canvas.layers, before);
        entry.redo(&mut canvas);
        assert!(!canvas.layers.contains(red()));
    }

    #[test]
    fn background_color_entry_round_trips() {
        let mut canvas = CanvasState::new(8, 8).unwrap();
        let entry = HistoryEntry::ChangeBackgroundColor {
            old_color: Color::WHITE,
            new_color: red(),
        };
        entry.redo(&mut canvas);
        assert_eq!(canvas.background_color, red());
        entry.undo(&mut canvas);
        assert_eq!(canvas.background_color, Color::WHITE);
    }

    #[test]
    fn listener_sees_every_transition() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut canvas = CanvasState::new(8, 8).unwrap();
        let mut history = HistoryManager::new();
        history.set_listener(move |status| sink.lock().unwrap().push(status));

        paint(&mut canvas, &mut history, 0, 0, red());
        history.undo(&mut canvas);
        history.redo(&mut canvas);
        history.clear();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], HistoryStatus { can_undo: true, can_redo: false });
        assert_eq!(seen[1], HistoryStatus { can_undo: false, can_redo: true });
        assert_eq!(seen[3], HistoryStatus { can_undo: false, can_redo: false });
    }

    #[test]
    fn memory_total_tracks_truncation() {
        let mut canvas = CanvasState::new(8, 8).unwrap();
        let mut history = HistoryManager::new();
        paint(&mut canvas, &mut history, 0, 0, red());
        let one = history.memory_usage();
        paint(&mut canvas, &mut history, 1, 0, red());
        history.undo(&mut canvas);
        paint(&mut canvas, &mut history, 2, 0, red());
        assert_eq!(history.memory_usage(), one * 2);
        assert_eq!(history.undo_history().len(), 2);
    }
}
