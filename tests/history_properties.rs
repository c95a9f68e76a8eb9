use image::{Rgba, RgbaImage};
use pixelfe::components::layers::LayerIndex;
use pixelfe::io;
use pixelfe::ops::canvas_ops;
use pixelfe::ops::trace::{CancelToken, TraceSettings, trace_background};
use pixelfe::{CanvasState, Color, HistoryManager, Palette, TransformKind};
use test_log::test;

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

const COLORS: [Color; 4] = [
    Color::from_rgb(255, 0, 0),
    Color::from_rgb(0, 255, 0),
    Color::from_rgb(0, 0, 255),
    Color::from_rgb(20, 20, 20),
];

#[derive(Clone, Debug, PartialEq)]
struct Snapshot {
    grid: pixelfe::PixelGrid,
    layers: LayerIndex,
    background_color: Color,
}

fn snapshot(state: &CanvasState) -> Snapshot {
    Snapshot {
        grid: state.grid.clone(),
        layers: state.layers.clone(),
        background_color: state.background_color,
    }
}

/// Apply one random edit. Returns false when the edit recorded nothing.
/// Visibility toggles are included so hidden layers meet every edit kind.
fn random_edit(rng: &mut Lcg, state: &mut CanvasState, history: &mut HistoryManager) -> bool {
    let (w, h) = (state.width() as u64, state.height() as u64);
    let x = rng.below(w) as u32;
    let y = rng.below(h) as u32;
    let color = COLORS[rng.below(COLORS.len() as u64) as usize];
    match rng.below(12) {
        0..=3 => canvas_ops::paint_color(state, history, x, y, Some(color)),
        4 => canvas_ops::erase(state, history, x, y),
        5 => canvas_ops::flood_fill(state, history, x, y, Some(color)) > 0,
        6 => canvas_ops::clear_layer(state, history, color) > 0,
        7 => {
            let to = COLORS[rng.below(COLORS.len() as u64) as usize];
            canvas_ops::change_layer_color(state, history, color, to)
        }
        8 => canvas_ops::shift_pixels(state, history, rng.below(3) as i64 - 1, rng.below(3) as i64 - 1),
        9 | 10 => {
            canvas_ops::toggle_layer_visibility(state, color);
            false
        }
        _ => {
            if rng.below(4) == 0 {
                canvas_ops::clear_canvas(state, history)
            } else {
                canvas_ops::change_background_color(state, history, color)
            }
        }
    }
}

#[test]
fn incremental_layers_never_drift_from_a_rescan() {
    let mut rng = Lcg(7);
    let mut state = CanvasState::new(8, 10).unwrap();
    let mut history = HistoryManager::new();
    for step in 0..400 {
        random_edit(&mut rng, &mut state, &mut history);
        if rng.below(5) == 0 {
            history.undo(&mut state);
        }
        assert!(state.layers_consistent(), "drift after step {}", step);
    }
}

#[test]
fn every_edit_undoes_and_redoes_exactly() {
    let mut rng = Lcg(42);
    let mut state = CanvasState::new(9, 8).unwrap();
    let mut history = HistoryManager::new();
    for step in 0..300 {
        let before = snapshot(&state);
        if !random_edit(&mut rng, &mut state, &mut history) {
            assert_eq!(snapshot(&state).grid, before.grid, "no-op edit changed grid at {}", step);
            continue;
        }
        let after = snapshot(&state);

        history.undo(&mut state);
        assert_eq!(snapshot(&state), before, "undo mismatch at step {}", step);
        history.redo(&mut state);
        assert_eq!(snapshot(&state), after, "redo mismatch at step {}", step);
    }
}

#[test]
fn full_unwind_returns_to_blank_canvas() {
    let mut rng = Lcg(99);
    let mut state = CanvasState::new(8, 8).unwrap();
    let initial = snapshot(&state);
    let mut history = HistoryManager::new();
    for _ in 0..150 {
        random_edit(&mut rng, &mut state, &mut history);
    }
    let end = snapshot(&state);

    history.undo_to(history.len(), &mut state);
    assert_eq!(snapshot(&state), initial);
    assert!(!history.can_undo());
    // Toggles are not recorded, so only cells come back on redo
    while history.redo(&mut state).is_some() {}
    assert_eq!(state.grid, end.grid);
    assert_eq!(state.background_color, end.background_color);
    assert!(state.layers_consistent());
}

#[test]
fn branch_discard_blocks_redo_until_next_push() {
    let mut state = CanvasState::new(8, 8).unwrap();
    let mut history = HistoryManager::new();
    for x in 0..5 {
        canvas_ops::paint_color(&mut state, &mut history, x, 0, Some(COLORS[0]));
    }
    history.undo_to(3, &mut state);
    assert!(history.can_redo());

    canvas_ops::paint_color(&mut state, &mut history, 0, 7, Some(COLORS[1]));
    assert_eq!(history.len(), 3);
    assert!(!history.can_redo());
    assert!(history.redo(&mut state).is_none());
    assert_eq!(state.grid.get(3, 0), None);
}

#[test]
fn enclosed_center_fill_changes_one_cell() {
    let mut state = CanvasState::new(8, 8).unwrap();
    let mut history = HistoryManager::new();
    for y in 1..=3 {
        for x in 1..=3 {
            if (x, y) != (2, 2) {
                canvas_ops::paint_color(&mut state, &mut history, x, y, Some(COLORS[0]));
            }
        }
    }
    assert_eq!(canvas_ops::flood_fill(&mut state, &mut history, 2, 2, Some(COLORS[2])), 1);
    assert_eq!(canvas_ops::flood_fill(&mut state, &mut history, 2, 2, Some(COLORS[2])), 0);
}

#[test]
fn round_trip_after_resize_keeps_grid_layers_and_settings() {
    let mut rng = Lcg(5);
    let mut state = CanvasState::new(8, 8).unwrap();
    let mut history = HistoryManager::new();
    for _ in 0..60 {
        random_edit(&mut rng, &mut state, &mut history);
    }
    canvas_ops::resize_canvas(&mut state, 13, 21).unwrap();
    let first_layer = state.layers.iter().next().map(|(c, i)| (*c, *i));
    if let Some((color, _)) = first_layer {
        canvas_ops::toggle_layer_visibility(&mut state, color);
    }
    state.display.zoom = 2.5;

    let loaded = io::project_from_json(&io::project_to_json(&state).unwrap()).unwrap();
    assert_eq!(loaded.grid, state.grid);
    assert_eq!(loaded.layers, state.layers);
    assert_eq!(loaded.display, state.display);
    assert_eq!(loaded.background_color, state.background_color);
}

#[test]
fn trace_after_transform_is_one_undoable_step() {
    let mut state = CanvasState::new(8, 8).unwrap();
    let mut history = HistoryManager::new();
    state.background.set_image(RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255])));
    let moved = pixelfe::BackgroundTransform { scale: 0.5, ..Default::default() };
    assert!(canvas_ops::transform_background(&mut state, &mut history, TransformKind::Resize, moved));

    let before = snapshot(&state);
    let mut batches = 0;
    let outcome = trace_background(
        &mut state,
        &mut history,
        &Palette::snes(),
        TraceSettings { batch_size: 10, ..Default::default() },
        CancelToken::new(),
        |_| batches += 1,
    )
    .unwrap();

    // Scale 0.5 covers the middle 4x4 cells
    assert_eq!(outcome.progress.drawn, 16);
    assert_eq!(batches, 7);
    assert!(state.layers_consistent());
    assert_eq!(history.len(), 2);

    history.undo(&mut state);
    assert_eq!(snapshot(&state), before);
    history.undo(&mut state);
    assert_eq!(state.background.transform, pixelfe::BackgroundTransform::default());
}

#[test]
fn hidden_layers_survive_undo_of_every_edit() {
    let mut rng = Lcg(11);
    let mut state = CanvasState::new(8, 8).unwrap();
    let mut history = HistoryManager::new();
    let mut hidden_checks = 0;
    for step in 0..400 {
        let before = snapshot(&state);
        if !random_edit(&mut rng, &mut state, &mut history) {
            continue;
        }
        if before.layers.iter().any(|(_, info)| !info.visible) {
            hidden_checks += 1;
        }
        history.undo(&mut state);
        assert_eq!(state.layers, before.layers, "layer state differs after undo at step {}", step);
        history.redo(&mut state);
    }
    assert!(hidden_checks > 0);
}
