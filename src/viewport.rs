// Viewport state and the mouse-driven controller that mutates it
//
// The state is plain data owned by the App. The controller holds everything
// needed to interpret raw input (step sizes, canvas size, drag anchor) and
// applies each event to the state in place.

use glam::{DVec2, UVec2};

/// Zoom never drops below this, so the shader never divides by zero
pub const MIN_ZOOM: f64 = 1e-12;
/// Upper clamp keeps repeated zoom-in from overflowing to infinity
pub const MAX_ZOOM: f64 = 1e300;

/// Tunable step sizes and startup values
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSettings {
    pub center: DVec2,
    pub zoom: f64,
    pub max_iterations: u32,
    /// Multiplier applied per wheel notch (> 1)
    pub zoom_factor: f64,
    /// Iterations added on zoom-in, removed on zoom-out
    pub iteration_step: u32,
    /// Floor for the iteration budget
    pub min_iterations: u32,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            center: DVec2::new(-0.5, 0.0),
            zoom: 1.0,
            max_iterations: 300,
            zoom_factor: 1.1,
            iteration_step: 5,
            min_iterations: 50,
        }
    }
}

/// What the fractal shader needs to know about the view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    /// Fractal-space point at the middle of the canvas
    pub center: DVec2,
    pub zoom: f64,
    pub max_iterations: u32,
}

impl ViewportState {
    pub fn new(settings: &ViewportSettings) -> Self {
        Self {
            center: settings.center,
            zoom: settings.zoom,
            max_iterations: settings.max_iterations.max(settings.min_iterations),
        }
    }
}

/// Translates wheel and pointer events into ViewportState mutations
#[derive(Debug)]
pub struct ViewportController {
    settings: ViewportSettings,
    canvas: UVec2,
    /// Last pointer position while the button is held, `None` when not dragging
    drag_anchor: Option<DVec2>,
}

impl ViewportController {
    pub fn new(settings: ViewportSettings, canvas: UVec2) -> Self {
        Self {
            settings,
            canvas,
            drag_anchor: None,
        }
    }

    /// Canvas size in physical pixels, as last reported by a resize
    pub fn canvas(&self) -> UVec2 {
        self.canvas
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_anchor.is_some()
    }

    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.canvas = UVec2::new(width, height);
    }

    /// Apply one wheel notch.
    ///
    /// `delta` follows the DOM convention: negative scrolls up and zooms in,
    /// positive scrolls down and zooms out. A zero delta (pure horizontal
    /// scroll) is ignored.
    pub fn on_wheel(&self, state: &mut ViewportState, delta: f64) {
        let s = &self.settings;

        if delta < 0.0 {
            state.zoom = (state.zoom * s.zoom_factor).min(MAX_ZOOM);
            state.max_iterations = state.max_iterations.saturating_add(s.iteration_step);
        } else if delta > 0.0 {
            state.zoom = (state.zoom / s.zoom_factor).max(MIN_ZOOM);
            state.max_iterations = state
                .max_iterations
                .saturating_sub(s.iteration_step)
                .max(s.min_iterations);
        }
    }

    pub fn on_drag_start(&mut self, position: DVec2) {
        self.drag_anchor = Some(position);
    }

    /// Pan by the pointer movement since the last recorded position.
    ///
    /// Pixels are converted with the canvas height so pan speed does not
    /// depend on the window's aspect ratio. Screen y grows downwards, fractal
    /// y grows upwards.
    pub fn on_drag_move(&mut self, state: &mut ViewportState, position: DVec2) {
        let Some(anchor) = self.drag_anchor else {
            return;
        };

        let height = f64::from(self.canvas.y);
        if height > 0.0 {
            let delta = (position - anchor) / (height * state.zoom);
            state.center.x -= delta.x;
            state.center.y += delta.y;
        }

        self.drag_anchor = Some(position);
    }

    pub fn on_drag_end(&mut self) {
        self.drag_anchor = None;
    }

    pub fn on_pointer_leave(&mut self) {
        self.drag_anchor = None;
    }

    /// Restore the startup view
    pub fn reset(&mut self, state: &mut ViewportState) {
        *state = ViewportState::new(&self.settings);
        self.drag_anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn controller(height: u32) -> ViewportController {
        ViewportController::new(ViewportSettings::default(), UVec2::new(200, height))
    }

    fn state(zoom: f64, max_iterations: u32) -> ViewportState {
        ViewportState {
            center: DVec2::new(-0.5, 0.0),
            zoom,
            max_iterations,
        }
    }

    #[test]
    fn defaults_match_startup_view() {
        let state = ViewportState::new(&ViewportSettings::default());
        assert_eq!(state.center, DVec2::new(-0.5, 0.0));
        assert_eq!(state.zoom, 1.0);
        assert_eq!(state.max_iterations, 300);
    }

    #[test]
    fn wheel_up_zooms_in_and_adds_iterations() {
        let c = controller(100);
        let mut s = state(1.0, 300);

        c.on_wheel(&mut s, -1.0);

        assert!((s.zoom - 1.1).abs() < EPS);
        assert_eq!(s.max_iterations, 305);
    }

    #[test]
    fn wheel_down_clamps_iterations_to_floor() {
        let c = controller(100);
        let mut s = state(1.1, 52);

        c.on_wheel(&mut s, 1.0);

        assert!((s.zoom - 1.0).abs() < EPS);
        assert_eq!(s.max_iterations, 50);
    }

    #[test]
    fn zero_delta_is_ignored() {
        let c = controller(100);
        let mut s = state(1.0, 300);

        c.on_wheel(&mut s, 0.0);

        assert_eq!(s, state(1.0, 300));
    }

    #[test]
    fn zoom_in_then_out_restores_zoom() {
        let c = controller(100);
        let mut s = state(1.0, 50);

        for _ in 0..40 {
            c.on_wheel(&mut s, -3.0);
        }
        for _ in 0..40 {
            c.on_wheel(&mut s, 3.0);
        }

        assert!((s.zoom - 1.0).abs() < 1e-9);
        assert_eq!(s.max_iterations, 50);
    }

    #[test]
    fn iterations_floor_is_asymmetric() {
        let c = controller(100);
        let mut s = state(1.0, 52);

        c.on_wheel(&mut s, 1.0);
        c.on_wheel(&mut s, -1.0);

        // 52 -> 50 (clamped) -> 55, not back to 52
        assert_eq!(s.max_iterations, 55);
    }

    #[test]
    fn long_scroll_sequences_keep_invariants() {
        let c = controller(100);
        let mut s = state(1.0, 300);

        for _ in 0..20_000 {
            c.on_wheel(&mut s, 1.0);
            assert!(s.zoom > 0.0);
            assert!(s.max_iterations >= 50);
        }
        assert_eq!(s.zoom, MIN_ZOOM);

        for _ in 0..20_000 {
            c.on_wheel(&mut s, -1.0);
            assert!(s.zoom.is_finite());
        }
        assert_eq!(s.zoom, MAX_ZOOM);
    }

    #[test]
    fn drag_pans_by_pixels_over_height_times_zoom() {
        let mut c = controller(100);
        let mut s = state(1.0, 300);

        c.on_drag_start(DVec2::new(0.0, 0.0));
        c.on_drag_move(&mut s, DVec2::new(10.0, 0.0));

        assert!((s.center.x - (-0.6)).abs() < EPS);
        assert!((s.center.y - 0.0).abs() < EPS);
    }

    #[test]
    fn drag_inverts_y_and_scales_with_zoom() {
        let mut c = controller(200);
        let mut s = state(4.0, 300);

        c.on_drag_start(DVec2::new(50.0, 50.0));
        c.on_drag_move(&mut s, DVec2::new(42.0, 66.0));

        // dx = -8, dy = 16, H * zoom = 800
        assert!((s.center.x - (-0.5 + 8.0 / 800.0)).abs() < EPS);
        assert!((s.center.y - 16.0 / 800.0).abs() < EPS);
    }

    #[test]
    fn drag_is_incremental() {
        let mut c = controller(100);
        let mut s = state(1.0, 300);

        c.on_drag_start(DVec2::new(0.0, 0.0));
        c.on_drag_move(&mut s, DVec2::new(10.0, 0.0));
        c.on_drag_move(&mut s, DVec2::new(20.0, 0.0));

        // Two steps of 10px, not 10px then 20px
        assert!((s.center.x - (-0.7)).abs() < EPS);
    }

    #[test]
    fn moving_without_drag_leaves_center_alone() {
        let mut c = controller(100);
        let mut s = state(1.0, 300);

        c.on_drag_move(&mut s, DVec2::new(500.0, -300.0));
        assert_eq!(s.center, DVec2::new(-0.5, 0.0));

        c.on_drag_start(DVec2::new(0.0, 0.0));
        c.on_drag_end();
        c.on_drag_move(&mut s, DVec2::new(10.0, 10.0));
        assert_eq!(s.center, DVec2::new(-0.5, 0.0));
    }

    #[test]
    fn pointer_leave_stops_dragging() {
        let mut c = controller(100);
        let mut s = state(1.0, 300);

        c.on_drag_start(DVec2::new(0.0, 0.0));
        assert!(c.is_dragging());
        c.on_pointer_leave();
        assert!(!c.is_dragging());

        c.on_drag_move(&mut s, DVec2::new(10.0, 10.0));
        assert_eq!(s.center, DVec2::new(-0.5, 0.0));
    }

    #[test]
    fn drag_on_zero_height_canvas_does_not_produce_nan() {
        let mut c = controller(0);
        let mut s = state(1.0, 300);

        c.on_drag_start(DVec2::new(0.0, 0.0));
        c.on_drag_move(&mut s, DVec2::new(10.0, 10.0));

        assert_eq!(s.center, DVec2::new(-0.5, 0.0));
    }

    #[test]
    fn resize_keeps_center_and_zoom() {
        let mut c = controller(100);
        let s = state(2.5, 300);

        c.on_resize(1920, 1080);

        assert_eq!(c.canvas(), UVec2::new(1920, 1080));
        assert_eq!(s, state(2.5, 300));
    }

    #[test]
    fn resize_changes_pan_scale() {
        let mut c = controller(100);
        let mut s = state(1.0, 300);
        c.on_resize(400, 50);

        c.on_drag_start(DVec2::new(0.0, 0.0));
        c.on_drag_move(&mut s, DVec2::new(10.0, 0.0));

        assert!((s.center.x - (-0.7)).abs() < EPS);
    }

    #[test]
    fn custom_steps_are_honoured() {
        let settings = ViewportSettings {
            zoom_factor: 2.0,
            iteration_step: 100,
            min_iterations: 10,
            ..ViewportSettings::default()
        };
        let c = ViewportController::new(settings, UVec2::new(100, 100));
        let mut s = state(1.0, 120);

        c.on_wheel(&mut s, -1.0);
        assert_eq!(s.zoom, 2.0);
        assert_eq!(s.max_iterations, 220);

        c.on_wheel(&mut s, 1.0);
        c.on_wheel(&mut s, 1.0);
        c.on_wheel(&mut s, 1.0);
        assert_eq!(s.zoom, 0.25);
        assert_eq!(s.max_iterations, 10);
    }

    #[test]
    fn reset_restores_configured_view() {
        let mut c = controller(100);
        let mut s = state(1.0, 300);

        c.on_wheel(&mut s, -1.0);
        c.on_drag_start(DVec2::ZERO);
        c.on_drag_move(&mut s, DVec2::new(30.0, 30.0));
        c.reset(&mut s);

        assert_eq!(s, ViewportState::new(&ViewportSettings::default()));
        assert!(!c.is_dragging());
    }
}
