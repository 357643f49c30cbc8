// =============================================================================
// MANDELBROT VIEWER - GPU escape-time fractal on Vulkan
// =============================================================================
//
// The fractal itself is evaluated per pixel by a fragment shader. The host
// side only keeps the viewport (center, zoom, iteration budget), updates it
// from mouse input and pushes it to the shader once per frame.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (single thread)                               │
// │    ├── input events ──> ViewportController ──> ViewportState    │
// │    └── redraw ────────> Presenter reads ViewportState           │
// │          └── Vulkan Device + Swapchain + FrameSync              │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Recreate swapchain if the window changed size
// 2. Reload the shader program if its SPIR-V changed on disk
// 3. Wait for the frame slot, acquire a swapchain image
// 4. Record: viewport, clear, push constants, draw 6 vertices
// 5. Submit, present, request the next redraw
//
// =============================================================================

mod backend;
mod config;
mod hot_reload;
mod presenter;
mod viewport;

use anyhow::{Context, Result};
use ash::vk;
use backend::{FrameSync, Swapchain, VulkanDevice};
use config::{Config, KeyBindings};
use glam::{DVec2, UVec2};
use hot_reload::ShaderWatcher;
use presenter::Presenter;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use viewport::{ViewportController, ViewportState};
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{CursorIcon, Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let (config, load_error) = Config::load();

    init_logging(&config);
    log::info!("Starting Mandelbrot viewer");
    if let Some(e) = load_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

/// Initialize logging, optionally redirected to the configured log file.
///
/// `RUST_LOG` overrides the default `info` level.
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if config.debug.log_to_file {
        match File::create(&config.debug.log_file) {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Mandelbrot Viewer Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("Cannot open log file {}: {}", config.debug.log_file, e);
            }
        }
    }

    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// What happened to a frame after it was handed to the GPU
enum FrameOutcome {
    Presented { stale_swapchain: bool },
    OutOfDate,
}

/// Main application struct.
///
/// Vulkan objects hold an `Arc<VulkanDevice>`, so the device (and the
/// surface it owns) outlives everything created from it.
pub struct App {
    // ─────────────────────────────────────────────────────────────────────────
    // CONFIGURATION
    // ─────────────────────────────────────────────────────────────────────────
    config: Config,
    keys: KeyBindings,

    // ─────────────────────────────────────────────────────────────────────────
    // VIEWPORT
    // ─────────────────────────────────────────────────────────────────────────
    viewport: ViewportState,
    controller: ViewportController,
    /// Last cursor position; mouse button events carry none
    cursor: DVec2,

    // ─────────────────────────────────────────────────────────────────────────
    // WINDOW
    // ─────────────────────────────────────────────────────────────────────────
    window: Option<Arc<Window>>,
    is_fullscreen: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // VULKAN
    // ─────────────────────────────────────────────────────────────────────────
    device: Option<Arc<VulkanDevice>>,
    swapchain: Option<Swapchain>,
    presenter: Option<Presenter>,
    command_pool: Option<vk::CommandPool>,
    /// One command buffer per frame in flight, re-recorded every frame
    command_buffers: Vec<vk::CommandBuffer>,
    frame_sync: Vec<FrameSync>,
    current_frame: usize,
    wait_stages: [vk::PipelineStageFlags; 1],
    shader_watcher: Option<ShaderWatcher>,

    // ─────────────────────────────────────────────────────────────────────────
    // STATE FLAGS
    // ─────────────────────────────────────────────────────────────────────────
    needs_resize: bool,
    is_minimized: bool,

    // ─────────────────────────────────────────────────────────────────────────
    // FPS TRACKING
    // ─────────────────────────────────────────────────────────────────────────
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    pub fn new(config: Config) -> Self {
        let settings = config.viewport_settings();
        let keys = config.key_bindings();
        let viewport = ViewportState::new(&settings);
        let canvas = UVec2::new(config.window.width, config.window.height);
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();

        Self {
            config,
            keys,
            viewport,
            controller: ViewportController::new(settings, canvas),
            cursor: DVec2::ZERO,
            window: None,
            is_fullscreen,
            device: None,
            swapchain: None,
            presenter: None,
            command_pool: None,
            command_buffers: Vec::new(),
            frame_sync: Vec::new(),
            current_frame: 0,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            shader_watcher: None,
            needs_resize: false,
            is_minimized: false,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    /// Create the device, swapchain, presenter and per-frame resources.
    ///
    /// Shader problems do not fail this; the presenter reports them and
    /// runs without a program.
    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions) && self.config.debug.validation_layers;
        let device = VulkanDevice::new(&self.config.window.title, enable_validation, window)?;
        self.device = Some(device.clone());

        let size = window.inner_size();
        self.is_minimized = size.width == 0 || size.height == 0;

        let swapchain = Swapchain::new(
            device.clone(),
            size.width.max(1),
            size.height.max(1),
            self.config.get_present_mode(),
        )?;

        let presenter = Presenter::new(
            &device,
            &swapchain,
            self.config.vertex_shader_path(),
            self.config.fragment_shader_path(),
            self.config.graphics.clear_color,
        )?;

        // RESET: each buffer is re-recorded every frame
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .context("Failed to create command pool")?;
        self.command_pool = Some(command_pool);

        let frames_in_flight = self.config.frames_in_flight();
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(frames_in_flight as u32);
        self.command_buffers = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .context("Failed to allocate command buffers")?;

        self.frame_sync = FrameSync::create_slots(&device, frames_in_flight)?;

        if self.config.shaders.hot_reload {
            let files = [self.config.vertex_shader_path(), self.config.fragment_shader_path()];
            self.shader_watcher = ShaderWatcher::new(&self.config.shaders.directory, &files)
                .map_err(|e| log::warn!("Shader hot reload disabled: {:#}", e))
                .ok();
        }

        log::info!(
            "Swapchain has {} images, {} frames in flight",
            swapchain.images.len(),
            frames_in_flight
        );

        self.controller.on_resize(swapchain.extent.width, swapchain.extent.height);
        self.swapchain = Some(swapchain);
        self.presenter = Some(presenter);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Recreate swapchain after window resize.
    fn recreate_swapchain(&mut self) -> Result<()> {
        let device = self.device.clone().context("Device not initialized")?;
        let window = self.window.clone().context("Window not created")?;

        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            self.is_minimized = true;
            return Ok(());
        }
        self.is_minimized = false;

        // Nothing may still reference the old images
        device.wait_idle()?;

        // The surface can only have one swapchain at a time
        self.swapchain = None;

        let swapchain = Swapchain::new(
            device,
            size.width,
            size.height,
            self.config.get_present_mode(),
        )?;

        if let Some(presenter) = self.presenter.as_mut() {
            presenter.resize(&swapchain)?;
        }

        // The surface may have picked a different size than asked
        self.controller.on_resize(swapchain.extent.width, swapchain.extent.height);
        self.swapchain = Some(swapchain);
        self.needs_resize = false;

        Ok(())
    }

    /// Rebuild the shader program if its SPIR-V changed on disk
    fn reload_changed_shaders(&mut self) -> Result<()> {
        let changed = self
            .shader_watcher
            .as_ref()
            .is_some_and(|watcher| watcher.poll_changed());

        if !changed {
            return Ok(());
        }

        if let (Some(device), Some(presenter)) = (&self.device, self.presenter.as_mut()) {
            log::info!("Shaders changed on disk, reloading");
            device.wait_idle()?;
            presenter.reload_program();
        }

        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    fn wants_redraw(&self) -> bool {
        !self.is_minimized
    }

    /// Render a single frame. Returns false when nothing was presented.
    pub fn render_frame(&mut self) -> Result<bool> {
        if self.is_minimized {
            return Ok(false);
        }

        if self.needs_resize {
            self.recreate_swapchain()?;
            if self.is_minimized {
                return Ok(false);
            }
        }

        self.reload_changed_shaders()?;

        match self.draw_frame()? {
            FrameOutcome::Presented { stale_swapchain } => {
                self.needs_resize |= stale_swapchain;
                self.current_frame = (self.current_frame + 1) % self.frame_sync.len();
                Ok(true)
            }
            FrameOutcome::OutOfDate => {
                self.needs_resize = true;
                Ok(false)
            }
        }
    }

    /// Record, submit and present one frame using the current frame slot
    fn draw_frame(&self) -> Result<FrameOutcome> {
        let device = self.device.as_ref().context("Device not initialized")?;
        let swapchain = self.swapchain.as_ref().context("Swapchain not initialized")?;
        let presenter = self.presenter.as_ref().context("Presenter not initialized")?;
        let sync = self
            .frame_sync
            .get(self.current_frame)
            .context("Frame sync not initialized")?;
        let cmd = self.command_buffers[self.current_frame];

        // The command buffer and semaphores of this slot must be free again
        sync.wait()?;

        let Some((image_index, suboptimal)) =
            swapchain.acquire_next_image(u64::MAX, sync.image_available)?
        else {
            return Ok(FrameOutcome::OutOfDate);
        };

        sync.reset()?;
        presenter.record_frame(cmd, image_index, &self.viewport)?;

        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info.build()], sync.in_flight_fence)
                .context("Failed to submit frame")?;
        }

        let stale = swapchain.present(device.graphics_queue, image_index, &signal_semaphores)?;

        Ok(FrameOutcome::Presented {
            stale_swapchain: suboptimal || stale,
        })
    }

    // =========================================================================
    // WINDOW CONTROLS
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            self.needs_resize = true;
        }
    }

    fn reset_view(&mut self) {
        self.controller.reset(&mut self.viewport);
        self.update_cursor_icon();
        log::info!("View reset");
    }

    fn update_cursor_icon(&self) {
        if let Some(ref window) = self.window {
            let icon = if self.controller.is_dragging() {
                CursorIcon::Grabbing
            } else {
                CursorIcon::Default
            };
            window.set_cursor(icon);
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed < 1.0 {
            return;
        }

        let fps = self.frame_count as f32 / elapsed;
        let canvas = self.controller.canvas();
        let has_program = self.presenter.as_ref().is_some_and(Presenter::has_program);

        if let Some(ref window) = self.window {
            window.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms) [{}x{}] - zoom {:.3e}, {} iterations{}",
                self.config.window.title,
                fps,
                frame_time * 1000.0,
                canvas.x,
                canvas.y,
                self.viewport.zoom,
                self.viewport.max_iterations,
                if has_program { "" } else { " [shader unavailable]" }
            ));
        }

        self.frame_count = 0;
        self.last_fps_update = now;
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref device) = self.device {
                    let _ = device.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.controller.on_resize(size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            WindowEvent::RedrawRequested => match self.render_frame() {
                Ok(true) => self.update_fps(),
                Ok(false) => {}
                Err(e) => log::error!("Render error: {:?}", e),
            },

            // ─────────────────────────────────────────────────────────────────
            // VIEWPORT INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::MouseWheel { delta, .. } => {
                // winit reports scrolling up as positive
                let up = match delta {
                    MouseScrollDelta::LineDelta(_, y) => f64::from(y),
                    MouseScrollDelta::PixelDelta(position) => position.y,
                };
                self.controller.on_wheel(&mut self.viewport, -up);
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                match state {
                    ElementState::Pressed => self.controller.on_drag_start(self.cursor),
                    ElementState::Released => self.controller.on_drag_end(),
                }
                self.update_cursor_icon();
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = DVec2::new(position.x, position.y);
                self.controller.on_drag_move(&mut self.viewport, self.cursor);
            }

            WindowEvent::CursorLeft { .. } => {
                self.controller.on_pointer_leave();
                self.update_cursor_icon();
            }

            // ─────────────────────────────────────────────────────────────────
            // KEYBOARD INPUT
            // ─────────────────────────────────────────────────────────────────
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;

                if !event.state.is_pressed() || event.repeat {
                    return;
                }

                if let PhysicalKey::Code(key) = event.physical_key {
                    if key == self.keys.quit {
                        log::info!("{:?} pressed, exiting...", key);
                        event_loop.exit();
                    } else if key == self.keys.fullscreen {
                        self.toggle_fullscreen();
                    } else if key == self.keys.reset {
                        self.reset_view();
                    }
                }
            }

            _ => {}
        }
    }

    /// Schedule the next frame. A minimised window waits for its next
    /// `Resized` instead of spinning.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if !self.wants_redraw() {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        if let Some(ref device) = self.device {
            let _ = device.wait_idle();

            // Command pool also frees its command buffers
            if let Some(pool) = self.command_pool.take() {
                unsafe { device.device.destroy_command_pool(pool, None) };
            }
        }

        // Children before the device; the device drops with the last Arc
        self.shader_watcher = None;
        self.presenter = None;
        self.swapchain = None;
        self.frame_sync.clear();
        self.device = None;

        log::info!("Cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimised_window_stops_requesting_frames() {
        let mut app = App::new(Config::default());
        assert!(app.wants_redraw());

        app.is_minimized = true;
        assert!(!app.wants_redraw());

        app.is_minimized = false;
        assert!(app.wants_redraw());
    }
}
