// Frame presenter
//
// Owns everything needed to draw the fractal into a swapchain image: the
// render pass, one framebuffer per image, the full-screen quad and the
// shader pipeline. Each frame it records: set viewport, clear, push the
// viewport uniforms, draw six vertices.
//
// The pipeline is optional. If the shaders fail to load or link the error
// is logged and frames are still cleared and presented, just without the
// fractal, until a later reload succeeds.

use anyhow::{Context, Result};
use ash::vk;
use glam::{UVec2, Vec2};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{pipeline, shader, GpuBuffer, Swapchain, VulkanDevice};
use crate::viewport::ViewportState;

/// Two triangles covering clip space
pub const QUAD_VERTICES: [[f32; 2]; 6] = [
    [-1.0, -1.0],
    [1.0, -1.0],
    [-1.0, 1.0],
    [-1.0, 1.0],
    [1.0, -1.0],
    [1.0, 1.0],
];

/// Push-constant block read by `shaders/mandelbrot.frag`.
///
/// Field order and sizes must match the GLSL `FractalParams` block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub resolution: Vec2,
    pub center: Vec2,
    pub zoom: f32,
    pub max_iterations: i32,
}

impl FrameUniforms {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Snapshot the viewport for a canvas of the given pixel size
    pub fn new(state: &ViewportState, canvas: UVec2) -> Self {
        Self {
            resolution: canvas.as_vec2(),
            center: state.center.as_vec2(),
            // f32 overflows long before the f64 zoom clamp
            zoom: (state.zoom as f32).min(f32::MAX),
            max_iterations: i32::try_from(state.max_iterations).unwrap_or(i32::MAX),
        }
    }
}

/// Pipeline plus its layout, destroyed together
struct FractalPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl FractalPipeline {
    /// Load both shaders and link them into a pipeline for `render_pass`
    fn build(
        device: &Arc<VulkanDevice>,
        render_pass: vk::RenderPass,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Result<Self> {
        let vert = shader::load_shader_module(device, vertex_path)
            .context("Vertex shader failed to compile")?;
        let frag = match shader::load_shader_module(device, fragment_path) {
            Ok(frag) => frag,
            Err(e) => {
                unsafe { device.device.destroy_shader_module(vert, None) };
                return Err(e.context("Fragment shader failed to compile"));
            }
        };

        let linked =
            pipeline::create_graphics_pipeline(device, render_pass, vert, frag, FrameUniforms::SIZE);

        // Modules are only needed while the pipeline is created
        unsafe {
            device.device.destroy_shader_module(vert, None);
            device.device.destroy_shader_module(frag, None);
        }

        let (pipeline, layout) = linked.context("Shader program failed to link")?;

        Ok(Self {
            pipeline,
            layout,
            device: device.clone(),
        })
    }
}

impl Drop for FractalPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

pub struct Presenter {
    // Drop order: pipeline and framebuffers before the render pass
    program: Option<FractalPipeline>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,
    quad: GpuBuffer,
    format: vk::Format,
    extent: vk::Extent2D,
    clear_color: [f32; 4],
    vertex_path: PathBuf,
    fragment_path: PathBuf,
    device: Arc<VulkanDevice>,
}

impl Presenter {
    pub fn new(
        device: &Arc<VulkanDevice>,
        swapchain: &Swapchain,
        vertex_path: PathBuf,
        fragment_path: PathBuf,
        clear_color: [f32; 4],
    ) -> Result<Self> {
        let render_pass = pipeline::create_render_pass(device, swapchain.format)?;

        let quad = GpuBuffer::with_data(
            device,
            "fullscreen quad",
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &QUAD_VERTICES,
        );
        let quad = match quad {
            Ok(quad) => quad,
            Err(e) => {
                unsafe { device.device.destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };

        let mut presenter = Self {
            program: None,
            framebuffers: Vec::new(),
            render_pass,
            quad,
            format: swapchain.format,
            extent: swapchain.extent,
            clear_color,
            vertex_path,
            fragment_path,
            device: device.clone(),
        };

        presenter.framebuffers = pipeline::create_framebuffers(
            device,
            &swapchain.image_views,
            render_pass,
            swapchain.extent,
        )?;
        presenter.reload_program();

        Ok(presenter)
    }

    /// Whether the fractal program is usable
    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    /// Rebuild the pipeline from the shader files on disk.
    ///
    /// Failure is reported and leaves the presenter without a program.
    /// The caller must make sure the GPU is not using the old pipeline.
    pub fn reload_program(&mut self) -> bool {
        self.program = None;

        match FractalPipeline::build(
            &self.device,
            self.render_pass,
            &self.vertex_path,
            &self.fragment_path,
        ) {
            Ok(program) => {
                log::info!("Fractal shader program ready");
                self.program = Some(program);
                true
            }
            Err(e) => {
                log::error!("Shader program unavailable: {:#}", e);
                false
            }
        }
    }

    /// Follow a recreated swapchain. The GPU must be idle.
    pub fn resize(&mut self, swapchain: &Swapchain) -> Result<()> {
        self.destroy_framebuffers();

        if swapchain.format != self.format {
            log::info!("Surface format changed to {:?}", swapchain.format);
            self.program = None;
            unsafe { self.device.device.destroy_render_pass(self.render_pass, None) };
            self.render_pass = vk::RenderPass::null();
            self.render_pass = pipeline::create_render_pass(&self.device, swapchain.format)?;
            self.format = swapchain.format;
            self.reload_program();
        }

        self.framebuffers = pipeline::create_framebuffers(
            &self.device,
            &swapchain.image_views,
            self.render_pass,
            swapchain.extent,
        )?;
        self.extent = swapchain.extent;

        Ok(())
    }

    /// Record one frame into `cmd`, targeting swapchain image `image_index`
    pub fn record_frame(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        state: &ViewportState,
    ) -> Result<()> {
        let device = &self.device.device;
        let framebuffer = *self
            .framebuffers
            .get(image_index as usize)
            .context("No framebuffer for swapchain image")?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        };
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];

        unsafe {
            device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;

            let begin_info = vk::CommandBufferBeginInfo::builder()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            // Clears via the render pass load op
            let pass_info = vk::RenderPassBeginInfo::builder()
                .render_pass(self.render_pass)
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: self.extent.width as f32,
                height: self.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);

            if let Some(program) = &self.program {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, program.pipeline);
                device.cmd_bind_vertex_buffers(cmd, 0, &[self.quad.buffer], &[0]);

                let canvas = UVec2::new(self.extent.width, self.extent.height);
                let uniforms = FrameUniforms::new(state, canvas);
                device.cmd_push_constants(
                    cmd,
                    program.layout,
                    vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&uniforms),
                );

                device.cmd_draw(cmd, QUAD_VERTICES.len() as u32, 1, 0, 0);
            }

            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd)?;
        }

        Ok(())
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { self.device.device.destroy_framebuffer(framebuffer, None) };
        }
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        let _ = self.device.wait_idle();
        self.program = None;
        self.destroy_framebuffers();
        unsafe { self.device.device.destroy_render_pass(self.render_pass, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    #[test]
    fn uniform_block_matches_shader_layout() {
        // vec2 resolution, vec2 center, float zoom, int max_iterations
        assert_eq!(FrameUniforms::SIZE, 24);
        assert_eq!(std::mem::offset_of!(FrameUniforms, center), 8);
        assert_eq!(std::mem::offset_of!(FrameUniforms, zoom), 16);
        assert_eq!(std::mem::offset_of!(FrameUniforms, max_iterations), 20);
    }

    #[test]
    fn uniforms_mirror_viewport_and_canvas() {
        let state = ViewportState {
            center: DVec2::new(-0.75, 0.1),
            zoom: 2.5,
            max_iterations: 305,
        };

        let uniforms = FrameUniforms::new(&state, UVec2::new(1280, 720));

        assert_eq!(uniforms.resolution, Vec2::new(1280.0, 720.0));
        assert_eq!(uniforms.center, Vec2::new(-0.75, 0.1));
        assert_eq!(uniforms.zoom, 2.5);
        assert_eq!(uniforms.max_iterations, 305);
    }

    #[test]
    fn resize_only_changes_resolution() {
        let state = ViewportState {
            center: DVec2::new(-0.5, 0.0),
            zoom: 1.0,
            max_iterations: 300,
        };

        let before = FrameUniforms::new(&state, UVec2::new(800, 600));
        let after = FrameUniforms::new(&state, UVec2::new(1920, 1080));

        assert_eq!(after.resolution, Vec2::new(1920.0, 1080.0));
        assert_eq!(before.center, after.center);
        assert_eq!(before.zoom, after.zoom);
        assert_eq!(before.max_iterations, after.max_iterations);
    }

    #[test]
    fn huge_iteration_budget_saturates() {
        let state = ViewportState {
            center: DVec2::ZERO,
            zoom: 1.0,
            max_iterations: u32::MAX,
        };

        assert_eq!(FrameUniforms::new(&state, UVec2::ONE).max_iterations, i32::MAX);
    }

    #[test]
    fn quad_covers_clip_space() {
        let min = QUAD_VERTICES.iter().fold([f32::MAX; 2], |m, v| [m[0].min(v[0]), m[1].min(v[1])]);
        let max = QUAD_VERTICES.iter().fold([f32::MIN; 2], |m, v| [m[0].max(v[0]), m[1].max(v[1])]);
        assert_eq!(min, [-1.0, -1.0]);
        assert_eq!(max, [1.0, 1.0]);

        // Two triangles, each with non-zero area
        for tri in QUAD_VERTICES.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]];
            let area = (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]);
            assert!(area.abs() > 0.0);
        }
    }
}
