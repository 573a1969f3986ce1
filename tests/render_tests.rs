//! Frame Rendering Tests
//!
//! Tests for:
//! - Frame call sequence (viewport, clear, depth test, draw, present)
//! - Render size fallback
//! - Framebuffer and scene validation
//! - Framebuffer unbinding on every exit path

use std::cell::Cell;

use glam::{Mat4, Vec3};
use myth_interop::{Bindable, Context, ContextSettings, Current, InteropError, RenderTarget, Result, SceneDraw};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Default)]
struct Framebuffer {
    incomplete: bool,
    size: Option<(u32, u32)>,
    bound: Cell<bool>,
    binds: Cell<usize>,
}

impl Bindable for Framebuffer {
    fn bind(&self, _cur: &Current<'_>) -> Result<()> {
        self.bound.set(true);
        self.binds.set(self.binds.get() + 1);
        Ok(())
    }

    fn unbind(&self, _cur: &Current<'_>) -> Result<()> {
        self.bound.set(false);
        Ok(())
    }
}

impl RenderTarget for Framebuffer {
    fn set_size(&mut self, _cur: &Current<'_>, width: u32, height: u32) -> Result<()> {
        self.size = Some((width, height));
        Ok(())
    }

    fn is_complete(&self) -> bool {
        !self.incomplete
    }
}

#[derive(Default)]
struct Scene {
    empty: bool,
    broken: bool,
    draws: Cell<usize>,
    last_view: Cell<Option<Mat4>>,
}

impl SceneDraw for Scene {
    fn is_loaded(&self) -> bool {
        !self.empty
    }

    fn draw(&self, cur: &Current<'_>, _projection: &Mat4, view: &Mat4) -> Result<()> {
        assert!(cur.context().is_current());
        self.draws.set(self.draws.get() + 1);
        self.last_view.set(Some(*view));
        if self.broken {
            return Err(InteropError::render("draw", "shader failed to link"));
        }
        Ok(())
    }
}

fn camera() -> (Mat4, Mat4) {
    let projection = Mat4::perspective_rh(45f32.to_radians(), 4.0 / 3.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
    (projection, view)
}

// ============================================================================
// Frame Sequence
// ============================================================================

#[test]
fn frame_sets_state_and_presents() {
    init_logging();
    let (ctx, device) = Context::headless(ContextSettings::new(320, 240));
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer::default();
    let scene = Scene::default();

    ctx.render(&projection, &view, &mut framebuffer, &scene, None).unwrap();

    assert_eq!(framebuffer.size, Some((320, 240)));
    assert_eq!(device.viewport(), (0, 0, 320, 240));
    assert_eq!(device.last_clear(), Some(ctx.clear_color()));
    assert!(device.depth_test());
    assert_eq!(scene.draws.get(), 1);
    assert_eq!(scene.last_view.get(), Some(view));

    let stats = device.stats();
    assert_eq!(stats.clears, 1);
    assert_eq!(stats.presents, 1);

    assert_eq!(framebuffer.binds.get(), 1);
    assert!(!framebuffer.bound.get());
    assert!(!ctx.is_current());
}

#[test]
fn explicit_size_overrides_context_size() {
    let (ctx, device) = Context::headless(ContextSettings::new(320, 240));
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer::default();
    let scene = Scene::default();

    ctx.render(&projection, &view, &mut framebuffer, &scene, Some((64, 32))).unwrap();
    assert_eq!(framebuffer.size, Some((64, 32)));
    assert_eq!(device.viewport(), (0, 0, 64, 32));
}

#[test]
fn degenerate_size_falls_back_to_context_size() {
    let (ctx, device) = Context::headless(ContextSettings::new(320, 240));
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer::default();
    let scene = Scene::default();

    ctx.render(&projection, &view, &mut framebuffer, &scene, Some((0, 100))).unwrap();
    assert_eq!(device.viewport(), (0, 0, 320, 240));

    ctx.resize(100, 50).unwrap();
    ctx.render(&projection, &view, &mut framebuffer, &scene, None).unwrap();
    assert_eq!(framebuffer.size, Some((100, 50)));
}

#[test]
fn clear_color_follows_context() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let (projection, view) = camera();
    ctx.set_clear_color([1.0, 0.0, 0.0, 1.0]);

    ctx.render(&projection, &view, &mut Framebuffer::default(), &Scene::default(), None)
        .unwrap();
    assert_eq!(device.last_clear(), Some([1.0, 0.0, 0.0, 1.0]));
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn unloaded_scene_is_rejected() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer::default();
    let scene = Scene {
        empty: true,
        ..Default::default()
    };

    let result = ctx.render(&projection, &view, &mut framebuffer, &scene, None);
    assert!(matches!(result, Err(InteropError::InvalidRenderTarget(_))));
    assert_eq!(framebuffer.binds.get(), 0);
    assert_eq!(scene.draws.get(), 0);
    assert_eq!(device.stats().presents, 0);
    assert!(!ctx.is_current());
}

#[test]
fn incomplete_framebuffer_is_rejected() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer {
        incomplete: true,
        ..Default::default()
    };
    let scene = Scene::default();

    let result = ctx.render(&projection, &view, &mut framebuffer, &scene, None);
    assert!(matches!(result, Err(InteropError::InvalidRenderTarget(_))));
    assert_eq!(framebuffer.binds.get(), 0);
    assert_eq!(device.stats().clears, 0);
}

// ============================================================================
// Error Paths
// ============================================================================

#[test]
fn draw_errors_unbind_the_framebuffer() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer::default();
    let scene = Scene {
        broken: true,
        ..Default::default()
    };

    let result = ctx.render(&projection, &view, &mut framebuffer, &scene, None);
    assert_eq!(result, Err(InteropError::render("draw", "shader failed to link")));
    assert_eq!(framebuffer.binds.get(), 1);
    assert!(!framebuffer.bound.get());
    assert_eq!(device.stats().presents, 0);
    assert!(!ctx.is_current());
}

#[test]
fn driver_failures_unbind_the_framebuffer() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer::default();
    let scene = Scene::default();

    device.fail_next("clear");
    let result = ctx.render(&projection, &view, &mut framebuffer, &scene, None);
    assert!(matches!(result, Err(InteropError::Render { call: "clear", .. })));
    assert!(!framebuffer.bound.get());
    assert_eq!(scene.draws.get(), 0);
}

#[test]
fn deferred_errors_fail_the_frame() {
    let (ctx, device) = Context::headless(ContextSettings::default());
    let (projection, view) = camera();
    let mut framebuffer = Framebuffer::default();
    let scene = Scene::default();

    // Make sure the surface exists before queueing the error.
    ctx.make_current().unwrap();
    ctx.detach_current().unwrap();
    device.push_error("invalid framebuffer operation");

    let result = ctx.render(&projection, &view, &mut framebuffer, &scene, None);
    assert_eq!(result, Err(InteropError::render("render", "invalid framebuffer operation")));
    assert!(!framebuffer.bound.get());

    // The next frame is clean again.
    ctx.render(&projection, &view, &mut framebuffer, &scene, None).unwrap();
    assert_eq!(device.stats().presents, 2);
}
