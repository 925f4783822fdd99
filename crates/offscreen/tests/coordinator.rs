mod common;

use std::rc::Rc;

use offscreen::soft::{ObjectKind, SoftContext, SoftDisplay};
use offscreen::{
    render_frame, BlitOrientation, ClearMask, CoordinatorOptions, DisplaySize, Gl, RenderContext,
    RenderToTextureCoordinator, Viewport,
};

use common::{all_pixels, read_framebuffer, rows, texture_framebuffer, RectScene, RED};

const BLUE: [u8; 4] = [0, 0, 255, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];

fn paint_default_framebuffer(gl: &SoftContext, rgba: [f32; 4]) {
    gl.set_clear_color(rgba);
    gl.clear(ClearMask::COLOR);
}

#[test]
fn empty_scene_composites_the_cleared_offscreen_target() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let gl = context.gl();
    paint_default_framebuffer(gl, [0.0, 1.0, 0.0, 1.0]);
    assert!(all_pixels(&context.default_framebuffer_pixels(), GREEN));
    gl.set_clear_color([0.0, 0.0, 1.0, 1.0]);

    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));
    coordinator.before_render(0.0);
    coordinator.after_render(0.0);

    assert!(all_pixels(&context.default_framebuffer_pixels(), BLUE));
    assert_eq!(gl.take_error(), None);
}

#[test]
fn scene_draws_land_in_the_offscreen_texture() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let gl = context.gl();
    gl.set_clear_color([0.0, 0.0, 1.0, 1.0]);
    let mut scene = RectScene::new(context.clone(), [-1.0, -1.0], [0.0, 1.0]);
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));

    coordinator.before_render(0.0);
    assert!(coordinator.is_intercepting());
    offscreen::SceneRenderer::draw(&mut scene, 0.0);

    let texture = coordinator.offscreen_texture().unwrap();
    let offscreen = context.texture_pixels(texture).unwrap();
    assert!(all_pixels(&context.default_framebuffer_pixels(), [0, 0, 0, 0]));
    for row in rows(&offscreen, 4) {
        assert_eq!(row, [RED, RED, BLUE, BLUE].concat());
    }

    coordinator.after_render(0.0);
    assert_eq!(context.default_framebuffer_pixels(), offscreen);
    assert_eq!(gl.take_error(), None);
}

#[test]
fn host_framebuffer_and_viewport_are_restored() {
    let context = Rc::new(SoftContext::headless(16, 16));
    let gl = context.gl();
    let (host, host_texture) = texture_framebuffer(gl, 8, 8);
    let depth = context.create_depth_renderbuffer(8, 8);
    gl.bind_framebuffer(Some(host));
    gl.attach_depth_renderbuffer(depth);
    let host_viewport = Viewport::new(1, 1, 6, 6);
    gl.set_viewport(host_viewport);

    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::new(4.0, 4.0, 2.0));
    assert_eq!(coordinator.offscreen_size(), (8, 8));

    coordinator.before_render(1.0);
    let offscreen = coordinator.offscreen_framebuffer().unwrap();
    assert_eq!(gl.current_framebuffer(), Some(offscreen));
    assert_eq!(gl.viewport(), Viewport::covering(8, 8));
    assert_eq!(gl.depth_renderbuffer(), depth);

    coordinator.after_render(1.0);
    assert_eq!(gl.current_framebuffer(), Some(host));
    assert_eq!(gl.viewport(), host_viewport);
    assert!(!coordinator.is_intercepting());
    assert!(context.texture_pixels(host_texture).is_some());
    assert_eq!(gl.take_error(), None);
}

#[test]
fn default_host_target_gets_no_depth_attachment() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let gl = context.gl();
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));

    coordinator.before_render(0.0);
    assert_eq!(gl.depth_renderbuffer(), None);
    coordinator.after_render(0.0);

    assert!(!coordinator.is_disabled());
    assert_eq!(gl.current_framebuffer(), None);
}

#[test]
fn after_render_without_before_render_is_a_no_op() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let gl = context.gl();
    paint_default_framebuffer(gl, [0.0, 1.0, 0.0, 1.0]);
    let viewport = Viewport::new(0, 0, 2, 2);
    gl.set_viewport(viewport);

    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));
    coordinator.after_render(0.0);

    assert_eq!(coordinator.offscreen_texture(), None);
    assert_eq!(gl.current_framebuffer(), None);
    assert_eq!(gl.viewport(), viewport);
    assert_eq!(context.draw_calls(), 0);
    assert!(all_pixels(&context.default_framebuffer_pixels(), GREEN));
    assert_eq!(gl.take_error(), None);
}

#[test]
fn target_is_created_once_and_reused() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let mut scene = RectScene::new(context.clone(), [-1.0, -1.0], [1.0, 1.0]);
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));

    render_frame(&mut coordinator, &mut scene, 0.0);
    let texture = coordinator.offscreen_texture();
    let textures = context.live_textures();
    let framebuffers = context.live_framebuffers();
    for frame in 1..4 {
        render_frame(&mut coordinator, &mut scene, f64::from(frame) / 60.0);
    }

    assert_eq!(coordinator.offscreen_texture(), texture);
    assert_eq!(context.live_textures(), textures);
    assert_eq!(context.live_framebuffers(), framebuffers);
    assert_eq!(context.buffer_uploads(), 2);
    assert_eq!(scene.draws, 4);
    assert!(all_pixels(&context.default_framebuffer_pixels(), RED));
}

#[test]
fn inverted_orientation_mirrors_the_composite() {
    let context = Rc::new(SoftContext::headless(4, 4));
    context.set_clear_color([0.0, 0.0, 1.0, 1.0]);
    // Scene covers the bottom half of the offscreen target.
    let mut scene = RectScene::new(context.clone(), [-1.0, -1.0], [1.0, 0.0]);
    let options = CoordinatorOptions {
        orientation: BlitOrientation::InvertY,
    };
    let mut coordinator = RenderToTextureCoordinator::with_options(
        context.clone(),
        DisplaySize::from_physical(4, 4),
        options,
    );

    render_frame(&mut coordinator, &mut scene, 0.0);

    let pixels = context.default_framebuffer_pixels();
    let rows = rows(&pixels, 4);
    assert!(all_pixels(rows[0], BLUE) && all_pixels(rows[1], BLUE));
    assert!(all_pixels(rows[2], RED) && all_pixels(rows[3], RED));
}

#[test]
fn allocation_failure_disables_interception() {
    let context = Rc::new(SoftContext::headless(4, 4));
    context.refuse_allocations(ObjectKind::Framebuffer);
    let mut scene = RectScene::new(context.clone(), [-1.0, -1.0], [1.0, 1.0]);
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));

    render_frame(&mut coordinator, &mut scene, 0.0);
    assert!(coordinator.is_disabled());
    assert!(!coordinator.is_intercepting());
    assert!(all_pixels(&context.default_framebuffer_pixels(), RED));

    // Disabled for good, even once allocation would succeed.
    context.allow_allocations(ObjectKind::Framebuffer);
    render_frame(&mut coordinator, &mut scene, 1.0);
    assert_eq!(coordinator.offscreen_texture(), None);
    assert_eq!(context.draw_calls(), 2);
    assert_eq!(context.take_error(), None);
}

#[test]
fn inert_blitter_disables_interception() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let mut scene = RectScene::new(context.clone(), [-1.0, -1.0], [1.0, 1.0]);
    context.refuse_allocations(ObjectKind::Program);
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));

    render_frame(&mut coordinator, &mut scene, 0.0);

    assert!(coordinator.is_disabled());
    assert_eq!(context.live_framebuffers(), 0);
    assert!(all_pixels(&context.default_framebuffer_pixels(), RED));
}

#[test]
fn incomplete_target_is_released_and_disables_interception() {
    let context = Rc::new(SoftContext::headless(8, 8));
    let gl = context.gl();
    let (host, _) = texture_framebuffer(gl, 8, 8);
    let depth = context.create_depth_renderbuffer(8, 8);
    gl.bind_framebuffer(Some(host));
    gl.attach_depth_renderbuffer(depth);
    let framebuffers = context.live_framebuffers();
    let textures = context.live_textures();

    // The shared depth buffer cannot back a differently sized target.
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));
    coordinator.before_render(0.0);

    assert!(coordinator.is_disabled());
    assert_eq!(context.live_framebuffers(), framebuffers);
    assert_eq!(context.live_textures(), textures);
    assert_eq!(gl.current_framebuffer(), Some(host));
}

#[test]
fn repeated_before_render_keeps_the_first_host_target() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let gl = context.gl();
    let (host, _) = texture_framebuffer(gl, 4, 4);
    gl.bind_framebuffer(Some(host));
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));

    coordinator.before_render(0.0);
    coordinator.before_render(0.0);
    coordinator.after_render(0.0);

    assert_eq!(gl.current_framebuffer(), Some(host));
    assert_eq!(gl.take_error(), None);
}

#[test]
fn drop_releases_target_and_restores_current_context() {
    let display = SoftDisplay::new();
    let owner = Rc::new(display.create_context(4, 4));
    let other = display.create_context(4, 4);
    display.make_current(Some(&*owner));

    let mut coordinator =
        RenderToTextureCoordinator::new(owner.clone(), DisplaySize::from_physical(4, 4));
    coordinator.before_render(0.0);
    coordinator.after_render(0.0);
    assert_eq!(owner.live_framebuffers(), 1);

    display.make_current(Some(&other));
    drop(coordinator);

    assert_eq!(display.current(), Some(other.tag()));
    assert_eq!(owner.live_framebuffers(), 0);
    assert_eq!(owner.live_textures(), 0);
    assert_eq!(owner.live_buffers(), 0);
    assert_eq!(owner.live_programs(), 0);
    assert_eq!(owner.calls_while_not_current(), 0);
}

#[test]
fn read_back_matches_the_composite() {
    let context = Rc::new(SoftContext::headless(4, 4));
    let mut scene = RectScene::new(context.clone(), [-1.0, -1.0], [1.0, 1.0]);
    let mut coordinator =
        RenderToTextureCoordinator::new(context.clone(), DisplaySize::from_physical(4, 4));

    render_frame(&mut coordinator, &mut scene, 0.0);

    let pixels = read_framebuffer(context.gl(), None, 4, 4);
    assert_eq!(pixels, context.default_framebuffer_pixels());
}
