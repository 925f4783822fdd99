//! In-memory OpenGL reference device.
//!
//! [`SoftContext`] implements [`Gl`] and [`RenderContext`] without a driver:
//! objects, bindings, the error flag and make-current bookkeeping are
//! tracked exactly enough for the pipeline to run headlessly, and draws are
//! rasterised on the CPU so the resulting pixels can be read back.
//!
//! Shader sources are scanned rather than compiled. Draw calls follow the
//! textured-quad convention the pipeline's programs use: the first active
//! attribute is the position, the next `vec2` attribute is the texture
//! coordinate, the first vertex-stage `mat4` uniform transforms positions and
//! the second transforms texture coordinates. Fragments sample the first
//! `sampler2D` uniform, fall back to a literal `gl_FragColor = vec4(...)`,
//! and are white otherwise. Depth testing is tracked but not performed.

mod glsl;
mod raster;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::context::RenderContext;
use crate::gl::{
    BufferId, ClearMask, FramebufferId, Gl, ProgramId, RenderbufferId, Sampling, ShaderId,
    ShaderStage, TextureId, Viewport,
};

use glsl::{GlslType, ShaderInterface};
use raster::{Image, Sampler, ShadedVertex};

const TEXTURE_UNITS: usize = 8;
const VERTEX_ATTRIBUTES: u32 = 16;

/// Identifies one context on a [`SoftDisplay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextTag(u32);

/// Kinds of object whose allocation can be refused to exercise failure paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Program,
    Shader,
    Buffer,
    Texture,
    Framebuffer,
}

#[derive(Debug, Default)]
struct DisplayState {
    current: Cell<Option<ContextTag>>,
    next_tag: Cell<u32>,
}

/// Stand-in for a window-system display: owns the notion of which context is
/// current. Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct SoftDisplay {
    state: Rc<DisplayState>,
}

impl SoftDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context whose default framebuffer is `width` x `height`.
    /// The new context is not made current.
    pub fn create_context(&self, width: i32, height: i32) -> SoftContext {
        let tag = self.state.next_tag.get() + 1;
        self.state.next_tag.set(tag);
        SoftContext {
            tag: ContextTag(tag),
            display: self.clone(),
            device: RefCell::new(Device::new(width, height)),
        }
    }

    pub fn make_current(&self, context: Option<&SoftContext>) {
        self.state.current.set(context.map(SoftContext::tag));
    }

    pub fn current(&self) -> Option<ContextTag> {
        self.state.current.get()
    }

    fn set_current(&self, tag: Option<ContextTag>) {
        self.state.current.set(tag);
    }
}

/// A headless rendering context.
pub struct SoftContext {
    tag: ContextTag,
    display: SoftDisplay,
    device: RefCell<Device>,
}

impl SoftContext {
    /// A context on its own display, already current.
    pub fn headless(width: i32, height: i32) -> Self {
        let display = SoftDisplay::new();
        let context = display.create_context(width, height);
        display.make_current(Some(&context));
        context
    }

    pub fn tag(&self) -> ContextTag {
        self.tag
    }

    pub fn display(&self) -> &SoftDisplay {
        &self.display
    }

    pub fn is_current(&self) -> bool {
        self.display.current() == Some(self.tag)
    }

    pub fn live_programs(&self) -> usize {
        self.device.borrow().programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.device.borrow().shaders.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.device.borrow().buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.device.borrow().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.device.borrow().framebuffers.len()
    }

    /// Number of `compile_shader` calls issued so far.
    pub fn compiled_shader_count(&self) -> usize {
        self.device.borrow().stats.compiles
    }

    /// Number of array-buffer uploads issued so far.
    pub fn buffer_uploads(&self) -> usize {
        self.device.borrow().stats.uploads
    }

    pub fn draw_calls(&self) -> usize {
        self.device.borrow().stats.draws
    }

    /// GL calls that arrived while another context (or none) was current.
    pub fn calls_while_not_current(&self) -> usize {
        self.device.borrow().stats.off_context_calls
    }

    /// Makes every later `create_*` of `kind` fail until re-allowed.
    pub fn refuse_allocations(&self, kind: ObjectKind) {
        self.device.borrow_mut().refused.insert(kind);
    }

    pub fn allow_allocations(&self, kind: ObjectKind) {
        self.device.borrow_mut().refused.remove(&kind);
    }

    /// Allocates depth renderbuffer storage, as a window system or host
    /// renderer would for its own framebuffers.
    pub fn create_depth_renderbuffer(&self, width: i32, height: i32) -> Option<RenderbufferId> {
        let mut device = self.device.borrow_mut();
        let name = device.next_name();
        device.renderbuffers.insert(name, (width, height));
        RenderbufferId::new(name)
    }

    /// Contents of `texture`'s level 0, bottom row first.
    pub fn texture_pixels(&self, texture: TextureId) -> Option<Vec<u8>> {
        let device = self.device.borrow();
        let image = device.textures.get(&raw(texture.get()))?.image.as_ref()?;
        Some(image.pixels.clone())
    }

    /// Contents of the window-system framebuffer, bottom row first.
    pub fn default_framebuffer_pixels(&self) -> Vec<u8> {
        self.device.borrow().default_color.pixels.clone()
    }

    fn with<T>(&self, call: impl FnOnce(&mut Device) -> T) -> T {
        let mut device = self.device.borrow_mut();
        if !self.is_current() {
            device.stats.off_context_calls += 1;
        }
        call(&mut device)
    }
}

impl RenderContext for SoftContext {
    type Api = SoftContext;
    type Saved = Option<ContextTag>;

    fn gl(&self) -> &SoftContext {
        self
    }

    fn enter(&self) -> Option<ContextTag> {
        let previous = self.display.current();
        self.display.set_current(Some(self.tag));
        previous
    }

    fn leave(&self, saved: Option<ContextTag>) {
        self.display.set_current(saved);
    }
}

fn raw(name: std::num::NonZeroU32) -> u32 {
    name.get()
}

#[derive(Debug, Default)]
struct Stats {
    compiles: usize,
    uploads: usize,
    draws: usize,
    off_context_calls: usize,
}

struct Shader {
    stage: ShaderStage,
    interface: Option<ShaderInterface>,
    log: String,
}

/// Shader state copied at attach time; the shader object may be deleted
/// before linking.
struct Attached {
    stage: ShaderStage,
    interface: Option<ShaderInterface>,
}

#[derive(Default)]
struct Program {
    attached: Vec<Attached>,
    linked: Option<Linked>,
    log: String,
}

struct Variable {
    name: String,
    ty: GlslType,
}

#[derive(Clone, Copy)]
enum UniformValue {
    Int(i32),
    Mat4([f32; 16]),
}

#[derive(Default)]
struct ShadingPlan {
    position: Option<u32>,
    tex_coord: Option<u32>,
    position_matrix: Option<i32>,
    tex_matrix: Option<i32>,
    sampler: Option<i32>,
    constant: Option<[f32; 4]>,
}

/// Location = index.
struct Linked {
    attributes: Vec<Variable>,
    uniforms: Vec<Variable>,
    values: HashMap<i32, UniformValue>,
    plan: ShadingPlan,
}

impl Linked {
    fn matrix(&self, location: i32) -> [f32; 16] {
        match self.values.get(&location) {
            Some(UniformValue::Mat4(matrix)) => *matrix,
            _ => [0.0; 16],
        }
    }

    fn int(&self, location: i32) -> i32 {
        match self.values.get(&location) {
            Some(UniformValue::Int(value)) => *value,
            _ => 0,
        }
    }
}

#[derive(Clone, Copy)]
struct AttributePointer {
    buffer: u32,
    components: i32,
    stride: i32,
    offset: i32,
}

#[derive(Clone, Copy, Default)]
struct AttributeState {
    enabled: bool,
    pointer: Option<AttributePointer>,
}

#[derive(Default)]
struct Texture {
    image: Option<Image>,
    sampling: Option<Sampling>,
}

#[derive(Default)]
struct Framebuffer {
    color: Option<u32>,
    depth: Option<u32>,
}

struct Device {
    names: u32,
    shaders: HashMap<u32, Shader>,
    programs: HashMap<u32, Program>,
    buffers: HashMap<u32, Vec<u8>>,
    textures: HashMap<u32, Texture>,
    framebuffers: HashMap<u32, Framebuffer>,
    renderbuffers: HashMap<u32, (i32, i32)>,
    default_color: Image,

    program: Option<u32>,
    array_buffer: Option<u32>,
    framebuffer: Option<u32>,
    active_unit: usize,
    units: [Option<u32>; TEXTURE_UNITS],
    attributes: HashMap<u32, AttributeState>,
    viewport: Viewport,
    depth_test: bool,
    clear_color: [f32; 4],

    error: Option<u32>,
    refused: HashSet<ObjectKind>,
    stats: Stats,
}

impl Device {
    fn new(width: i32, height: i32) -> Self {
        Self {
            names: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            default_color: Image::new(width, height),
            program: None,
            array_buffer: None,
            framebuffer: None,
            active_unit: 0,
            units: [None; TEXTURE_UNITS],
            attributes: HashMap::new(),
            viewport: Viewport::covering(width, height),
            depth_test: false,
            clear_color: [0.0; 4],
            error: None,
            refused: HashSet::new(),
            stats: Stats::default(),
        }
    }

    fn next_name(&mut self) -> u32 {
        self.names += 1;
        self.names
    }

    fn allocate(&mut self, kind: ObjectKind) -> Option<u32> {
        if self.refused.contains(&kind) {
            return None;
        }
        Some(self.next_name())
    }

    /// Keeps the first error until it is taken, like a single GL error flag.
    fn record(&mut self, code: u32) {
        if self.error.is_none() {
            self.error = Some(code);
        }
    }

    fn bound_texture(&self) -> Option<u32> {
        self.units[self.active_unit]
    }

    fn linked_program(&self, program: ProgramId) -> Option<&Linked> {
        self.programs.get(&raw(program.get()))?.linked.as_ref()
    }

    fn framebuffer_complete(&self) -> bool {
        let Some(name) = self.framebuffer else {
            return true;
        };
        let Some(framebuffer) = self.framebuffers.get(&name) else {
            return false;
        };
        let color_size = framebuffer
            .color
            .and_then(|texture| self.textures.get(&texture))
            .and_then(|texture| texture.image.as_ref())
            .filter(|image| image.width > 0 && image.height > 0)
            .map(|image| (image.width, image.height));
        let Some(color_size) = color_size else {
            return false;
        };
        match framebuffer.depth {
            Some(depth) => self.renderbuffers.get(&depth) == Some(&color_size),
            None => true,
        }
    }

    fn target_image(&mut self) -> Option<&mut Image> {
        match self.framebuffer {
            None => Some(&mut self.default_color),
            Some(name) => {
                let color = self.framebuffers.get(&name)?.color?;
                self.textures.get_mut(&color)?.image.as_mut()
            }
        }
    }

    fn set_uniform(&mut self, location: i32, value: UniformValue) {
        if location == -1 {
            return;
        }
        let Some(linked) = self
            .program
            .and_then(|program| self.programs.get_mut(&program))
            .and_then(|program| program.linked.as_mut())
        else {
            self.record(glow::INVALID_OPERATION);
            return;
        };
        let Some(variable) = usize::try_from(location)
            .ok()
            .and_then(|index| linked.uniforms.get(index))
        else {
            self.record(glow::INVALID_OPERATION);
            return;
        };
        let accepted = match value {
            UniformValue::Int(unit) => match variable.ty {
                GlslType::Int | GlslType::Bool => Ok(()),
                GlslType::Sampler2D if (0..TEXTURE_UNITS as i32).contains(&unit) => Ok(()),
                GlslType::Sampler2D => Err(glow::INVALID_VALUE),
                _ => Err(glow::INVALID_OPERATION),
            },
            UniformValue::Mat4(_) if variable.ty == GlslType::Mat4 => Ok(()),
            UniformValue::Mat4(_) => Err(glow::INVALID_OPERATION),
        };
        match accepted {
            Ok(()) => {
                linked.values.insert(location, value);
            }
            Err(code) => self.record(code),
        }
    }

    /// Reads attribute `location` for vertex `index`; disabled arrays yield
    /// the generic value (0, 0, 0, 1).
    fn fetch(&self, location: Option<u32>, index: i32) -> Result<[f32; 4], u32> {
        let mut value = [0.0, 0.0, 0.0, 1.0];
        let Some(state) = location.and_then(|location| self.attributes.get(&location)) else {
            return Ok(value);
        };
        if !state.enabled {
            return Ok(value);
        }
        let pointer = state.pointer.ok_or(glow::INVALID_OPERATION)?;
        let data = self
            .buffers
            .get(&pointer.buffer)
            .ok_or(glow::INVALID_OPERATION)?;
        let stride = if pointer.stride == 0 {
            pointer.components * 4
        } else {
            pointer.stride
        };
        let start = (pointer.offset + index * stride) as usize;
        for (component, slot) in value
            .iter_mut()
            .take(pointer.components as usize)
            .enumerate()
        {
            let at = start + component * 4;
            let bytes = data.get(at..at + 4).ok_or(glow::INVALID_OPERATION)?;
            *slot = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        Ok(value)
    }

    fn draw_strip(&mut self, first: i32, count: i32) -> Result<(), u32> {
        if first < 0 || count < 0 {
            return Err(glow::INVALID_VALUE);
        }
        let program = self.program.ok_or(glow::INVALID_OPERATION)?;
        let linked = self
            .programs
            .get(&program)
            .and_then(|program| program.linked.as_ref())
            .ok_or(glow::INVALID_OPERATION)?;
        if !self.framebuffer_complete() {
            return Err(glow::INVALID_FRAMEBUFFER_OPERATION);
        }
        self.stats.draws += 1;
        if count < 3 {
            return Ok(());
        }

        let plan = &linked.plan;
        let mut vertices = Vec::with_capacity(count as usize);
        for index in first..first + count {
            let position = self.fetch(plan.position, index)?;
            let clip = match plan.position_matrix {
                Some(location) => raster::transform(&linked.matrix(location), position),
                None => position,
            };
            let tex = self.fetch(plan.tex_coord, index)?;
            let tex = [tex[0], tex[1], 0.0, 1.0];
            let tex = match plan.tex_matrix {
                Some(location) => raster::transform(&linked.matrix(location), tex),
                None => tex,
            };
            vertices.push(ShadedVertex {
                clip,
                tex: [tex[0], tex[1]],
            });
        }

        enum Shade {
            Sample(Option<Image>, Option<Sampling>),
            Solid([u8; 4]),
        }
        let shade = match (plan.sampler, plan.constant) {
            (Some(location), _) => {
                let unit = linked.int(location) as usize;
                let texture = self.units[unit].and_then(|name| self.textures.get(&name));
                Shade::Sample(
                    texture.and_then(|texture| texture.image.clone()),
                    texture.and_then(|texture| texture.sampling),
                )
            }
            (None, Some(rgba)) => Shade::Solid(raster::to_unorm8(rgba)),
            (None, None) => Shade::Solid([255; 4]),
        };

        let viewport = self.viewport;
        let target = self
            .target_image()
            .ok_or(glow::INVALID_FRAMEBUFFER_OPERATION)?;
        match shade {
            Shade::Sample(image, sampling) => {
                let sampler = Sampler {
                    image: image.as_ref(),
                    sampling,
                };
                raster::draw_strip(target, viewport, &vertices, |uv| sampler.sample(uv));
            }
            Shade::Solid(rgba) => raster::draw_strip(target, viewport, &vertices, |_| rgba),
        }
        Ok(())
    }

    fn link(&mut self, name: u32) -> bool {
        let Some(program) = self.programs.get_mut(&name) else {
            self.record(glow::INVALID_VALUE);
            return false;
        };
        program.linked = None;
        match link(&program.attached) {
            Ok(linked) => {
                program.log.clear();
                program.linked = Some(linked);
                true
            }
            Err(log) => {
                program.log = log;
                false
            }
        }
    }
}

fn link(attached: &[Attached]) -> Result<Linked, String> {
    let stage = |wanted: ShaderStage| {
        attached
            .iter()
            .filter(|shader| shader.stage == wanted)
            .find_map(|shader| shader.interface.as_ref())
    };
    let (Some(vertex), Some(fragment)) = (stage(ShaderStage::Vertex), stage(ShaderStage::Fragment))
    else {
        return Err("error: a compiled vertex and fragment shader must be attached".to_string());
    };

    for input in fragment.inputs.iter().filter(|input| input.used) {
        match vertex.outputs.iter().find(|output| output.name == input.name) {
            None => {
                return Err(format!(
                    "error: varying '{}' is read by the fragment shader but never written",
                    input.name
                ));
            }
            Some(output) if output.ty != input.ty => {
                return Err(format!("error: varying '{}' has mismatched types", input.name));
            }
            Some(_) => {}
        }
    }

    let mut uniforms: Vec<Variable> = Vec::new();
    for declaration in vertex
        .uniforms
        .iter()
        .chain(&fragment.uniforms)
        .filter(|declaration| declaration.used)
    {
        match uniforms.iter().find(|uniform| uniform.name == declaration.name) {
            Some(existing) if existing.ty != declaration.ty => {
                return Err(format!(
                    "error: uniform '{}' is declared with different types",
                    declaration.name
                ));
            }
            Some(_) => {}
            None => uniforms.push(Variable {
                name: declaration.name.clone(),
                ty: declaration.ty,
            }),
        }
    }
    let attributes: Vec<Variable> = vertex
        .attributes
        .iter()
        .filter(|declaration| declaration.used)
        .map(|declaration| Variable {
            name: declaration.name.clone(),
            ty: declaration.ty,
        })
        .collect();

    let location_of = |name: &str| {
        uniforms
            .iter()
            .position(|uniform| uniform.name == name)
            .map(|index| index as i32)
    };
    let mut vertex_matrices = vertex
        .uniforms
        .iter()
        .filter(|declaration| declaration.used && declaration.ty == GlslType::Mat4)
        .filter_map(|declaration| location_of(&declaration.name));
    let position_matrix = vertex_matrices.next();
    let tex_matrix = vertex_matrices.next();
    let sampler = fragment
        .uniforms
        .iter()
        .find(|declaration| declaration.used && declaration.ty == GlslType::Sampler2D)
        .and_then(|declaration| location_of(&declaration.name));

    let plan = ShadingPlan {
        position: (!attributes.is_empty()).then_some(0),
        tex_coord: attributes
            .iter()
            .skip(1)
            .position(|attribute| attribute.ty == GlslType::Vec2)
            .map(|index| index as u32 + 1),
        position_matrix,
        tex_matrix,
        sampler,
        constant: fragment.constant_output,
    };

    Ok(Linked {
        attributes,
        uniforms,
        values: HashMap::new(),
        plan,
    })
}

fn names(variables: &[Variable]) -> Vec<Vec<u8>> {
    variables
        .iter()
        .map(|variable| variable.name.clone().into_bytes())
        .collect()
}

impl Gl for SoftContext {
    fn create_program(&self) -> Option<ProgramId> {
        self.with(|device| {
            let name = device.allocate(ObjectKind::Program)?;
            device.programs.insert(name, Program::default());
            ProgramId::new(name)
        })
    }

    fn delete_program(&self, program: ProgramId) {
        self.with(|device| {
            let name = raw(program.get());
            device.programs.remove(&name);
            if device.program == Some(name) {
                device.program = None;
            }
        })
    }

    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId> {
        self.with(|device| {
            let name = device.allocate(ObjectKind::Shader)?;
            device.shaders.insert(
                name,
                Shader {
                    stage,
                    interface: None,
                    log: String::new(),
                },
            );
            ShaderId::new(name)
        })
    }

    fn delete_shader(&self, shader: ShaderId) {
        self.with(|device| {
            device.shaders.remove(&raw(shader.get()));
        })
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> bool {
        self.with(|device| {
            device.stats.compiles += 1;
            let Some(shader) = device.shaders.get_mut(&raw(shader.get())) else {
                device.record(glow::INVALID_VALUE);
                return false;
            };
            match glsl::scan(shader.stage, source) {
                Ok(interface) => {
                    shader.interface = Some(interface);
                    shader.log.clear();
                    true
                }
                Err(log) => {
                    shader.interface = None;
                    shader.log = log;
                    false
                }
            }
        })
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        self.with(|device| {
            device
                .shaders
                .get(&raw(shader.get()))
                .map(|shader| shader.log.clone())
                .unwrap_or_default()
        })
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        self.with(|device| {
            let Some(source) = device.shaders.get(&raw(shader.get())) else {
                device.record(glow::INVALID_VALUE);
                return;
            };
            let attached = Attached {
                stage: source.stage,
                interface: source.interface.clone(),
            };
            match device.programs.get_mut(&raw(program.get())) {
                Some(program) => program.attached.push(attached),
                None => device.record(glow::INVALID_VALUE),
            }
        })
    }

    fn link_program(&self, program: ProgramId) -> bool {
        self.with(|device| device.link(raw(program.get())))
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        self.with(|device| {
            device
                .programs
                .get(&raw(program.get()))
                .map(|program| program.log.clone())
                .unwrap_or_default()
        })
    }

    fn active_attribute_names(&self, program: ProgramId) -> Vec<Vec<u8>> {
        self.with(|device| {
            device
                .linked_program(program)
                .map(|linked| names(&linked.attributes))
                .unwrap_or_default()
        })
    }

    fn active_uniform_names(&self, program: ProgramId) -> Vec<Vec<u8>> {
        self.with(|device| {
            device
                .linked_program(program)
                .map(|linked| names(&linked.uniforms))
                .unwrap_or_default()
        })
    }

    fn attribute_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.with(|device| {
            let Some(linked) = device.linked_program(program) else {
                device.record(glow::INVALID_OPERATION);
                return None;
            };
            linked
                .attributes
                .iter()
                .position(|attribute| attribute.name == name)
                .map(|index| index as u32)
        })
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<i32> {
        self.with(|device| {
            let Some(linked) = device.linked_program(program) else {
                device.record(glow::INVALID_OPERATION);
                return None;
            };
            linked
                .uniforms
                .iter()
                .position(|uniform| uniform.name == name)
                .map(|index| index as i32)
        })
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.with(|device| match program {
            None => device.program = None,
            Some(program) if device.linked_program(program).is_some() => {
                device.program = Some(raw(program.get()));
            }
            Some(_) => device.record(glow::INVALID_OPERATION),
        })
    }

    fn uniform_1_i32(&self, location: i32, value: i32) {
        self.with(|device| device.set_uniform(location, UniformValue::Int(value)))
    }

    fn uniform_matrix_4_f32(&self, location: i32, matrix: &[f32; 16]) {
        self.with(|device| device.set_uniform(location, UniformValue::Mat4(*matrix)))
    }

    fn create_buffer(&self) -> Option<BufferId> {
        self.with(|device| {
            let name = device.allocate(ObjectKind::Buffer)?;
            device.buffers.insert(name, Vec::new());
            BufferId::new(name)
        })
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.with(|device| {
            let name = raw(buffer.get());
            device.buffers.remove(&name);
            if device.array_buffer == Some(name) {
                device.array_buffer = None;
            }
        })
    }

    fn bind_array_buffer(&self, buffer: Option<BufferId>) {
        self.with(|device| match buffer.map(|buffer| raw(buffer.get())) {
            None => device.array_buffer = None,
            Some(name) if device.buffers.contains_key(&name) => device.array_buffer = Some(name),
            Some(_) => device.record(glow::INVALID_OPERATION),
        })
    }

    fn array_buffer_data_static(&self, data: &[u8]) {
        self.with(|device| {
            let Some(store) = device
                .array_buffer
                .and_then(|name| device.buffers.get_mut(&name))
            else {
                device.record(glow::INVALID_OPERATION);
                return;
            };
            *store = data.to_vec();
            device.stats.uploads += 1;
        })
    }

    fn enable_vertex_attribute(&self, location: u32) {
        self.with(|device| {
            if location >= VERTEX_ATTRIBUTES {
                device.record(glow::INVALID_VALUE);
                return;
            }
            device.attributes.entry(location).or_default().enabled = true;
        })
    }

    fn vertex_attribute_f32(&self, location: u32, components: i32, stride: i32, offset: i32) {
        self.with(|device| {
            if location >= VERTEX_ATTRIBUTES
                || !(1..=4).contains(&components)
                || stride < 0
                || offset < 0
            {
                device.record(glow::INVALID_VALUE);
                return;
            }
            let Some(buffer) = device.array_buffer else {
                device.record(glow::INVALID_OPERATION);
                return;
            };
            device.attributes.entry(location).or_default().pointer = Some(AttributePointer {
                buffer,
                components,
                stride,
                offset,
            });
        })
    }

    fn create_texture(&self) -> Option<TextureId> {
        self.with(|device| {
            let name = device.allocate(ObjectKind::Texture)?;
            device.textures.insert(name, Texture::default());
            TextureId::new(name)
        })
    }

    fn delete_texture(&self, texture: TextureId) {
        self.with(|device| {
            let name = raw(texture.get());
            device.textures.remove(&name);
            for unit in device.units.iter_mut().filter(|unit| **unit == Some(name)) {
                *unit = None;
            }
            for framebuffer in device.framebuffers.values_mut() {
                if framebuffer.color == Some(name) {
                    framebuffer.color = None;
                }
            }
        })
    }

    fn active_texture_unit(&self, unit: u32) {
        self.with(|device| match usize::try_from(unit) {
            Ok(unit) if unit < TEXTURE_UNITS => device.active_unit = unit,
            _ => device.record(glow::INVALID_ENUM),
        })
    }

    fn bind_texture_2d(&self, texture: Option<TextureId>) {
        self.with(|device| {
            let unit = device.active_unit;
            match texture.map(|texture| raw(texture.get())) {
                None => device.units[unit] = None,
                Some(name) if device.textures.contains_key(&name) => {
                    device.units[unit] = Some(name);
                }
                Some(_) => device.record(glow::INVALID_OPERATION),
            }
        })
    }

    fn allocate_texture_2d_rgba(&self, width: i32, height: i32, pixels: Option<&[u8]>) {
        self.with(|device| {
            if width < 0 || height < 0 {
                device.record(glow::INVALID_VALUE);
                return;
            }
            let mut image = Image::new(width, height);
            if let Some(pixels) = pixels {
                let Some(source) = pixels.get(..image.pixels.len()) else {
                    device.record(glow::INVALID_VALUE);
                    return;
                };
                image.pixels.copy_from_slice(source);
            }
            let Some(texture) = device
                .bound_texture()
                .and_then(|name| device.textures.get_mut(&name))
            else {
                device.record(glow::INVALID_OPERATION);
                return;
            };
            texture.image = Some(image);
        })
    }

    fn set_texture_sampling_2d(&self, sampling: Sampling) {
        self.with(|device| {
            match device
                .bound_texture()
                .and_then(|name| device.textures.get_mut(&name))
            {
                Some(texture) => texture.sampling = Some(sampling),
                None => device.record(glow::INVALID_OPERATION),
            }
        })
    }

    fn create_framebuffer(&self) -> Option<FramebufferId> {
        self.with(|device| {
            let name = device.allocate(ObjectKind::Framebuffer)?;
            device.framebuffers.insert(name, Framebuffer::default());
            FramebufferId::new(name)
        })
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        self.with(|device| {
            let name = raw(framebuffer.get());
            device.framebuffers.remove(&name);
            if device.framebuffer == Some(name) {
                device.framebuffer = None;
            }
        })
    }

    fn bind_framebuffer(&self, framebuffer: Option<FramebufferId>) {
        self.with(|device| match framebuffer.map(|framebuffer| raw(framebuffer.get())) {
            None => device.framebuffer = None,
            Some(name) if device.framebuffers.contains_key(&name) => {
                device.framebuffer = Some(name);
            }
            Some(_) => device.record(glow::INVALID_OPERATION),
        })
    }

    fn attach_color_texture(&self, texture: Option<TextureId>) {
        self.with(|device| {
            let texture = texture.map(|texture| raw(texture.get()));
            if texture.is_some_and(|name| !device.textures.contains_key(&name)) {
                device.record(glow::INVALID_OPERATION);
                return;
            }
            match device
                .framebuffer
                .and_then(|name| device.framebuffers.get_mut(&name))
            {
                Some(framebuffer) => framebuffer.color = texture,
                None => device.record(glow::INVALID_OPERATION),
            }
        })
    }

    fn attach_depth_renderbuffer(&self, renderbuffer: Option<RenderbufferId>) {
        self.with(|device| {
            let renderbuffer = renderbuffer.map(|renderbuffer| raw(renderbuffer.get()));
            if renderbuffer.is_some_and(|name| !device.renderbuffers.contains_key(&name)) {
                device.record(glow::INVALID_OPERATION);
                return;
            }
            match device
                .framebuffer
                .and_then(|name| device.framebuffers.get_mut(&name))
            {
                Some(framebuffer) => framebuffer.depth = renderbuffer,
                None => device.record(glow::INVALID_OPERATION),
            }
        })
    }

    fn depth_renderbuffer(&self) -> Option<RenderbufferId> {
        self.with(|device| {
            let framebuffer = device.framebuffers.get(&device.framebuffer?)?;
            RenderbufferId::new(framebuffer.depth?)
        })
    }

    fn framebuffer_complete(&self) -> bool {
        self.with(|device| device.framebuffer_complete())
    }

    fn viewport(&self) -> Viewport {
        self.with(|device| device.viewport)
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.with(|device| {
            if viewport.width < 0 || viewport.height < 0 {
                device.record(glow::INVALID_VALUE);
            } else {
                device.viewport = viewport;
            }
        })
    }

    fn depth_test_enabled(&self) -> bool {
        self.with(|device| device.depth_test)
    }

    fn set_depth_test(&self, enabled: bool) {
        self.with(|device| device.depth_test = enabled)
    }

    fn set_clear_color(&self, rgba: [f32; 4]) {
        self.with(|device| device.clear_color = rgba)
    }

    fn clear(&self, mask: ClearMask) {
        self.with(|device| {
            if !device.framebuffer_complete() {
                device.record(glow::INVALID_FRAMEBUFFER_OPERATION);
                return;
            }
            let rgba = raster::to_unorm8(device.clear_color);
            if mask.color {
                if let Some(image) = device.target_image() {
                    image.fill(rgba);
                }
            }
        })
    }

    fn draw_triangle_strip(&self, first: i32, count: i32) {
        self.with(|device| {
            if let Err(code) = device.draw_strip(first, count) {
                device.record(code);
            }
        })
    }

    fn read_pixels_rgba(&self, region: Viewport) -> Vec<u8> {
        self.with(|device| {
            let len = region.width.max(0) as usize * region.height.max(0) as usize * 4;
            if region.width < 0 || region.height < 0 {
                device.record(glow::INVALID_VALUE);
                return Vec::new();
            }
            if !device.framebuffer_complete() {
                device.record(glow::INVALID_FRAMEBUFFER_OPERATION);
                return vec![0; len];
            }
            device
                .target_image()
                .map(|image| image.read(region))
                .unwrap_or_else(|| vec![0; len])
        })
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.with(|device| device.program.and_then(ProgramId::new))
    }

    fn current_array_buffer(&self) -> Option<BufferId> {
        self.with(|device| device.array_buffer.and_then(BufferId::new))
    }

    fn current_framebuffer(&self) -> Option<FramebufferId> {
        self.with(|device| device.framebuffer.and_then(FramebufferId::new))
    }

    fn current_texture_2d(&self) -> Option<TextureId> {
        self.with(|device| device.bound_texture().and_then(TextureId::new))
    }

    fn take_error(&self) -> Option<u32> {
        self.with(|device| device.error.take())
    }
}
