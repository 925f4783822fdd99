use crate::gl::{Filter, Sampling, Viewport, Wrap};

/// RGBA8 pixels, bottom row first like OpenGL storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Image {
    pub width: i32,
    pub height: i32,
    pub pixels: Vec<u8>,
}

impl Image {
    pub fn new(width: i32, height: i32) -> Self {
        let len = (width.max(0) as usize) * (height.max(0) as usize) * 4;
        Self {
            width,
            height,
            pixels: vec![0; len],
        }
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        ((y * self.width + x) * 4) as usize
    }

    pub fn pixel(&self, x: i32, y: i32) -> [u8; 4] {
        let at = self.offset(x, y);
        [
            self.pixels[at],
            self.pixels[at + 1],
            self.pixels[at + 2],
            self.pixels[at + 3],
        ]
    }

    pub fn put(&mut self, x: i32, y: i32, rgba: [u8; 4]) {
        let at = self.offset(x, y);
        self.pixels[at..at + 4].copy_from_slice(&rgba);
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Copies `region`, zero-filling whatever lies outside the image.
    pub fn read(&self, region: Viewport) -> Vec<u8> {
        let mut out = Vec::with_capacity((region.width.max(0) * region.height.max(0) * 4) as usize);
        for y in region.y..region.y + region.height {
            for x in region.x..region.x + region.width {
                let inside = (0..self.width).contains(&x) && (0..self.height).contains(&y);
                out.extend_from_slice(&if inside { self.pixel(x, y) } else { [0; 4] });
            }
        }
        out
    }
}

/// Texture image paired with its sampling state; incomplete textures sample
/// opaque black.
pub(crate) struct Sampler<'a> {
    pub image: Option<&'a Image>,
    pub sampling: Option<Sampling>,
}

impl Sampler<'_> {
    pub fn sample(&self, uv: [f32; 2]) -> [u8; 4] {
        let (Some(image), Some(sampling)) = (self.image, self.sampling) else {
            return [0, 0, 0, 255];
        };
        if image.width <= 0 || image.height <= 0 {
            return [0, 0, 0, 255];
        }
        let x = uv[0] * image.width as f32 - 0.5;
        let y = uv[1] * image.height as f32 - 0.5;
        match sampling.filter {
            Filter::Nearest => {
                let texel = |coord: f32, size: i32| wrap(coord.round() as i32, size, sampling.wrap);
                image.pixel(texel(x, image.width), texel(y, image.height))
            }
            Filter::Linear => bilinear(image, x, y, sampling.wrap),
        }
    }
}

fn wrap(index: i32, size: i32, mode: Wrap) -> i32 {
    match mode {
        Wrap::ClampToEdge => index.clamp(0, size - 1),
        Wrap::Repeat => index.rem_euclid(size),
    }
}

fn bilinear(image: &Image, x: f32, y: f32, mode: Wrap) -> [u8; 4] {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i32, y0 as i32);
    let fetch = |dx: i32, dy: i32| {
        image.pixel(
            wrap(x0 + dx, image.width, mode),
            wrap(y0 + dy, image.height, mode),
        )
    };
    let (a, b, c, d) = (fetch(0, 0), fetch(1, 0), fetch(0, 1), fetch(1, 1));
    let mut out = [0u8; 4];
    for channel in 0..4 {
        let lerp = |p: u8, q: u8, t: f32| f32::from(p) * (1.0 - t) + f32::from(q) * t;
        let bottom = lerp(a[channel], b[channel], fx);
        let top = lerp(c[channel], d[channel], fx);
        out[channel] = (bottom * (1.0 - fy) + top * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Vertex after the vertex stage.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ShadedVertex {
    pub clip: [f32; 4],
    pub tex: [f32; 2],
}

/// Rasterises a triangle strip into `target` through `viewport`, calling
/// `shade` with the interpolated texture coordinate of each covered pixel
/// centre.
pub(crate) fn draw_strip<F>(target: &mut Image, viewport: Viewport, vertices: &[ShadedVertex], shade: F)
where
    F: Fn([f32; 2]) -> [u8; 4],
{
    let to_window = |vertex: &ShadedVertex| -> Option<[f64; 2]> {
        let w = f64::from(vertex.clip[3]);
        if w == 0.0 {
            return None;
        }
        let ndc_x = f64::from(vertex.clip[0]) / w;
        let ndc_y = f64::from(vertex.clip[1]) / w;
        Some([
            f64::from(viewport.x) + (ndc_x + 1.0) * 0.5 * f64::from(viewport.width),
            f64::from(viewport.y) + (ndc_y + 1.0) * 0.5 * f64::from(viewport.height),
        ])
    };

    for triangle in vertices.windows(3) {
        let (Some(a), Some(b), Some(c)) = (
            to_window(&triangle[0]),
            to_window(&triangle[1]),
            to_window(&triangle[2]),
        ) else {
            continue;
        };
        let area = edge(a, b, c);
        if area == 0.0 {
            continue;
        }

        let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as i32;
        let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as i32;
        let max_x = (a[0].max(b[0]).max(c[0]).ceil() as i32).min(target.width);
        let max_y = (a[1].max(b[1]).max(c[1]).ceil() as i32).min(target.height);

        for py in min_y..max_y {
            for px in min_x..max_x {
                let p = [f64::from(px) + 0.5, f64::from(py) + 0.5];
                let wa = edge(b, c, p) / area;
                let wb = edge(c, a, p) / area;
                let wc = edge(a, b, p) / area;
                if wa < 0.0 || wb < 0.0 || wc < 0.0 {
                    continue;
                }
                let interpolate = |axis: usize| {
                    (wa * f64::from(triangle[0].tex[axis])
                        + wb * f64::from(triangle[1].tex[axis])
                        + wc * f64::from(triangle[2].tex[axis])) as f32
                };
                target.put(px, py, shade([interpolate(0), interpolate(1)]));
            }
        }
    }
}

fn edge(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Column-major 4x4 matrix times a column vector.
pub(crate) fn transform(matrix: &[f32; 16], v: [f32; 4]) -> [f32; 4] {
    let mut out = [0.0; 4];
    for (row, slot) in out.iter_mut().enumerate() {
        *slot = (0..4).map(|col| matrix[col * 4 + row] * v[col]).sum();
    }
    out
}

pub(crate) fn to_unorm8(rgba: [f32; 4]) -> [u8; 4] {
    rgba.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
}
