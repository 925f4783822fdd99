use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::flip_vertical_in_place;
use image::{ImageFormat, RgbaImage};
use offscreen::{Gl, Viewport};

/// Reads back the bound framebuffer and writes it as a top-down PNG.
pub fn save_png<G: Gl>(gl: &G, width: u32, height: u32, path: &Path) -> Result<()> {
    let region = Viewport::covering(
        i32::try_from(width).context("capture width out of range")?,
        i32::try_from(height).context("capture height out of range")?,
    );
    let pixels = gl.read_pixels_rgba(region);
    let mut image = RgbaImage::from_raw(width, height, pixels)
        .context("framebuffer read-back was shorter than the capture size")?;
    // GL rows start at the bottom.
    flip_vertical_in_place(&mut image);
    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("failed to write capture to {}", path.display()))?;
    tracing::info!(path = %path.display(), width, height, "captured frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use offscreen::soft::SoftContext;
    use offscreen::{BlitOrientation, RenderContext, Sampling, TextureBlitter};

    use super::*;

    #[test]
    fn capture_is_written_top_down() {
        let context = Rc::new(SoftContext::headless(1, 2));
        let gl = context.gl();
        // Bottom row red, top row green.
        let pixels: [u8; 8] = [255, 0, 0, 255, 0, 255, 0, 255];
        let texture = gl.create_texture().unwrap();
        gl.bind_texture_2d(Some(texture));
        gl.allocate_texture_2d_rgba(1, 2, Some(&pixels[..]));
        gl.set_texture_sampling_2d(Sampling::NEAREST_CLAMP);
        gl.bind_texture_2d(None);
        TextureBlitter::new(context.clone()).blit(texture, None, BlitOrientation::Normal);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        save_png(gl, 1, 2, &path).unwrap();

        let written = image::open(&path).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (1, 2));
        assert_eq!(written.get_pixel(0, 0).0, [0, 255, 0, 255]);
        assert_eq!(written.get_pixel(0, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let context = Rc::new(SoftContext::headless(1, 1));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("frame.png");
        assert!(save_png(context.gl(), 1, 1, &path).is_err());
    }
}
