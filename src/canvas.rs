use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

pub struct Canvas {
    pub pixmap: Pixmap,
}

pub struct FontState {
    font: fontdue::Font,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height)
            .with_context(|| format!("Invalid canvas size {}x{}", width, height))?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn clear(&mut self, color: [u8; 4]) {
        self.pixmap.fill(Color::from_rgba8(color[0], color[1], color[2], color[3]));
    }

    pub fn fill_polygon(&mut self, points: &[(f32, f32)], color: [u8; 4]) {
        let Some((&(x0, y0), rest)) = points.split_first() else { return };
        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0);
        for &(x, y) in rest {
            pb.line_to(x, y);
        }
        pb.close();
        if let Some(path) = pb.finish() {
            let mut paint = Paint::default();
            paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
            paint.anti_alias = false;
            self.pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }

    pub fn draw_line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, color: [u8; 4], width: f32) {
        let mut pb = PathBuilder::new();
        pb.move_to(x1, y1);
        pb.line_to(x2, y2);
        if let Some(path) = pb.finish() {
            let mut paint = Paint::default();
            paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
            paint.anti_alias = true;
            let stroke = Stroke { width, ..Stroke::default() };
            self.pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    /// Un-premultiplied RGBA of one pixel.
    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some([c.red(), c.green(), c.blue(), c.alpha()])
    }

    /// Pack pixels as little-endian RGB565, one row per `line_length` bytes.
    pub fn pixels_rgb565(&self, line_length: usize) -> Vec<u8> {
        self.pack(line_length, 2, |r, g, b, out| {
            let mut rgb565: u16 = (r as u16 & 0b11111000) << 8;
            rgb565 |= (g as u16 & 0b11111100) << 3;
            rgb565 |= (b as u16) >> 3;
            out.copy_from_slice(&rgb565.to_le_bytes());
        })
    }

    /// Pack pixels as XRGB8888 (BGRX byte order in little-endian).
    pub fn pixels_xrgb8888(&self, line_length: usize) -> Vec<u8> {
        self.pack(line_length, 4, |r, g, b, out| {
            out.copy_from_slice(&[b, g, r, 0xFF]);
        })
    }

    fn pack(&self, line_length: usize, bpp: usize, put: impl Fn(u8, u8, u8, &mut [u8])) -> Vec<u8> {
        let w = self.width() as usize;
        let h = self.height() as usize;
        let row_bytes = (w * bpp).min(line_length);
        let mut out = vec![0u8; line_length * h];
        let data = self.pixmap.data();
        for y in 0..h {
            for x in 0..row_bytes / bpp {
                // Frames are opaque, so premultiplied and straight RGB agree.
                let src = (y * w + x) * 4;
                let dst = y * line_length + x * bpp;
                put(data[src], data[src + 1], data[src + 2], &mut out[dst..dst + bpp]);
            }
        }
        out
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.pixmap
            .save_png(path)
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl FontState {
    /// Load `font_name` as a file path, or find a monospace system font.
    pub fn load(font_name: &str) -> Result<Self> {
        if let Ok(data) = std::fs::read(font_name) {
            if let Ok(font) = fontdue::Font::from_bytes(data, fontdue::FontSettings::default()) {
                log::info!("Using font: {}", font_name);
                return Ok(Self { font });
            }
        }

        let fallback_fonts = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
            "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
            "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
        ];
        for path in &fallback_fonts {
            if let Some(font) = Self::try_load(Path::new(path)) {
                return Ok(Self { font });
            }
        }

        let search_paths = ["/usr/share/fonts", "/usr/local/share/fonts"];
        for base in &search_paths {
            if let Some(font) = Self::walk_for_font(Path::new(base), true) {
                return Ok(Self { font });
            }
        }
        for base in &search_paths {
            if let Some(font) = Self::walk_for_font(Path::new(base), false) {
                return Ok(Self { font });
            }
        }

        anyhow::bail!("No usable font found for '{}'", font_name)
    }

    fn try_load(path: &Path) -> Option<fontdue::Font> {
        let data = std::fs::read(path).ok()?;
        let font = fontdue::Font::from_bytes(data, fontdue::FontSettings::default()).ok()?;
        log::info!("Found font: {}", path.display());
        Some(font)
    }

    fn walk_for_font(dir: &Path, mono_only: bool) -> Option<fontdue::Font> {
        let entries = std::fs::read_dir(dir).ok()?;
        let mut subdirs: Vec<PathBuf> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                subdirs.push(path);
                continue;
            }
            let Some(ext) = path.extension() else { continue };
            let ext = ext.to_string_lossy().to_lowercase();
            if ext != "ttf" && ext != "otf" {
                continue;
            }
            if mono_only && !path.to_string_lossy().contains("Mono") {
                continue;
            }
            if let Some(font) = Self::try_load(&path) {
                return Some(font);
            }
        }
        subdirs.iter().find_map(|d| Self::walk_for_font(d, mono_only))
    }

    pub fn measure_text(&self, text: &str, size: f32) -> (f32, f32) {
        let mut width = 0.0f32;
        let mut max_height = 0.0f32;
        for ch in text.chars() {
            let metrics = self.font.metrics(ch, size);
            width += metrics.advance_width;
            let h = metrics.height as f32;
            if h > max_height { max_height = h; }
        }
        (width, max_height)
    }

    /// Draw `text` with its box centered on (cx, cy).
    pub fn draw_text_centered(&self, canvas: &mut Canvas, text: &str, cx: f32, cy: f32, size: f32, color: [u8; 4]) {
        let (tw, _) = self.measure_text(text, size);
        self.draw_text(canvas, text, cx - tw / 2.0, cy - size / 2.0, size, color);
    }

    pub fn draw_text(&self, canvas: &mut Canvas, text: &str, x: f32, y: f32, size: f32, color: [u8; 4]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, size);
            if !bitmap.is_empty() && metrics.width > 0 && metrics.height > 0 {
                let gx = cursor_x as i32 + metrics.xmin;
                let gy = y as i32 + size as i32 - metrics.height as i32 - metrics.ymin;
                for row in 0..metrics.height {
                    for col in 0..metrics.width {
                        let coverage = bitmap[row * metrics.width + col];
                        if coverage == 0 {
                            continue;
                        }
                        let px = gx + col as i32;
                        let py = gy + row as i32;
                        if px >= 0 && py >= 0 && (px as u32) < canvas.width() && (py as u32) < canvas.height() {
                            let alpha = (coverage as u32 * color[3] as u32) / 255;
                            if alpha > 0 {
                                blend_pixel(&mut canvas.pixmap, px as u32, py as u32, color, alpha as u8);
                            }
                        }
                    }
                }
            }
            cursor_x += metrics.advance_width;
        }
    }
}

fn blend_pixel(pixmap: &mut Pixmap, x: u32, y: u32, color: [u8; 4], alpha: u8) {
    let w = pixmap.width();
    let idx = ((y * w + x) * 4) as usize;
    let data = pixmap.data_mut();
    if idx + 3 >= data.len() { return; }

    let a = alpha as u32;
    let inv_a = 255 - a;
    data[idx]     = ((color[0] as u32 * a + data[idx] as u32 * inv_a) / 255) as u8;
    data[idx + 1] = ((color[1] as u32 * a + data[idx + 1] as u32 * inv_a) / 255) as u8;
    data[idx + 2] = ((color[2] as u32 * a + data[idx + 2] as u32 * inv_a) / 255) as u8;
    data[idx + 3] = (a + data[idx + 3] as u32 * inv_a / 255).min(255) as u8;
}
