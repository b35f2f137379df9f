//! Text rasterization using `cosmic-text`.
//!
//! The engine owns a `FontSystem` (system font discovery + shaping) and a
//! `SwashCache` (glyph rasterization). Glyph coverage is blitted straight
//! into the page pixmap; no atlas is needed for a CPU surface.

use cosmic_text::{Attrs, Buffer, Color as CColor, Family, FontSystem, Metrics, Shaping, SwashCache};
use notary_core::Color;
use tiny_skia::{Paint, Pixmap, Rect, Transform};

/// Line height as a multiple of font size.
const LINE_HEIGHT_FACTOR: f32 = 1.2;

pub struct TextEngine {
    font_system: FontSystem,
    swash_cache: SwashCache,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    /// Create a new engine with system font discovery.
    pub fn new() -> Self {
        let font_system = FontSystem::new();
        let faces = font_system.db().len();
        if faces == 0 {
            log::warn!("No system fonts found; text annotations will not be visible");
        } else {
            log::debug!("Text engine loaded {faces} font faces");
        }
        Self {
            font_system,
            swash_cache: SwashCache::new(),
        }
    }

    /// Shape `value` and draw it into `pixmap` in device pixels.
    ///
    /// `(x, y)` is the start of the first line's baseline.
    pub fn draw(
        &mut self,
        pixmap: &mut Pixmap,
        x: f32,
        y: f32,
        value: &str,
        font_size: f32,
        color: Color,
    ) {
        let Self {
            font_system,
            swash_cache,
        } = self;

        let metrics = Metrics::new(font_size, font_size * LINE_HEIGHT_FACTOR);
        let mut buffer = Buffer::new(font_system, metrics);
        buffer.set_text(
            font_system,
            value,
            Attrs::new().family(Family::SansSerif),
            Shaping::Advanced,
        );
        buffer.shape_until_scroll(font_system, false);

        let baseline = buffer
            .layout_runs()
            .next()
            .map(|run| run.line_y)
            .unwrap_or(font_size);
        let origin_x = x.round();
        let origin_y = (y - baseline).round();

        let text_color = CColor::rgb(color.r, color.g, color.b);
        let mut paint = Paint::default();
        paint.anti_alias = false;

        buffer.draw(font_system, swash_cache, text_color, |gx, gy, w, h, c| {
            if c.a() == 0 {
                return;
            }
            let Some(rect) = Rect::from_xywh(
                origin_x + gx as f32,
                origin_y + gy as f32,
                w as f32,
                h as f32,
            ) else {
                return;
            };
            paint.set_color_rgba8(c.r(), c.g(), c.b(), c.a());
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        });
    }
}
