//! Offscreen raster drawing for distribution frames.

use image::RgbaImage;
use thiserror::Error;
use tiny_skia::{
    Color, GradientStop, LinearGradient, Paint, PathBuilder, Pixmap, Point, Rect, SpreadMode,
    Stroke, Transform,
};

use crate::data::histogram::HistogramFrame;

use RenderError::Geometry;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} surface")]
    Allocation { width: u32, height: u32 },
    #[error("invalid geometry: {0}")]
    Geometry(String),
    #[error("pixel buffer does not match {width}x{height}")]
    Buffer { width: u32, height: u32 },
}

pub type RenderResult<T> = Result<T, RenderError>;

/// RGBA color, 8 bits per channel.
pub type Rgba = [u8; 4];

/// Pixel-buffer drawing primitives used by the export path.
pub trait RasterSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn clear(&mut self, color: Rgba) -> RenderResult<()>;
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba) -> RenderResult<()>;
    /// Vertical gradient from `top` to `bottom`.
    fn fill_rect_gradient(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        top: Rgba,
        bottom: Rgba,
    ) -> RenderResult<()>;
    fn line(&mut self, from: (f32, f32), to: (f32, f32), width: f32, color: Rgba)
        -> RenderResult<()>;
    /// Copy out the current contents as straight-alpha RGBA.
    fn snapshot(&self) -> RenderResult<RgbaImage>;
}

fn color(c: Rgba) -> Color {
    Color::from_rgba8(c[0], c[1], c[2], c[3])
}

fn solid(c: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(c[0], c[1], c[2], c[3]);
    paint.anti_alias = true;
    paint
}

fn rect(x: f32, y: f32, w: f32, h: f32) -> RenderResult<Rect> {
    Rect::from_xywh(x, y, w, h).ok_or_else(|| Geometry(format!("rect {x},{y} {w}x{h}")))
}

/// [`RasterSurface`] over a tiny-skia [`Pixmap`].
pub struct PixmapSurface {
    pixmap: Pixmap,
}

impl PixmapSurface {
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or(RenderError::Allocation { width, height })?;
        Ok(Self { pixmap })
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

impl RasterSurface for PixmapSurface {
    fn width(&self) -> u32 {
        self.pixmap.width()
    }

    fn height(&self) -> u32 {
        self.pixmap.height()
    }

    fn clear(&mut self, c: Rgba) -> RenderResult<()> {
        self.pixmap.fill(color(c));
        Ok(())
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, c: Rgba) -> RenderResult<()> {
        let r = rect(x, y, w, h)?;
        self.pixmap
            .fill_rect(r, &solid(c), Transform::identity(), None);
        Ok(())
    }

    fn fill_rect_gradient(
        &mut self,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        top: Rgba,
        bottom: Rgba,
    ) -> RenderResult<()> {
        let r = rect(x, y, w, h)?;
        let shader = LinearGradient::new(
            Point::from_xy(x, y),
            Point::from_xy(x, y + h),
            vec![
                GradientStop::new(0.0, color(top)),
                GradientStop::new(1.0, color(bottom)),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        )
        .ok_or_else(|| Geometry(format!("gradient over {h}px")))?;
        let mut paint = Paint::default();
        paint.shader = shader;
        paint.anti_alias = true;
        self.pixmap.fill_rect(r, &paint, Transform::identity(), None);
        Ok(())
    }

    fn line(
        &mut self,
        from: (f32, f32),
        to: (f32, f32),
        width: f32,
        c: Rgba,
    ) -> RenderResult<()> {
        let mut pb = PathBuilder::new();
        pb.move_to(from.0, from.1);
        pb.line_to(to.0, to.1);
        let path = pb
            .finish()
            .ok_or_else(|| Geometry(format!("line {from:?} -> {to:?}")))?;
        let stroke = Stroke {
            width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &solid(c), &stroke, Transform::identity(), None);
        Ok(())
    }

    fn snapshot(&self) -> RenderResult<RgbaImage> {
        let (width, height) = (self.pixmap.width(), self.pixmap.height());
        let mut buf = Vec::with_capacity(self.pixmap.pixels().len() * 4);
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            buf.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        RgbaImage::from_raw(width, height, buf).ok_or(RenderError::Buffer { width, height })
    }
}

/// Colors and margins of a rendered distribution frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramStyle {
    pub background: Rgba,
    pub bar_top: Rgba,
    pub bar_bottom: Rgba,
    pub axis: Rgba,
    pub margin: f32,
}

impl Default for HistogramStyle {
    fn default() -> Self {
        Self {
            background: [255, 255, 255, 255],
            bar_top: [31, 119, 180, 255],
            bar_bottom: [174, 199, 232, 255],
            axis: [64, 64, 64, 255],
            margin: 16.0,
        }
    }
}

/// Draws one frame as bars, with heights scaled against a fixed maximum so
/// consecutive frames share a y scale.
#[derive(Debug, Clone, Default)]
pub struct HistogramPainter {
    pub style: HistogramStyle,
}

impl HistogramPainter {
    pub fn new(style: HistogramStyle) -> Self {
        Self { style }
    }

    pub fn paint<S: RasterSurface + ?Sized>(
        &self,
        surface: &mut S,
        frame: &HistogramFrame,
        scale_max: f64,
    ) -> RenderResult<()> {
        let s = &self.style;
        surface.clear(s.background)?;

        let (w, h) = (surface.width() as f32, surface.height() as f32);
        let left = s.margin;
        let bottom = h - s.margin;
        let plot_w = w - 2.0 * s.margin;
        let plot_h = h - 2.0 * s.margin;
        if plot_w <= 0.0 || plot_h <= 0.0 {
            return Err(Geometry(format!("{w}x{h} leaves no room inside the margins")));
        }

        let count = frame.freq.len();
        if count > 0 && scale_max > 0.0 {
            let bar_w = plot_w / count as f32;
            for (i, &f) in frame.freq.iter().enumerate() {
                let bar_h = ((f / scale_max).min(1.0) as f32) * plot_h;
                if bar_h < 0.5 {
                    continue;
                }
                let x = left + i as f32 * bar_w;
                surface.fill_rect_gradient(
                    x,
                    bottom - bar_h,
                    bar_w.max(1.0),
                    bar_h,
                    s.bar_top,
                    s.bar_bottom,
                )?;
            }
        }

        surface.line((left, bottom), (left + plot_w, bottom), 1.0, s.axis)?;
        surface.line((left, bottom), (left, bottom - plot_h), 1.0, s.axis)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::histogram::BinSpec;

    fn frame(freq: Vec<f64>) -> HistogramFrame {
        let count = freq.len();
        HistogramFrame::try_new(0, BinSpec { min: 0.0, max: 1.0, count }, freq).unwrap()
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        assert!(matches!(
            PixmapSurface::new(0, 10),
            Err(RenderError::Allocation { width: 0, height: 10 })
        ));
    }

    #[test]
    fn tallest_bar_reaches_the_top_of_the_plot() {
        let mut surface = PixmapSurface::new(40, 40).unwrap();
        let painter = HistogramPainter::new(HistogramStyle {
            margin: 4.0,
            ..HistogramStyle::default()
        });
        painter.paint(&mut surface, &frame(vec![0.0, 2.0]), 2.0).unwrap();
        let img = surface.snapshot().unwrap();
        assert_eq!(img.dimensions(), (40, 40));
        // inside the second bar, near its top
        assert_ne!(img.get_pixel(30, 6).0, [255, 255, 255, 255]);
        // first bin is empty
        assert_eq!(img.get_pixel(10, 20).0, [255, 255, 255, 255]);
    }

    #[test]
    fn margins_larger_than_surface_fail() {
        let mut surface = PixmapSurface::new(10, 10).unwrap();
        let painter = HistogramPainter::default();
        assert!(painter.paint(&mut surface, &frame(vec![1.0]), 1.0).is_err());
    }
}
