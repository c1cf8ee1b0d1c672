use serde::Serialize;

/// Axis-aligned rectangle in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner.
    pub x: u32,
    /// Y coordinate of the top-left corner.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Create a box from its top-left corner and size.
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Center point in pixel coordinates.
    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Whether the pixel `(px, py)` lies inside the box.
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Whether the box fits entirely inside a `width` × `height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0 && self.height > 0 && self.right() <= width && self.bottom() <= height
    }

    /// Shift the box by an offset, e.g. from crop-local into global coordinates.
    pub fn translate(&self, dx: u32, dy: u32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Intersect the box with a `width` × `height` image.
    ///
    /// Returns `None` when nothing of the box remains inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.right().min(width);
        let y1 = self.bottom().min(height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Self::new(x0, y0, x1 - x0, y1 - y0))
    }

    /// Grow the box by `margin` on every side, clamped to a `width` × `height` image.
    pub fn pad(&self, margin: u32, width: u32, height: u32) -> Option<Self> {
        let x0 = self.x.saturating_sub(margin);
        let y0 = self.y.saturating_sub(margin);
        let x1 = self.right().saturating_add(margin);
        let y1 = self.bottom().saturating_add(margin);
        Self::new(x0, y0, x1 - x0, y1 - y0).clamp_to(width, height)
    }

    /// Build a box from signed coordinates (as returned by some detectors),
    /// clipping negative origins to zero.
    pub fn from_signed(x: i64, y: i64, width: i64, height: i64) -> Option<Self> {
        let x1 = x.saturating_add(width);
        let y1 = y.saturating_add(height);
        let x0 = x.max(0);
        let y0 = y.max(0);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let to_u32 = |v: i64| u32::try_from(v).unwrap_or(u32::MAX);
        Some(Self::new(
            to_u32(x0),
            to_u32(y0),
            to_u32(x1 - x0),
            to_u32(y1 - y0),
        ))
    }
}

/// Fractions of the face box that make up the nose-bridge region.
const NOSE_LEFT: f64 = 0.35;
const NOSE_TOP: f64 = 0.30;
const NOSE_WIDTH: f64 = 0.30;
const NOSE_HEIGHT: f64 = 0.30;

/// Estimate the nose-bridge region from the face box alone.
///
/// The region starts 35% across and 30% down the face and spans 30% of the
/// face in each direction. Fractions are truncated toward zero; the size is
/// at least one pixel.
pub fn nose_bridge(face: &BoundingBox) -> BoundingBox {
    let fw = face.width as f64;
    let fh = face.height as f64;
    BoundingBox::new(
        face.x + (fw * NOSE_LEFT) as u32,
        face.y + (fh * NOSE_TOP) as u32,
        ((fw * NOSE_WIDTH) as u32).max(1),
        ((fh * NOSE_HEIGHT) as u32).max(1),
    )
}
