use serde::{Deserialize, Serialize};

/// A position in page space: PDF points, origin at the top-left corner of the
/// unrotated page, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            width: self.width * factor,
            height: self.height * factor,
        }
    }

    pub fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn is_valid(&self) -> bool {
        self.right > self.left && self.bottom > self.top
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }

    /// Orders the edges so that `left <= right` and `top <= bottom`.
    pub fn normalized(&self) -> Self {
        Self {
            left: self.left.min(self.right),
            top: self.top.min(self.bottom),
            right: self.left.max(self.right),
            bottom: self.top.max(self.bottom),
        }
    }

    pub fn union(&self, other: &Rect) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// A quadrilateral bounding a search hit or a text selection, in page space.
/// Corners follow reading order: upper-left, upper-right, lower-left, lower-right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point,
    pub ur: Point,
    pub ll: Point,
    pub lr: Point,
}

impl Quad {
    pub fn from_rect(rect: Rect) -> Self {
        Self {
            ul: Point::new(rect.left, rect.top),
            ur: Point::new(rect.right, rect.top),
            ll: Point::new(rect.left, rect.bottom),
            lr: Point::new(rect.right, rect.bottom),
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [self.ul, self.ur, self.ll, self.lr]
    }

    pub fn bounds(&self) -> Rect {
        let [first, rest @ ..] = self.corners();
        let mut rect = Rect::new(first.x, first.y, first.x, first.y);
        for corner in rest {
            rect = rect.union(&Rect::new(corner.x, corner.y, corner.x, corner.y));
        }
        rect
    }
}

/// Clockwise page rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Normalizes any multiple of 90 (negative values included); other angles
    /// snap down to the previous quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) / 90 {
            1 => Rotation::Deg90,
            2 => Rotation::Deg180,
            3 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    pub fn rotated(self, clockwise: bool) -> Self {
        let delta = if clockwise { 90 } else { -90 };
        Self::from_degrees(i32::from(self.degrees()) + delta)
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }

    /// Size of a page of `size` once displayed with this rotation.
    pub fn apply_to_size(self, size: Size) -> Size {
        if self.swaps_axes() {
            size.transposed()
        } else {
            size
        }
    }

    /// Maps an unrotated page-space point into the rotated display space of a
    /// page whose unrotated size is `page`.
    pub fn map_point(self, point: Point, page: Size) -> Point {
        match self {
            Rotation::Deg0 => point,
            Rotation::Deg90 => Point::new(page.height - point.y, point.x),
            Rotation::Deg180 => Point::new(page.width - point.x, page.height - point.y),
            Rotation::Deg270 => Point::new(point.y, page.width - point.x),
        }
    }

    pub fn map_rect(self, rect: Rect, page: Size) -> Rect {
        let a = self.map_point(Point::new(rect.left, rect.top), page);
        let b = self.map_point(Point::new(rect.right, rect.bottom), page);
        Rect::new(a.x, a.y, b.x, b.y).normalized()
    }
}

/// Row-major 2x3 affine matrix `[a b c d e f]`, mapping `(x, y)` to
/// `(a*x + c*y + e, b*x + d*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// `self` followed by `other`.
    pub fn then(&self, other: &Transform) -> Self {
        Self {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            self.a * point.x + self.c * point.y + self.e,
            self.b * point.x + self.d * point.y + self.f,
        )
    }

    /// Uniform scale component, used by backends that only support scaling.
    pub fn scale_factor(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }
}
