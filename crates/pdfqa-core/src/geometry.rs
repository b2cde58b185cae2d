//! Page-space geometry
//!
//! All coordinates are PDF default user space: points, origin bottom-left.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a normalized rect from two opposite corners in any order
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x: x0.min(x1),
            y: y0.min(y1),
            width: (x1 - x0).abs(),
            height: (y1 - y0).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    /// True when the rect has no area or carries non-finite values
    pub fn is_empty(&self) -> bool {
        !(self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width * self.height
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Point containment, edges included
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.top()
    }

    /// Overlap with positive area. Touching edges do not count.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersection(other).is_some()
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.top().min(other.top());
        let rect = Rect::new(x0, y0, x1 - x0, y1 - y0);
        if rect.is_empty() {
            None
        } else {
            Some(rect)
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.top().max(other.top()),
        )
    }

    /// `[x0 y0 x1 y1]` as PDF `Rect` array values
    pub fn to_pdf_rect(&self) -> [f32; 4] {
        [
            self.x as f32,
            self.y as f32,
            self.right() as f32,
            self.top() as f32,
        ]
    }

    /// QuadPoints in the order viewers expect: top-left, top-right, bottom-left, bottom-right
    pub fn to_quad_points(&self) -> [f32; 8] {
        [
            self.x as f32,
            self.top() as f32,
            self.right() as f32,
            self.top() as f32,
            self.x as f32,
            self.y as f32,
            self.right() as f32,
            self.y as f32,
        ]
    }
}

/// Affine transform `[a b c d e f]` using the PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`
    pub fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    /// Axis-aligned bounds of a rect after transformation
    pub fn transform_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(rect.x, rect.y),
            self.apply(rect.right(), rect.y),
            self.apply(rect.x, rect.top()),
            self.apply(rect.right(), rect.top()),
        ];
        let (mut x0, mut y0) = corners[0];
        let (mut x1, mut y1) = corners[0];
        for &(x, y) in &corners[1..] {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        Rect::from_corners(x0, y0, x1, y1)
    }
}

/// The geometry of one text occurrence: one rect per line it touches
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub rects: Vec<Rect>,
}

impl Region {
    pub fn new(rects: Vec<Rect>) -> Self {
        Self { rects }
    }

    pub fn is_empty(&self) -> bool {
        self.rects.iter().all(Rect::is_empty)
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.rects
            .iter()
            .filter(|r| !r.is_empty())
            .copied()
            .reduce(|acc, r| acc.union(&r))
    }

    /// Clip every rect to `page`, dropping the ones that fall outside
    pub fn clamped_to(&self, page: &Rect) -> Region {
        Region {
            rects: self
                .rects
                .iter()
                .filter_map(|r| r.intersection(page))
                .collect(),
        }
    }
}
