//! Geometry types for snapshot nodes and text-run rectangles.
//!
//! Rectangles here are viewport-relative and cached; the snapshot layer
//! only stores and combines them, it never computes layout itself.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::id::NodeId;

/// A 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2D size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    #[inline]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Check if either dimension is zero or negative.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// A rectangle defined by origin and size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    /// Empty rectangle at origin.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a new rectangle from origin and size.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            origin: Point { x, y },
            size: Size { width, height },
        }
    }

    /// Left edge x coordinate.
    #[inline]
    pub fn left(&self) -> f32 {
        self.origin.x
    }

    /// Top edge y coordinate.
    #[inline]
    pub fn top(&self) -> f32 {
        self.origin.y
    }

    /// Right edge x coordinate.
    #[inline]
    pub fn right(&self) -> f32 {
        self.origin.x + self.size.width
    }

    /// Bottom edge y coordinate.
    #[inline]
    pub fn bottom(&self) -> f32 {
        self.origin.y + self.size.height
    }

    /// Check if the rectangle has zero or negative area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Move the rectangle by the given offsets.
    #[inline]
    pub fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(
            self.origin.x + dx,
            self.origin.y + dy,
            self.size.width,
            self.size.height,
        )
    }

    /// Compute the smallest rectangle containing both rectangles.
    ///
    /// An empty rectangle contributes nothing, so uniting with one returns
    /// the other operand unchanged.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let left = self.left().min(other.left());
        let top = self.top().min(other.top());
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Compute the intersection, or `None` when the rectangles are
    /// disjoint.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.left().max(other.left());
        let top = self.top().max(other.top());
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }
}

/// Cached viewport-relative frames, keyed by node id.
///
/// The owner thread caches a frame whenever layout produces one; the
/// reader thread consults the cache when projecting marker ranges to
/// geometry. Absence of an entry means the frame must be computed on
/// demand through the owner-thread fallback, it is not an error.
#[derive(Default)]
pub struct GeometryCache {
    frames: Mutex<HashMap<NodeId, Rect>>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache the frame for a node, replacing any previous entry.
    pub fn cache_frame(&self, id: NodeId, frame: Rect) {
        self.frames.lock().insert(id, frame);
    }

    /// Look up the cached frame for a node.
    pub fn frame_for(&self, id: NodeId) -> Option<Rect> {
        self.frames.lock().get(&id).copied()
    }

    /// Drop the cached frame for a node.
    pub fn remove(&self, id: NodeId) {
        self.frames.lock().remove(&id);
    }

    /// Number of cached frames.
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
    }

    #[test]
    fn test_union_with_empty() {
        let a = Rect::new(2.0, 3.0, 4.0, 5.0);
        assert_eq!(a.union(&Rect::ZERO), a);
        assert_eq!(Rect::ZERO.union(&a), a);
    }

    #[test]
    fn test_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersect(&b), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));

        let c = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_geometry_cache() {
        let cache = GeometryCache::new();
        let id = NodeId::from_raw(1).unwrap();
        assert_eq!(cache.frame_for(id), None);

        cache.cache_frame(id, Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(cache.frame_for(id), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));

        cache.remove(id);
        assert!(cache.is_empty());
    }
}
