/// Axis-aligned rectangle in pixels (top-left origin).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle at `(x, y)` with the size of a `width`×`height` texture.
    #[inline]
    pub fn at(x: f32, y: f32, width: u32, height: u32) -> Self {
        Self::new(x, y, width as f32, height as f32)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Converts a pixel-space source rect into `[u_min, v_min, u_max, v_max]`
    /// for a texture of the given size.
    pub fn to_uv(self, texture_width: u32, texture_height: u32) -> [f32; 4] {
        let tw = texture_width.max(1) as f32;
        let th = texture_height.max(1) as f32;
        [
            self.x / tw,
            self.y / th,
            (self.x + self.width) / tw,
            (self.y + self.height) / th,
        ]
    }
}
