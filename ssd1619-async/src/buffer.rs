use core::convert::Infallible;

use embedded_graphics::{
    pixelcolor::PixelColor,
    prelude::{Dimensions, DrawTarget, OriginDimensions, Size},
    primitives::Rectangle,
    Pixel,
};

use crate::{
    geometry::{Geometry, GEOMETRY_1IN54_BWR},
    pipeline::{Plane, RowSource},
};

/// The colours a bi-color panel can show.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriColor {
    Black,
    White,
    Red,
}

impl PixelColor for TriColor {
    type Raw = ();
}

impl TriColor {
    /// The (monochrome, red) plane bits for this colour.
    ///
    /// Red pixels are white in the monochrome plane, so the panel has a light base under the red
    /// particles.
    const fn plane_bits(self) -> (bool, bool) {
        match self {
            TriColor::Black => (false, false),
            TriColor::White => (true, false),
            TriColor::Red => (true, true),
        }
    }
}

/// Computes the length of each plane of a [TriColorBuffer] with the given dimensions.
pub const fn tricolor_buffer_length(size: Size) -> usize {
    (size.width as usize / 8) * size.height as usize
}

/// The pixel size of a panel geometry.
pub const fn geometry_size(geometry: Geometry) -> Size {
    Size::new(geometry.width() as u32, geometry.height() as u32)
}

/// The buffer type for [GEOMETRY_1IN54_BWR].
pub type Buffer1In54Bwr =
    TriColorBuffer<{ tricolor_buffer_length(geometry_size(GEOMETRY_1IN54_BWR)) }>;
/// Constructs a new, all white buffer for [GEOMETRY_1IN54_BWR].
pub fn new_1in54_bwr_buffer() -> Buffer1In54Bwr {
    Buffer1In54Bwr::new(geometry_size(GEOMETRY_1IN54_BWR))
}

/// A frame buffer for bi-color panels, holding both planes packed 8 pixels per byte.
///
/// It can be drawn on with `embedded-graphics`, then handed to [crate::Ssd1619::draw] as a
/// [RowSource]. Flushing is a no-op: the buffer keeps its content between frames.
pub struct TriColorBuffer<const L: usize> {
    size: Size,
    bytes_per_row: usize,
    mono: [u8; L],
    red: [u8; L],
}

impl<const L: usize> TriColorBuffer<L> {
    /// Creates a new [TriColorBuffer] with all pixels set to [TriColor::White].
    ///
    /// The dimensions must match the buffer length `L`, and the width must be a multiple of 8.
    ///
    /// ```
    /// use embedded_graphics::prelude::Size;
    /// use ssd1619_async::buffer::{tricolor_buffer_length, TriColorBuffer};
    ///
    /// const DIMENSIONS: Size = Size::new(8, 8);
    /// let buffer = TriColorBuffer::<{ tricolor_buffer_length(DIMENSIONS) }>::new(DIMENSIONS);
    /// ```
    pub fn new(dimensions: Size) -> Self {
        debug_assert_eq!(
            dimensions.width % 8,
            0,
            "Width must be a multiple of 8 for binary packing."
        );
        debug_assert_eq!(
            tricolor_buffer_length(dimensions),
            L,
            "Size must match given dimensions"
        );
        Self {
            size: dimensions,
            bytes_per_row: dimensions.width as usize / 8,
            mono: [0xFF; L],
            red: [0; L],
        }
    }

    /// The packed monochrome plane. A set bit is white.
    pub fn mono(&self) -> &[u8] {
        &self.mono
    }

    /// The packed red plane. A set bit is red.
    pub fn red(&self) -> &[u8] {
        &self.red
    }

    fn set(&mut self, byte_index: usize, bit_index: usize, color: TriColor) {
        let mask = 0x80 >> bit_index;
        let (mono, red) = color.plane_bits();
        if mono {
            self.mono[byte_index] |= mask;
        } else {
            self.mono[byte_index] &= !mask;
        }
        if red {
            self.red[byte_index] |= mask;
        } else {
            self.red[byte_index] &= !mask;
        }
    }
}

impl<const L: usize> OriginDimensions for TriColorBuffer<L> {
    fn size(&self) -> Size {
        self.size
    }
}

impl<const L: usize> DrawTarget for TriColorBuffer<L> {
    type Color = TriColor;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels.into_iter() {
            if point.x < 0
                || point.x >= self.size.width as i32
                || point.y < 0
                || point.y >= self.size.height as i32
            {
                continue; // Skip out-of-bounds pixels
            }

            let byte_index = (point.x as usize) / 8 + (point.y as usize * self.bytes_per_row);
            self.set(byte_index, point.x as usize % 8, color);
        }
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let drawable_area = self.bounding_box().intersection(area);
        if drawable_area.is_zero_sized() {
            return Ok(()); // Nothing to fill
        }

        let (mono, red) = color.plane_bits();
        let full_byte = |on: bool| if on { 0xFF } else { 0x00 };
        let x_start = drawable_area.top_left.x as usize;
        let x_end = x_start + drawable_area.size.width as usize;
        for y in drawable_area.rows() {
            let row_start = y as usize * self.bytes_per_row;
            let mut x = x_start;
            while x < x_end {
                let byte_index = row_start + x / 8;
                if x % 8 == 0 && x + 8 <= x_end {
                    // Fast fill for fully covered bytes.
                    self.mono[byte_index] = full_byte(mono);
                    self.red[byte_index] = full_byte(red);
                    x += 8;
                } else {
                    self.set(byte_index, x % 8, color);
                    x += 1;
                }
            }
        }
        Ok(())
    }
}

impl<const L: usize> RowSource for TriColorBuffer<L> {
    fn render_row(&mut self, row: &mut [u8], y: u16, plane: Plane) {
        let start = y as usize * self.bytes_per_row;
        let len = row.len().min(self.bytes_per_row);
        let data = match plane {
            Plane::Monochrome => &self.mono,
            Plane::Red => &self.red,
        };
        if let Some(src) = data.get(start..start + len) {
            row[..len].copy_from_slice(src);
        }
    }
}
