use thiserror::Error as ThisError;

/// The largest row, in bytes, the transfer pipeline can buffer (512 pixels).
pub const MAX_ROW_BYTES: usize = 64;
/// One past the last pixel column the controller's 8 bit byte address can reach.
pub const MAX_COLUMN: u16 = 0x100 * 8;

/// The fixed geometry of a panel, in pixels.
///
/// The controller addresses columns 8 pixels at a time, so width, height and the horizontal
/// offset must all be multiples of 8.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    width: u16,
    height: u16,
    x_offset: u16,
}

/// Reasons a [Geometry] can be rejected.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum GeometryError {
    #[error("width and height must be non-zero multiples of 8")]
    UnalignedSize,
    #[error("x offset must be a multiple of 8")]
    UnalignedOffset,
    #[error("rows of {bytes} bytes do not fit the row buffer")]
    RowTooLong { bytes: usize },
    #[error("columns beyond the controller's 8 bit byte address")]
    ColumnOutOfRange,
}

/// The 152x152 black/white/red 1.54" panel.
pub const GEOMETRY_1IN54_BWR: Geometry = match Geometry::new(152, 152, 0) {
    Ok(geometry) => geometry,
    Err(_) => panic!("invalid preset geometry"),
};

impl Geometry {
    pub const fn new(width: u16, height: u16, x_offset: u16) -> Result<Self, GeometryError> {
        if width == 0 || height == 0 || width % 8 != 0 || height % 8 != 0 {
            return Err(GeometryError::UnalignedSize);
        }
        if x_offset % 8 != 0 {
            return Err(GeometryError::UnalignedOffset);
        }
        let bytes = width as usize / 8;
        if bytes > MAX_ROW_BYTES {
            return Err(GeometryError::RowTooLong { bytes });
        }
        if x_offset as usize + width as usize > MAX_COLUMN as usize {
            return Err(GeometryError::ColumnOutOfRange);
        }
        Ok(Self {
            width,
            height,
            x_offset,
        })
    }

    pub const fn width(&self) -> u16 {
        self.width
    }

    pub const fn height(&self) -> u16 {
        self.height
    }

    /// The first pixel column of the panel in controller RAM.
    pub const fn x_offset(&self) -> u16 {
        self.x_offset
    }

    /// The length of one packed row of one plane.
    pub const fn row_bytes(&self) -> usize {
        self.width as usize / 8
    }
}

/// Splits a 16 bit register value into the (low, high) byte order the controller expects.
pub const fn split_low_and_high(value: u16) -> (u8, u8) {
    ((value & 0xFF) as u8, (value >> 8) as u8)
}

/// Saturates a byte address to the 8 bit register.
const fn byte_address(byte: u16) -> u8 {
    if byte > 0xFF {
        0xFF
    } else {
        byte as u8
    }
}

/// Arguments for the RAM X window covering pixel columns `start..end`.
///
/// Both bounds are sent as byte addresses, and the end is inclusive. Addresses beyond the
/// register saturate, and an end below 8 selects byte 0.
pub const fn window_x_args(start: u16, end: u16) -> [u8; 2] {
    [
        byte_address(start / 8),
        byte_address((end / 8).saturating_sub(1)),
    ]
}

/// Arguments for the RAM Y window covering rows `start..end`. The end is sent inclusive, and
/// an empty window selects row 0 as its end.
pub const fn window_y_args(start: u16, end: u16) -> [u8; 4] {
    let (start_low, start_high) = split_low_and_high(start);
    let (end_low, end_high) = split_low_and_high(end.saturating_sub(1));
    [start_low, start_high, end_low, end_high]
}

/// Argument for the RAM X address counter at pixel column `x`, saturating at the last byte.
pub const fn position_x_arg(x: u16) -> u8 {
    byte_address(x / 8)
}

/// Arguments for the RAM Y address counter at row `y`.
pub const fn position_y_args(y: u16) -> [u8; 2] {
    let (low, high) = split_low_and_high(y);
    [low, high]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_for_1in54_panel() {
        assert_eq!(window_x_args(0, 152), [0, 18]);
        assert_eq!(position_x_arg(0), 0);
        assert_eq!(position_y_args(0), [0, 0]);
    }

    #[test]
    fn test_window_end_is_last_byte() {
        for width in (8..=512).step_by(8) {
            for offset in (0..64).step_by(8) {
                let [start, end] = window_x_args(offset, offset + width);
                assert_eq!(start as u16, offset / 8);
                assert_eq!(end as u16, (offset + width) / 8 - 1);
                assert_eq!((end - start) as u16 + 1, width / 8);
            }
        }
    }

    #[test]
    fn test_out_of_range_addresses_saturate() {
        assert_eq!(window_x_args(0, 0), [0, 0]);
        assert_eq!(window_x_args(0, 7), [0, 0]);
        assert_eq!(window_x_args(2040, 2048), [0xFF, 0xFF]);
        assert_eq!(window_x_args(2048, u16::MAX), [0xFF, 0xFF]);
        assert_eq!(window_y_args(0, 0), [0, 0, 0, 0]);
        assert_eq!(position_x_arg(2040), 0xFF);
        assert_eq!(position_x_arg(4096), 0xFF);
    }

    #[test]
    fn test_window_y_is_little_endian_and_inclusive() {
        assert_eq!(window_y_args(0, 152), [0, 0, 151, 0]);
        assert_eq!(window_y_args(8, 296), [8, 0, 0x27, 0x01]);
        assert_eq!(window_y_args(0x100, 0x208), [0x00, 0x01, 0x07, 0x02]);
        assert_eq!(position_y_args(0x0127), [0x27, 0x01]);
    }

    #[test]
    fn test_geometry_accepts_aligned_sizes() {
        let geometry = Geometry::new(152, 296, 8).unwrap();
        assert_eq!(geometry.width(), 152);
        assert_eq!(geometry.height(), 296);
        assert_eq!(geometry.x_offset(), 8);
        assert_eq!(geometry.row_bytes(), 19);
        assert_eq!(GEOMETRY_1IN54_BWR.row_bytes(), 19);
    }

    #[test]
    fn test_geometry_rejects_invalid_sizes() {
        assert_eq!(Geometry::new(150, 152, 0), Err(GeometryError::UnalignedSize));
        assert_eq!(Geometry::new(152, 4, 0), Err(GeometryError::UnalignedSize));
        assert_eq!(Geometry::new(0, 152, 0), Err(GeometryError::UnalignedSize));
        assert_eq!(Geometry::new(152, 152, 4), Err(GeometryError::UnalignedOffset));
        assert_eq!(
            Geometry::new(520, 8, 0),
            Err(GeometryError::RowTooLong { bytes: 65 })
        );
        assert_eq!(
            Geometry::new(512, 8, 1544),
            Err(GeometryError::ColumnOutOfRange)
        );
    }

    #[test]
    fn test_geometry_error_messages() {
        assert_eq!(
            GeometryError::RowTooLong { bytes: 65 }.to_string(),
            "rows of 65 bytes do not fit the row buffer"
        );
    }
}
