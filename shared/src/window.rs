//! Rectangular pixel windows applied to picture stacks

use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced when a window does not fit the pictures it is applied to
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("window {window} is empty")]
    Empty { window: PixelWindow },
    #[error("window {window} exceeds picture size {cols}x{rows}")]
    OutOfBounds {
        window: PixelWindow,
        rows: usize,
        cols: usize,
    },
}

/// Region of interest in picture coordinates
///
/// `x` indexes columns and `y` indexes rows; the maxima are exclusive. A
/// maximum of zero means "to the edge of the picture", so the default window
/// covers everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelWindow {
    /// First column kept
    pub x_min: usize,
    /// One past the last column kept (0 = picture width)
    pub x_max: usize,
    /// First row kept
    pub y_min: usize,
    /// One past the last row kept (0 = picture height)
    pub y_max: usize,
}

impl PixelWindow {
    /// Window covering the full picture
    pub fn full() -> Self {
        Self::default()
    }

    pub fn new(x_min: usize, x_max: usize, y_min: usize, y_max: usize) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// True when the window keeps every pixel regardless of picture size
    pub fn is_full(&self) -> bool {
        *self == Self::full()
    }

    /// Resolve zero maxima against a concrete picture size, returning
    /// `(row_range, col_range)` as half-open bounds.
    pub fn resolve(
        &self,
        rows: usize,
        cols: usize,
    ) -> Result<((usize, usize), (usize, usize)), WindowError> {
        let x_max = if self.x_max == 0 { cols } else { self.x_max };
        let y_max = if self.y_max == 0 { rows } else { self.y_max };

        if x_max > cols || y_max > rows {
            return Err(WindowError::OutOfBounds {
                window: *self,
                rows,
                cols,
            });
        }
        if self.x_min >= x_max || self.y_min >= y_max {
            return Err(WindowError::Empty { window: *self });
        }

        Ok(((self.y_min, y_max), (self.x_min, x_max)))
    }
}

impl fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[x {}..{}, y {}..{}]",
            self.x_min, self.x_max, self.y_min, self.y_max
        )
    }
}

/// Crop every picture of a `(pictures, rows, cols)` stack to `window`
pub fn crop_stack(
    pictures: ArrayView3<f64>,
    window: &PixelWindow,
) -> Result<Array3<f64>, WindowError> {
    let (_, rows, cols) = pictures.dim();
    let ((y0, y1), (x0, x1)) = window.resolve(rows, cols)?;
    Ok(pictures.slice(s![.., y0..y1, x0..x1]).to_owned())
}
