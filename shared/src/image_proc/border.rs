//! Background estimation from picture borders.
//!
//! Tweezer pictures are cropped so that no trap sits on the outermost pixel
//! ring. The mean of that ring is therefore a per-picture background level
//! which absorbs slow drifts in camera offset and stray light.

use ndarray::{ArrayView2, ArrayView3, ArrayViewMut2};

/// Mean count of the perimeter pixels of a single picture.
///
/// Each corner pixel is counted once, so the normalisation is
/// `2 * rows + 2 * cols - 4`. A single-row or single-column picture has no
/// separate interior; in that case the plain mean of all pixels is returned.
pub fn average_border_count(picture: ArrayView2<f64>) -> f64 {
    let (rows, cols) = picture.dim();
    if rows == 0 || cols == 0 {
        return 0.0;
    }
    if rows < 2 || cols < 2 {
        return picture.mean().unwrap_or(0.0);
    }

    let top: f64 = picture.row(0).sum();
    let bottom: f64 = picture.row(rows - 1).sum();
    let left: f64 = picture.column(0).sum();
    let right: f64 = picture.column(cols - 1).sum();
    let corners = picture[[0, 0]]
        + picture[[0, cols - 1]]
        + picture[[rows - 1, 0]]
        + picture[[rows - 1, cols - 1]];

    let perimeter = (2 * rows + 2 * cols - 4) as f64;
    (top + bottom + left + right - corners) / perimeter
}

/// Average border count of every picture whose in-repetition index is
/// `picture`, in stack order.
///
/// # Arguments
/// * `pictures` - Stack shaped `(pictures, rows, cols)`
/// * `picture` - Which picture of each repetition to use (0-indexed)
/// * `pictures_per_repetition` - Pictures taken per experimental repetition
pub fn border_counts(
    pictures: ArrayView3<f64>,
    picture: usize,
    pictures_per_repetition: usize,
) -> Vec<f64> {
    pictures
        .outer_iter()
        .skip(picture)
        .step_by(pictures_per_repetition.max(1))
        .map(average_border_count)
        .collect()
}

/// Mean of the four corner pixels
pub fn corner_average(picture: ArrayView2<f64>) -> f64 {
    let (rows, cols) = picture.dim();
    if rows == 0 || cols == 0 {
        return 0.0;
    }
    (picture[[0, 0]]
        + picture[[0, cols - 1]]
        + picture[[rows - 1, 0]]
        + picture[[rows - 1, cols - 1]])
        / 4.0
}

/// Subtract the corner average from every pixel
pub fn zero_corners(mut picture: ArrayViewMut2<f64>) {
    let offset = corner_average(picture.view());
    picture.mapv_inplace(|v| v - offset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_border_of_constant_picture() {
        let picture = Array2::from_elem((6, 8), 12.5);
        assert_relative_eq!(average_border_count(picture.view()), 12.5);
    }

    #[test]
    fn test_border_ignores_interior() {
        let mut picture = Array2::from_elem((5, 5), 10.0);
        // A bright atom in the middle must not move the background estimate
        picture[[2, 2]] = 5000.0;
        picture[[1, 3]] = 800.0;
        assert_relative_eq!(average_border_count(picture.view()), 10.0);
    }

    #[test]
    fn test_corners_counted_once() {
        let mut picture = Array2::zeros((3, 3));
        picture[[0, 0]] = 8.0;
        // Perimeter of a 3x3 picture has 8 pixels
        assert_relative_eq!(average_border_count(picture.view()), 1.0);
    }

    #[test]
    fn test_border_counts_select_picture_in_repetition() {
        let stack = Array3::from_shape_fn((6, 4, 4), |(p, _, _)| p as f64);
        let counts = border_counts(stack.view(), 1, 2);
        assert_eq!(counts, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_zero_corners() {
        let mut picture = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as f64);
        zero_corners(picture.view_mut());
        // corners 0, 2, 6, 8 average to 4
        assert_relative_eq!(picture[[1, 1]], 0.0);
        assert_relative_eq!(corner_average(picture.view()), 0.0);
    }
}
