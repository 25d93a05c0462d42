use ndarray::{s, Array2};
use num_traits::Float;

use crate::error::{DiffimError, Result};
use crate::mask::MaskPixel;

/// An axis-aligned box in parent pixel coordinates.
///
/// `x0`/`y0` are the column/row of the lower-left corner; the box covers
/// `x0..x0 + width` and `y0..y0 + height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BBox {
    pub x0: i64,
    pub y0: i64,
    pub width: usize,
    pub height: usize,
}

impl BBox {
    pub fn new(x0: i64, y0: i64, width: usize, height: usize) -> Self {
        Self {
            x0,
            y0,
            width,
            height,
        }
    }

    /// Build a box from inclusive corner coordinates.
    pub fn from_corners(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        Self {
            x0: min_x,
            y0: min_y,
            width: (max_x - min_x + 1).max(0) as usize,
            height: (max_y - min_y + 1).max(0) as usize,
        }
    }

    /// Inclusive maximum column.
    pub fn x1(&self) -> i64 {
        self.x0 + self.width as i64 - 1
    }

    /// Inclusive maximum row.
    pub fn y1(&self) -> i64 {
        self.y0 + self.height as i64 - 1
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x0 && x <= self.x1() && y >= self.y0 && y <= self.y1()
    }

    pub fn contains_bbox(&self, other: &BBox) -> bool {
        other.is_empty()
            || (self.contains(other.x0, other.y0) && self.contains(other.x1(), other.y1()))
    }

    /// Grow the box by `n` pixels on every side.
    pub fn grown(&self, n: usize) -> Self {
        Self {
            x0: self.x0 - n as i64,
            y0: self.y0 - n as i64,
            width: self.width + 2 * n,
            height: self.height + 2 * n,
        }
    }
}

/// Image, mask and variance planes of identical shape, with an origin offset
/// into the parent image they were cut from.
///
/// Arrays are row-major with shape `(height, width)`, indexed `[[row, col]]`.
#[derive(Clone, Debug)]
pub struct MaskedImage<T> {
    pub image: Array2<T>,
    pub mask: Array2<MaskPixel>,
    pub variance: Array2<T>,
    /// Parent column of local column 0.
    pub x0: i64,
    /// Parent row of local row 0.
    pub y0: i64,
}

impl<T: Float> MaskedImage<T> {
    pub fn new(image: Array2<T>, mask: Array2<MaskPixel>, variance: Array2<T>) -> Result<Self> {
        check_same_dim(image.dim(), mask.dim())?;
        check_same_dim(image.dim(), variance.dim())?;
        Ok(Self {
            image,
            mask,
            variance,
            x0: 0,
            y0: 0,
        })
    }

    /// Wrap a bare image with an empty mask and a uniform variance plane.
    pub fn from_image(image: Array2<T>, variance: T) -> Self {
        let dim = image.dim();
        Self {
            image,
            mask: Array2::zeros(dim),
            variance: Array2::from_elem(dim, variance),
            x0: 0,
            y0: 0,
        }
    }

    pub fn with_origin(mut self, x0: i64, y0: i64) -> Self {
        self.x0 = x0;
        self.y0 = y0;
        self
    }

    pub fn width(&self) -> usize {
        self.image.ncols()
    }

    pub fn height(&self) -> usize {
        self.image.nrows()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.image.dim()
    }

    /// Bounding box of this image in parent coordinates.
    pub fn bbox(&self) -> BBox {
        BBox::new(self.x0, self.y0, self.width(), self.height())
    }

    /// Copy out the region covered by `bbox` (parent coordinates).
    ///
    /// Fails when the box is empty or not fully contained in this image.
    pub fn sub_image(&self, bbox: &BBox) -> Result<Self> {
        let (col0, row0) = self.local_origin(bbox)?;
        let rows = row0..row0 + bbox.height;
        let cols = col0..col0 + bbox.width;
        Ok(Self {
            image: self.image.slice(s![rows.clone(), cols.clone()]).to_owned(),
            mask: self.mask.slice(s![rows.clone(), cols.clone()]).to_owned(),
            variance: self.variance.slice(s![rows, cols]).to_owned(),
            x0: bbox.x0,
            y0: bbox.y0,
        })
    }

    /// Local `(col, row)` of the corner of `bbox`, validated against this image.
    pub fn local_origin(&self, bbox: &BBox) -> Result<(usize, usize)> {
        if bbox.is_empty() || !self.bbox().contains_bbox(bbox) {
            return Err(DiffimError::InvalidParameter(format!(
                "box ({},{} {}x{}) is not contained in image ({},{} {}x{})",
                bbox.x0,
                bbox.y0,
                bbox.width,
                bbox.height,
                self.x0,
                self.y0,
                self.width(),
                self.height()
            )));
        }
        Ok(((bbox.x0 - self.x0) as usize, (bbox.y0 - self.y0) as usize))
    }

    /// Verify that `other` has the same pixel dimensions.
    pub fn check_same_dimensions<U>(&self, other: &MaskedImage<U>) -> Result<()> {
        check_same_dim(self.dim(), other.image.dim())
    }
}

/// Fail with `DimensionMismatch` unless two `(rows, cols)` shapes agree.
pub fn check_same_dim(expected: (usize, usize), got: (usize, usize)) -> Result<()> {
    if expected != got {
        return Err(DiffimError::DimensionMismatch {
            expected_width: expected.1,
            expected_height: expected.0,
            width: got.1,
            height: got.0,
        });
    }
    Ok(())
}
