use ndarray::Array2;
use num_traits::Float;

use crate::mask::MaskPixel;
use crate::masked_image::{BBox, MaskedImage};

/// A horizontal run of pixels `x0..=x1` on row `y`, in parent coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub y: i64,
    pub x0: i64,
    pub x1: i64,
}

impl Span {
    pub fn len(&self) -> usize {
        (self.x1 - self.x0 + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.x1 < self.x0
    }
}

/// Brightest pixel of a footprint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak {
    pub x: i64,
    pub y: i64,
    pub value: f64,
}

/// A connected set of pixels, stored as sorted row spans.
#[derive(Clone, Debug, PartialEq)]
pub struct Footprint {
    spans: Vec<Span>,
    bbox: BBox,
    npix: usize,
    peak: Peak,
}

impl Footprint {
    /// Build a footprint from a list of `(x, y)` parent pixels. Duplicates
    /// are merged.
    pub fn from_pixels(mut pixels: Vec<(i64, i64)>, peak: Peak) -> Self {
        pixels.sort_unstable_by_key(|&(x, y)| (y, x));
        pixels.dedup();

        let mut spans: Vec<Span> = Vec::new();
        for &(x, y) in &pixels {
            match spans.last_mut() {
                Some(last) if last.y == y && last.x1 + 1 == x => last.x1 = x,
                _ => spans.push(Span { y, x0: x, x1: x }),
            }
        }

        let bbox = if spans.is_empty() {
            BBox::new(peak.x, peak.y, 0, 0)
        } else {
            let min_x = spans.iter().map(|s| s.x0).min().unwrap_or(0);
            let max_x = spans.iter().map(|s| s.x1).max().unwrap_or(0);
            let min_y = spans[0].y;
            let max_y = spans[spans.len() - 1].y;
            BBox::from_corners(min_x, min_y, max_x, max_y)
        };

        Self {
            npix: pixels.len(),
            spans,
            bbox,
            peak,
        }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn npix(&self) -> usize {
        self.npix
    }

    pub fn peak(&self) -> Peak {
        self.peak
    }

    /// Iterate the member pixels as `(x, y)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.spans
            .iter()
            .flat_map(|s| (s.x0..=s.x1).map(move |x| (x, s.y)))
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.spans
            .binary_search_by(|s| s.y.cmp(&y).then(ordering_in_span(s, x)))
            .is_ok()
    }

    /// Grow by `n` pixels. Fast growth uses the Manhattan (L1) distance,
    /// isotropic growth the Euclidean distance. The result may extend
    /// beyond the image the footprint was detected in.
    pub fn grow(&self, n: usize, isotropic: bool) -> Footprint {
        if n == 0 || self.npix == 0 {
            return self.clone();
        }
        let grid = self.bbox.grown(n);
        let pixels = if isotropic {
            self.grow_isotropic(&grid, n)
        } else {
            self.grow_manhattan(&grid, n)
        };
        Footprint::from_pixels(pixels, self.peak)
    }

    fn grow_manhattan(&self, grid: &BBox, n: usize) -> Vec<(i64, i64)> {
        let (h, w) = (grid.height, grid.width);
        let far = u32::MAX / 2;
        let mut dist = Array2::<u32>::from_elem((h, w), far);
        for (x, y) in self.pixels() {
            dist[[(y - grid.y0) as usize, (x - grid.x0) as usize]] = 0;
        }

        // Two-pass L1 distance transform.
        for row in 0..h {
            for col in 0..w {
                let mut d = dist[[row, col]];
                if row > 0 {
                    d = d.min(dist[[row - 1, col]] + 1);
                }
                if col > 0 {
                    d = d.min(dist[[row, col - 1]] + 1);
                }
                dist[[row, col]] = d;
            }
        }
        for row in (0..h).rev() {
            for col in (0..w).rev() {
                let mut d = dist[[row, col]];
                if row + 1 < h {
                    d = d.min(dist[[row + 1, col]] + 1);
                }
                if col + 1 < w {
                    d = d.min(dist[[row, col + 1]] + 1);
                }
                dist[[row, col]] = d;
            }
        }

        dist.indexed_iter()
            .filter(|(_, &d)| d as usize <= n)
            .map(|((row, col), _)| (grid.x0 + col as i64, grid.y0 + row as i64))
            .collect()
    }

    fn grow_isotropic(&self, grid: &BBox, n: usize) -> Vec<(i64, i64)> {
        let r2 = (n * n) as i64;
        let members: Vec<(i64, i64)> = self.pixels().collect();
        let mut out = Vec::new();
        for y in grid.y0..=grid.y1() {
            for x in grid.x0..=grid.x1() {
                let hit = members.iter().any(|&(mx, my)| {
                    let (dx, dy) = (x - mx, y - my);
                    dx * dx + dy * dy <= r2
                });
                if hit {
                    out.push((x, y));
                }
            }
        }
        out
    }
}

fn ordering_in_span(s: &Span, x: i64) -> std::cmp::Ordering {
    if x < s.x0 {
        std::cmp::Ordering::Greater
    } else if x > s.x1 {
        std::cmp::Ordering::Less
    } else {
        std::cmp::Ordering::Equal
    }
}

/// OR of the mask bits under `footprint`. Pixels outside the mask are ignored.
pub fn footprint_mask_bits<T: Float>(image: &MaskedImage<T>, footprint: &Footprint) -> MaskPixel {
    let bbox = image.bbox();
    footprint
        .pixels()
        .filter(|&(x, y)| bbox.contains(x, y))
        .fold(0, |bits, (x, y)| {
            bits | image.mask[[(y - image.y0) as usize, (x - image.x0) as usize]]
        })
}

/// Sum of image values under `footprint` (pixels outside the image are
/// ignored) together with the number of pixels summed.
pub fn footprint_counts<T: Float>(image: &MaskedImage<T>, footprint: &Footprint) -> (f64, usize) {
    let bbox = image.bbox();
    footprint
        .pixels()
        .filter(|&(x, y)| bbox.contains(x, y))
        .fold((0.0, 0), |(sum, n), (x, y)| {
            let v = image.image[[(y - image.y0) as usize, (x - image.x0) as usize]];
            (sum + v.to_f64().unwrap_or(0.0), n + 1)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(x: i64, y: i64) -> Footprint {
        Footprint::from_pixels(vec![(x, y)], Peak { x, y, value: 1.0 })
    }

    #[test]
    fn test_spans_merge_runs() {
        let fp = Footprint::from_pixels(
            vec![(3, 1), (1, 1), (2, 1), (5, 1), (2, 2)],
            Peak { x: 2, y: 1, value: 1.0 },
        );
        assert_eq!(fp.npix(), 5);
        assert_eq!(fp.spans().len(), 3);
        assert_eq!(fp.bbox(), BBox::from_corners(1, 1, 5, 2));
        assert!(fp.contains(3, 1));
        assert!(!fp.contains(4, 1));
    }

    #[test]
    fn test_manhattan_grow_is_diamond() {
        let grown = single(10, 10).grow(2, false);
        // |dx| + |dy| <= 2 holds 13 pixels.
        assert_eq!(grown.npix(), 13);
        assert!(grown.contains(12, 10));
        assert!(grown.contains(11, 11));
        assert!(!grown.contains(12, 11));
        assert_eq!(grown.bbox(), BBox::from_corners(8, 8, 12, 12));
    }

    #[test]
    fn test_isotropic_grow_is_disk() {
        let grown = single(0, 0).grow(2, true);
        // Disk and diamond agree at n = 2 and diverge at n = 3.
        assert_eq!(grown.npix(), 13);
        let bigger = single(0, 0).grow(3, true);
        assert!(bigger.contains(2, 2));
        assert!(!single(0, 0).grow(3, false).contains(2, 2));
    }

    #[test]
    fn test_grow_zero_is_identity() {
        let fp = single(4, 4);
        assert_eq!(fp.grow(0, false), fp);
    }
}
