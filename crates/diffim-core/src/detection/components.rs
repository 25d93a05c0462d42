use std::collections::HashMap;

use ndarray::Array2;

/// Label the connected regions of a binary mask using two-pass labeling
/// with union-find. Uses 8-connectivity (the four already-visited neighbors:
/// upper-left, upper, upper-right, left).
///
/// Returns one pixel list per region, each as `(row, col)` in scan order.
/// Regions are ordered by their first pixel in row-major order.
pub fn connected_regions(mask: &Array2<bool>) -> Vec<Vec<(usize, usize)>> {
    let (h, w) = mask.dim();
    if h == 0 || w == 0 {
        return Vec::new();
    }

    let mut labels = Array2::<u32>::zeros((h, w));
    // Union-find parent array. Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0];

    // Pass 1: assign provisional labels.
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            let mut neighbors = [0u32; 4];
            if col > 0 {
                neighbors[0] = labels[[row, col - 1]];
            }
            if row > 0 {
                neighbors[1] = labels[[row - 1, col]];
                if col > 0 {
                    neighbors[2] = labels[[row - 1, col - 1]];
                }
                if col + 1 < w {
                    neighbors[3] = labels[[row - 1, col + 1]];
                }
            }

            let smallest = neighbors.iter().copied().filter(|&l| l > 0).min();
            match smallest {
                None => {
                    let label = parent.len() as u32;
                    parent.push(label);
                    labels[[row, col]] = label;
                }
                Some(label) => {
                    labels[[row, col]] = label;
                    for &other in neighbors.iter().filter(|&&l| l > 0 && l != label) {
                        union(&mut parent, label, other);
                    }
                }
            }
        }
    }

    // Pass 2: resolve labels and collect pixels.
    let mut index_of_root = HashMap::<u32, usize>::new();
    let mut regions: Vec<Vec<(usize, usize)>> = Vec::new();
    for row in 0..h {
        for col in 0..w {
            let lbl = labels[[row, col]];
            if lbl == 0 {
                continue;
            }
            let root = find(&parent, lbl);
            let idx = *index_of_root.entry(root).or_insert_with(|| {
                regions.push(Vec::new());
                regions.len() - 1
            });
            regions[idx].push((row, col));
        }
    }
    regions
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Merge larger root into smaller root to keep labels consistent.
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
