/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum number of footprints to fit candidate kernels in parallel.
pub const PARALLEL_CANDIDATE_THRESHOLD: usize = 2;

/// Kernel area (kw*kh) at or above which `ConvolutionMethod::Auto` uses the FFT path.
pub const FFT_KERNEL_AREA_THRESHOLD: usize = 225;

/// Number of rows accumulated per partial normal-equation sum.
pub const NORMAL_EQUATION_ROW_BAND: usize = 16;

/// Eigenvalues with magnitude at or below `EIGEN_ZERO_TOLERANCE * max|lambda| * n`
/// are treated as zero by the pseudo-inverse.
pub const EIGEN_ZERO_TOLERANCE: f64 = f64::EPSILON;

/// Factorization pivots at or below this fraction of their diagonal scale
/// count as singular.
pub const PIVOT_TOLERANCE: f64 = 64.0 * f64::EPSILON;

/// Iteration cap of the symmetric eigen-decomposition.
pub const MAX_EIGEN_ITERATIONS: usize = 10_000;

/// Default kernel grid width in pixels.
pub const DEFAULT_KERNEL_COLS: usize = 19;

/// Default kernel grid height in pixels.
pub const DEFAULT_KERNEL_ROWS: usize = 19;

/// Default minimum pixel count of a detected footprint.
pub const DEFAULT_FP_NPIX_MIN: usize = 5;

/// Default maximum pixel count of a detected footprint.
pub const DEFAULT_FP_NPIX_MAX: usize = 500;

/// Default footprint growth, in units of the larger kernel dimension.
pub const DEFAULT_FP_GROW_KSIZE: f64 = 1.0;

/// Default number of clean footprints required.
pub const DEFAULT_MIN_CLEAN_FP: usize = 10;

/// Default starting detection threshold.
pub const DEFAULT_DET_THRESHOLD: f64 = 10.0;

/// Default multiplicative threshold decay per search pass.
pub const DEFAULT_DET_THRESHOLD_SCALING: f64 = 0.5;

/// Default floor below which the detection threshold may not fall.
pub const DEFAULT_DET_THRESHOLD_MIN: f64 = 1.0;

/// Default sigma for kernel-sum candidate clipping.
pub const DEFAULT_CANDIDATE_CLIP_SIGMA: f64 = 3.0;

/// Default number of kernel-sum clipping iterations.
pub const DEFAULT_CANDIDATE_CLIP_ITERATIONS: usize = 3;

/// Default detector gain (normalized counts per electron) for variance planes.
pub const DEFAULT_GAIN: f64 = 65_535.0;

/// Default read noise (normalized units) for variance planes.
pub const DEFAULT_READ_NOISE: f64 = 1e-3;

/// Largest pixel count a raw header may declare.
pub const MAX_RAW_PIXELS: usize = 1 << 28;

/// Magic bytes of the raw f32 plane format.
pub const RAW_MAGIC: &[u8; 8] = b"DIFFIMF4";
