//! Mask plane bits carried alongside every masked image.

/// Pixel type of a mask plane.
pub type MaskPixel = u16;

/// Bad detector pixel.
pub const BAD: MaskPixel = 1 << 0;
/// Saturated pixel.
pub const SAT: MaskPixel = 1 << 1;
/// Interpolated pixel.
pub const INTRP: MaskPixel = 1 << 2;
/// Cosmic ray.
pub const CR: MaskPixel = 1 << 3;
/// Pixel in the border band of a convolution, not fully valid.
pub const EDGE: MaskPixel = 1 << 4;
/// Pixel belongs to a positive detection.
pub const DETECTED: MaskPixel = 1 << 5;
/// Pixel belongs to a negative detection.
pub const DETECTED_NEGATIVE: MaskPixel = 1 << 6;
/// No data was recorded for this pixel.
pub const NO_DATA: MaskPixel = 1 << 7;

const PLANES: [(&str, MaskPixel); 8] = [
    ("BAD", BAD),
    ("SAT", SAT),
    ("INTRP", INTRP),
    ("CR", CR),
    ("EDGE", EDGE),
    ("DETECTED", DETECTED),
    ("DETECTED_NEGATIVE", DETECTED_NEGATIVE),
    ("NO_DATA", NO_DATA),
];

/// Look up the bit of a named mask plane.
pub fn plane_bit(name: &str) -> Option<MaskPixel> {
    PLANES
        .iter()
        .find(|(plane, _)| plane.eq_ignore_ascii_case(name))
        .map(|&(_, bit)| bit)
}

/// OR together the bits of the named planes. Unknown names are ignored.
pub fn plane_bit_mask<S: AsRef<str>>(names: &[S]) -> MaskPixel {
    names
        .iter()
        .filter_map(|n| plane_bit(n.as_ref()))
        .fold(0, |acc, bit| acc | bit)
}

/// Names of the planes set in `bits`.
pub fn plane_names(bits: MaskPixel) -> Vec<&'static str> {
    PLANES
        .iter()
        .filter(|&&(_, bit)| bits & bit != 0)
        .map(|&(name, _)| name)
        .collect()
}
