use std::str::FromStr;

use ndarray::Array2;
use num_traits::Float;
use serde::{Deserialize, Serialize};

use crate::error::DiffimError;
use crate::masked_image::MaskedImage;

/// Statistic a detection threshold is expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdType {
    /// Raw pixel value.
    Value,
    /// Multiples of the image's standard deviation.
    #[default]
    Stdev,
    /// Multiples of each pixel's own noise, sqrt(variance).
    Variance,
}

impl std::fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value => write!(f, "value"),
            Self::Stdev => write!(f, "stdev"),
            Self::Variance => write!(f, "variance"),
        }
    }
}

impl FromStr for ThresholdType {
    type Err = DiffimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "value" => Ok(Self::Value),
            "stdev" => Ok(Self::Stdev),
            "variance" => Ok(Self::Variance),
            other => Err(DiffimError::InvalidParameter(format!(
                "unknown threshold type '{other}'"
            ))),
        }
    }
}

/// Sign of the excursions a threshold selects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

/// A detection threshold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Threshold {
    pub value: f64,
    pub kind: ThresholdType,
    pub polarity: Polarity,
}

impl Threshold {
    pub fn new(value: f64, kind: ThresholdType) -> Self {
        Self {
            value,
            kind,
            polarity: Polarity::Positive,
        }
    }

    pub fn negative(self) -> Self {
        Self {
            polarity: Polarity::Negative,
            ..self
        }
    }
}

/// Boolean map of pixels passing `threshold`. Non-finite pixels never pass.
pub fn threshold_mask<T: Float>(image: &MaskedImage<T>, threshold: &Threshold) -> Array2<bool> {
    let sign = match threshold.polarity {
        Polarity::Positive => 1.0,
        Polarity::Negative => -1.0,
    };
    let value = |v: T| v.to_f64().unwrap_or(f64::NAN) * sign;

    match threshold.kind {
        ThresholdType::Value => image.image.mapv(|v| value(v) > threshold.value),
        ThresholdType::Stdev => {
            let (_, std) = compute_mean_stddev(&image.image);
            let level = threshold.value * std;
            image.image.mapv(|v| value(v) > level)
        }
        ThresholdType::Variance => {
            let mut mask = Array2::from_elem(image.dim(), false);
            ndarray::Zip::from(&mut mask)
                .and(&image.image)
                .and(&image.variance)
                .for_each(|m, &v, &var| {
                    let sigma = var.to_f64().unwrap_or(f64::NAN).sqrt();
                    *m = value(v) > threshold.value * sigma;
                });
            mask
        }
    }
}

/// Mean and standard deviation of the finite pixel values.
pub fn compute_mean_stddev<T: Float>(data: &Array2<T>) -> (f64, f64) {
    let finite = || {
        data.iter()
            .filter_map(|v| v.to_f64())
            .filter(|v| v.is_finite())
    };
    let n = finite().count() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = finite().sum::<f64>() / n;
    let var = finite().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
