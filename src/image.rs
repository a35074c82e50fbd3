//! Turning the acquired sample stream back into an image.

use crate::decomb::{adjust_bidirectional, BidirectionalAdjustment, LagCorrection};
use crate::error::{ScanError, ScanResult};
use crate::geometry::ScanGeometry;
use ndarray::{s, Array2, ArrayView2, Axis};
use tracing::debug;

/// One frame laid out as `(rows, pixels)`, overscan columns included.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanImage {
    data: Array2<f64>,
    os_len: usize,
    pixel_rate: f64,
    bidirectional: bool,
}

impl ScanImage {
    /// Reshapes one frame of raw samples, averages every `downsample` samples
    /// into a pixel, and reverses the odd rows of bidirectional scans.
    pub fn from_samples(samples: &[f64], geometry: &ScanGeometry) -> ScanResult<Self> {
        let rows = geometry.num_rows.max(0) as usize;
        let samples_per_row = geometry.samples_per_row();
        let expected = rows * samples_per_row;
        if samples.len() != expected {
            return Err(ScanError::Image(format!(
                "expected {expected} samples ({rows} rows x {samples_per_row}), got {}",
                samples.len()
            )));
        }
        let downsample = geometry.downsample.max(1) as usize;
        if samples_per_row % downsample != 0 {
            return Err(ScanError::Image(format!(
                "row of {samples_per_row} samples is not a multiple of downsample {downsample}"
            )));
        }

        let raw = ArrayView2::from_shape((rows, samples_per_row), samples)
            .map_err(|e| ScanError::Image(e.to_string()))?;
        let pixels = samples_per_row / downsample;
        let mut data = Array2::zeros((rows, pixels));
        for (r, (src, mut dst)) in raw
            .axis_iter(Axis(0))
            .zip(data.axis_iter_mut(Axis(0)))
            .enumerate()
        {
            let reversed = geometry.bidirectional && r % 2 == 1;
            for p in 0..pixels {
                let bin = src.slice(s![p * downsample..(p + 1) * downsample]);
                let col = if reversed { pixels - 1 - p } else { p };
                dst[col] = bin.sum() / downsample as f64;
            }
        }
        debug!(rows, pixels, downsample, "image assembled from samples");

        Ok(Self {
            data,
            os_len: geometry.os_len.max(0) as usize,
            pixel_rate: geometry.sample_rate / downsample as f64,
            bidirectional: geometry.bidirectional,
        })
    }

    /// Wraps an existing `(rows, pixels)` array.
    pub fn from_array(
        data: Array2<f64>,
        os_len: usize,
        pixel_rate: f64,
        bidirectional: bool,
    ) -> Self {
        Self {
            data,
            os_len,
            pixel_rate,
            bidirectional,
        }
    }

    /// Pixels including overscan.
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn into_data(self) -> Array2<f64> {
        self.data
    }

    /// Overscan pixels at each end of a row.
    pub fn os_len(&self) -> usize {
        self.os_len
    }

    pub fn is_bidirectional(&self) -> bool {
        self.bidirectional
    }

    /// The imaging region only.
    pub fn active(&self) -> ScanResult<Array2<f64>> {
        remove_overscan(self.data.view(), self.os_len)
    }

    /// 1 over the imaging region, 0 over the overscan.
    pub fn blanking(&self) -> Array2<f64> {
        overscan_blanking(self.data.dim(), self.os_len)
    }

    /// Corrects mirror lag on the imaging region. Unidirectional images are
    /// returned unchanged.
    pub fn adjust_bidirectional(
        &self,
        correction: LagCorrection,
    ) -> ScanResult<BidirectionalAdjustment> {
        let active = self.active()?;
        let correction = if self.bidirectional {
            correction
        } else {
            LagCorrection::Fixed { seconds: 0.0 }
        };
        adjust_bidirectional(active.view(), self.pixel_rate, correction)
    }
}

/// Drops `os_len` pixels from both ends of every row.
pub fn remove_overscan(image: ArrayView2<'_, f64>, os_len: usize) -> ScanResult<Array2<f64>> {
    let cols = image.ncols();
    if 2 * os_len >= cols {
        return Err(ScanError::Image(format!(
            "overscan of {os_len} pixels per side leaves nothing of a {cols} pixel row"
        )));
    }
    Ok(image.slice(s![.., os_len..cols - os_len]).to_owned())
}

/// Mask of the given `(rows, pixels)` shape that is 1 over the imaging region
/// and 0 over `os_len` pixels at both ends of each row.
pub fn overscan_blanking(shape: (usize, usize), os_len: usize) -> Array2<f64> {
    let (rows, cols) = shape;
    Array2::from_shape_fn((rows, cols), |(_, c)| {
        if c >= os_len && c + os_len < cols {
            1.0
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_overscan_columns() {
        let image = Array2::from_shape_fn((2, 6), |(r, c)| (r * 6 + c) as f64);
        let active = remove_overscan(image.view(), 2).unwrap();
        assert_eq!(active.dim(), (2, 2));
        assert_eq!(active[[0, 0]], 2.0);
        assert_eq!(active[[1, 1]], 9.0);
        assert!(remove_overscan(image.view(), 3).is_err());
    }

    #[test]
    fn blanking_masks_both_ends() {
        let mask = overscan_blanking((2, 5), 1);
        assert_eq!(mask.row(0).to_vec(), vec![0.0, 1.0, 1.0, 1.0, 0.0]);
        assert_eq!(mask.sum(), 6.0);
    }
}
