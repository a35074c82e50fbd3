//! Row realignment for bidirectional scans.
//!
//! Mirror lag displaces the rows traversed in one direction against the rows
//! traversed in the other. Images here are `(rows, columns)` with rows along the
//! slow axis; the even rows form one field and the odd rows the other, and the
//! misalignment is an integer number of columns.
//!
//! A shift `s` means the odd field leads the even field by `s` columns:
//! `odd[r][c] == even[r][c + s]`. Correction moves the even rows left by
//! `floor(s / 2)` and the odd rows right by the remainder.

use crate::error::{ScanError, ScanResult};
use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, instrument};

/// Mirror lag searched by default, in seconds.
pub const DEFAULT_MAX_LAG_SECONDS: f64 = 400e-6;

/// How the shift is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftSearch {
    /// Search every shift in `min_shift..=max_shift`.
    Auto { min_shift: i64, max_shift: i64 },
    /// Apply a known shift.
    Fixed { shift: i64 },
}

/// Best candidate of a shift search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftEstimate {
    pub shift: i64,
    /// Squared field difference per compared column.
    pub cost: f64,
}

/// Corrected image and the shift applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecombResult {
    /// Same shape as the input; samples shifted in from outside are zero.
    pub image: Array2<f64>,
    /// Shift actually applied, 0 when the image was returned unchanged.
    pub shift: i64,
    /// False when an automatic search had no candidate to evaluate.
    pub found: bool,
    valid: Range<usize>,
}

impl DecombResult {
    fn unchanged(image: ArrayView2<'_, f64>, found: bool) -> Self {
        Self {
            valid: 0..image.ncols(),
            image: image.to_owned(),
            shift: 0,
            found,
        }
    }

    /// Columns defined in every row after correction.
    pub fn valid_columns(&self) -> Range<usize> {
        self.valid.clone()
    }

    /// The corrected image restricted to [`valid_columns`](Self::valid_columns).
    pub fn valid_image(&self) -> ArrayView2<'_, f64> {
        self.image.slice(s![.., self.valid.clone()])
    }
}

/// Searches `min_shift..=max_shift` for the shift that best aligns the fields.
///
/// Each candidate compares every even row with the odd row below it and with
/// the odd row above it, summing squared differences over the overlapping
/// columns and dividing by the overlap. Ties go to the smallest shift. Returns
/// `None` when the image has fewer than two row pairs or no candidate overlaps
/// the image.
#[instrument(skip(image), fields(shape = ?image.dim()))]
pub fn find_best_shift(
    image: ArrayView2<'_, f64>,
    min_shift: i64,
    max_shift: i64,
) -> Option<ShiftEstimate> {
    let pairs = image.nrows() / 2;
    let ncols = image.ncols() as i64;
    if pairs < 2 || min_shift > max_shift {
        return None;
    }

    let lo = min_shift.max(1 - ncols);
    let hi = max_shift.min(ncols - 1);
    if lo > hi {
        return None;
    }

    let costs: Vec<ShiftEstimate> = (lo..=hi)
        .into_par_iter()
        .map(|shift| ShiftEstimate {
            shift,
            cost: shift_cost(image, pairs, shift),
        })
        .collect();

    let mut best: Option<ShiftEstimate> = None;
    for candidate in costs {
        best = match best {
            None => Some(candidate),
            Some(b) if candidate.cost < b.cost => Some(candidate),
            keep => keep,
        };
    }
    if let Some(b) = best {
        debug!(shift = b.shift, cost = b.cost, "best field shift");
    }
    best
}

fn shift_cost(image: ArrayView2<'_, f64>, pairs: usize, shift: i64) -> f64 {
    let ncols = image.ncols() as i64;
    // Odd-row columns whose shifted even-row partner is inside the image.
    let lo = (-shift).max(0) as usize;
    let hi = (ncols - shift.max(0)) as usize;
    let overlap = hi - lo;
    let even_lo = (lo as i64 + shift) as usize;
    let even_hi = (hi as i64 + shift) as usize;

    let diff = |even: usize, odd: usize| -> f64 {
        let f1 = image.slice(s![2 * even, even_lo..even_hi]);
        let f2 = image.slice(s![2 * odd + 1, lo..hi]);
        f1.iter().zip(f2.iter()).map(|(a, b)| (a - b) * (a - b)).sum()
    };

    // The first pair is only compared through the second alignment.
    let same_index: f64 = (1..pairs).map(|i| diff(i, i)).sum();
    let next_even: f64 = (0..pairs - 1).map(|i| diff(i + 1, i)).sum();
    (same_index + next_even) / overlap as f64
}

/// Finds or applies a shift and rebuilds the image from the shifted fields.
///
/// A shift whose odd-row part rounds to less than one column cannot be applied
/// and leaves the image unchanged with a reported shift of 0.
pub fn decomb(image: ArrayView2<'_, f64>, search: ShiftSearch) -> ScanResult<DecombResult> {
    let shift = match search {
        ShiftSearch::Auto {
            min_shift,
            max_shift,
        } => match find_best_shift(image, min_shift, max_shift) {
            Some(best) => best.shift,
            None => {
                debug!(min_shift, max_shift, "no decomb shift candidates");
                return Ok(DecombResult::unchanged(image, false));
            }
        },
        ShiftSearch::Fixed { shift } => shift,
    };
    reconstruct(image, shift)
}

fn reconstruct(image: ArrayView2<'_, f64>, shift: i64) -> ScanResult<DecombResult> {
    let left = shift.div_euclid(2);
    let right = left + shift.rem_euclid(2);
    if right < 1 {
        return Ok(DecombResult::unchanged(image, true));
    }

    let (nrows, ncols) = image.dim();
    let (left, right) = (left as usize, right as usize);
    if right >= ncols {
        return Err(ScanError::Image(format!(
            "shift {shift} does not fit an image {ncols} columns wide"
        )));
    }

    let mut out = Array2::zeros((nrows, ncols));
    for r in (0..nrows).step_by(2) {
        out.slice_mut(s![r, ..ncols - left])
            .assign(&image.slice(s![r, left..]));
    }
    for r in (1..nrows).step_by(2) {
        out.slice_mut(s![r, right..])
            .assign(&image.slice(s![r, ..ncols - right]));
    }

    Ok(DecombResult {
        image: out,
        shift,
        found: true,
        valid: right..ncols - left,
    })
}

/// Lag correction expressed in time rather than columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagCorrection {
    /// Search lags from zero up to `max_lag_seconds`.
    Auto { max_lag_seconds: f64 },
    /// Apply a known lag.
    Fixed { seconds: f64 },
}

impl Default for LagCorrection {
    fn default() -> Self {
        LagCorrection::Auto {
            max_lag_seconds: DEFAULT_MAX_LAG_SECONDS,
        }
    }
}

/// Outcome of [`adjust_bidirectional`].
#[derive(Debug, Clone, PartialEq)]
pub struct BidirectionalAdjustment {
    pub result: DecombResult,
    /// Applied shift converted back to seconds.
    pub shift_seconds: f64,
}

/// Decombs an image whose columns are acquired at `pixel_rate` per second
/// (the sample rate divided by the downsample factor).
pub fn adjust_bidirectional(
    image: ArrayView2<'_, f64>,
    pixel_rate: f64,
    correction: LagCorrection,
) -> ScanResult<BidirectionalAdjustment> {
    if !(pixel_rate.is_finite() && pixel_rate > 0.0) {
        return Err(ScanError::invalid_parameter(
            "pixel_rate",
            format!("must be positive, got {pixel_rate}"),
        ));
    }
    let search = match correction {
        LagCorrection::Auto { max_lag_seconds } => ShiftSearch::Auto {
            min_shift: 0,
            max_shift: (max_lag_seconds * pixel_rate).round() as i64,
        },
        LagCorrection::Fixed { seconds } => ShiftSearch::Fixed {
            shift: (seconds * pixel_rate).round() as i64,
        },
    };
    let result = decomb(image, search)?;
    let shift_seconds = result.shift as f64 / pixel_rate;
    debug!(shift = result.shift, shift_seconds, "bidirectional lag corrected");
    Ok(BidirectionalAdjustment {
        result,
        shift_seconds,
    })
}
