//! Per-sample mirror waveforms for a resolved scan.
//!
//! [`scan_positions`] lays the samples out in scan space: rows along the slow
//! axis, each row extended by the overscan on both ends, with odd rows reversed
//! for bidirectional scans. [`generate`] then hands the positions to a
//! [`DeviceMapper`] that turns them into whatever the output hardware expects.

use crate::error::{ScanError, ScanResult};
use crate::geometry::ScanGeometry;
use nalgebra::{Matrix2, Vector2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, instrument};

/// Converts scan-space coordinates into device coordinates.
///
/// Implementations must return exactly one output pair per input pair.
pub trait DeviceMapper {
    fn map(&self, xs: &[f64], ys: &[f64]) -> ScanResult<(Vec<f64>, Vec<f64>)>;
}

impl<F> DeviceMapper for F
where
    F: Fn(&[f64], &[f64]) -> ScanResult<(Vec<f64>, Vec<f64>)>,
{
    fn map(&self, xs: &[f64], ys: &[f64]) -> ScanResult<(Vec<f64>, Vec<f64>)> {
        self(xs, ys)
    }
}

/// Leaves coordinates unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl DeviceMapper for IdentityMapper {
    fn map(&self, xs: &[f64], ys: &[f64]) -> ScanResult<(Vec<f64>, Vec<f64>)> {
        Ok((xs.to_vec(), ys.to_vec()))
    }
}

/// `device = matrix * position + offset`, e.g. volts per metre plus a bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineMapper {
    /// Row-major 2x2 matrix.
    pub matrix: [[f64; 2]; 2],
    pub offset: [f64; 2],
}

impl AffineMapper {
    /// Independent gains per axis, no offset.
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            matrix: [[sx, 0.0], [0.0, sy]],
            offset: [0.0, 0.0],
        }
    }

    fn transform(&self) -> (Matrix2<f64>, Vector2<f64>) {
        let [[a, b], [c, d]] = self.matrix;
        (
            Matrix2::new(a, b, c, d),
            Vector2::new(self.offset[0], self.offset[1]),
        )
    }
}

impl Default for AffineMapper {
    fn default() -> Self {
        Self::scale(1.0, 1.0)
    }
}

impl DeviceMapper for AffineMapper {
    fn map(&self, xs: &[f64], ys: &[f64]) -> ScanResult<(Vec<f64>, Vec<f64>)> {
        let (m, t) = self.transform();
        let (out_x, out_y): (Vec<f64>, Vec<f64>) = xs
            .par_iter()
            .zip(ys.par_iter())
            .map(|(&x, &y)| {
                let v = m * Vector2::new(x, y) + t;
                (v.x, v.y)
            })
            .unzip();
        Ok((out_x, out_y))
    }
}

/// Paired x/y samples, one per acquisition sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trajectory {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// The `i`th sample.
    pub fn point(&self, i: usize) -> Option<(f64, f64)> {
        Some((*self.x.get(i)?, *self.y.get(i)?))
    }

    /// Concatenates `n_frames` copies of this trajectory.
    pub fn repeat(&self, n_frames: usize) -> Self {
        Self {
            x: self.x.repeat(n_frames),
            y: self.y.repeat(n_frames),
        }
    }

    /// Extends to `len` samples by holding the final position.
    pub fn padded_to(&self, len: usize) -> ScanResult<Self> {
        if len < self.len() {
            return Err(ScanError::Trajectory(format!(
                "cannot pad {} samples down to {len}",
                self.len()
            )));
        }
        let mut out = self.clone();
        if let Some((x, y)) = self.len().checked_sub(1).and_then(|i| self.point(i)) {
            out.x.resize(len, x);
            out.y.resize(len, y);
        } else if len > 0 {
            return Err(ScanError::Trajectory(
                "cannot pad an empty trajectory".to_string(),
            ));
        }
        Ok(out)
    }

    /// `((min_x, max_x), (min_y, max_y))`, or `None` when empty.
    pub fn extents(&self) -> Option<((f64, f64), (f64, f64))> {
        if self.is_empty() {
            return None;
        }
        let span = |v: &[f64]| {
            v.iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                    (lo.min(x), hi.max(x))
                })
        };
        Some((span(&self.x), span(&self.y)))
    }

    /// Writes `{"x": [...], "y": [...]}` to `path`.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> ScanResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        debug!(path = %path.as_ref().display(), samples = self.len(), "trajectory written");
        Ok(())
    }
}

/// Scan-space sample positions for one frame, before device mapping.
///
/// Length is always `num_rows * samples_per_row`. The first imaging sample of
/// each row sits on the `p0 -> p1` edge; overscan samples extend the row past
/// both ends along the fast axis.
#[instrument(skip_all, fields(rows = geometry.num_rows, samples_per_row = geometry.samples_per_row()))]
pub fn scan_positions(geometry: &ScanGeometry) -> ScanResult<Trajectory> {
    let rows = usize::try_from(geometry.num_rows)
        .map_err(|_| ScanError::Trajectory(format!("invalid row count {}", geometry.num_rows)))?;
    let per_row = geometry.samples_per_row();
    let downsample = geometry.downsample as f64;
    let image_width = geometry.image_width() as f64;
    let image_height = geometry.image_height() as f64;
    if image_width < 1.0 || image_height < 1.0 || downsample < 1.0 {
        return Err(ScanError::Trajectory(format!(
            "degenerate image shape {:?}",
            geometry.image.shape
        )));
    }

    let dx = (geometry.p1 - geometry.p0) / (image_width * downsample);
    let dy = (geometry.p2 - geometry.p0) / image_height;
    let origin = geometry.p0 - dx * (geometry.os_len as f64 * downsample);
    let bidirectional = geometry.bidirectional;

    let mut x = vec![0.0; rows * per_row];
    let mut y = vec![0.0; rows * per_row];
    if per_row > 0 {
        x.par_chunks_mut(per_row)
            .zip(y.par_chunks_mut(per_row))
            .enumerate()
            .for_each(|(row, (xs, ys))| {
                let row_start = origin + dy * row as f64;
                let reversed = bidirectional && row % 2 == 1;
                for i in 0..per_row {
                    let col = if reversed { per_row - 1 - i } else { i };
                    let p = row_start + dx * col as f64;
                    xs[i] = p.x;
                    ys[i] = p.y;
                }
            });
    }

    debug!(samples = x.len(), "scan positions generated");
    Ok(Trajectory { x, y })
}

/// Generates one frame of device-space samples.
pub fn generate(geometry: &ScanGeometry, mapper: &dyn DeviceMapper) -> ScanResult<Trajectory> {
    let positions = scan_positions(geometry)?;
    let (x, y) = mapper.map(&positions.x, &positions.y)?;
    if x.len() != positions.len() || y.len() != positions.len() {
        return Err(ScanError::Mapping(format!(
            "mapper returned {}/{} samples for {} positions",
            x.len(),
            y.len(),
            positions.len()
        )));
    }
    Ok(Trajectory { x, y })
}
