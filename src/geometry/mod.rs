//! Rectangular raster scan geometry.
//!
//! [`RectScan`] owns a [`Solver`] over the graph from [`rect_scan_graph`]. The
//! caller fixes whichever inputs it has, then [`RectScan::resolve`] derives the
//! rest and returns a plain [`ScanGeometry`] snapshot.
//!
//! Three regions describe where samples land:
//!
//! - *scan*: every sample written to the mirrors, including overscan, in raw
//!   samples.
//! - *active*: the imaging part of each row, in raw samples.
//! - *image*: the imaging part of each row, in downsampled pixels.
//!
//! ```rust
//! use nalgebra::Vector2;
//! use raster_scan::geometry::RectScan;
//!
//! let mut scan = RectScan::new().unwrap();
//! scan.set_corners(
//!     Vector2::new(0.0, 0.0),
//!     Vector2::new(2e-5, 0.0),
//!     Vector2::new(0.0, 1e-5),
//! )
//! .unwrap();
//! scan.set_pixel_size(4e-7).unwrap();
//! scan.set_sample_rate(1e6).unwrap();
//! scan.set_overscan(0.0).unwrap();
//!
//! let geometry = scan.resolve().unwrap();
//! assert_eq!(geometry.image.shape, [51, 26]);
//! ```

mod graph;
mod params;

pub use graph::{rect_scan_graph, OVERSCAN_INCLUSIVE};
pub use params::{ScanParams, DOWNSAMPLE_RANGE, OVERSCAN_PERCENT_RANGE};

use crate::error::{ScanError, ScanResult};
use crate::solver::{Graph, Kind, SolveError, Solver, Value};
use crate::validation::is_in_range;
use nalgebra::Vector2;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Relative tolerance for comparing fixed inputs against derived values.
pub const CONSISTENCY_TOLERANCE: f64 = 1e-6;

/// A rectangular scan being configured.
#[derive(Debug, Clone)]
pub struct RectScan {
    solver: Solver,
}

impl RectScan {
    /// Creates a unidirectional scan with no downsampling and nothing else fixed.
    pub fn new() -> ScanResult<Self> {
        Self::with_graph(Arc::new(rect_scan_graph()?))
    }

    /// Creates a scan over an already built graph, so many scans can share it.
    pub fn with_graph(graph: Arc<Graph>) -> ScanResult<Self> {
        let mut solver = Solver::new(graph);
        solver.set("bidirectional", false)?;
        solver.set("downsample", 1i64)?;
        Ok(Self { solver })
    }

    /// Creates a scan from serialized parameters.
    pub fn from_params(params: &ScanParams) -> ScanResult<Self> {
        let mut scan = Self::new()?;
        params.apply(&mut scan)?;
        Ok(scan)
    }

    /// The underlying solver.
    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    /// Mutable access to the underlying solver.
    pub fn solver_mut(&mut self) -> &mut Solver {
        &mut self.solver
    }

    /// Fixes any settable variable by its graph name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> ScanResult<()> {
        Ok(self.solver.set(name, value)?)
    }

    /// Resolves a single variable by its graph name.
    pub fn get(&mut self, name: &str) -> ScanResult<Value> {
        Ok(self.solver.get(name)?)
    }

    /// Places the scan by its three corners.
    pub fn set_corners(
        &mut self,
        p0: Vector2<f64>,
        p1: Vector2<f64>,
        p2: Vector2<f64>,
    ) -> ScanResult<()> {
        self.set("p0", p0)?;
        self.set("p1", p1)?;
        self.set("p2", p2)
    }

    /// Places the scan by origin, size and rotation of the fast axis.
    pub fn set_rect(
        &mut self,
        p0: Vector2<f64>,
        width: f64,
        height: f64,
        angle: f64,
    ) -> ScanResult<()> {
        self.set("p0", p0)?;
        self.set("width", width)?;
        self.set("height", height)?;
        self.set("angle", angle)
    }

    /// Fixes square pixels of the given edge length.
    pub fn set_pixel_size(&mut self, size: f64) -> ScanResult<()> {
        self.set("pixelWidth", size)?;
        self.set("pixelHeight", size)
    }

    pub fn set_sample_rate(&mut self, rate: f64) -> ScanResult<()> {
        self.set("sampleRate", rate)
    }

    pub fn set_duration(&mut self, seconds: f64) -> ScanResult<()> {
        self.set("duration", seconds)
    }

    pub fn set_bidirectional(&mut self, bidirectional: bool) -> ScanResult<()> {
        self.set("bidirectional", bidirectional)
    }

    /// Fixes the number of raw samples averaged into one pixel.
    pub fn set_downsample(&mut self, downsample: i64) -> ScanResult<()> {
        is_in_range(downsample, DOWNSAMPLE_RANGE)
            .map_err(|reason| ScanError::invalid_parameter("downsample", reason))?;
        self.set("downsample", downsample)
    }

    /// Fixes the overscan time at each end of a row, in seconds.
    pub fn set_overscan(&mut self, seconds: f64) -> ScanResult<()> {
        self.solver.unset("overscanFraction");
        self.set("overscan", seconds)
    }

    /// Sets the total overscan as a percentage of the active row time.
    ///
    /// Converted to seconds once the scan speed is known, so it only works when
    /// the speed does not itself come from the duration.
    pub fn set_overscan_percent(&mut self, percent: f64) -> ScanResult<()> {
        is_in_range(percent, OVERSCAN_PERCENT_RANGE)
            .map_err(|reason| ScanError::invalid_parameter("overscan_percent", reason))?;
        self.solver.unset("overscan");
        self.set("overscanFraction", percent / 100.0)
    }

    /// Resolves every variable, checks the fixed inputs agree with each other,
    /// and extracts the result.
    #[instrument(skip(self), err)]
    pub fn resolve(&mut self) -> ScanResult<ScanGeometry> {
        self.solver.resolve_all()?;
        self.solver.check_consistency(CONSISTENCY_TOLERANCE)?;
        let geometry = ScanGeometry::extract(&mut self.solver)?;
        debug!(
            image = ?geometry.image.shape,
            scan = ?geometry.scan.shape,
            os_len = geometry.os_len,
            duration = geometry.duration,
            "scan resolved"
        );
        Ok(geometry)
    }
}

/// Offset, shape and stride of one region of the scan buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub offset: i64,
    /// `[columns, rows]`
    pub shape: [i64; 2],
    /// `[row stride, column stride]`
    pub stride: [i64; 2],
}

/// Fully resolved scan. Lengths in metres, times in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanGeometry {
    pub p0: Vector2<f64>,
    pub p1: Vector2<f64>,
    pub p2: Vector2<f64>,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
    pub overscan: f64,
    pub os_vector: Vector2<f64>,
    /// Overscan pixels at each end of a row.
    pub os_len: i64,
    pub os_p0: Vector2<f64>,
    pub os_p1: Vector2<f64>,
    pub full_width: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub pixel_aspect_ratio: f64,
    pub sample_rate: f64,
    pub downsample: i64,
    pub bidirectional: bool,
    pub duration: f64,
    pub scan_speed: f64,
    pub exposure_per_um2: f64,
    pub num_rows: i64,
    pub scan: Region,
    pub active: Region,
    pub image: Region,
}

impl ScanGeometry {
    fn extract(solver: &mut Solver) -> ScanResult<Self> {
        let mut x = Extractor { solver };
        Ok(Self {
            p0: x.vector("p0")?,
            p1: x.vector("p1")?,
            p2: x.vector("p2")?,
            width: x.float("width")?,
            height: x.float("height")?,
            angle: x.float("angle")?,
            overscan: x.float("overscan")?,
            os_vector: x.vector("osVector")?,
            os_len: x.int("osLen")?,
            os_p0: x.vector("osP0")?,
            os_p1: x.vector("osP1")?,
            full_width: x.float("fullWidth")?,
            pixel_width: x.float("pixelWidth")?,
            pixel_height: x.float("pixelHeight")?,
            pixel_aspect_ratio: x.float("pixelAspectRatio")?,
            sample_rate: x.float("sampleRate")?,
            downsample: x.int("downsample")?,
            bidirectional: x.flag("bidirectional")?,
            duration: x.float("duration")?,
            scan_speed: x.float("scanSpeed")?,
            exposure_per_um2: x.float("exposurePerUm2")?,
            num_rows: x.int("numRows")?,
            scan: Region {
                offset: x.int("scanOffset")?,
                shape: x.shape("scanShape")?,
                stride: x.shape("scanStride")?,
            },
            active: Region {
                offset: x.int("activeOffset")?,
                shape: x.shape("activeShape")?,
                stride: x.shape("activeStride")?,
            },
            image: Region {
                offset: x.int("imageOffset")?,
                shape: x.shape("imageShape")?,
                stride: x.shape("imageStride")?,
            },
        })
    }

    /// Raw samples per row, overscan included.
    pub fn samples_per_row(&self) -> usize {
        self.scan.shape[0].max(0) as usize
    }

    /// Raw samples in one frame.
    pub fn samples_per_frame(&self) -> usize {
        self.num_rows.max(0) as usize * self.samples_per_row()
    }

    /// Image width in pixels.
    pub fn image_width(&self) -> usize {
        self.image.shape[0].max(0) as usize
    }

    /// Image height in pixels, which is also the number of rows.
    pub fn image_height(&self) -> usize {
        self.image.shape[1].max(0) as usize
    }

    /// Time needed to write one frame, overscan included.
    pub fn frame_time(&self) -> f64 {
        self.samples_per_frame() as f64 / self.sample_rate
    }

    /// Metadata for a run of `n_frames` identical frames.
    pub fn summary(&self, n_frames: usize) -> ScanSummary {
        let samples_per_frame = self.samples_per_frame();
        ScanSummary {
            image_shape: self.image.shape,
            scan_shape: self.scan.shape,
            active_shape: self.active.shape,
            os_len: self.os_len,
            pixel_width: self.pixel_width,
            pixel_height: self.pixel_height,
            sample_rate: self.sample_rate,
            downsample: self.downsample,
            bidirectional: self.bidirectional,
            scan_speed: self.scan_speed,
            duration: self.duration,
            frame_time: self.frame_time(),
            samples_per_frame,
            n_frames,
            total_samples: samples_per_frame * n_frames,
            frame_exposure_per_um2: self.exposure_per_um2,
            total_exposure_per_um2: self.exposure_per_um2 * n_frames as f64,
        }
    }
}

/// Scan metadata handed to acquisition and image reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    pub image_shape: [i64; 2],
    pub scan_shape: [i64; 2],
    pub active_shape: [i64; 2],
    pub os_len: i64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub sample_rate: f64,
    pub downsample: i64,
    pub bidirectional: bool,
    pub scan_speed: f64,
    /// Nominal frame duration: image time plus overscan time.
    pub duration: f64,
    /// Sample count of one frame divided by the sample rate.
    pub frame_time: f64,
    pub samples_per_frame: usize,
    pub n_frames: usize,
    pub total_samples: usize,
    pub frame_exposure_per_um2: f64,
    pub total_exposure_per_um2: f64,
}

struct Extractor<'a> {
    solver: &'a mut Solver,
}

impl Extractor<'_> {
    fn float(&mut self, name: &str) -> ScanResult<f64> {
        match self.solver.get(name)? {
            Value::Float(v) => Ok(v),
            other => Err(mismatch(name, Kind::Float, &other)),
        }
    }

    fn int(&mut self, name: &str) -> ScanResult<i64> {
        match self.solver.get(name)? {
            Value::Int(v) => Ok(v),
            other => Err(mismatch(name, Kind::Int, &other)),
        }
    }

    fn flag(&mut self, name: &str) -> ScanResult<bool> {
        match self.solver.get(name)? {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch(name, Kind::Bool, &other)),
        }
    }

    fn vector(&mut self, name: &str) -> ScanResult<Vector2<f64>> {
        match self.solver.get(name)? {
            Value::Vector(v) => Ok(v),
            other => Err(mismatch(name, Kind::Vector, &other)),
        }
    }

    fn shape(&mut self, name: &str) -> ScanResult<[i64; 2]> {
        match self.solver.get(name)? {
            Value::Shape(v) => Ok(v),
            other => Err(mismatch(name, Kind::Shape, &other)),
        }
    }
}

fn mismatch(name: &str, expected: Kind, found: &Value) -> ScanError {
    SolveError::TypeMismatch {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn corners_scan() -> RectScan {
        let mut scan = RectScan::new().unwrap();
        scan.set_corners(
            Vector2::new(0.0, 0.0),
            Vector2::new(2e-5, 0.0),
            Vector2::new(0.0, 1e-5),
        )
        .unwrap();
        scan.set_pixel_size(4e-7).unwrap();
        scan.set_sample_rate(1e6).unwrap();
        scan
    }

    #[test]
    fn pixel_size_driven_scan() {
        let mut scan = corners_scan();
        scan.set_overscan(0.0).unwrap();
        let g = scan.resolve().unwrap();

        assert_eq!(g.image.shape, [51, 26]);
        assert_eq!(g.num_rows, 26);
        assert_eq!(g.os_len, 0);
        assert_relative_eq!(g.width, 2e-5, max_relative = 1e-12);
        assert_relative_eq!(g.height, 1e-5, max_relative = 1e-12);
        assert_relative_eq!(g.angle, 0.0);
        assert_relative_eq!(g.scan_speed, 0.4, max_relative = 1e-12);
        assert_relative_eq!(g.duration, 51.0 * 26.0 / 1e6, max_relative = 1e-12);
        assert_relative_eq!(g.pixel_aspect_ratio, 1.0);
        assert_relative_eq!(
            g.exposure_per_um2,
            1e-12 / (16e-14 * 1e6),
            max_relative = 1e-12
        );
    }

    #[test]
    fn overscan_percent_extends_rows() {
        let mut scan = corners_scan();
        scan.set_overscan_percent(70.0).unwrap();
        let g = scan.resolve().unwrap();

        // 70% of a 50us row, split over both ends.
        assert_relative_eq!(g.overscan, 17.5e-6, max_relative = 1e-12);
        assert_eq!(g.os_len, 18);
        assert_eq!(g.scan.shape, [51 + 2 * 18, 26]);
        assert_eq!(g.image.offset, 18);
        assert_relative_eq!(g.os_p0.x, -7e-6, max_relative = 1e-9);
        assert_relative_eq!(g.full_width, 3.4e-5, max_relative = 1e-9);
    }

    #[test]
    fn downsample_scales_raw_regions() {
        let mut scan = corners_scan();
        scan.set_overscan(0.0).unwrap();
        scan.set_downsample(4).unwrap();
        let g = scan.resolve().unwrap();

        assert_eq!(g.image.shape, [51, 26]);
        assert_eq!(g.active.shape, [204, 26]);
        assert_eq!(g.scan.stride, [204, 1]);
        assert_eq!(g.image.stride, [51, 1]);
        assert_relative_eq!(g.scan_speed, 0.1, max_relative = 1e-12);
    }

    #[test]
    fn rejects_out_of_range_downsample() {
        let mut scan = corners_scan();
        assert!(matches!(
            scan.set_downsample(101),
            Err(ScanError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn summary_multiplies_exposure_by_frames() {
        let mut scan = corners_scan();
        scan.set_overscan(0.0).unwrap();
        let g = scan.resolve().unwrap();
        let s = g.summary(3);
        assert_eq!(s.samples_per_frame, 51 * 26);
        assert_eq!(s.total_samples, 3 * 51 * 26);
        assert_relative_eq!(
            s.total_exposure_per_um2,
            3.0 * g.exposure_per_um2,
            max_relative = 1e-12
        );
    }
}
