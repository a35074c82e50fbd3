//! Serializable form of the caller's fixed scan inputs.

use super::RectScan;
use crate::error::{ScanError, ScanResult};
use crate::validation::{is_finite, is_in_range, is_positive};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Accepted downsample factors.
pub const DOWNSAMPLE_RANGE: std::ops::RangeInclusive<i64> = 1..=100;
/// Accepted overscan, as a percentage of the active row time.
pub const OVERSCAN_PERCENT_RANGE: std::ops::RangeInclusive<f64> = 0.0..=200.0;

/// Fixed inputs for a rectangular scan.
///
/// Every field is optional; only the ones present are fixed on the solver.
/// Geometry is given either as corners (`p0`, `p1`, `p2`) or as `p0` plus
/// `width`, `height` and `angle`. Lengths are in metres, times in seconds,
/// angles in radians.
///
/// ```toml
/// p0 = [0.0, 0.0]
/// p1 = [2e-5, 0.0]
/// p2 = [0.0, 1e-5]
/// pixel_size = 4e-7
/// sample_rate = 1e6
/// overscan_percent = 70.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParams {
    pub p0: Option<[f64; 2]>,
    pub p1: Option<[f64; 2]>,
    pub p2: Option<[f64; 2]>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub angle: Option<f64>,
    /// Sets both pixel width and pixel height.
    pub pixel_size: Option<f64>,
    pub pixel_width: Option<f64>,
    pub pixel_height: Option<f64>,
    pub pixel_aspect_ratio: Option<f64>,
    pub sample_rate: Option<f64>,
    pub downsample: Option<i64>,
    pub duration: Option<f64>,
    /// Overscan per row edge, in seconds.
    pub overscan: Option<f64>,
    /// Total overscan as a percentage of the active row time.
    pub overscan_percent: Option<f64>,
    pub bidirectional: Option<bool>,
}

impl ScanParams {
    /// Range-checks every present value.
    pub fn validate(&self) -> ScanResult<()> {
        for (name, point) in [("p0", self.p0), ("p1", self.p1), ("p2", self.p2)] {
            if let Some([x, y]) = point {
                check(name, is_finite(x).and(is_finite(y)))?;
            }
        }
        for (name, value) in [
            ("width", self.width),
            ("height", self.height),
            ("pixel_size", self.pixel_size),
            ("pixel_width", self.pixel_width),
            ("pixel_height", self.pixel_height),
            ("pixel_aspect_ratio", self.pixel_aspect_ratio),
            ("sample_rate", self.sample_rate),
            ("duration", self.duration),
        ] {
            if let Some(v) = value {
                check(name, is_positive(v))?;
            }
        }
        if let Some(angle) = self.angle {
            check("angle", is_finite(angle))?;
        }
        if let Some(ds) = self.downsample {
            check("downsample", is_in_range(ds, DOWNSAMPLE_RANGE))?;
        }
        if let Some(os) = self.overscan {
            check("overscan", is_finite(os).and(is_in_range(os, 0.0..=f64::MAX)))?;
        }
        if let Some(pct) = self.overscan_percent {
            check("overscan_percent", is_in_range(pct, OVERSCAN_PERCENT_RANGE))?;
        }
        if self.overscan.is_some() && self.overscan_percent.is_some() {
            return Err(ScanError::invalid_parameter(
                "overscan",
                "give either overscan or overscan_percent, not both",
            ));
        }
        if self.pixel_size.is_some() && (self.pixel_width.is_some() || self.pixel_height.is_some())
        {
            return Err(ScanError::invalid_parameter(
                "pixel_size",
                "conflicts with pixel_width/pixel_height",
            ));
        }
        Ok(())
    }

    /// Validates and fixes every present value on `scan`.
    pub fn apply(&self, scan: &mut RectScan) -> ScanResult<()> {
        self.validate()?;

        let vec = |p: [f64; 2]| Vector2::new(p[0], p[1]);
        let points = [("p0", self.p0), ("p1", self.p1), ("p2", self.p2)];
        for (name, point) in points {
            if let Some(p) = point {
                scan.set(name, vec(p))?;
            }
        }

        let scalars = [
            ("width", self.width),
            ("height", self.height),
            ("angle", self.angle),
            ("pixelWidth", self.pixel_width.or(self.pixel_size)),
            ("pixelHeight", self.pixel_height.or(self.pixel_size)),
            ("pixelAspectRatio", self.pixel_aspect_ratio),
            ("sampleRate", self.sample_rate),
            ("duration", self.duration),
            ("overscan", self.overscan),
        ];
        for (name, value) in scalars {
            if let Some(v) = value {
                scan.set(name, v)?;
            }
        }

        if let Some(pct) = self.overscan_percent {
            scan.set_overscan_percent(pct)?;
        }
        if let Some(ds) = self.downsample {
            scan.set_downsample(ds)?;
        }
        if let Some(bidirectional) = self.bidirectional {
            scan.set_bidirectional(bidirectional)?;
        }
        Ok(())
    }
}

fn check(name: &str, outcome: Result<(), &'static str>) -> ScanResult<()> {
    outcome.map_err(|reason| ScanError::invalid_parameter(name, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_from_toml() {
        let params: ScanParams = toml::from_str(
            r#"
            p0 = [0.0, 0.0]
            p1 = [2e-5, 0.0]
            p2 = [0.0, 1e-5]
            pixel_size = 4e-7
            sample_rate = 1e6
            overscan_percent = 70.0
            bidirectional = true
            "#,
        )
        .unwrap();
        assert_eq!(params.p1, Some([2e-5, 0.0]));
        assert_eq!(params.overscan_percent, Some(70.0));
        assert!(params.downsample.is_none());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let params = ScanParams {
            downsample: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ScanError::InvalidParameter { ref name, .. }) if name == "downsample"
        ));

        let params = ScanParams {
            overscan_percent: Some(250.0),
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = ScanParams {
            sample_rate: Some(0.0),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_two_overscan_forms() {
        let params = ScanParams {
            overscan: Some(1e-4),
            overscan_percent: Some(10.0),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
