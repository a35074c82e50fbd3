//! Equations relating the geometry and timing of a rectangular raster scan.
//!
//! ```text
//!   p0 ______ p1        fast axis: p0 -> p1
//!     |                 slow axis: p0 -> p2
//!     |
//!   p2
//! ```
//!
//! Every variable lists its formulas primary-first. A formula whose inputs
//! cannot be resolved falls through to the next one, which is how the same graph
//! serves pixel-size driven scans (pixel size -> image shape -> duration) and
//! duration driven scans (duration -> image shape -> pixel size).

use crate::solver::{Flags, Graph, Kind, Scope, SolveError, SolveResult, Value};
use nalgebra::Vector2;

/// Variables that include the overscan region.
///
/// `duration` is computed from the image region plus a fixed overscan time per
/// row; it must never be derived through any of these, because `osVector`
/// depends on `scanSpeed`, which may itself come from `duration`.
pub const OVERSCAN_INCLUSIVE: &[&str] = &[
    "osVector",
    "osLen",
    "osP0",
    "osP1",
    "fullWidth",
    "scanShape",
    "scanStride",
    "activeOffset",
    "activeStride",
    "imageOffset",
    "imageStride",
];

const INPUT_ONLY: Flags = Flags::FIXED;
const EITHER: Flags = Flags::FIXED.union(Flags::COMPUTED);
const OUTPUT: Flags = Flags::COMPUTED.union(Flags::READONLY);

// Ratios within this relative distance of an integer are treated as exact.
const SNAP_TOLERANCE: f64 = 1e-9;

/// Builds the rectangular scan graph.
pub fn rect_scan_graph() -> SolveResult<Graph> {
    let mut g = Graph::builder();

    // Placement
    g.variable("p0", Kind::Vector, INPUT_ONLY);
    g.variable("p1", Kind::Vector, EITHER)
        .formula(&["p0", "width", "angle"], |s| {
            let p0 = s.vector("p0")?;
            let width = s.float("width")?;
            let angle = s.float("angle")?;
            Ok(Value::Vector(p0 + width * Vector2::new(angle.cos(), angle.sin())))
        });
    g.variable("p2", Kind::Vector, EITHER)
        .formula(&["p0", "height", "angle"], |s| {
            let p0 = s.vector("p0")?;
            let height = s.float("height")?;
            let angle = s.float("angle")?;
            Ok(Value::Vector(p0 + height * Vector2::new(-angle.sin(), angle.cos())))
        });
    g.variable("width", Kind::Float, EITHER)
        .formula(&["p0", "p1"], |s| {
            let d = s.vector("p1")? - s.vector("p0")?;
            Ok(Value::Float(d.norm()))
        });
    g.variable("height", Kind::Float, EITHER)
        .formula(&["p0", "p2"], |s| {
            let d = s.vector("p2")? - s.vector("p0")?;
            Ok(Value::Float(d.norm()))
        });
    g.variable("angle", Kind::Float, EITHER)
        .formula(&["p0", "p1"], |s| {
            let d = s.vector("p1")? - s.vector("p0")?;
            Ok(Value::Float(d.y.atan2(d.x)))
        });

    // Overscan
    g.variable("overscanFraction", Kind::Float, INPUT_ONLY);
    g.variable("overscan", Kind::Float, EITHER)
        .formula(&["overscanFraction", "width", "scanSpeed"], |s| {
            let fraction = s.float("overscanFraction")?;
            let width = s.float("width")?;
            let speed = positive(s, "scanSpeed")?;
            // Split evenly between both ends of the row.
            Ok(Value::Float(fraction * (width / speed) / 2.0))
        });
    g.variable("osVector", Kind::Vector, OUTPUT)
        .formula(&["scanSpeed", "overscan", "p0", "p1"], |s| {
            let distance = s.float("scanSpeed")? * s.float("overscan")?;
            let axis = s.vector("p1")? - s.vector("p0")?;
            let len = axis.norm();
            if len <= 0.0 {
                return Err(SolveError::invalid("osVector", "p0 and p1 coincide"));
            }
            Ok(Value::Vector(axis * (distance / len)))
        });
    g.variable("osLen", Kind::Int, OUTPUT)
        .formula(&["osVector", "pixelWidth"], |s| {
            let osv = s.vector("osVector")?;
            let pw = positive(s, "pixelWidth")?;
            Ok(Value::Int(ceil_snapped(osv.norm() / pw) as i64))
        });
    g.variable("osP0", Kind::Vector, OUTPUT)
        .formula(&["p0", "osVector"], |s| {
            Ok(Value::Vector(s.vector("p0")? - s.vector("osVector")?))
        });
    g.variable("osP1", Kind::Vector, OUTPUT)
        .formula(&["p1", "osVector"], |s| {
            Ok(Value::Vector(s.vector("p1")? + s.vector("osVector")?))
        });
    g.variable("fullWidth", Kind::Float, OUTPUT)
        .formula(&["osP0", "osP1"], |s| {
            Ok(Value::Float((s.vector("osP1")? - s.vector("osP0")?).norm()))
        });

    // Pixel geometry
    g.variable("pixelWidth", Kind::Float, EITHER)
        .formula(&["pixelHeight", "pixelAspectRatio"], |s| {
            Ok(Value::Float(
                s.float("pixelHeight")? * s.float("pixelAspectRatio")?,
            ))
        })
        .formula(&["scanSpeed", "sampleRate", "downsample"], |s| {
            let speed = s.float("scanSpeed")?;
            let rate = positive(s, "sampleRate")?;
            let ds = downsample(s)?;
            Ok(Value::Float(speed * ds / rate))
        });
    g.variable("pixelHeight", Kind::Float, EITHER)
        .formula(&["pixelWidth", "pixelAspectRatio"], |s| {
            let pw = s.float("pixelWidth")?;
            let ar = positive(s, "pixelAspectRatio")?;
            Ok(Value::Float(pw / ar))
        })
        .formula(&["height", "numRows"], |s| {
            let height = s.float("height")?;
            let rows = s.int("numRows")?;
            if rows < 2 {
                return Err(SolveError::invalid(
                    "pixelHeight",
                    format!("cannot derive row spacing from {rows} row(s)"),
                ));
            }
            Ok(Value::Float(height / (rows - 1) as f64))
        });
    g.variable("pixelAspectRatio", Kind::Float, EITHER)
        .formula(&["pixelWidth", "pixelHeight"], |s| {
            let pw = s.float("pixelWidth")?;
            let ph = positive(s, "pixelHeight")?;
            Ok(Value::Float(pw / ph))
        });

    // Timing
    g.variable("bidirectional", Kind::Bool, INPUT_ONLY);
    g.variable("sampleRate", Kind::Float, INPUT_ONLY);
    g.variable("downsample", Kind::Int, INPUT_ONLY);
    g.variable("duration", Kind::Float, EITHER)
        .formula(&["imageShape", "overscan", "downsample", "sampleRate"], |s| {
            let [nx, ny] = s.shape("imageShape")?;
            let overscan = s.float("overscan")?;
            let ds = downsample(s)?;
            let rate = positive(s, "sampleRate")?;
            let image_time = (nx * ny) as f64 * ds / rate;
            let overscan_time = ny as f64 * 2.0 * overscan;
            Ok(Value::Float(image_time + overscan_time))
        });
    g.variable("scanSpeed", Kind::Float, EITHER)
        .formula(&["pixelWidth", "sampleRate", "downsample"], |s| {
            let pw = s.float("pixelWidth")?;
            let rate = s.float("sampleRate")?;
            let ds = downsample(s)?;
            Ok(Value::Float((pw / ds) * rate))
        })
        .formula(&["duration", "numRows", "overscan", "width"], |s| {
            let duration = s.float("duration")?;
            let rows = s.int("numRows")?;
            let overscan = s.float("overscan")?;
            let width = s.float("width")?;
            if rows < 1 {
                return Err(SolveError::invalid("scanSpeed", "scan has no rows"));
            }
            let row_time = (duration - rows as f64 * 2.0 * overscan) / rows as f64;
            if row_time <= 0.0 {
                return Err(SolveError::invalid(
                    "scanSpeed",
                    "duration is shorter than the total overscan time",
                ));
            }
            Ok(Value::Float(width / row_time))
        });
    g.variable("exposurePerUm2", Kind::Float, OUTPUT)
        .formula(
            &["pixelWidth", "pixelHeight", "downsample", "sampleRate"],
            |s| {
                let area = s.float("pixelWidth")? * s.float("pixelHeight")?;
                let ds = downsample(s)?;
                let rate = positive(s, "sampleRate")?;
                if area <= 0.0 {
                    return Err(SolveError::invalid("exposurePerUm2", "pixel area is zero"));
                }
                Ok(Value::Float((ds / area) * 1e-12 / rate))
            },
        );

    // Scan region: includes overscan, counted in samples
    g.variable("scanOffset", Kind::Int, OUTPUT)
        .formula(&[], |_| Ok(Value::Int(0)));
    g.variable("scanShape", Kind::Shape, OUTPUT)
        .formula(&["imageShape", "osLen", "downsample"], |s| {
            let [nx, ny] = s.shape("imageShape")?;
            let os_len = s.int("osLen")?;
            let ds = s.int("downsample")?;
            Ok(Value::Shape([(nx + 2 * os_len) * ds, ny]))
        });
    g.variable("scanStride", Kind::Shape, OUTPUT)
        .formula(&["scanShape"], |s| {
            let [w, _] = s.shape("scanShape")?;
            Ok(Value::Shape([w, 1]))
        });
    g.variable("numRows", Kind::Int, OUTPUT)
        .formula(&["imageShape"], |s| Ok(Value::Int(s.shape("imageShape")?[1])));

    // Active region: excludes overscan, counted in samples
    g.variable("activeOffset", Kind::Int, OUTPUT)
        .formula(&["imageOffset", "downsample"], |s| {
            Ok(Value::Int(s.int("imageOffset")? * s.int("downsample")?))
        });
    g.variable("activeShape", Kind::Shape, OUTPUT)
        .formula(&["imageShape", "downsample"], |s| {
            let [nx, ny] = s.shape("imageShape")?;
            Ok(Value::Shape([nx * s.int("downsample")?, ny]))
        });
    g.variable("activeStride", Kind::Shape, OUTPUT)
        .formula(&["scanStride"], |s| Ok(Value::Shape(s.shape("scanStride")?)));

    // Image region: excludes overscan, counted in pixels
    g.variable("imageOffset", Kind::Int, OUTPUT)
        .formula(&["osLen"], |s| Ok(Value::Int(s.int("osLen")?)));
    g.variable("imageShape", Kind::Shape, OUTPUT)
        .formula(&["width", "height", "pixelWidth", "pixelHeight"], |s| {
            let width = s.float("width")?;
            let height = s.float("height")?;
            let pw = positive(s, "pixelWidth")?;
            let ph = positive(s, "pixelHeight")?;
            let nx = ceil_snapped(width / pw) as i64 + 1;
            let ny = ceil_snapped(height / ph) as i64 + 1;
            Ok(Value::Shape([nx, ny]))
        })
        .formula(
            &[
                "width",
                "height",
                "duration",
                "sampleRate",
                "downsample",
                "pixelAspectRatio",
            ],
            |s| {
                let width = s.float("width")?;
                let height = positive(s, "height")?;
                let duration = s.float("duration")?;
                let rate = s.float("sampleRate")?;
                let ds = downsample(s)?;
                let ar = positive(s, "pixelAspectRatio")?;

                let max_pixels = (duration * rate / ds).floor();
                let shape_ratio = (width / height) / ar;
                if max_pixels < 1.0 || shape_ratio <= 0.0 {
                    return Err(SolveError::invalid(
                        "imageShape",
                        "duration too short for a single pixel",
                    ));
                }
                // nx * ny == max_pixels and nx / ny == shape_ratio
                let ny = (max_pixels / shape_ratio).sqrt().ceil();
                let nx = (max_pixels / ny).floor();
                if nx < 1.0 {
                    return Err(SolveError::invalid("imageShape", "image has no columns"));
                }
                Ok(Value::Shape([nx as i64, ny as i64]))
            },
        );
    g.variable("imageStride", Kind::Shape, OUTPUT)
        .formula(&["scanStride", "downsample"], |s| {
            let [w, _] = s.shape("scanStride")?;
            Ok(Value::Shape([w / s.int("downsample")?, 1]))
        });

    g.forbid("duration", OVERSCAN_INCLUSIVE);
    g.build()
}

fn positive(s: &mut Scope<'_>, name: &str) -> SolveResult<f64> {
    let v = s.float(name)?;
    if v > 0.0 {
        Ok(v)
    } else {
        Err(SolveError::invalid(
            s.variable(),
            format!("{name} must be positive, got {v}"),
        ))
    }
}

fn downsample(s: &mut Scope<'_>) -> SolveResult<f64> {
    let ds = s.int("downsample")?;
    if ds < 1 {
        return Err(SolveError::invalid(
            s.variable(),
            format!("downsample must be at least 1, got {ds}"),
        ));
    }
    Ok(ds as f64)
}

/// Ceiling that treats values within rounding error of an integer as exact.
pub(crate) fn ceil_snapped(x: f64) -> f64 {
    let nearest = x.round();
    if (x - nearest).abs() <= SNAP_TOLERANCE * nearest.abs().max(1.0) {
        nearest
    } else {
        x.ceil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_builds_with_duration_isolated_from_overscan() {
        let graph = rect_scan_graph().unwrap();
        assert!(graph.variable("duration").is_some());
        assert!(graph.len() >= 30);
    }

    #[test]
    fn ceil_snapped_tolerates_rounding_error() {
        assert_eq!(ceil_snapped(50.000000000001), 50.0);
        assert_eq!(ceil_snapped(49.99999999999), 50.0);
        assert_eq!(ceil_snapped(49.2), 50.0);
        assert_eq!(ceil_snapped(0.0), 0.0);
    }

    #[test]
    fn duration_reading_scan_shape_is_rejected() {
        let mut g = Graph::builder();
        g.variable("scanShape", Kind::Shape, Flags::FIXED);
        g.variable("duration", Kind::Float, Flags::COMPUTED)
            .formula(&["scanShape"], |s| {
                let [w, h] = s.shape("scanShape")?;
                Ok(Value::Float((w * h) as f64))
            });
        g.forbid("duration", OVERSCAN_INCLUSIVE);
        assert!(matches!(
            g.build(),
            Err(SolveError::ForbiddenDependency { .. })
        ));
    }
}
