//! Waveform generation from resolved scans.

use approx::assert_relative_eq;
use nalgebra::Vector2;
use raster_scan::geometry::{RectScan, ScanGeometry};
use raster_scan::image::ScanImage;
use raster_scan::trajectory::{generate, scan_positions, AffineMapper, IdentityMapper};
use raster_scan::{ScanError, ScanResult};

fn geometry(bidirectional: bool, downsample: i64) -> ScanGeometry {
    let mut scan = RectScan::new().unwrap();
    scan.set_corners(
        Vector2::new(0.0, 0.0),
        Vector2::new(2e-5, 0.0),
        Vector2::new(0.0, 1e-5),
    )
    .unwrap();
    scan.set_pixel_size(4e-7).unwrap();
    scan.set_sample_rate(1e6).unwrap();
    scan.set_overscan_percent(70.0).unwrap();
    scan.set_downsample(downsample).unwrap();
    scan.set_bidirectional(bidirectional).unwrap();
    scan.resolve().unwrap()
}

#[test]
fn length_is_rows_times_samples_per_row() {
    let g = geometry(false, 1);
    let t = scan_positions(&g).unwrap();
    assert_eq!(g.samples_per_row(), (51 + 2 * 18) as usize);
    assert_eq!(t.len(), 26 * 87);
    assert_eq!(t.len(), g.samples_per_frame());
    assert_eq!(t.x.len(), t.y.len());

    let g = geometry(true, 4);
    let t = scan_positions(&g).unwrap();
    assert_eq!(t.len(), g.num_rows as usize * g.samples_per_row());
}

#[test]
fn bidirectional_rows_are_reversed() {
    let g = geometry(true, 1);
    let t = scan_positions(&g).unwrap();
    let n = g.samples_per_row();
    let row0 = &t.x[..n];
    let row1 = &t.x[n..2 * n];
    let reversed: Vec<f64> = row0.iter().rev().copied().collect();
    assert_eq!(row1, reversed.as_slice());

    let forward = scan_positions(&geometry(false, 1)).unwrap();
    assert_eq!(&forward.x[n..2 * n], row0);
}

#[test]
fn overscan_extends_rows_past_the_corners() {
    let g = geometry(false, 1);
    let t = scan_positions(&g).unwrap();
    let os = g.os_len as usize;

    // first imaging sample sits on p0
    let (x, y) = t.point(os).unwrap();
    assert_relative_eq!(x, g.p0.x, epsilon = 1e-15);
    assert_relative_eq!(y, g.p0.y, epsilon = 1e-15);

    // the row starts os_len pixels before p0 and rows step along the slow axis
    let (x_start, _) = t.point(0).unwrap();
    assert!(x_start < g.p0.x);
    let (_, y_next) = t.point(g.samples_per_row()).unwrap();
    assert_relative_eq!(y_next, 1e-5 / 26.0, max_relative = 1e-12);
}

#[test]
fn generation_is_reproducible() {
    let g = geometry(true, 2);
    let a = generate(&g, &IdentityMapper).unwrap();
    let b = generate(&g, &IdentityMapper).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, scan_positions(&g).unwrap());
}

#[test]
fn affine_mapper_scales_to_volts() {
    let g = geometry(false, 1);
    let positions = scan_positions(&g).unwrap();
    let volts = generate(&g, &AffineMapper::scale(5e4, -5e4)).unwrap();
    assert_eq!(volts.len(), positions.len());
    for i in [0, 100, positions.len() - 1] {
        assert_relative_eq!(volts.x[i], positions.x[i] * 5e4, max_relative = 1e-12);
        assert_relative_eq!(volts.y[i], -positions.y[i] * 5e4, max_relative = 1e-12);
    }
}

#[test]
fn closure_mapper_with_wrong_length_is_rejected() {
    let g = geometry(false, 1);
    let truncating = |xs: &[f64], ys: &[f64]| -> ScanResult<(Vec<f64>, Vec<f64>)> {
        Ok((xs[1..].to_vec(), ys[1..].to_vec()))
    };
    assert!(matches!(
        generate(&g, &truncating),
        Err(ScanError::Mapping(_))
    ));

    let failing = |_: &[f64], _: &[f64]| -> ScanResult<(Vec<f64>, Vec<f64>)> {
        Err(ScanError::Mapping("offline".into()))
    };
    assert!(generate(&g, &failing).is_err());
}

#[test]
fn frames_and_padding() {
    let g = geometry(false, 1);
    let frame = scan_positions(&g).unwrap();
    let three = frame.repeat(3);
    assert_eq!(three.len(), 3 * frame.len());
    assert_eq!(three.point(frame.len()), frame.point(0));

    let padded = frame.padded_to(frame.len() + 10).unwrap();
    assert_eq!(padded.point(padded.len() - 1), frame.point(frame.len() - 1));
}

#[test]
fn samples_rebuild_into_image_orientation() {
    // Feed the scan's own x positions back as the acquired signal: every row of
    // the rebuilt image must then increase left to right.
    let g = geometry(true, 2);
    let t = scan_positions(&g).unwrap();
    let image = ScanImage::from_samples(&t.x, &g).unwrap();
    let data = image.data();

    assert_eq!(data.dim(), (26, 51 + 2 * g.os_len as usize));
    assert_eq!(data.row(0), data.row(1));
    for row in data.rows() {
        assert!(row.to_vec().windows(2).all(|w| w[0] < w[1]));
    }

    let active = image.active().unwrap();
    assert_eq!(active.ncols(), 51);
    let half_sample = 0.25 * (g.p1.x - g.p0.x) / 51.0;
    assert_relative_eq!(active[[0, 0]], g.p0.x + half_sample, epsilon = 1e-15);
}

#[test]
fn written_json_holds_both_axes() {
    let g = geometry(false, 1);
    let t = scan_positions(&g).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waveform.json");
    t.write_json(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["x"].as_array().unwrap().len(), t.len());
    assert_eq!(parsed["y"].as_array().unwrap().len(), t.len());

    let missing = dir.path().join("no/such/dir/waveform.json");
    assert!(matches!(t.write_json(missing), Err(ScanError::Io(_))));
}
