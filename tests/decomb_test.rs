//! Field shift recovery on synthetic bidirectional images.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raster_scan::decomb::{
    adjust_bidirectional, decomb, find_best_shift, LagCorrection, ShiftSearch,
};
use raster_scan::image::ScanImage;

const ROWS: usize = 16;
const COLS: usize = 128;
const MARGIN: usize = 30;

fn random_profile(seed: u64) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array1::from_shape_fn(COLS + 2 * MARGIN, |_| rng.gen_range(0.0..1.0))
}

/// Every row shows the same profile, with the even rows displaced right by `k`.
fn combed(profile: &Array1<f64>, k: i64) -> Array2<f64> {
    Array2::from_shape_fn((ROWS, COLS), |(r, c)| {
        let offset = if r % 2 == 0 {
            MARGIN as i64 - k
        } else {
            MARGIN as i64
        };
        profile[(c as i64 + offset) as usize]
    })
}

#[test]
fn search_recovers_every_shift_in_range() {
    let profile = random_profile(7);
    for k in -20..=20 {
        let image = combed(&profile, k);
        let best = find_best_shift(image.view(), -25, 25).unwrap();
        assert_eq!(best.shift, k, "shift {k} recovered as {}", best.shift);
        assert!(best.cost < 1e-12);
    }
}

#[test]
fn one_correction_pass_removes_the_misalignment() {
    let profile = random_profile(11);
    for k in 1..=20 {
        let image = combed(&profile, k);
        let result = decomb(
            image.view(),
            ShiftSearch::Auto {
                min_shift: 0,
                max_shift: 25,
            },
        )
        .unwrap();
        assert_eq!(result.shift, k);

        let valid = result.valid_columns();
        assert_eq!(valid.len(), COLS - k as usize);
        let residual = find_best_shift(result.valid_image(), -5, 5).unwrap();
        assert_eq!(residual.shift, 0, "residual after correcting {k}");
        assert!(residual.cost < 1e-12);

        // every even row now matches the odd row below it over the valid columns
        let fixed = result.valid_image();
        assert_eq!(fixed.row(0), fixed.row(1));
    }
}

#[test]
fn flat_image_yields_zero_shift() {
    let image = Array2::from_elem((ROWS, COLS), 0.42);
    // every candidate ties; the smallest one cannot be applied
    let best = find_best_shift(image.view(), -20, 20).unwrap();
    assert_eq!(best.shift, -20);

    let result = decomb(
        image.view(),
        ShiftSearch::Auto {
            min_shift: -20,
            max_shift: 20,
        },
    )
    .unwrap();
    assert_eq!(result.shift, 0);
    assert_eq!(result.image, image);
}

#[test]
fn negative_shift_cannot_be_reconstructed() {
    let image = combed(&random_profile(3), -6);
    let result = decomb(
        image.view(),
        ShiftSearch::Auto {
            min_shift: -10,
            max_shift: 10,
        },
    )
    .unwrap();
    assert!(result.found);
    assert_eq!(result.shift, 0);
    assert_eq!(result.image, image);
}

#[test]
fn empty_search_range_returns_image_unchanged() {
    let image = combed(&random_profile(5), 4);
    let result = decomb(
        image.view(),
        ShiftSearch::Auto {
            min_shift: 10,
            max_shift: 5,
        },
    )
    .unwrap();
    assert!(!result.found);
    assert_eq!(result.shift, 0);
    assert_eq!(result.image, image);
}

#[test]
fn fixed_shift_matches_automatic_result() {
    let image = combed(&random_profile(9), 7);
    let auto = decomb(
        image.view(),
        ShiftSearch::Auto {
            min_shift: 0,
            max_shift: 20,
        },
    )
    .unwrap();
    let fixed = decomb(image.view(), ShiftSearch::Fixed { shift: auto.shift }).unwrap();
    assert_eq!(auto, fixed);
}

#[test]
fn lag_correction_in_seconds() {
    // 1 MHz sampling, downsample 2: one column every 2 us
    let pixel_rate = 5e5;
    let image = combed(&random_profile(13), 6);
    let adjusted =
        adjust_bidirectional(image.view(), pixel_rate, LagCorrection::default()).unwrap();
    assert_eq!(adjusted.result.shift, 6);
    assert!((adjusted.shift_seconds - 12e-6).abs() < 1e-15);

    assert!(adjust_bidirectional(image.view(), 0.0, LagCorrection::default()).is_err());
}

#[test]
fn scan_image_skips_overscan_and_unidirectional_data() {
    let profile = random_profile(17);
    let combed_image = combed(&profile, 5);

    // Pad each row with 4 overscan columns of noise on both sides.
    let mut rng = StdRng::seed_from_u64(99);
    let padded = Array2::from_shape_fn((ROWS, COLS + 8), |(r, c)| {
        if (4..COLS + 4).contains(&c) {
            combed_image[[r, c - 4]]
        } else {
            rng.gen_range(10.0..20.0)
        }
    });

    let image = ScanImage::from_array(padded.clone(), 4, 1e5, true);
    let adjusted = image.adjust_bidirectional(LagCorrection::default()).unwrap();
    assert_eq!(adjusted.result.shift, 5);
    assert_eq!(adjusted.result.image.ncols(), COLS);

    let unidirectional = ScanImage::from_array(padded, 4, 1e5, false);
    let adjusted = unidirectional
        .adjust_bidirectional(LagCorrection::default())
        .unwrap();
    assert_eq!(adjusted.result.shift, 0);
    assert_eq!(adjusted.shift_seconds, 0.0);
}
