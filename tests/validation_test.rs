use raster_scan::validation::*;

#[test]
fn test_is_in_range() {
    assert!(is_in_range(5, 1..=10).is_ok());
    assert!(is_in_range(11, 1..=10).is_err());
    assert!(is_in_range(200.0, 0.0..=200.0).is_ok());
}

#[test]
fn test_is_finite() {
    assert!(is_finite(1e-7).is_ok());
    assert!(is_finite(f64::NAN).is_err());
    assert!(is_finite(f64::NEG_INFINITY).is_err());
}

#[test]
fn test_is_positive() {
    assert!(is_positive(4e-7).is_ok());
    assert!(is_positive(0.0).is_err());
    assert!(is_positive(-1.0).is_err());
    assert!(is_positive(f64::INFINITY).is_err());
}

#[test]
fn test_is_not_empty() {
    assert!(is_not_empty("hello").is_ok());
    assert!(is_not_empty("").is_err());
}

#[test]
fn test_is_one_of() {
    assert!(is_one_of("json", &["pretty", "compact", "json"]).is_ok());
    assert!(is_one_of("JSON", &["pretty", "compact", "json"]).is_ok());
    assert!(is_one_of("xml", &["pretty", "compact", "json"]).is_err());
}
