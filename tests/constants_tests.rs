// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use fimc::constants::{
    FIMC_MAX_OUT_BUFS, FIMC_MAX_PLANES, FimcClock, PRESCALER_MAX_RATIO, PRESCALER_MAX_SHIFT,
    SCALER_MAX_HRATIO, SCALER_MAX_VRATIO,
};
use fimc::media::formats::format_by_index;

#[test]
fn test_clock_names() {
    // Clock names match the platform registrations
    let names: Vec<&str> = FimcClock::ALL.iter().map(|c| c.clock_name()).collect();
    assert_eq!(names, vec!["fimc", "camif", "camera"]);
}

#[test]
fn test_camera_clock_only_with_sensor() {
    assert!(!FimcClock::required(false).contains(&FimcClock::Camera));
    assert!(FimcClock::required(true).contains(&FimcClock::Camera));
    // Bus clock always comes first
    assert_eq!(FimcClock::required(false)[0], FimcClock::Bus);
}

#[test]
fn test_scaler_limits() {
    assert_eq!(SCALER_MAX_HRATIO, 64);
    assert_eq!(SCALER_MAX_VRATIO, 64);
    assert_eq!(1 << PRESCALER_MAX_SHIFT, 32);
    assert!(PRESCALER_MAX_RATIO >= 1 << PRESCALER_MAX_SHIFT);
}

#[test]
fn test_format_planes_within_limit() {
    // No format describes more planes than a buffer can carry
    for fmt in (0..).map_while(format_by_index) {
        assert!(fmt.memplanes >= 1 && fmt.memplanes <= FIMC_MAX_PLANES, "{}", fmt.name);
        assert!(fmt.colplanes >= fmt.memplanes, "{}", fmt.name);
    }
    assert_eq!(FIMC_MAX_OUT_BUFS, 4);
}
