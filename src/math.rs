//! Mathematical structs and functions.

use cgmath::{Point2, Vector2};
use std::f64::consts::TAU;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// The smallest speed used as a divisor when deriving time-based quantities, in m/s.
pub const MIN_SPEED_DENOM: f64 = 0.1;

/// Wraps an angle into the interval [0, 2π).
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly 2π for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Rotates a vector anticlockwise through the given angle.
pub fn rotate(vec: Vector2d, angle: f64) -> Vector2d {
    let (sin, cos) = angle.sin_cos();
    Vector2d::new(cos * vec.x - sin * vec.y, sin * vec.x + cos * vec.y)
}

/// Expresses `point` in the local frame at `origin` whose x-axis points along `heading`.
pub fn into_frame(point: Point2d, origin: Point2d, heading: f64) -> Point2d {
    let local = rotate(point - origin, -heading);
    Point2d::new(local.x, local.y)
}

/// Computes the time for a gap to close at the given closing speed.
/// The divisor is clamped away from zero so that a stopped or crawling
/// vehicle yields a large but finite time.
pub fn time_to_arrival(gap: f64, closing_speed: f64) -> f64 {
    gap / f64::max(closing_speed, MIN_SPEED_DENOM)
}

/// The logistic sigmoid.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Density of a zero-mean 1D Gaussian with standard deviation `sigma`.
pub fn gaussian(x: f64, sigma: f64) -> f64 {
    let z = x / sigma;
    (-0.5 * z * z).exp() / (sigma * TAU.sqrt())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::PI;

    #[test]
    fn wrap_angle_stays_in_range() {
        for angle in [-10.0, -PI, -1e-18, 0.0, 1.0, TAU, 17.5] {
            let wrapped = wrap_angle(angle);
            assert!((0.0..TAU).contains(&wrapped), "{} -> {}", angle, wrapped);
        }
        assert_approx_eq!(wrap_angle(-PI / 2.0), 1.5 * PI);
        assert_approx_eq!(wrap_angle(TAU + 1.0), 1.0);
    }

    #[test]
    fn rotate_quarter_turn() {
        let v = rotate(Vector2d::new(1.0, 0.0), PI / 2.0);
        assert_approx_eq!(v.x, 0.0);
        assert_approx_eq!(v.y, 1.0);
    }

    #[test]
    fn time_to_arrival_clamps_denominator() {
        assert_approx_eq!(time_to_arrival(10.0, 2.0), 5.0);
        // stopped oncoming traffic yields a large but finite time
        assert_approx_eq!(time_to_arrival(10.0, 0.0), 100.0);
        assert_approx_eq!(time_to_arrival(10.0, -3.0), 100.0);
    }

    #[test]
    fn gaussian_peaks_at_zero() {
        assert!(gaussian(0.0, 2.0) > gaussian(0.5, 2.0));
        assert!(gaussian(0.5, 2.0) > gaussian(1.5, 2.0));
        assert_approx_eq!(gaussian(0.0, 1.0), 1.0 / TAU.sqrt());
    }
}
