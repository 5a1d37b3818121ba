//! Speed curve evaluation
//!
//! A curve is a list of `(temp, speed)` points sorted by temperature. Between
//! two points the duty is interpolated linearly and truncated to a whole
//! percent; outside the curve it is held at the nearest end point.
//!
//! The upper bound is the first point at least as hot as the reading, so a
//! temperature equal to a point's temperature takes that point's speed, and
//! on a step (two points sharing a temperature) the first of the pair wins.

use crate::constants::duty;
use crate::data::CurvePoint;

/// Fan duty (0-100) for `temperature` on `curve`
///
/// An empty curve yields the fallback duty. A NaN temperature is treated as
/// off the hot end of the curve.
pub fn evaluate(curve: &[CurvePoint], temperature: f64) -> u8 {
    let (first, last) = match (curve.first(), curve.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return duty::EMPTY_CURVE_FALLBACK,
    };

    if temperature.is_nan() {
        return last.speed.min(duty::MAX_PERCENT);
    }

    // First point at least as hot as the reading; its predecessor is the lower bound
    let (lower, upper) = match curve.iter().position(|p| p.temp >= temperature) {
        None => return last.speed.min(duty::MAX_PERCENT),
        Some(0) => return first.speed.min(duty::MAX_PERCENT),
        Some(index) => (&curve[index - 1], &curve[index]),
    };
    if upper.temp == temperature {
        return upper.speed.min(duty::MAX_PERCENT);
    }

    let lower_speed = f64::from(lower.speed);
    let slope = (f64::from(upper.speed) - lower_speed) / (upper.temp - lower.temp);
    let speed = (lower_speed + (temperature - lower.temp) * slope).trunc();

    speed.clamp(0.0, f64::from(duty::MAX_PERCENT)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(points: &[(f64, u8)]) -> Vec<CurvePoint> {
        points.iter().map(|&(t, s)| CurvePoint::new(t, s)).collect()
    }

    #[test]
    fn test_interpolation_between_points() {
        let c = curve(&[(40.0, 10), (60.0, 30), (80.0, 80)]);
        assert_eq!(evaluate(&c, 50.0), 20);
        assert_eq!(evaluate(&c, 70.0), 55);
    }

    #[test]
    fn test_exact_points_take_their_own_speed() {
        let c = curve(&[(40.0, 10), (60.0, 30), (80.0, 80)]);
        for p in &c {
            assert_eq!(evaluate(&c, p.temp), p.speed);
        }
    }

    #[test]
    fn test_outside_the_curve_is_clamped() {
        let c = curve(&[(40.0, 10), (60.0, 30), (80.0, 80)]);
        assert_eq!(evaluate(&c, 20.0), 10);
        assert_eq!(evaluate(&c, 90.0), 80);
        assert_eq!(evaluate(&c, f64::INFINITY), 80);
        assert_eq!(evaluate(&c, f64::NEG_INFINITY), 10);
        assert_eq!(evaluate(&c, f64::NAN), 80);
    }

    #[test]
    fn test_result_is_truncated() {
        let c = curve(&[(40.0, 10), (80.0, 90)]);
        assert_eq!(evaluate(&c, 60.0), 50);
        // 10 + 0.5 * 2 = 11.0, 10 + 0.9 * 2 = 11.8
        assert_eq!(evaluate(&c, 40.5), 11);
        assert_eq!(evaluate(&c, 40.9), 11);
    }

    #[test]
    fn test_step_takes_first_point_of_pair() {
        let c = curve(&[(40.0, 10), (60.0, 30), (60.0, 80), (80.0, 90)]);
        assert_eq!(evaluate(&c, 59.0), 29);
        assert_eq!(evaluate(&c, 60.0), 30);
        assert_eq!(evaluate(&c, 61.0), 80);

        let c = curve(&[(50.0, 10), (50.0, 40), (60.0, 60)]);
        assert_eq!(evaluate(&c, 50.0), 10);
        assert_eq!(evaluate(&c, 55.0), 50);
    }

    #[test]
    fn test_single_point_is_constant() {
        let c = curve(&[(55.0, 35)]);
        for t in [-10.0, 0.0, 54.9, 55.0, 55.1, 120.0] {
            assert_eq!(evaluate(&c, t), 35);
        }
    }

    #[test]
    fn test_empty_curve_falls_back() {
        assert_eq!(evaluate(&[], 30.0), duty::EMPTY_CURVE_FALLBACK);
    }

    #[test]
    fn test_monotonic_for_increasing_curves() {
        let c = curve(&[(0.0, 15), (40.0, 15), (60.0, 30), (70.0, 40), (75.0, 80), (85.0, 100)]);
        let mut previous = 0;
        let mut t = -5.0;
        while t <= 95.0 {
            let speed = evaluate(&c, t);
            assert!(speed >= previous, "speed dropped at {}°C", t);
            previous = speed;
            t += 0.25;
        }
    }
}
