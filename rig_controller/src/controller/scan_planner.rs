use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for the index-range divisibility check and for detecting a
/// leftover partial step.
pub const DIVISIBILITY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDirection {
    /// The scanhead sweeps alternately in both directions; the pusher steps
    /// once per sweep.
    Bidirectional,
    /// The scanhead returns to the sweep start before every pusher step.
    Unidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    pub scan_start: f64,
    pub scan_stop: f64,
    pub index_start: f64,
    pub index_stop: f64,
    pub index_size: f64,
    pub scan_speed: f64,
    pub index_speed: f64,
    pub direction: ScanDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanParameterError {
    #[error("scan stop equals scan start")]
    EmptyScanRange,

    #[error("index stop equals index start")]
    EmptyIndexRange,

    #[error("index size is zero")]
    ZeroIndexSize,

    #[error("scan speed must be positive")]
    NonPositiveScanSpeed,

    #[error("index speed must be positive")]
    NonPositiveIndexSpeed,

    #[error("index range is not a whole number of index steps")]
    UnevenIndexRange,
}

impl ScanParameters {
    /// Checked before any device command is issued; each violated constraint
    /// has its own diagnostic.
    pub fn validate(&self) -> Result<(), ScanParameterError> {
        if self.scan_stop == self.scan_start {
            return Err(ScanParameterError::EmptyScanRange);
        }
        if self.index_stop == self.index_start {
            return Err(ScanParameterError::EmptyIndexRange);
        }
        if self.index_size == 0.0 {
            return Err(ScanParameterError::ZeroIndexSize);
        }
        if !(self.scan_speed > 0.0) {
            return Err(ScanParameterError::NonPositiveScanSpeed);
        }
        if !(self.index_speed > 0.0) {
            return Err(ScanParameterError::NonPositiveIndexSpeed);
        }

        let remainder = (self.index_stop - self.index_start).abs() % self.index_size.abs();
        if remainder > DIVISIBILITY_EPSILON
            && self.index_size.abs() - remainder > DIVISIBILITY_EPSILON
        {
            return Err(ScanParameterError::UnevenIndexRange);
        }

        Ok(())
    }
}

/// One commanded (scan, index) target pair. `travel` is the single-axis
/// distance from the previous waypoint; `time_remaining` is the seeded
/// estimate of scan time left once this waypoint is reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Waypoint {
    pub scan: f64,
    pub index: f64,
    pub travel: f64,
    pub time_remaining: f64,
}

/// Expand scan parameters into the ordered waypoint sequence. Pure:
/// identical parameters always produce the identical sequence.
///
/// The index axis always terminates exactly on `index_stop`; when the range
/// is not a whole number of steps the final step is shortened rather than
/// overshooting the boundary.
pub fn plan(params: &ScanParameters) -> Vec<Waypoint> {
    let range = params.index_stop - params.index_start;
    let step = params.index_size.abs() * range.signum();

    let ratio = (range / step).abs();
    let rounds = if (ratio - ratio.round()).abs() <= DIVISIBILITY_EPSILON {
        ratio.round() as usize
    } else {
        ratio.ceil() as usize
    };

    let count = match params.direction {
        ScanDirection::Bidirectional => rounds * 2 + 2,
        ScanDirection::Unidirectional => rounds * 3 + 3,
    };

    let mut scan = params.scan_start;
    let mut index = params.index_start;
    let mut points: Vec<Waypoint> = Vec::with_capacity(count);

    for i in 0..count {
        match params.direction {
            ScanDirection::Bidirectional => {
                if i % 2 == 1 {
                    scan = if scan == params.scan_stop {
                        params.scan_start
                    } else {
                        params.scan_stop
                    };
                } else if i > 0 {
                    index = advance(index, step, params.index_stop);
                }
            }
            ScanDirection::Unidirectional => match i % 3 {
                0 => {
                    if i > 0 {
                        index = advance(index, step, params.index_stop);
                    }
                }
                1 => scan = params.scan_stop,
                _ => scan = params.scan_start,
            },
        }

        let travel = points
            .last()
            .map_or(0.0, |prev| travel_between(prev, scan, index));

        points.push(Waypoint {
            scan,
            index,
            travel,
            time_remaining: 0.0,
        });
    }

    seed_time_remaining(&mut points, params.scan_speed);
    points
}

/// One index step toward the stop value, landing exactly on it instead of
/// overshooting when the remaining range is shorter than a full step.
fn advance(index: f64, step: f64, stop: f64) -> f64 {
    let next = index + step;
    let clamped = if step > 0.0 { next.min(stop) } else { next.max(stop) };

    if (clamped - stop).abs() <= DIVISIBILITY_EPSILON {
        stop
    } else {
        clamped
    }
}

/// Index legs are linear; scan legs are arcs swept at the current radius.
fn travel_between(prev: &Waypoint, scan: f64, index: f64) -> f64 {
    if index != prev.index {
        (index - prev.index).abs()
    } else {
        2.0 * std::f64::consts::PI * index.abs() * (scan - prev.scan).abs() / 360.0
    }
}

/// Seed the per-waypoint estimate from distance over speed plus an
/// empirically fitted per-vertex overhead. The sequencer replaces these with
/// observed move times once the scan is running.
fn seed_time_remaining(points: &mut [Waypoint], scan_speed: f64) {
    let legs = points.len().saturating_sub(1).max(1) as f64;
    let overhead = 0.5456 * legs + 3.4393;
    let per_vertex = overhead / legs;
    let total = points.iter().map(|p| p.travel).sum::<f64>() / scan_speed + overhead;

    let mut remaining = total;
    for point in points.iter_mut() {
        remaining -= point.travel / scan_speed + per_vertex;
        point.time_remaining = remaining.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster_params() -> ScanParameters {
        ScanParameters {
            scan_start: 0.0,
            scan_stop: 20.0,
            index_start: 0.0,
            index_stop: -2.0,
            index_size: 1.0,
            scan_speed: 6.0,
            index_speed: 0.25,
            direction: ScanDirection::Bidirectional,
        }
    }

    fn coords(points: &[Waypoint]) -> Vec<(f64, f64)> {
        points.iter().map(|p| (p.scan, p.index)).collect()
    }

    #[test]
    fn bidirectional_raster_scenario() {
        let params = raster_params();
        assert_eq!(params.validate(), Ok(()));

        let points = plan(&params);
        assert_eq!(
            coords(&points),
            [
                (0.0, 0.0),
                (20.0, 0.0),
                (20.0, -1.0),
                (0.0, -1.0),
                (0.0, -2.0),
                (20.0, -2.0),
            ]
        );
        assert_eq!(points.last().unwrap().index, -2.0);
    }

    #[test]
    fn unidirectional_returns_before_each_index_step() {
        let params = ScanParameters {
            direction: ScanDirection::Unidirectional,
            ..raster_params()
        };

        let points = plan(&params);
        assert_eq!(
            coords(&points),
            [
                (0.0, 0.0),
                (20.0, 0.0),
                (0.0, 0.0),
                (0.0, -1.0),
                (20.0, -1.0),
                (0.0, -1.0),
                (0.0, -2.0),
                (20.0, -2.0),
                (0.0, -2.0),
            ]
        );
    }

    #[test]
    fn uneven_range_clamps_final_step_to_stop() {
        let params = ScanParameters {
            index_stop: -2.5,
            ..raster_params()
        };

        let points = plan(&params);
        assert_eq!(points.len(), 8);
        assert_eq!(points.last().unwrap().index, -2.5);
        assert!(points.iter().all(|p| p.index >= -2.5));

        let uni = plan(&ScanParameters {
            direction: ScanDirection::Unidirectional,
            ..params
        });
        assert_eq!(uni.len(), 12);
        assert_eq!(uni.last().unwrap().index, -2.5);
    }

    #[test]
    fn index_can_step_upward() {
        let params = ScanParameters {
            index_start: 1.0,
            index_stop: 3.0,
            ..raster_params()
        };

        let points = plan(&params);
        assert_eq!(points.first().unwrap().index, 1.0);
        assert_eq!(points.last().unwrap().index, 3.0);
    }

    #[test]
    fn moves_are_axis_sequential_never_diagonal() {
        for direction in [ScanDirection::Bidirectional, ScanDirection::Unidirectional] {
            let points = plan(&ScanParameters {
                direction,
                index_stop: -3.5,
                ..raster_params()
            });

            for pair in points.windows(2) {
                let scan_moved = pair[0].scan != pair[1].scan;
                let index_moved = pair[0].index != pair[1].index;
                assert!(scan_moved ^ index_moved, "diagonal or empty leg: {pair:?}");
            }
        }
    }

    #[test]
    fn planning_is_pure() {
        let params = raster_params();
        assert_eq!(plan(&params), plan(&params));
    }

    #[test]
    fn travel_distances_follow_arc_and_linear_formulas() {
        let points = plan(&raster_params());

        // Pusher step from 0 to -1 is a plain linear distance.
        assert!((points[2].travel - 1.0).abs() < 1e-12);

        // Scanhead sweep at radius 1: theta/360 * 2*pi*r.
        let expected = 2.0 * std::f64::consts::PI * 1.0 * 20.0 / 360.0;
        assert!((points[3].travel - expected).abs() < 1e-12);
    }

    #[test]
    fn seeded_estimates_decrease_monotonically() {
        let points = plan(&raster_params());

        assert!(points[0].time_remaining > 0.0);
        for pair in points.windows(2) {
            assert!(pair[0].time_remaining >= pair[1].time_remaining);
        }
    }

    #[test]
    fn validation_reports_the_violated_constraint() {
        let ok = raster_params();

        let mut p = ok;
        p.scan_stop = p.scan_start;
        assert_eq!(p.validate(), Err(ScanParameterError::EmptyScanRange));

        let mut p = ok;
        p.index_stop = p.index_start;
        assert_eq!(p.validate(), Err(ScanParameterError::EmptyIndexRange));

        let mut p = ok;
        p.index_size = 0.0;
        assert_eq!(p.validate(), Err(ScanParameterError::ZeroIndexSize));

        let mut p = ok;
        p.scan_speed = 0.0;
        assert_eq!(p.validate(), Err(ScanParameterError::NonPositiveScanSpeed));

        let mut p = ok;
        p.index_speed = -1.0;
        assert_eq!(p.validate(), Err(ScanParameterError::NonPositiveIndexSpeed));

        let mut p = ok;
        p.index_stop = -2.5;
        assert_eq!(p.validate(), Err(ScanParameterError::UnevenIndexRange));
    }

    #[test]
    fn divisibility_check_tolerates_float_noise() {
        let mut p = raster_params();
        p.index_stop = -2.0000004;
        assert_eq!(p.validate(), Ok(()));

        let points = plan(&p);
        assert_eq!(points.len(), 6);
        assert_eq!(points.last().unwrap().index, -2.0000004);
    }
}
