//! Distance, climb and moving time for a track
//!
//! Climb is counted two ways: raw, straight from the logged elevations, and
//! smoothed, after running the elevations through a Kaiser window to damp
//! GPS elevation noise.

use crate::point::SequenceItem;
use crate::track::{TIMESTAMP_FORMAT, TrackPoints};
use crate::utils::{Units, haversine_distance};
use chrono::{DateTime, NaiveDateTime, Utc};

/// A rise smaller than this (feet or meters) is treated as noise
pub const CLIMB_THRESHOLD: f64 = 8.0;

/// Slower than this, in miles per hour, counts as stopped
pub const SPEED_THRESHOLD_MPH: f64 = 0.5;

const FEET_PER_METER: f64 = 3.2808399;
const KM_PER_MILE: f64 = 1.609344;

#[derive(Debug, Clone, PartialEq)]
pub struct StatsOptions {
    /// Half width of the smoothing window, in points
    pub halfwin: usize,
    /// Kaiser window shape; 0 is a plain moving average
    pub beta: f64,
    pub units: Units,
    /// Index into the track sequence to start from
    pub start: usize,
    /// Stop at the end of the segment containing `start`
    pub single_segment: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            halfwin: 15,
            beta: 2.0,
            units: Units::Imperial,
            start: 0,
            single_segment: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackStats {
    /// Miles or kilometers
    pub total_distance: f64,
    /// Feet or meters
    pub raw_climb: f64,
    pub smoothed_climb: f64,
    /// Seconds
    pub moving_time: f64,
    pub stopped_time: f64,
    /// Miles or kilometers per hour; `None` without any moving time
    pub average_moving_speed: Option<f64>,
    /// Running distance at each point
    pub distances: Vec<f64>,
    /// Elevation at each point, feet or meters
    pub elevations: Vec<f64>,
    pub smoothed_elevations: Vec<f64>,
}

/// Accumulates climbs, ignoring humps below [`CLIMB_THRESHOLD`]
#[derive(Debug, Default)]
struct ClimbCounter {
    total: f64,
    current: f64,
    current_start: f64,
    last: Option<f64>,
}

impl ClimbCounter {
    fn add(&mut self, ele: f64) {
        if let Some(last) = self.last {
            if ele > last {
                if self.current == 0.0 {
                    self.current_start = last;
                }
                self.current += ele - last;
            } else if ele < last {
                if self.current > CLIMB_THRESHOLD {
                    self.total += self.current;
                    self.current = 0.0;
                } else if ele <= self.current_start {
                    self.current = 0.0;
                }
            }
        }
        self.last = Some(ele);
    }

    /// Close the climb in progress, e.g. at the end of a segment
    fn finish(&mut self) {
        if self.current > CLIMB_THRESHOLD {
            self.total += self.current;
        }
        self.current = 0.0;
        self.last = None;
    }

    fn total(mut self) -> f64 {
        self.finish();
        self.total
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc).naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT))
        .ok()
}

/// Gather statistics over the track points of `tracks`
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn statistics(tracks: &TrackPoints, options: &StatsOptions) -> TrackStats {
    let mut stats = TrackStats::default();
    let mut climb = ClimbCounter::default();
    let mut last: Option<(f64, f64, Option<NaiveDateTime>)> = None;
    let mut seen_point = false;

    for item in tracks.points().iter().skip(options.start) {
        let point = match item {
            SequenceItem::SegmentStart(_) => {
                if options.single_segment && seen_point {
                    break;
                }
                last = None;
                climb.finish();
                continue;
            }
            SequenceItem::Attributes(_) => continue,
            SequenceItem::Point(point) => point,
        };
        seen_point = true;

        let ele = match options.units {
            Units::Imperial => point.elevation() * FEET_PER_METER,
            Units::Metric => point.elevation(),
        };
        let time = point.timestamp.as_deref().and_then(parse_timestamp);

        if let Some((lat, lon, last_time)) = last {
            let dist = haversine_distance(lat, lon, point.lat, point.lon, options.units);
            stats.total_distance += dist;

            if let (Some(t0), Some(t1)) = (last_time, time) {
                let seconds = (t1 - t0).num_milliseconds() as f64 / 1000.0;
                if seconds > 0.0 {
                    let miles = match options.units {
                        Units::Imperial => dist,
                        Units::Metric => dist / KM_PER_MILE,
                    };
                    if miles / seconds * 3600.0 > SPEED_THRESHOLD_MPH {
                        stats.moving_time += seconds;
                    } else {
                        stats.stopped_time += seconds;
                    }
                }
            }
        }

        climb.add(ele);
        // A point without a time keeps the previous one for speed purposes
        let time = time.or(last.and_then(|(_, _, t)| t));
        last = Some((point.lat, point.lon, time));
        stats.distances.push(stats.total_distance);
        stats.elevations.push(ele);
    }

    stats.raw_climb = climb.total();
    stats.smoothed_elevations = smooth(&stats.elevations, options.halfwin, options.beta);
    let mut smoothed = ClimbCounter::default();
    for &ele in &stats.smoothed_elevations {
        smoothed.add(ele);
    }
    stats.smoothed_climb = smoothed.total();
    stats.average_moving_speed = (stats.moving_time > 0.0)
        .then(|| stats.total_distance * 3600.0 / stats.moving_time);
    stats
}

/// Modified Bessel function of the first kind, order zero
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..100 {
        term *= half / k as f64;
        let step = term * term;
        sum += step;
        if step < sum * 1e-17 {
            break;
        }
    }
    sum
}

/// Kaiser window of `len` points
pub fn kaiser_window(len: usize, beta: f64) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    let denom = bessel_i0(beta);
    let m = (len - 1) as f64;
    (0..len)
        .map(|n| {
            let r = 2.0 * n as f64 / m - 1.0;
            bessel_i0(beta * (1.0 - r * r).max(0.0).sqrt()) / denom
        })
        .collect()
}

/// Smooth `values` with a normalised Kaiser window of `2 * halfwin + 1`
/// points, mirroring the series at both ends
pub fn smooth(values: &[f64], halfwin: usize, beta: f64) -> Vec<f64> {
    let n = values.len();
    if n == 0 || halfwin == 0 {
        return values.to_vec();
    }
    let window = kaiser_window(2 * halfwin + 1, beta);
    let total: f64 = window.iter().sum();
    let last = n as i64 - 1;
    let mirrored = |t: i64| -> f64 {
        let index = if t < 0 {
            -t
        } else if t > last {
            2 * last + 1 - t
        } else {
            t
        };
        values[index.clamp(0, last) as usize]
    };

    (0..n as i64)
        .map(|i| {
            window
                .iter()
                .enumerate()
                .map(|(k, w)| w * mirrored(i + k as i64 - halfwin as i64))
                .sum::<f64>()
                / total
        })
        .collect()
}
