use super::{FnDetector, Pattern, PatternWindow};
use crate::indicators::tail;
use itertools::Itertools;

/// Samples examined by every chart pattern.
pub const CHART_WINDOW: usize = 15;

/// History required before chart patterns are evaluated.
pub const MIN_CHART_HISTORY: usize = 20;

fn high(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn low(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// The last 15 prices and volumes, or `None` below the required history.
fn recent<'a>(window: &PatternWindow<'a>) -> Option<(&'a [f64], &'a [f64])> {
    if window.prices.len() < MIN_CHART_HISTORY || window.volumes.len() < CHART_WINDOW {
        return None;
    }
    Some((
        tail(window.prices, CHART_WINDOW),
        tail(window.volumes, CHART_WINDOW),
    ))
}

/// Strong pole over the first half, tight flag at the end, volume drying up.
pub fn bull_flag(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let pole = p[7] - p[0];
    let flag = p[14] - p[10];
    pole > 0.0 && flag.abs() < pole * 0.22 && v[0] > v[7] * 2.2
}

pub fn cup_and_handle(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let cup_depth = high(&p[..7]) - low(&p[..7]);
    let handle_depth = p[14] - low(&p[10..14]);
    cup_depth > 0.0 && handle_depth < cup_depth * 0.25 && v[14] > v[10] * 1.9
}

/// Lower highs with higher lows, volume expanding into the apex.
pub fn falling_wedge(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let (high1, high2) = (high(&p[..3]), high(&p[5..8]));
    let (low1, low2, low3) = (low(&p[..3]), low(&p[5..8]), low(&p[10..13]));
    high2 < high1 && low2 > low1 && low3 > low2 && v[13] > v[0] * 1.7
}

/// Flat resistance from the first five samples with strictly rising lows beneath it.
///
/// Lows are the minimum of each adjacent pair after the resistance block.
pub fn ascending_triangle(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let resistance = high(&p[..5]);
    let below_resistance = p[5..].iter().all(|price| *price < resistance);

    let rising = p[5..]
        .iter()
        .tuple_windows()
        .map(|(a, b)| a.min(*b))
        .tuple_windows()
        .all(|(a, b)| b > a);

    below_resistance && rising && v[14] > v[5] * 2.0
}

pub fn double_bottom(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let first_low = low(&p[..5]);
    let second_low = low(&p[6..10]);
    let (Some(i1), Some(i2)) = (
        p.iter().position(|x| *x == first_low),
        p.iter().position(|x| *x == second_low),
    ) else {
        return false;
    };

    i1 < 5
        && i2 > 5
        && i2 < 10
        && (p[i1] - p[i2]).abs() < p[i1] * 0.03
        && p[14] > high(&p[i1..i2])
        && v[i2] > v[i1] * 1.2
}

pub fn inverse_head_shoulders(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let left = low(&p[..3]);
    let head = low(&p[4..7]);
    let right = low(&p[8..11]);
    let neckline = (p[3] + p[7]) / 2.0;

    head < left
        && head < right
        && (left - right).abs() < left * 0.03
        && p[14] > neckline
        && v[10] > v[4] * 1.3
}

pub fn pennant(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let pole = (p[4] - p[0]).abs();
    let (top, bottom) = (high(&p[5..10]), low(&p[5..10]));
    pole > 0.0 && pole > (top - bottom) * 3.0 && v[4] > v[0] * 2.5 && p[14] > top
}

pub fn rounding_bottom(window: &PatternWindow<'_>) -> bool {
    let Some((p, v)) = recent(window) else {
        return false;
    };
    let first_min = low(&p[..7]);
    let second_min = low(&p[7..]);
    let mid = p[7];

    first_min < mid
        && second_min < mid
        && (first_min - second_min).abs() < first_min * 0.05
        && p[14] > mid
        && v[14] > v[0] * 1.8
}

pub(super) fn detectors() -> Vec<FnDetector> {
    vec![
        FnDetector::new(Pattern::BullFlag, bull_flag),
        FnDetector::new(Pattern::CupAndHandle, cup_and_handle),
        FnDetector::new(Pattern::FallingWedge, falling_wedge),
        FnDetector::new(Pattern::AscendingTriangle, ascending_triangle),
        FnDetector::new(Pattern::DoubleBottom, double_bottom),
        FnDetector::new(Pattern::InverseHeadShoulders, inverse_head_shoulders),
        FnDetector::new(Pattern::Pennant, pennant),
        FnDetector::new(Pattern::RoundingBottom, rounding_bottom),
    ]
}
