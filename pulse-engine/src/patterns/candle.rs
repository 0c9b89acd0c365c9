use super::{FnDetector, Pattern, PatternWindow};
use derive_more::Constructor;

/// Wick length added on each side of the body, as a fraction of the body.
const WICK_FRACTION: f64 = 0.1;

/// Open/high/low/close approximation of one bar
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
pub struct SyntheticBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl SyntheticBar {
    /// Bar between two consecutive prices, wicks at ±10% of the body.
    pub fn from_prices(open: f64, close: f64) -> Self {
        let body = (open - close).abs();
        Self {
            open,
            high: open.max(close) + body * WICK_FRACTION,
            low: open.min(close) - body * WICK_FRACTION,
            close,
        }
    }

    pub fn body(&self) -> f64 {
        (self.open - self.close).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Body over range, 0 for a flat bar.
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range > 0.0 { self.body() / range } else { 0.0 }
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    fn lower_wick(&self) -> f64 {
        self.close - self.low
    }

    fn upper_wick(&self) -> f64 {
        self.high - self.close
    }
}

/// Previous and current synthetic bars from the last three prices.
pub fn last_two_bars(window: &PatternWindow<'_>) -> Option<(SyntheticBar, SyntheticBar)> {
    let first = window.price_back(2)?;
    let middle = window.price_back(1)?;
    let last = window.price_back(0)?;
    Some((
        SyntheticBar::from_prices(first, middle),
        SyntheticBar::from_prices(middle, last),
    ))
}

pub fn marubozu(bar: &SyntheticBar) -> bool {
    bar.body() > 0.0 && bar.body_ratio() > 0.9
}

/// Current bar opens at or below the previous close and closes above the previous open.
pub fn bullish_engulfing(prev: &SyntheticBar, cur: &SyntheticBar) -> bool {
    cur.is_bullish() && prev.is_bearish() && cur.open <= prev.close && cur.close > prev.open
}

pub fn bearish_engulfing(prev: &SyntheticBar, cur: &SyntheticBar) -> bool {
    cur.is_bearish() && prev.is_bullish() && cur.open >= prev.close && cur.close < prev.open
}

pub fn hammer(bar: &SyntheticBar) -> bool {
    let body = bar.body();
    body > 0.0
        && bar.body_ratio() < 0.3
        && bar.lower_wick() > body * 2.0
        && bar.upper_wick() < body * 0.5
}

pub fn inverted_hammer(bar: &SyntheticBar) -> bool {
    let body = bar.body();
    body > 0.0
        && bar.body_ratio() < 0.3
        && bar.upper_wick() > body * 2.0
        && bar.lower_wick() < body * 0.5
}

pub(super) fn detectors() -> Vec<FnDetector> {
    vec![
        FnDetector::new(Pattern::Marubozu, |w| {
            last_two_bars(w).is_some_and(|(_, cur)| marubozu(&cur))
        }),
        FnDetector::new(Pattern::BullishEngulfing, |w| {
            last_two_bars(w).is_some_and(|(prev, cur)| bullish_engulfing(&prev, &cur))
        }),
        FnDetector::new(Pattern::BearishEngulfing, |w| {
            last_two_bars(w).is_some_and(|(prev, cur)| bearish_engulfing(&prev, &cur))
        }),
        FnDetector::new(Pattern::Hammer, |w| {
            last_two_bars(w).is_some_and(|(_, cur)| hammer(&cur))
        }),
        FnDetector::new(Pattern::InvertedHammer, |w| {
            last_two_bars(w).is_some_and(|(_, cur)| inverted_hammer(&cur))
        }),
    ]
}
