//! Chart, candlestick and micro-structure pattern recognition.
//!
//! Every pattern is a [`PatternDetector`] evaluated against the same
//! [`PatternWindow`] snapshot. The [`PatternRegistry`] runs all registered
//! detectors each tick and collects the results into [`PatternFlags`]; new
//! detectors plug in without touching scoring.

use crate::{config::DetectorConfig, types::TransactionRecord};
use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Multi-bar chart patterns over the last 15 samples.
pub mod chart;

/// Synthetic two-bar candlestick patterns.
pub mod candle;

/// Short-window scalping patterns.
pub mod micro;

/// Read-only view of the buffers a detector inspects
#[derive(Debug, Clone, Copy, Constructor)]
pub struct PatternWindow<'a> {
    pub prices: &'a [f64],
    pub volumes: &'a [f64],
    pub transactions: &'a [TransactionRecord],
    pub config: &'a DetectorConfig,
}

impl PatternWindow<'_> {
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Price `back` steps before the latest (0 = latest).
    pub fn price_back(&self, back: usize) -> Option<f64> {
        self.prices.len().checked_sub(back + 1).map(|i| self.prices[i])
    }

    /// Volume `back` steps before the latest (0 = latest).
    pub fn volume_back(&self, back: usize) -> Option<f64> {
        self.volumes.len().checked_sub(back + 1).map(|i| self.volumes[i])
    }
}

/// Group a pattern belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternFamily {
    Chart,
    Candle,
    Micro,
}

/// Every pattern the recognizer knows about
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    #[display("BULL FLAG")]
    BullFlag,
    #[display("CUP & HANDLE")]
    CupAndHandle,
    #[display("FALLING WEDGE")]
    FallingWedge,
    #[display("ASC TRIANGLE")]
    AscendingTriangle,
    #[display("DOUBLE BOTTOM")]
    DoubleBottom,
    #[display("INV H&S")]
    InverseHeadShoulders,
    #[display("PENNANT")]
    Pennant,
    #[display("ROUNDING BOTTOM")]
    RoundingBottom,

    #[display("MARUBOZU")]
    Marubozu,
    #[display("BULLISH ENGULFING")]
    BullishEngulfing,
    #[display("BEARISH ENGULFING")]
    BearishEngulfing,
    #[display("HAMMER")]
    Hammer,
    #[display("INVERTED HAMMER")]
    InvertedHammer,

    #[display("MICRO RANGE")]
    MicroRange,
    #[display("VDU SPIKE")]
    VduSpike,
    #[display("FLASH ABSORPTION")]
    FlashAbsorption,
    #[display("TRAP & RUN")]
    TrapRun,
    #[display("SHAKEOUT BAR")]
    ShakeoutBar,
    #[display("SUPPLY ABSORPTION")]
    SupplyAbsorption,
    #[display("VOLUME STAIRCASE")]
    VolumeStaircase,
    #[display("DARVAS BOX")]
    DarvasBox,
    #[display("BOX BREAKOUT RETEST")]
    BoxBreakoutRetest,
    #[display("HIDDEN BULLISH DIVERGENCE")]
    HiddenBullishDivergence,
    #[display("OBV UPTREND")]
    ObvUptrend,
    #[display("BUY WALL STACK")]
    BuyWallStack,
    #[display("VWAP RETEST")]
    VwapRetestSuccess,
}

impl Pattern {
    pub const COUNT: usize = 26;

    pub const ALL: [Pattern; Self::COUNT] = [
        Pattern::BullFlag,
        Pattern::CupAndHandle,
        Pattern::FallingWedge,
        Pattern::AscendingTriangle,
        Pattern::DoubleBottom,
        Pattern::InverseHeadShoulders,
        Pattern::Pennant,
        Pattern::RoundingBottom,
        Pattern::Marubozu,
        Pattern::BullishEngulfing,
        Pattern::BearishEngulfing,
        Pattern::Hammer,
        Pattern::InvertedHammer,
        Pattern::MicroRange,
        Pattern::VduSpike,
        Pattern::FlashAbsorption,
        Pattern::TrapRun,
        Pattern::ShakeoutBar,
        Pattern::SupplyAbsorption,
        Pattern::VolumeStaircase,
        Pattern::DarvasBox,
        Pattern::BoxBreakoutRetest,
        Pattern::HiddenBullishDivergence,
        Pattern::ObvUptrend,
        Pattern::BuyWallStack,
        Pattern::VwapRetestSuccess,
    ];

    /// Patterns that count as a "pattern match", in display priority order.
    pub const HEADLINE: [Pattern; 11] = [
        Pattern::BullFlag,
        Pattern::CupAndHandle,
        Pattern::FallingWedge,
        Pattern::AscendingTriangle,
        Pattern::DoubleBottom,
        Pattern::InverseHeadShoulders,
        Pattern::Pennant,
        Pattern::RoundingBottom,
        Pattern::MicroRange,
        Pattern::VduSpike,
        Pattern::TrapRun,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn family(self) -> PatternFamily {
        match self {
            Pattern::BullFlag
            | Pattern::CupAndHandle
            | Pattern::FallingWedge
            | Pattern::AscendingTriangle
            | Pattern::DoubleBottom
            | Pattern::InverseHeadShoulders
            | Pattern::Pennant
            | Pattern::RoundingBottom => PatternFamily::Chart,
            Pattern::Marubozu
            | Pattern::BullishEngulfing
            | Pattern::BearishEngulfing
            | Pattern::Hammer
            | Pattern::InvertedHammer => PatternFamily::Candle,
            _ => PatternFamily::Micro,
        }
    }
}

/// Boolean result per [`Pattern`] for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "BTreeMap<Pattern, bool>", into = "BTreeMap<Pattern, bool>")]
pub struct PatternFlags([bool; Pattern::COUNT]);

impl PatternFlags {
    pub fn is_set(&self, pattern: Pattern) -> bool {
        self.0[pattern.index()]
    }

    pub fn set(&mut self, pattern: Pattern, value: bool) {
        self.0[pattern.index()] = value;
    }

    /// Active patterns in declaration order.
    pub fn active(&self) -> impl Iterator<Item = Pattern> + '_ {
        Pattern::ALL.into_iter().filter(|p| self.is_set(*p))
    }

    /// Any of the eight chart patterns.
    pub fn any_chart(&self) -> bool {
        self.active().any(|p| p.family() == PatternFamily::Chart)
    }

    /// First active headline pattern, used for status display and `pattern_match`.
    pub fn headline(&self) -> Option<Pattern> {
        Pattern::HEADLINE.into_iter().find(|p| self.is_set(*p))
    }

    /// Bull flag, ascending triangle or bullish engulfing.
    pub fn bullish_setup(&self) -> bool {
        self.is_set(Pattern::BullFlag)
            || self.is_set(Pattern::AscendingTriangle)
            || self.is_set(Pattern::BullishEngulfing)
    }
}

impl From<BTreeMap<Pattern, bool>> for PatternFlags {
    fn from(map: BTreeMap<Pattern, bool>) -> Self {
        let mut flags = Self::default();
        for (pattern, value) in map {
            flags.set(pattern, value);
        }
        flags
    }
}

impl From<PatternFlags> for BTreeMap<Pattern, bool> {
    fn from(flags: PatternFlags) -> Self {
        Pattern::ALL.into_iter().map(|p| (p, flags.is_set(p))).collect()
    }
}

/// A single boolean pattern predicate.
pub trait PatternDetector: Send + Sync {
    fn pattern(&self) -> Pattern;

    /// `false` whenever the window is too short for the pattern.
    fn detect(&self, window: &PatternWindow<'_>) -> bool;
}

/// [`PatternDetector`] backed by a plain function.
#[derive(Debug, Clone, Copy, Constructor)]
pub struct FnDetector {
    pattern: Pattern,
    predicate: fn(&PatternWindow<'_>) -> bool,
}

impl PatternDetector for FnDetector {
    fn pattern(&self) -> Pattern {
        self.pattern
    }

    fn detect(&self, window: &PatternWindow<'_>) -> bool {
        (self.predicate)(window)
    }
}

/// Ordered collection of detectors run once per tick
pub struct PatternRegistry {
    detectors: Vec<Box<dyn PatternDetector>>,
}

impl std::fmt::Debug for PatternRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.detectors.iter().map(|d| d.pattern()))
            .finish()
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl PatternRegistry {
    pub fn empty() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Registry with every built-in detector.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        chart::detectors()
            .into_iter()
            .chain(candle::detectors())
            .chain(micro::detectors())
            .for_each(|detector| registry.register(Box::new(detector)));
        registry
    }

    pub fn register(&mut self, detector: Box<dyn PatternDetector>) {
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector against the window.
    pub fn evaluate(&self, window: &PatternWindow<'_>) -> PatternFlags {
        let mut flags = PatternFlags::default();
        for detector in &self.detectors {
            if detector.detect(window) {
                flags.set(detector.pattern(), true);
            }
        }
        flags
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    pub fn window<'a>(
        prices: &'a [f64],
        volumes: &'a [f64],
        config: &'a DetectorConfig,
    ) -> PatternWindow<'a> {
        PatternWindow::new(prices, volumes, &[], config)
    }
}
