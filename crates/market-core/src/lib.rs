#![deny(warnings)]

//! Core domain models and invariants for the bubble market game.
//!
//! This crate defines the serializable catalog types (sectors, stocks, events,
//! action cards), the mutable market indexes, a generic shuffled deck and the
//! injectable random source, together with validation helpers that reject
//! malformed configuration before a game can start.

pub mod deck;
pub mod random;

pub use deck::ShuffledDeck;
pub use random::{RandomSource, ScriptedRandom, SeededRandom};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Lowest price any index (and therefore any stock) can reach.
pub const PRICE_FLOOR: i64 = 1;

/// The four market sectors. Every stock belongs to exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorId {
    Tech,
    Finance,
    #[serde(alias = "manufacturing")]
    Industrial,
    #[serde(alias = "health and science", alias = "Health and Science")]
    HealthAndScience,
}

impl SectorId {
    pub const ALL: [SectorId; 4] = [
        SectorId::Tech,
        SectorId::Finance,
        SectorId::Industrial,
        SectorId::HealthAndScience,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectorId::Tech => "tech",
            SectorId::Finance => "finance",
            SectorId::Industrial => "industrial",
            SectorId::HealthAndScience => "health and science",
        }
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats a signed delta with an explicit sign, e.g. `+3` or `-2`.
pub fn signed(delta: i64) -> String {
    if delta >= 0 {
        format!("+{delta}")
    } else {
        delta.to_string()
    }
}

/// Outcome of moving one index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceChange {
    pub sector: SectorId,
    pub delta: i64,
    pub old_price: i64,
    pub new_price: i64,
}

impl fmt::Display for PriceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}→{})",
            self.sector,
            signed(self.delta),
            self.old_price,
            self.new_price
        )
    }
}

/// A sector aggregate whose price feeds every stock in that sector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketIndex {
    pub sector: SectorId,
    price: i64,
    pub emoji: String,
    pub description: String,
}

impl MarketIndex {
    /// Creates an index; the starting price is clamped to the floor.
    pub fn new(sector: SectorId, price: i64, emoji: impl Into<String>) -> Self {
        Self {
            sector,
            price: price.max(PRICE_FLOOR),
            emoji: emoji.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn price(&self) -> i64 {
        self.price
    }

    /// Moves the price by `delta`, never below [`PRICE_FLOOR`].
    pub fn apply_delta(&mut self, delta: i64) -> PriceChange {
        let old_price = self.price;
        self.price = old_price.saturating_add(delta).max(PRICE_FLOOR);
        PriceChange {
            sector: self.sector,
            delta,
            old_price,
            new_price: self.price,
        }
    }
}

/// The per-game set of sector indexes, owned by the session and mutated in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketIndexes {
    indexes: Vec<MarketIndex>,
}

impl MarketIndexes {
    pub fn new(indexes: Vec<MarketIndex>) -> Self {
        Self { indexes }
    }

    pub fn get(&self, sector: SectorId) -> Option<&MarketIndex> {
        self.indexes.iter().find(|i| i.sector == sector)
    }

    pub fn get_mut(&mut self, sector: SectorId) -> Option<&mut MarketIndex> {
        self.indexes.iter_mut().find(|i| i.sector == sector)
    }

    pub fn price_of(&self, sector: SectorId) -> Option<i64> {
        self.get(sector).map(MarketIndex::price)
    }

    pub fn apply(&mut self, sector: SectorId, delta: i64) -> Option<PriceChange> {
        self.get_mut(sector).map(|i| i.apply_delta(delta))
    }

    /// Applies each effect to its index. Effects naming a missing sector are skipped.
    pub fn apply_all(&mut self, effects: &[IndexEffect]) -> Vec<PriceChange> {
        let mut results = Vec::with_capacity(effects.len());
        for effect in effects {
            match self.apply(effect.sector, effect.delta) {
                Some(change) => results.push(change),
                None => warn!(sector = %effect.sector, "no index for effect; skipped"),
            }
        }
        results
    }

    pub fn iter(&self) -> impl Iterator<Item = &MarketIndex> {
        self.indexes.iter()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn prices(&self) -> BTreeMap<SectorId, i64> {
        self.indexes.iter().map(|i| (i.sector, i.price)).collect()
    }
}

/// When an event (or its conditional follow-up) takes effect within a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Start,
    End,
}

/// A signed price move on one sector index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEffect {
    pub sector: SectorId,
    pub delta: i64,
}

impl fmt::Display for IndexEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sector, signed(self.delta))
    }
}

fn join_effects(effects: &[IndexEffect]) -> String {
    effects
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Test deciding whether conditional effects fire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Fires iff a uniform draw in `[0,1)` is below the probability.
    Probability(f64),
    /// Fires iff a uniform integer in `[min,max]` lands in `success`.
    DieRoll { min: i64, max: i64, success: Vec<i64> },
}

impl Trigger {
    /// Chance of firing on a single check, in `[0,1]`.
    pub fn odds(&self) -> f64 {
        match self {
            Trigger::Probability(p) => *p,
            Trigger::DieRoll { min, max, success } => {
                let faces = max.saturating_sub(*min).saturating_add(1).max(1) as f64;
                let hits = success.iter().collect::<BTreeSet<_>>().len() as f64;
                hits / faces
            }
        }
    }

    /// Odds rounded to a whole percentage, e.g. `33%`.
    pub fn odds_percent(&self) -> String {
        format!("{}%", (self.odds() * 100.0).round() as i64)
    }

    pub fn describe(&self) -> String {
        match self {
            Trigger::Probability(_) => self.odds_percent(),
            Trigger::DieRoll { min, max, success } => {
                let faces = success
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("/");
                format!(
                    "roll {} on d{}",
                    faces,
                    max.saturating_sub(*min).saturating_add(1)
                )
            }
        }
    }
}

/// Delayed, probabilistic follow-up of an event (the "pop" of a bubble).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalEffects {
    pub timing: Timing,
    pub trigger: Trigger,
    pub effects: Vec<IndexEffect>,
}

/// Immutable market event from the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub timing: Timing,
    pub effects: Vec<IndexEffect>,
    #[serde(default)]
    pub conditional: Option<ConditionalEffects>,
    #[serde(default)]
    pub discard_on_conditional_trigger: bool,
}

impl EventDefinition {
    /// Events with conditional effects grow every round until they pop.
    pub fn is_bubble(&self) -> bool {
        self.conditional.is_some()
    }

    /// One-line summary, e.g. `tech +3 | THEN tech -5 (roll 1/2 on d6)`.
    pub fn effects_summary(&self) -> String {
        if self.effects.is_empty() && self.conditional.is_none() {
            return "No effects".to_string();
        }
        let mut summary = join_effects(&self.effects);
        if let Some(cond) = &self.conditional {
            summary.push_str(&format!(
                " | THEN {} ({})",
                join_effects(&cond.effects),
                cond.trigger.describe()
            ));
        }
        summary
    }
}

/// Immutable stock from the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockDefinition {
    pub name: String,
    pub base_cost: i64,
    pub dividend: i64,
    pub growth: i64,
    pub sector: SectorId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub archetype: String,
}

/// Behavior of an action card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Peek at the next event.
    Forecast,
    /// Reshuffle the event deck.
    Shuffle,
    /// Buy a board stock at a fixed discount.
    InsiderTrading { discount: i64 },
    /// Move the target stock's sector index; the sign of `delta` is the direction.
    Manipulate { delta: i64 },
}

impl ActionKind {
    /// Whether playing the card requires a board stock as target.
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            ActionKind::InsiderTrading { .. } | ActionKind::Manipulate { .. }
        )
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ActionKind::Forecast => "forecast",
            ActionKind::Shuffle => "shuffle",
            ActionKind::InsiderTrading { .. } => "insider_trading",
            ActionKind::Manipulate { .. } => "manipulate",
        }
    }
}

/// Immutable action card from the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCardDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub action: ActionKind,
}

/// Validation errors for catalog invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Names must be non-empty.
    #[error("empty name in {0}")]
    EmptyName(&'static str),
    /// Probability must be finite and within [0, 1].
    #[error("probability {1} of event '{0}' is outside [0,1]")]
    InvalidProbability(String, f64),
    /// Die roll needs min < max and success values inside the range.
    #[error("invalid die roll on event '{0}': {1}")]
    InvalidDieRoll(String, String),
    /// Growth must be strictly positive.
    #[error("growth of stock '{0}' must be > 0")]
    NonPositiveGrowth(String),
    /// Dividend must be non-negative.
    #[error("dividend of stock '{0}' must be >= 0")]
    NegativeDividend(String),
    /// Action card parameters out of range.
    #[error("invalid action card '{0}': {1}")]
    InvalidActionCard(String, String),
    /// Sector configured twice.
    #[error("sector configured more than once: {0}")]
    DuplicateSector(SectorId),
    /// Sector missing from the index configuration.
    #[error("no index configured for sector: {0}")]
    MissingSector(SectorId),
    /// Starting price range for an index is empty or below the floor.
    #[error("invalid start price range [{1}, {2}] for sector {0}")]
    InvalidStartPrice(SectorId, i64, i64),
    /// A deck would be empty.
    #[error("catalog has no {0}")]
    EmptyDeck(&'static str),
}

/// Validate a stock definition.
pub fn validate_stock(s: &StockDefinition) -> Result<(), ValidationError> {
    if s.name.trim().is_empty() {
        return Err(ValidationError::EmptyName("stock"));
    }
    if s.growth <= 0 {
        return Err(ValidationError::NonPositiveGrowth(s.name.clone()));
    }
    if s.dividend < 0 {
        return Err(ValidationError::NegativeDividend(s.name.clone()));
    }
    Ok(())
}

/// Validate a conditional trigger belonging to event `event`.
pub fn validate_trigger(event: &str, t: &Trigger) -> Result<(), ValidationError> {
    match t {
        Trigger::Probability(p) => {
            if !p.is_finite() || !(0.0..=1.0).contains(p) {
                return Err(ValidationError::InvalidProbability(event.to_string(), *p));
            }
        }
        Trigger::DieRoll { min, max, success } => {
            if min >= max {
                return Err(ValidationError::InvalidDieRoll(
                    event.to_string(),
                    format!("min {min} must be < max {max}"),
                ));
            }
            if success.is_empty() {
                return Err(ValidationError::InvalidDieRoll(
                    event.to_string(),
                    "no success values".to_string(),
                ));
            }
            if let Some(bad) = success.iter().find(|v| **v < *min || **v > *max) {
                return Err(ValidationError::InvalidDieRoll(
                    event.to_string(),
                    format!("success value {bad} outside [{min},{max}]"),
                ));
            }
        }
    }
    Ok(())
}

/// Validate an event definition.
pub fn validate_event(e: &EventDefinition) -> Result<(), ValidationError> {
    if e.name.trim().is_empty() {
        return Err(ValidationError::EmptyName("event"));
    }
    if let Some(cond) = &e.conditional {
        validate_trigger(&e.name, &cond.trigger)?;
    }
    Ok(())
}

/// Validate an action card definition.
pub fn validate_action_card(c: &ActionCardDefinition) -> Result<(), ValidationError> {
    if c.name.trim().is_empty() {
        return Err(ValidationError::EmptyName("action card"));
    }
    match c.action {
        ActionKind::InsiderTrading { discount } if discount <= 0 => Err(
            ValidationError::InvalidActionCard(c.name.clone(), "discount must be > 0".into()),
        ),
        ActionKind::Manipulate { delta: 0 } => Err(ValidationError::InvalidActionCard(
            c.name.clone(),
            "manipulation delta must be non-zero".into(),
        )),
        _ => Ok(()),
    }
}

/// Validate that `sectors` names each of the four sectors exactly once.
pub fn validate_sector_set(sectors: &[SectorId]) -> Result<(), ValidationError> {
    let mut seen = BTreeSet::new();
    for s in sectors {
        if !seen.insert(*s) {
            return Err(ValidationError::DuplicateSector(*s));
        }
    }
    for s in SectorId::ALL {
        if !seen.contains(&s) {
            return Err(ValidationError::MissingSector(s));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stock(name: &str) -> StockDefinition {
        StockDefinition {
            name: name.to_string(),
            base_cost: 6,
            dividend: 2,
            growth: 3,
            sector: SectorId::Tech,
            description: String::new(),
            archetype: String::new(),
        }
    }

    fn bubble(trigger: Trigger) -> EventDefinition {
        EventDefinition {
            name: "Tech Sector Euphoria".to_string(),
            description: String::new(),
            timing: Timing::Start,
            effects: vec![IndexEffect {
                sector: SectorId::Tech,
                delta: 3,
            }],
            conditional: Some(ConditionalEffects {
                timing: Timing::End,
                trigger,
                effects: vec![IndexEffect {
                    sector: SectorId::Tech,
                    delta: -5,
                }],
            }),
            discard_on_conditional_trigger: true,
        }
    }

    #[test]
    fn index_floor_holds() {
        let mut idx = MarketIndex::new(SectorId::Tech, 3, "💻");
        let change = idx.apply_delta(-10);
        assert_eq!(change.old_price, 3);
        assert_eq!(change.new_price, 1);
        assert_eq!(idx.price(), 1);
        assert_eq!(MarketIndex::new(SectorId::Tech, -4, "").price(), 1);
    }

    #[test]
    fn apply_all_skips_missing_sector() {
        let mut idx = MarketIndexes::new(vec![MarketIndex::new(SectorId::Tech, 7, "💻")]);
        let results = idx.apply_all(&[
            IndexEffect {
                sector: SectorId::Tech,
                delta: 2,
            },
            IndexEffect {
                sector: SectorId::Finance,
                delta: 2,
            },
        ]);
        assert_eq!(results.len(), 1);
        assert_eq!(idx.price_of(SectorId::Tech), Some(9));
        assert_eq!(idx.price_of(SectorId::Finance), None);
    }

    #[test]
    fn stock_validation() {
        assert!(validate_stock(&stock("TechTitan")).is_ok());
        let mut s = stock("Zero");
        s.growth = 0;
        assert_eq!(
            validate_stock(&s),
            Err(ValidationError::NonPositiveGrowth("Zero".into()))
        );
        let mut s = stock("Neg");
        s.dividend = -1;
        assert!(validate_stock(&s).is_err());
        assert!(validate_stock(&stock("  ")).is_err());
    }

    #[test]
    fn trigger_validation() {
        assert!(validate_event(&bubble(Trigger::Probability(0.4))).is_ok());
        assert!(validate_event(&bubble(Trigger::Probability(1.5))).is_err());
        assert!(validate_event(&bubble(Trigger::Probability(f64::NAN))).is_err());
        let ok = Trigger::DieRoll {
            min: 1,
            max: 6,
            success: vec![1, 2],
        };
        assert!(validate_event(&bubble(ok)).is_ok());
        let inverted = Trigger::DieRoll {
            min: 6,
            max: 6,
            success: vec![6],
        };
        assert!(matches!(
            validate_event(&bubble(inverted)),
            Err(ValidationError::InvalidDieRoll(..))
        ));
        let outside = Trigger::DieRoll {
            min: 1,
            max: 6,
            success: vec![7],
        };
        assert!(validate_event(&bubble(outside)).is_err());
    }

    #[test]
    fn action_card_validation() {
        let card = |action| ActionCardDefinition {
            name: "Card".into(),
            description: String::new(),
            action,
        };
        assert!(validate_action_card(&card(ActionKind::Forecast)).is_ok());
        assert!(validate_action_card(&card(ActionKind::InsiderTrading { discount: 3 })).is_ok());
        assert!(validate_action_card(&card(ActionKind::InsiderTrading { discount: 0 })).is_err());
        assert!(validate_action_card(&card(ActionKind::Manipulate { delta: 0 })).is_err());
        assert!(validate_action_card(&card(ActionKind::Manipulate { delta: -4 })).is_ok());
    }

    #[test]
    fn sector_set_must_be_complete() {
        assert!(validate_sector_set(&SectorId::ALL).is_ok());
        assert_eq!(
            validate_sector_set(&[SectorId::Tech, SectorId::Finance, SectorId::Industrial]),
            Err(ValidationError::MissingSector(SectorId::HealthAndScience))
        );
        assert_eq!(
            validate_sector_set(&[SectorId::Tech, SectorId::Tech]),
            Err(ValidationError::DuplicateSector(SectorId::Tech))
        );
    }

    #[test]
    fn summaries_and_odds() {
        let ev = bubble(Trigger::DieRoll {
            min: 1,
            max: 6,
            success: vec![1, 2],
        });
        assert_eq!(
            ev.effects_summary(),
            "tech +3 | THEN tech -5 (roll 1/2 on d6)"
        );
        assert_eq!(ev.conditional.as_ref().unwrap().trigger.odds_percent(), "33%");
        assert_eq!(Trigger::Probability(0.25).describe(), "25%");
    }

    #[test]
    fn extreme_die_bounds_do_not_overflow() {
        let wide = Trigger::DieRoll {
            min: i64::MIN,
            max: i64::MAX,
            success: vec![0],
        };
        assert!(validate_event(&bubble(wide.clone())).is_ok());
        assert!(wide.odds() < 1e-15);
        assert_eq!(wide.describe(), format!("roll 0 on d{}", i64::MAX));
    }

    #[test]
    fn serde_roundtrip_event() {
        let ev = bubble(Trigger::Probability(0.5));
        let s = serde_json::to_string(&ev).unwrap();
        let back: EventDefinition = serde_json::from_str(&s).unwrap();
        assert_eq!(back, ev);
        let sector: SectorId = serde_json::from_str("\"Health and Science\"").unwrap();
        assert_eq!(sector, SectorId::HealthAndScience);
    }

    proptest! {
        #[test]
        fn price_never_below_floor(start in -20i64..50, deltas in proptest::collection::vec(-15i64..15, 0..40)) {
            let mut idx = MarketIndex::new(SectorId::Finance, start, "🏦");
            prop_assert!(idx.price() >= PRICE_FLOOR);
            for d in deltas {
                let change = idx.apply_delta(d);
                prop_assert!(change.new_price >= PRICE_FLOOR);
                prop_assert_eq!(change.new_price, idx.price());
            }
        }
    }
}
