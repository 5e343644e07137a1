//! Market-event lifecycle: draw, apply, bubble growth, conditional resolution
//! and cleanup.
//!
//! Each drawn event moves `Pending -> Active` (it has conditional effects) or
//! `Pending -> Resolved` (it does not) the first time its initial effects are
//! applied, and `Active -> Resolved` when its conditional effects fire.

use market_core::{
    EventDefinition, IndexEffect, MarketIndexes, PriceChange, RandomSource, ShuffledDeck, Timing,
    Trigger,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Active,
    Resolved,
}

/// The value drawn for a conditional check.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Roll {
    Probability(f64),
    Die(i64),
}

impl std::fmt::Display for Roll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Roll::Probability(v) => write!(f, "{v:.2}"),
            Roll::Die(v) => write!(f, "{v}"),
        }
    }
}

/// An event drawn into play.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    #[serde(flatten)]
    pub definition: EventDefinition,
    pub status: EventStatus,
    pub rounds_active: u32,
}

impl ActiveEvent {
    pub fn new(definition: EventDefinition) -> Self {
        Self {
            definition,
            status: EventStatus::Pending,
            rounds_active: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// An active event that will keep growing until its conditional effects fire.
    pub fn is_growing_bubble(&self) -> bool {
        self.definition.is_bubble() && self.status == EventStatus::Active
    }

    /// Applies the initial effects and settles a pending status.
    pub fn apply_effects(&mut self, indexes: &mut MarketIndexes) -> Vec<PriceChange> {
        let results = indexes.apply_all(&self.definition.effects);
        if self.status == EventStatus::Pending {
            self.status = if self.definition.is_bubble() {
                EventStatus::Active
            } else {
                EventStatus::Resolved
            };
        }
        results
    }

    /// Rolls the conditional trigger of an active event, applying its effects
    /// and resolving it on success. Returns `None` when there is nothing to check.
    fn check_conditional<R: RandomSource + ?Sized>(
        &mut self,
        indexes: &mut MarketIndexes,
        rng: &mut R,
    ) -> Option<(bool, Roll, Vec<PriceChange>)> {
        if self.status != EventStatus::Active {
            return None;
        }
        let cond = self.definition.conditional.as_ref()?;
        let (triggered, roll) = match &cond.trigger {
            Trigger::Probability(p) => {
                let v = rng.next_float();
                (v < *p, Roll::Probability(v))
            }
            Trigger::DieRoll { min, max, success } => {
                let v = rng.next_int(*min, *max);
                (success.contains(&v), Roll::Die(v))
            }
        };
        if !triggered {
            return Some((false, roll, Vec::new()));
        }
        let results = indexes.apply_all(&cond.effects);
        self.status = EventStatus::Resolved;
        Some((true, roll, results))
    }

    fn should_discard(&self) -> bool {
        self.status == EventStatus::Resolved && self.definition.discard_on_conditional_trigger
    }
}

/// Result of drawing a new event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawResult {
    pub event: ActiveEvent,
    pub results: Vec<PriceChange>,
}

/// One round of growth for an active bubble.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BubbleGrowth {
    pub event: String,
    pub rounds_active: u32,
    pub results: Vec<PriceChange>,
}

/// Outcome of one conditional check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalResult {
    pub event: ActiveEvent,
    pub triggered: bool,
    pub roll: Roll,
    pub results: Vec<PriceChange>,
    pub discarded: bool,
}

/// Owns the event deck and the set of events in play.
#[derive(Clone, Debug, Default)]
pub struct EventEngine {
    catalog: Vec<EventDefinition>,
    deck: Option<ShuffledDeck<EventDefinition>>,
    active: Vec<ActiveEvent>,
    recent_pop_effects: Vec<IndexEffect>,
}

impl EventEngine {
    /// Creates an engine with no deck; call [`EventEngine::initialize`] before play.
    pub fn new(catalog: Vec<EventDefinition>) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    /// Builds and shuffles a full deck and clears the events in play.
    pub fn initialize<R: RandomSource + ?Sized>(&mut self, rng: &mut R) {
        self.deck = Some(ShuffledDeck::shuffled(self.catalog.clone(), rng));
        self.active.clear();
        self.recent_pop_effects.clear();
    }

    pub fn active_events(&self) -> &[ActiveEvent] {
        &self.active
    }

    pub fn deck_len(&self) -> usize {
        self.deck.as_ref().map_or(0, ShuffledDeck::len)
    }

    /// Deals one event (rebuilding the deck when empty) and puts it in play,
    /// applying its initial effects at once when it is a start-of-round event.
    pub fn draw_and_activate<R: RandomSource + ?Sized>(
        &mut self,
        indexes: &mut MarketIndexes,
        rng: &mut R,
    ) -> Option<DrawResult> {
        if self.deck_len() == 0 {
            debug!("event deck empty; reshuffling a fresh deck");
            self.deck = Some(ShuffledDeck::shuffled(self.catalog.clone(), rng));
        }
        let mut event = ActiveEvent::new(self.deck.as_mut()?.deal()?);
        let results = if event.definition.timing == Timing::Start {
            let results = event.apply_effects(indexes);
            if event.is_growing_bubble() {
                event.rounds_active = 1;
            }
            results
        } else {
            Vec::new()
        };
        info!(event = %event.name(), timing = ?event.definition.timing, "event drawn");
        self.active.push(event.clone());
        Some(DrawResult { event, results })
    }

    /// Reapplies the initial effects of every active bubble (growth step).
    pub fn reapply_bubble_effects(&mut self, indexes: &mut MarketIndexes) -> Vec<BubbleGrowth> {
        let mut growth = Vec::new();
        for event in self.active.iter_mut().filter(|e| e.is_growing_bubble()) {
            event.rounds_active += 1;
            let results = indexes.apply_all(&event.definition.effects);
            debug!(event = %event.name(), rounds = event.rounds_active, "bubble grows");
            growth.push(BubbleGrowth {
                event: event.name().to_string(),
                rounds_active: event.rounds_active,
                results,
            });
        }
        growth
    }

    /// Checks every active event whose conditional timing matches `timing`, and
    /// applies pending events of the same timing.
    pub fn process_conditional_events<R: RandomSource + ?Sized>(
        &mut self,
        timing: Timing,
        indexes: &mut MarketIndexes,
        rng: &mut R,
    ) -> Vec<ConditionalResult> {
        let mut outcomes = Vec::new();
        let mut kept = Vec::with_capacity(self.active.len());
        for mut event in self.active.drain(..) {
            let cond_timing = event.definition.conditional.as_ref().map(|c| c.timing);
            let mut discarded = false;
            if cond_timing == Some(timing) {
                if let Some((triggered, roll, results)) = event.check_conditional(indexes, rng) {
                    discarded = triggered && event.should_discard();
                    if triggered {
                        info!(event = %event.name(), %roll, discarded, "conditional effects fired");
                        if discarded {
                            if let Some(cond) = &event.definition.conditional {
                                self.recent_pop_effects.extend(cond.effects.iter().copied());
                            }
                        }
                    } else {
                        debug!(event = %event.name(), %roll, "conditional effects held");
                    }
                    outcomes.push(ConditionalResult {
                        event: event.clone(),
                        triggered,
                        roll,
                        results,
                        discarded,
                    });
                }
            }
            if event.definition.timing == timing && event.status == EventStatus::Pending {
                event.apply_effects(indexes);
            }
            if !discarded {
                kept.push(event);
            }
        }
        self.active = kept;
        outcomes
    }

    /// Purges resolved start-timing events and clears the pop-effects buffer.
    /// Returns the number of events removed.
    pub fn cleanup_resolved_start_events(&mut self) -> usize {
        let before = self.active.len();
        self.active
            .retain(|e| !(e.definition.timing == Timing::Start && e.status == EventStatus::Resolved));
        self.recent_pop_effects.clear();
        before - self.active.len()
    }

    /// The event that would be dealt next, if the deck has one.
    pub fn peek_next_event(&self) -> Option<&EventDefinition> {
        self.deck.as_ref()?.peek()
    }

    /// Reshuffles the remaining deck. Returns false if no deck exists yet.
    pub fn shuffle_event_deck<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> bool {
        match self.deck.as_mut() {
            Some(deck) => {
                deck.shuffle(rng);
                true
            }
            None => false,
        }
    }

    /// Initial effects of every event in play plus the effects of bubbles that
    /// popped since the last cleanup.
    pub fn visual_effects(&self) -> Vec<IndexEffect> {
        self.active
            .iter()
            .flat_map(|e| e.definition.effects.iter().copied())
            .chain(self.recent_pop_effects.iter().copied())
            .collect()
    }
}
