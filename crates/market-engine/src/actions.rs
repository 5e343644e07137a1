//! Action cards: the deck players draw from and the effect of playing each kind.

use crate::events::EventEngine;
use crate::ledger::{Ledger, PlayerId};
use crate::trading::{purchase_with_discount, Purchase};
use crate::ActionError;
use market_core::{
    signed, ActionCardDefinition, ActionKind, EventDefinition, IndexEffect, MarketIndexes,
    RandomSource, SectorId, ShuffledDeck, StockDefinition, Timing,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Identity of one dealt card, unique within a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub u64);

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A card in a player's hand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionCard {
    pub id: CardId,
    #[serde(flatten)]
    pub definition: ActionCardDefinition,
}

impl ActionCard {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn needs_target(&self) -> bool {
        self.definition.action.needs_target()
    }
}

/// The shared action deck. It is built once per game and never regenerates.
#[derive(Clone, Debug, Default)]
pub struct ActionDeck {
    deck: ShuffledDeck<ActionCardDefinition>,
    next_id: u64,
}

impl ActionDeck {
    pub fn new<R: RandomSource + ?Sized>(cards: Vec<ActionCardDefinition>, rng: &mut R) -> Self {
        Self {
            deck: ShuffledDeck::shuffled(cards, rng),
            next_id: 1,
        }
    }

    /// Deals the top card, stamping it with a fresh id.
    pub fn draw(&mut self) -> Option<ActionCard> {
        let definition = self.deck.deal()?;
        let id = CardId(self.next_id);
        self.next_id += 1;
        Some(ActionCard { id, definition })
    }

    pub fn len(&self) -> usize {
        self.deck.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deck.is_empty()
    }
}

/// Everything a card may touch while it resolves.
pub struct ActionContext<'a> {
    pub player: &'a PlayerId,
    pub target: Option<&'a StockDefinition>,
    pub round: u32,
    pub ledger: &'a mut Ledger,
    pub indexes: &'a mut MarketIndexes,
    pub events: &'a mut EventEngine,
    pub rng: &'a mut dyn RandomSource,
}

/// Structured result payload of a played card.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardData {
    Forecast {
        event: EventDefinition,
    },
    Shuffled,
    InsiderPurchase {
        purchase: Purchase,
    },
    Manipulation {
        sector: SectorId,
        stock_name: String,
        old_price: i64,
        new_price: i64,
        change: i64,
        direction: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardEffect {
    pub message: String,
    pub data: CardData,
}

fn effect_lines(effects: &[IndexEffect]) -> String {
    effects
        .iter()
        .map(|e| format!("  {}: {}", e.sector, signed(e.delta)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Player-facing text revealing an upcoming event.
pub fn forecast_text(event: &EventDefinition) -> String {
    let mut text = format!("Market Forecast reveals: {}", event.name);
    if !event.effects.is_empty() {
        text.push_str("\n\n📊 Price Movements:\n");
        text.push_str(&effect_lines(&event.effects));
    }
    if let Some(cond) = &event.conditional {
        let when = match cond.timing {
            Timing::End => "End of round",
            Timing::Start => "Next round",
        };
        text.push_str(&format!(
            "\n\n⚠️ Potential Bubble ({}, {}):\n{}",
            when,
            cond.trigger.odds_percent(),
            effect_lines(&cond.effects)
        ));
    }
    text
}

fn target<'a>(
    card: &ActionCardDefinition,
    ctx: &ActionContext<'a>,
) -> Result<&'a StockDefinition, ActionError> {
    ctx.target
        .ok_or_else(|| ActionError::MissingTarget(card.name.clone()))
}

/// Resolves one card against the game state. Consuming the player's action
/// and removing the card from the hand are left to the caller.
pub fn execute(
    card: &ActionCardDefinition,
    ctx: ActionContext<'_>,
) -> Result<CardEffect, ActionError> {
    match card.action {
        ActionKind::Forecast => {
            let next = ctx
                .events
                .peek_next_event()
                .ok_or(ActionError::NothingToForecast)?;
            Ok(CardEffect {
                message: forecast_text(next),
                data: CardData::Forecast {
                    event: next.clone(),
                },
            })
        }
        ActionKind::Shuffle => {
            if !ctx.events.shuffle_event_deck(ctx.rng) {
                return Err(ActionError::NoEventDeck);
            }
            info!(player = %ctx.player, "event deck shuffled");
            Ok(CardEffect {
                message: "Event deck shuffled! Forecasts are now useless.".to_string(),
                data: CardData::Shuffled,
            })
        }
        ActionKind::InsiderTrading { discount } => {
            let stock = target(card, &ctx)?;
            let purchase = purchase_with_discount(
                ctx.ledger,
                ctx.player,
                stock,
                ctx.indexes,
                ctx.round,
                discount,
            )?;
            Ok(CardEffect {
                message: format!(
                    "{} on {}! Bought for ${} ({} off)",
                    card.name, stock.name, purchase.price, discount
                ),
                data: CardData::InsiderPurchase { purchase },
            })
        }
        ActionKind::Manipulate { delta } => {
            let stock = target(card, &ctx)?;
            let change = ctx
                .indexes
                .apply(stock.sector, delta)
                .ok_or(ActionError::SectorNotFound(stock.sector))?;
            let verb = if delta > 0 { "increased" } else { "decreased" };
            info!(player = %ctx.player, stock = %stock.name, %change, "market manipulated");
            Ok(CardEffect {
                message: format!(
                    "{} on {}! Stock price {} by {}",
                    card.name,
                    stock.name,
                    verb,
                    delta.abs()
                ),
                data: CardData::Manipulation {
                    sector: stock.sector,
                    stock_name: stock.name.clone(),
                    old_price: change.old_price,
                    new_price: change.new_price,
                    change: delta,
                    direction: if delta > 0 { "up" } else { "down" }.to_string(),
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{ConditionalEffects, MarketIndex, SeededRandom, Trigger};

    fn card(name: &str, action: ActionKind) -> ActionCardDefinition {
        ActionCardDefinition {
            name: name.to_string(),
            description: String::new(),
            action,
        }
    }

    fn stock() -> StockDefinition {
        StockDefinition {
            name: "Quantum Chips".to_string(),
            base_cost: 6,
            dividend: 1,
            growth: 3,
            sector: SectorId::Tech,
            description: String::new(),
            archetype: String::new(),
        }
    }

    fn bubble() -> EventDefinition {
        EventDefinition {
            name: "Crypto Mania".to_string(),
            description: String::new(),
            timing: Timing::Start,
            effects: vec![IndexEffect {
                sector: SectorId::Finance,
                delta: 3,
            }],
            conditional: Some(ConditionalEffects {
                timing: Timing::End,
                trigger: Trigger::DieRoll {
                    min: 1,
                    max: 6,
                    success: vec![1, 2],
                },
                effects: vec![IndexEffect {
                    sector: SectorId::Finance,
                    delta: -6,
                }],
            }),
            discard_on_conditional_trigger: true,
        }
    }

    struct World {
        ledger: Ledger,
        indexes: MarketIndexes,
        events: EventEngine,
        rng: SeededRandom,
        player: PlayerId,
    }

    impl World {
        fn new(events: Vec<EventDefinition>) -> Self {
            let mut rng = SeededRandom::new(11);
            let player = PlayerId::from("ana");
            let mut ledger = Ledger::new();
            ledger.add_player(player.clone(), 40, &mut rng);
            ledger.get_mut(&player).unwrap().reset_turn(2);
            Self {
                ledger,
                indexes: MarketIndexes::new(
                    SectorId::ALL
                        .iter()
                        .map(|s| MarketIndex::new(*s, 7, ""))
                        .collect(),
                ),
                events: EventEngine::new(events),
                rng,
                player,
            }
        }

        fn play(
            &mut self,
            card: &ActionCardDefinition,
            target: Option<&StockDefinition>,
        ) -> Result<CardEffect, ActionError> {
            execute(
                card,
                ActionContext {
                    player: &self.player,
                    target,
                    round: 1,
                    ledger: &mut self.ledger,
                    indexes: &mut self.indexes,
                    events: &mut self.events,
                    rng: &mut self.rng,
                },
            )
        }
    }

    #[test]
    fn deck_stamps_unique_ids_and_does_not_regenerate() {
        let mut rng = SeededRandom::new(1);
        let defs = vec![
            card("Market Forecast", ActionKind::Forecast),
            card("Market Uncertainty", ActionKind::Shuffle),
        ];
        let mut deck = ActionDeck::new(defs, &mut rng);
        let a = deck.draw().unwrap();
        let b = deck.draw().unwrap();
        assert_ne!(a.id, b.id);
        assert!(deck.is_empty());
        assert!(deck.draw().is_none());
    }

    #[test]
    fn forecast_reveals_next_event_without_drawing() {
        let mut world = World::new(vec![bubble()]);
        let forecast = card("Market Forecast", ActionKind::Forecast);
        assert_eq!(
            world.play(&forecast, None),
            Err(ActionError::NothingToForecast)
        );

        world.events.initialize(&mut world.rng);
        let effect = world.play(&forecast, None).unwrap();
        assert!(effect.message.starts_with("Market Forecast reveals: Crypto Mania"));
        assert!(effect.message.contains("📊 Price Movements:\n  finance: +3"));
        assert!(effect
            .message
            .contains("⚠️ Potential Bubble (End of round, 33%):\n  finance: -6"));
        assert_eq!(world.events.deck_len(), 1);
    }

    #[test]
    fn shuffle_requires_a_deck() {
        let mut world = World::new(vec![bubble()]);
        let shuffle = card("Market Uncertainty", ActionKind::Shuffle);
        assert_eq!(world.play(&shuffle, None), Err(ActionError::NoEventDeck));
        world.events.initialize(&mut world.rng);
        assert_eq!(world.play(&shuffle, None).unwrap().data, CardData::Shuffled);
    }

    #[test]
    fn insider_trading_buys_at_discount_with_one_action() {
        let mut world = World::new(Vec::new());
        let insider = card("Insider Trading", ActionKind::InsiderTrading { discount: 3 });
        assert_eq!(
            world.play(&insider, None),
            Err(ActionError::MissingTarget("Insider Trading".to_string()))
        );
        let target = stock();
        let effect = world.play(&insider, Some(&target)).unwrap();
        match effect.data {
            CardData::InsiderPurchase { purchase } => {
                // 6 + 7 - 3
                assert_eq!(purchase.price, 10);
                assert_eq!(purchase.cash_after, 30);
                assert_eq!(purchase.actions_remaining, 1);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn manipulate_moves_the_target_sector() {
        let mut world = World::new(Vec::new());
        let target = stock();
        let rumor = card("Spread Rumor", ActionKind::Manipulate { delta: -4 });
        let effect = world.play(&rumor, Some(&target)).unwrap();
        assert_eq!(
            effect.message,
            "Spread Rumor on Quantum Chips! Stock price decreased by 4"
        );
        assert_eq!(world.indexes.price_of(SectorId::Tech), Some(3));
        match effect.data {
            CardData::Manipulation {
                old_price,
                new_price,
                direction,
                ..
            } => {
                assert_eq!((old_price, new_price), (7, 3));
                assert_eq!(direction, "down");
            }
            other => panic!("unexpected payload {other:?}"),
        }
        // floor holds
        world.play(&rumor, Some(&target)).unwrap();
        assert_eq!(world.indexes.price_of(SectorId::Tech), Some(1));
    }

    #[test]
    fn manipulate_reports_missing_sector() {
        let mut world = World::new(Vec::new());
        world.indexes = MarketIndexes::new(vec![MarketIndex::new(SectorId::Finance, 7, "")]);
        let hype = card("Create Hype", ActionKind::Manipulate { delta: 2 });
        assert_eq!(
            world.play(&hype, Some(&stock())),
            Err(ActionError::SectorNotFound(SectorId::Tech))
        );
    }
}
