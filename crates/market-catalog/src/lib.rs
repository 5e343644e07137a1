#![deny(warnings)]

//! YAML-backed game configuration: the card catalog (sector indexes, stocks,
//! events, action cards) and the table rules.
//!
//! Everything is validated at load time so a bad file is rejected before any
//! session starts.

use market_core::{
    validate_action_card, validate_event, validate_sector_set, validate_stock,
    ActionCardDefinition, EventDefinition, MarketIndex, MarketIndexes, RandomSource, SectorId,
    StockDefinition, ValidationError, PRICE_FLOOR,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const DEFAULT_CATALOG: &str = include_str!("../../../assets/catalog.yaml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid catalog: {0}")]
    Invalid(#[from] ValidationError),
    #[error("duplicate stock name: {0}")]
    DuplicateStock(String),
    #[error("invalid rules: {0}")]
    Rules(String),
}

fn read(path: &Path) -> Result<String, CatalogError> {
    fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Inclusive range a sector index's opening price is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub sector: SectorId,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub description: String,
    pub start_price: PriceRange,
}

fn one() -> u32 {
    1
}

/// An action card and how many copies of it go in the deck.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCardEntry {
    #[serde(flatten)]
    pub card: ActionCardDefinition,
    #[serde(default = "one")]
    pub copies: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub indexes: Vec<IndexSpec>,
    pub stocks: Vec<StockDefinition>,
    pub events: Vec<EventDefinition>,
    #[serde(default)]
    pub action_cards: Vec<ActionCardEntry>,
}

impl Catalog {
    /// Parses and validates a catalog document. Triggers are written as
    /// single-key maps (`{ die_roll: {...} }`) rather than YAML tags.
    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_yaml::with::singleton_map_recursive::deserialize(
            serde_yaml::Deserializer::from_str(text),
        )?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let catalog = Self::from_yaml_str(&read(path)?)?;
        info!(
            path = %path.display(),
            stocks = catalog.stocks.len(),
            events = catalog.events.len(),
            action_cards = catalog.action_deck().len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(DEFAULT_CATALOG)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let sectors: Vec<SectorId> = self.indexes.iter().map(|i| i.sector).collect();
        validate_sector_set(&sectors)?;
        for spec in &self.indexes {
            let PriceRange { min, max } = spec.start_price;
            if min < PRICE_FLOOR || min > max {
                return Err(ValidationError::InvalidStartPrice(spec.sector, min, max).into());
            }
        }

        if self.stocks.is_empty() {
            return Err(ValidationError::EmptyDeck("stocks").into());
        }
        let mut names = BTreeSet::new();
        for stock in &self.stocks {
            validate_stock(stock)?;
            if !names.insert(stock.name.as_str()) {
                return Err(CatalogError::DuplicateStock(stock.name.clone()));
            }
        }

        if self.events.is_empty() {
            return Err(ValidationError::EmptyDeck("events").into());
        }
        for event in &self.events {
            validate_event(event)?;
        }
        for entry in &self.action_cards {
            validate_action_card(&entry.card)?;
        }
        Ok(())
    }

    /// Fresh sector indexes, each opening at a price drawn from its range.
    pub fn build_indexes<R: RandomSource + ?Sized>(&self, rng: &mut R) -> MarketIndexes {
        MarketIndexes::new(
            self.indexes
                .iter()
                .map(|spec| {
                    let price = rng.next_int(spec.start_price.min, spec.start_price.max);
                    MarketIndex::new(spec.sector, price, spec.emoji.clone())
                        .with_description(spec.description.clone())
                })
                .collect(),
        )
    }

    /// Every action card, with copies expanded.
    pub fn action_deck(&self) -> Vec<ActionCardDefinition> {
        self.action_cards
            .iter()
            .flat_map(|e| std::iter::repeat(e.card.clone()).take(e.copies as usize))
            .collect()
    }
}

/// Table rules. Every field may be omitted from the YAML document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    pub max_rounds: u32,
    pub actions_per_turn: u32,
    pub starting_cash: i64,
    pub max_board_stocks: usize,
    pub new_stocks_per_round: usize,
    pub initial_board_stocks: usize,
    pub max_hand_size: usize,
    pub starting_hand_size: usize,
    pub min_players: usize,
    pub shuffle_turn_order: bool,
    pub rng_seed: Option<u64>,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_rounds: 6,
            actions_per_turn: 2,
            starting_cash: 40,
            max_board_stocks: 6,
            new_stocks_per_round: 2,
            initial_board_stocks: 3,
            max_hand_size: 4,
            starting_hand_size: 0,
            min_players: 2,
            shuffle_turn_order: true,
            rng_seed: None,
        }
    }
}

impl GameRules {
    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let rules: GameRules = serde_yaml::from_str(text)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let rules = Self::from_yaml_str(&read(path)?)?;
        info!(path = %path.display(), max_rounds = rules.max_rounds, "rules loaded");
        Ok(rules)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        let bad = |msg: &str| -> Result<(), CatalogError> { Err(CatalogError::Rules(msg.to_string())) };
        if self.max_rounds == 0 {
            return bad("max_rounds must be >= 1");
        }
        if self.actions_per_turn == 0 {
            return bad("actions_per_turn must be >= 1");
        }
        if self.starting_cash < 0 {
            return bad("starting_cash must be >= 0");
        }
        if self.max_board_stocks == 0 {
            return bad("max_board_stocks must be >= 1");
        }
        if self.initial_board_stocks > self.max_board_stocks {
            return bad("initial_board_stocks exceeds max_board_stocks");
        }
        if self.starting_hand_size > self.max_hand_size {
            return bad("starting_hand_size exceeds max_hand_size");
        }
        if self.min_players == 0 {
            return bad("min_players must be >= 1");
        }
        Ok(())
    }
}
