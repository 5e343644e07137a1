//! Stock pricing, purchase/sale validation and the rotating stock board.
//!
//! Prices couple to scarcity: every unit currently held by any player raises
//! the price of the next unit by the stock's `growth`.

use crate::ledger::{Ledger, OwnedStock, OwnedStockRef, PlayerId, StockAction};
use crate::ActionError;
use market_core::{MarketIndexes, RandomSource, ShuffledDeck, StockDefinition, PRICE_FLOOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// `base_cost + sector index price + growth * global ownership`.
///
/// A stock whose sector has no index prices as if the index were 0.
pub fn calculate_price(stock: &StockDefinition, indexes: &MarketIndexes, ownership: usize) -> i64 {
    let index_price = indexes.price_of(stock.sector).unwrap_or(0);
    stock.base_cost + index_price + stock.growth * ownership as i64
}

/// Sale proceeds: the market price minus one `growth` step, floored at 1.
pub fn calculate_sell_price(
    stock: &StockDefinition,
    indexes: &MarketIndexes,
    ownership: usize,
) -> i64 {
    (calculate_price(stock, indexes, ownership) - stock.growth).max(PRICE_FLOOR)
}

/// Market price using the live ownership count from `ledger`.
pub fn market_price(stock: &StockDefinition, indexes: &MarketIndexes, ledger: &Ledger) -> i64 {
    calculate_price(stock, indexes, ledger.ownership_count(&stock.name))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub player: PlayerId,
    pub stock: OwnedStock,
    pub price: i64,
    pub discount: i64,
    pub cash_after: i64,
    pub actions_remaining: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub player: PlayerId,
    pub stock: OwnedStock,
    pub sale_price: i64,
    pub profit_loss: i64,
    pub cash_after: i64,
    pub actions_remaining: u32,
}

fn check_lock(
    ledger: &Ledger,
    player: &PlayerId,
    stock: &str,
    action: StockAction,
) -> Result<(), ActionError> {
    let p = ledger.get(player)?;
    if !p.has_actions() {
        return Err(ActionError::NoActionsRemaining);
    }
    match p.stock_action(stock) {
        Some(prev) if prev == action => Err(ActionError::DuplicateAction {
            stock: stock.to_string(),
            action,
        }),
        Some(prev) => Err(ActionError::ConflictingAction {
            stock: stock.to_string(),
            action,
            previous: prev,
        }),
        None => Ok(()),
    }
}

/// Buys one unit of `stock` at the current market price.
pub fn purchase(
    ledger: &mut Ledger,
    player: &PlayerId,
    stock: &StockDefinition,
    indexes: &MarketIndexes,
    round: u32,
) -> Result<Purchase, ActionError> {
    purchase_with_discount(ledger, player, stock, indexes, round, 0)
}

/// Buys one unit at market price minus `discount` (never below 1).
pub fn purchase_with_discount(
    ledger: &mut Ledger,
    player: &PlayerId,
    stock: &StockDefinition,
    indexes: &MarketIndexes,
    round: u32,
    discount: i64,
) -> Result<Purchase, ActionError> {
    check_lock(ledger, player, &stock.name, StockAction::Buy)?;

    let market = market_price(stock, indexes, ledger);
    if market <= 0 {
        return Err(ActionError::InvalidPrice(market));
    }
    let price = (market - discount.max(0)).max(PRICE_FLOOR);

    let p = ledger.get_mut(player)?;
    if p.cash() < price {
        return Err(ActionError::InsufficientFunds {
            required: price,
            available: p.cash(),
        });
    }

    p.debit(price);
    p.consume_action();
    p.record_stock_action(&stock.name, StockAction::Buy);
    let owned = OwnedStock {
        stock: stock.clone(),
        purchase_price: price,
        purchase_round: round,
    };
    p.add_stock(owned.clone());
    info!(player = %player, stock = %stock.name, price, discount, "stock purchased");

    Ok(Purchase {
        player: player.clone(),
        stock: owned,
        price,
        discount,
        cash_after: p.cash(),
        actions_remaining: p.actions_remaining(),
    })
}

/// Sells the exact owned unit identified by `unit`.
///
/// The unit leaves the portfolio before pricing, so the seller does not count
/// toward the scarcity term of their own sale.
pub fn sell(
    ledger: &mut Ledger,
    player: &PlayerId,
    unit: &OwnedStockRef,
    indexes: &MarketIndexes,
) -> Result<Sale, ActionError> {
    check_lock(ledger, player, &unit.name, StockAction::Sell)?;

    let removed = ledger
        .get_mut(player)?
        .remove_stock(unit)
        .ok_or_else(|| ActionError::StockNotOwned(unit.name.clone()))?;

    let ownership = ledger.ownership_count(&unit.name);
    let sale_price = calculate_sell_price(&removed.stock, indexes, ownership);
    let profit_loss = sale_price - removed.purchase_price;

    let p = ledger.get_mut(player)?;
    p.credit(sale_price);
    p.consume_action();
    p.record_stock_action(&unit.name, StockAction::Sell);
    info!(player = %player, stock = %unit.name, sale_price, profit_loss, "stock sold");

    Ok(Sale {
        player: player.clone(),
        stock: removed,
        sale_price,
        profit_loss,
        cash_after: p.cash(),
        actions_remaining: p.actions_remaining(),
    })
}

/// The deck fresh board stocks are dealt from. Regenerates from the catalog
/// when it runs low.
#[derive(Clone, Debug, Default)]
pub struct StockSource {
    catalog: Vec<StockDefinition>,
    deck: ShuffledDeck<StockDefinition>,
}

impl StockSource {
    pub fn new<R: RandomSource + ?Sized>(catalog: Vec<StockDefinition>, rng: &mut R) -> Self {
        let deck = ShuffledDeck::shuffled(catalog.clone(), rng);
        Self { catalog, deck }
    }

    pub fn remaining(&self) -> usize {
        self.deck.len()
    }

    fn regenerate<R: RandomSource + ?Sized>(&mut self, rng: &mut R) {
        debug!(cards = self.catalog.len(), "regenerating stock deck");
        self.deck = ShuffledDeck::shuffled(self.catalog.clone(), rng);
    }

    /// Deals up to `count` stocks whose names are not in `exclude`.
    pub fn deal<R: RandomSource + ?Sized>(
        &mut self,
        count: usize,
        exclude: &BTreeSet<String>,
        rng: &mut R,
    ) -> Vec<StockDefinition> {
        if self.deck.len() <= count {
            self.regenerate(rng);
        }
        let mut dealt: Vec<StockDefinition> = Vec::with_capacity(count);
        let mut regenerated = false;
        while dealt.len() < count {
            let next = match self.deck.deal() {
                Some(s) => s,
                None if !regenerated => {
                    regenerated = true;
                    self.regenerate(rng);
                    continue;
                }
                None => break,
            };
            if exclude.contains(&next.name) || dealt.iter().any(|d| d.name == next.name) {
                continue;
            }
            dealt.push(next);
        }
        dealt
    }
}

/// A stock currently offered for purchase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoardStock {
    #[serde(flatten)]
    pub stock: StockDefinition,
    pub is_carryover: bool,
}

/// What changed on the board at a round boundary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardUpdate {
    pub kept: Vec<StockDefinition>,
    pub removed: Vec<StockDefinition>,
    pub added: Vec<StockDefinition>,
    pub board: Vec<BoardStock>,
}

/// The stocks currently offered for purchase.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StockBoard {
    stocks: Vec<BoardStock>,
}

impl StockBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stocks(&self) -> &[BoardStock] {
        &self.stocks
    }

    pub fn find(&self, name: &str) -> Option<&BoardStock> {
        self.stocks.iter().find(|s| s.stock.name == name)
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    /// Keeps owned stocks (tagged carryover), drops the rest, and deals up to
    /// `new_per_round` fresh stocks without exceeding `max_board`.
    pub fn update<R: RandomSource + ?Sized>(
        &mut self,
        ledger: &Ledger,
        source: &mut StockSource,
        max_board: usize,
        new_per_round: usize,
        rng: &mut R,
    ) -> BoardUpdate {
        let (mut kept, removed): (Vec<BoardStock>, Vec<BoardStock>) = self
            .stocks
            .drain(..)
            .partition(|s| ledger.ownership_count(&s.stock.name) > 0);
        for s in &mut kept {
            s.is_carryover = true;
        }
        // A board over capacity (e.g. after a rules change) keeps its oldest entries.
        kept.truncate(max_board);

        let space = max_board.saturating_sub(kept.len());
        let to_deal = new_per_round.min(space);
        let exclude: BTreeSet<String> = kept.iter().map(|s| s.stock.name.clone()).collect();
        let added = if to_deal > 0 {
            source.deal(to_deal, &exclude, rng)
        } else {
            Vec::new()
        };

        self.stocks = kept;
        self.stocks
            .extend(added.iter().cloned().map(|stock| BoardStock {
                stock,
                is_carryover: false,
            }));

        let kept_defs: Vec<StockDefinition> = self
            .stocks
            .iter()
            .filter(|s| s.is_carryover)
            .map(|s| s.stock.clone())
            .collect();
        let removed_defs: Vec<StockDefinition> = removed.into_iter().map(|s| s.stock).collect();
        info!(
            kept = kept_defs.len(),
            removed = removed_defs.len(),
            added = added.len(),
            "stock board rotated"
        );
        BoardUpdate {
            kept: kept_defs,
            removed: removed_defs,
            added,
            board: self.stocks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{MarketIndex, SectorId, SeededRandom};
    use proptest::prelude::*;

    fn stock(name: &str, base_cost: i64, growth: i64, sector: SectorId) -> StockDefinition {
        StockDefinition {
            name: name.to_string(),
            base_cost,
            dividend: 1,
            growth,
            sector,
            description: String::new(),
            archetype: String::new(),
        }
    }

    fn indexes(price: i64) -> MarketIndexes {
        MarketIndexes::new(
            SectorId::ALL
                .iter()
                .map(|s| MarketIndex::new(*s, price, ""))
                .collect(),
        )
    }

    fn ledger_with(players: &[&str], cash: i64, actions: u32) -> Ledger {
        let mut ledger = Ledger::new();
        let mut rng = SeededRandom::new(9);
        for p in players {
            ledger.add_player((*p).into(), cash, &mut rng);
            ledger.get_mut(&(*p).into()).unwrap().reset_turn(actions);
        }
        ledger
    }

    #[test]
    fn scarcity_pricing_scenario() {
        let idx = indexes(7);
        let x = stock("X", 6, 3, SectorId::Tech);
        let mut ledger = ledger_with(&["ana", "bo"], 40, 2);
        let first = purchase(&mut ledger, &"ana".into(), &x, &idx, 1).unwrap();
        assert_eq!(first.price, 13);
        assert_eq!(first.cash_after, 27);
        assert_eq!(first.actions_remaining, 1);
        let second = purchase(&mut ledger, &"bo".into(), &x, &idx, 1).unwrap();
        assert_eq!(second.price, 16);
        assert_eq!(ledger.ownership_count("X"), 2);
    }

    #[test]
    fn turn_lock_blocks_rebuy_and_sell() {
        let idx = indexes(4);
        let x = stock("X", 6, 3, SectorId::Tech);
        let mut ledger = ledger_with(&["ana"], 40, 3);
        let bought = purchase(&mut ledger, &"ana".into(), &x, &idx, 1).unwrap();
        assert_eq!(bought.price, 10);
        assert!(matches!(
            purchase(&mut ledger, &"ana".into(), &x, &idx, 1),
            Err(ActionError::DuplicateAction { .. })
        ));
        let unit = bought.stock.to_ref();
        assert!(matches!(
            sell(&mut ledger, &"ana".into(), &unit, &idx),
            Err(ActionError::ConflictingAction {
                previous: StockAction::Buy,
                ..
            })
        ));
        // state unchanged by the rejected sale
        assert_eq!(ledger.get(&"ana".into()).unwrap().actions_remaining(), 2);
        assert_eq!(ledger.ownership_count("X"), 1);

        ledger.get_mut(&"ana".into()).unwrap().reset_turn(3);
        let sale = sell(&mut ledger, &"ana".into(), &unit, &idx).unwrap();
        assert_eq!(sale.sale_price, 10 - 3);
        assert_eq!(sale.profit_loss, -3);
        assert_eq!(sale.cash_after, 40 - 10 + 7);
        assert!(matches!(
            purchase(&mut ledger, &"ana".into(), &x, &idx, 2),
            Err(ActionError::ConflictingAction { .. })
        ));
    }

    #[test]
    fn purchase_rejections_leave_state_unchanged() {
        let idx = indexes(7);
        let x = stock("X", 6, 3, SectorId::Tech);
        let mut ledger = ledger_with(&["ana"], 12, 2);
        let err = purchase(&mut ledger, &"ana".into(), &x, &idx, 1).unwrap_err();
        assert_eq!(
            err,
            ActionError::InsufficientFunds {
                required: 13,
                available: 12
            }
        );
        assert_eq!(err.to_string(), "insufficient funds: need $13, have $12");
        let ana = ledger.get(&"ana".into()).unwrap();
        assert_eq!(ana.cash(), 12);
        assert_eq!(ana.actions_remaining(), 2);
        assert_eq!(ana.stock_action("X"), None);

        assert!(matches!(
            purchase(&mut ledger, &"zed".into(), &x, &idx, 1),
            Err(ActionError::UnknownPlayer(_))
        ));
        ledger.get_mut(&"ana".into()).unwrap().reset_turn(0);
        assert_eq!(
            purchase(&mut ledger, &"ana".into(), &x, &idx, 1),
            Err(ActionError::NoActionsRemaining)
        );
    }

    #[test]
    fn discount_is_floored() {
        let idx = indexes(1);
        let cheap = stock("Penny", 0, 1, SectorId::Finance);
        let mut ledger = ledger_with(&["ana"], 40, 2);
        let p = purchase_with_discount(&mut ledger, &"ana".into(), &cheap, &idx, 1, 3).unwrap();
        assert_eq!(p.price, 1);
        let x = stock("X", 6, 3, SectorId::Tech);
        let p = purchase_with_discount(&mut ledger, &"ana".into(), &x, &idx, 1, 3).unwrap();
        assert_eq!(p.price, 4);
        assert_eq!(p.discount, 3);
    }

    #[test]
    fn selling_unowned_unit_fails() {
        let idx = indexes(5);
        let mut ledger = ledger_with(&["ana"], 40, 2);
        let unit = OwnedStockRef {
            name: "Ghost".into(),
            purchase_price: 9,
            purchase_round: 1,
        };
        assert_eq!(
            sell(&mut ledger, &"ana".into(), &unit, &idx),
            Err(ActionError::StockNotOwned("Ghost".into()))
        );
        assert_eq!(ledger.get(&"ana".into()).unwrap().actions_remaining(), 2);
    }

    fn catalog(n: usize) -> Vec<StockDefinition> {
        (0..n)
            .map(|i| stock(&format!("S{i}"), 2 + i as i64, 2, SectorId::ALL[i % 4]))
            .collect()
    }

    #[test]
    fn board_keeps_owned_and_deals_fresh() {
        let mut rng = SeededRandom::new(4);
        let idx = indexes(6);
        let mut source = StockSource::new(catalog(16), &mut rng);
        let mut board = StockBoard::new();
        let mut ledger = ledger_with(&["ana"], 100, 3);

        let first = board.update(&ledger, &mut source, 6, 3, &mut rng);
        assert_eq!(first.added.len(), 3);
        assert!(first.kept.is_empty());
        assert!(board.stocks().iter().all(|s| !s.is_carryover));

        let target = board.stocks()[0].stock.clone();
        purchase(&mut ledger, &"ana".into(), &target, &idx, 1).unwrap();

        let second = board.update(&ledger, &mut source, 6, 2, &mut rng);
        assert_eq!(second.kept, vec![target.clone()]);
        assert_eq!(second.removed.len(), 2);
        assert_eq!(second.added.len(), 2);
        assert_eq!(board.len(), 3);
        assert!(board.find(&target.name).unwrap().is_carryover);
        let names: BTreeSet<_> = board.stocks().iter().map(|s| s.stock.name.clone()).collect();
        assert_eq!(names.len(), board.len());
    }

    #[test]
    fn stock_source_regenerates() {
        let mut rng = SeededRandom::new(8);
        let mut source = StockSource::new(catalog(4), &mut rng);
        let none = BTreeSet::new();
        assert_eq!(source.deal(3, &none, &mut rng).len(), 3);
        // one card left: regenerate before dealing
        assert_eq!(source.deal(2, &none, &mut rng).len(), 2);
        let exclude: BTreeSet<String> = ["S0", "S1", "S2"].iter().map(|s| s.to_string()).collect();
        let dealt = source.deal(3, &exclude, &mut rng);
        assert_eq!(dealt.len(), 1);
        assert_eq!(dealt[0].name, "S3");
    }

    proptest! {
        #[test]
        fn sell_tax_formula(base in -5i64..20, growth in 1i64..8, index in 1i64..30, owners in 0usize..10) {
            let s = stock("P", base, growth, SectorId::Industrial);
            let idx = indexes(index);
            let price = calculate_price(&s, &idx, owners);
            prop_assert_eq!(price, base + index + growth * owners as i64);
            prop_assert_eq!(calculate_sell_price(&s, &idx, owners), (price - growth).max(1));
        }

        #[test]
        fn board_never_exceeds_capacity(seed in any::<u64>(), max_board in 1usize..8, per_round in 0usize..5, buys in proptest::collection::vec(0usize..8, 0..6)) {
            let mut rng = SeededRandom::new(seed);
            let idx = indexes(3);
            let mut source = StockSource::new(catalog(16), &mut rng);
            let mut board = StockBoard::new();
            let mut ledger = ledger_with(&["ana"], 10_000, 0);
            for b in buys {
                board.update(&ledger, &mut source, max_board, per_round, &mut rng);
                prop_assert!(board.len() <= max_board);
                for s in board.stocks().iter().filter(|s| s.is_carryover) {
                    prop_assert!(ledger.ownership_count(&s.stock.name) >= 1);
                }
                if let Some(target) = board.stocks().get(b).map(|s| s.stock.clone()) {
                    ledger.get_mut(&"ana".into()).unwrap().reset_turn(1);
                    purchase(&mut ledger, &"ana".into(), &target, &idx, 1).unwrap();
                }
            }
        }
    }
}
