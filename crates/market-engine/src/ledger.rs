//! Per-player cash, portfolio, action budget and hand.

use crate::actions::{ActionCard, CardId};
use crate::ActionError;
use market_core::{RandomSource, StockDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

const COLORS: [&str; 10] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#FFA07A", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E2",
    "#F8B739", "#52BE80",
];

const EMOJIS: [&str; 40] = [
    "🎮", "🎯", "🎲", "🎪", "🎨", "🎭", "🎸", "🎺", "🎻", "🎤", "🏆", "⚽", "🏀", "🏈", "⚾", "🎾",
    "🏐", "🏉", "🎱", "🏓", "🐶", "🐱", "🐭", "🐹", "🐰", "🦊", "🐻", "🐼", "🐨", "🐯", "🦁", "🐮",
    "🐷", "🐸", "🐵", "🐔", "🐧", "🐦", "🐤", "🦆",
];

/// Player identifier (the display name chosen on join).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        PlayerId(s.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(s: String) -> Self {
        PlayerId(s)
    }
}

/// Kind of trade a player made on a stock this turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockAction {
    Buy,
    Sell,
}

impl fmt::Display for StockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StockAction::Buy => "buy",
            StockAction::Sell => "sell",
        })
    }
}

/// A unit of stock held in one player's portfolio.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedStock {
    #[serde(flatten)]
    pub stock: StockDefinition,
    pub purchase_price: i64,
    pub purchase_round: u32,
}

impl OwnedStock {
    pub fn name(&self) -> &str {
        &self.stock.name
    }

    pub fn to_ref(&self) -> OwnedStockRef {
        OwnedStockRef {
            name: self.stock.name.clone(),
            purchase_price: self.purchase_price,
            purchase_round: self.purchase_round,
        }
    }

    fn matches(&self, r: &OwnedStockRef) -> bool {
        self.stock.name == r.name
            && self.purchase_price == r.purchase_price
            && self.purchase_round == r.purchase_round
    }
}

/// Identifies one owned unit; a player may hold several units of the same stock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedStockRef {
    pub name: String,
    pub purchase_price: i64,
    pub purchase_round: u32,
}

/// Display identity assigned on join.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    pub color: String,
    pub emoji: String,
}

/// Dividends credited to one player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DividendPayment {
    pub player: PlayerId,
    pub total: i64,
    pub by_stock: Vec<(String, i64)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerLedger {
    pub id: PlayerId,
    cash: i64,
    portfolio: Vec<OwnedStock>,
    actions_remaining: u32,
    stock_actions: BTreeMap<String, StockAction>,
    hand: Vec<ActionCard>,
    pub identity: PlayerIdentity,
}

impl PlayerLedger {
    pub fn new(id: PlayerId, cash: i64, identity: PlayerIdentity) -> Self {
        Self {
            id,
            cash,
            portfolio: Vec::new(),
            actions_remaining: 0,
            stock_actions: BTreeMap::new(),
            hand: Vec::new(),
            identity,
        }
    }

    pub fn cash(&self) -> i64 {
        self.cash
    }

    pub fn credit(&mut self, amount: i64) {
        self.cash += amount;
    }

    /// Debits cash; callers check affordability first.
    pub fn debit(&mut self, amount: i64) {
        self.cash -= amount;
    }

    pub fn actions_remaining(&self) -> u32 {
        self.actions_remaining
    }

    pub fn has_actions(&self) -> bool {
        self.actions_remaining > 0
    }

    /// Uses one action. Returns false (and changes nothing) when none are left.
    pub fn consume_action(&mut self) -> bool {
        if self.actions_remaining == 0 {
            return false;
        }
        self.actions_remaining -= 1;
        true
    }

    /// Start-of-turn reset of the action budget and the per-stock trade locks.
    pub fn reset_turn(&mut self, actions: u32) {
        self.actions_remaining = actions;
        self.stock_actions.clear();
    }

    pub fn stock_action(&self, stock: &str) -> Option<StockAction> {
        self.stock_actions.get(stock).copied()
    }

    pub fn record_stock_action(&mut self, stock: &str, action: StockAction) {
        self.stock_actions.insert(stock.to_string(), action);
    }

    pub fn portfolio(&self) -> &[OwnedStock] {
        &self.portfolio
    }

    pub fn add_stock(&mut self, stock: OwnedStock) {
        self.portfolio.push(stock);
    }

    /// Removes the exact unit (name + purchase price + purchase round).
    pub fn remove_stock(&mut self, r: &OwnedStockRef) -> Option<OwnedStock> {
        let pos = self.portfolio.iter().position(|s| s.matches(r))?;
        Some(self.portfolio.remove(pos))
    }

    pub fn units_of(&self, stock: &str) -> usize {
        self.portfolio.iter().filter(|s| s.name() == stock).count()
    }

    pub fn hand(&self) -> &[ActionCard] {
        &self.hand
    }

    pub fn card(&self, id: CardId) -> Option<&ActionCard> {
        self.hand.iter().find(|c| c.id == id)
    }

    pub fn add_card(&mut self, card: ActionCard) {
        self.hand.push(card);
    }

    pub fn take_card(&mut self, id: CardId) -> Option<ActionCard> {
        let pos = self.hand.iter().position(|c| c.id == id)?;
        Some(self.hand.remove(pos))
    }

    fn dividends(&self) -> Option<DividendPayment> {
        let by_stock: Vec<(String, i64)> = self
            .portfolio
            .iter()
            .filter(|s| s.stock.dividend > 0)
            .map(|s| (s.stock.name.clone(), s.stock.dividend))
            .collect();
        let total: i64 = by_stock.iter().map(|(_, d)| d).sum();
        (total > 0).then(|| DividendPayment {
            player: self.id.clone(),
            total,
            by_stock,
        })
    }
}

/// Hands out distinct colors and emojis, recycling when a palette runs out.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct IdentityPalette {
    used_colors: BTreeSet<String>,
    used_emojis: BTreeSet<String>,
}

impl IdentityPalette {
    fn pick<R: RandomSource + ?Sized>(
        options: &[&str],
        used: &mut BTreeSet<String>,
        rng: &mut R,
    ) -> String {
        let free: Vec<&str> = options
            .iter()
            .copied()
            .filter(|o| !used.contains(*o))
            .collect();
        if free.is_empty() {
            used.clear();
            let i = rng.next_int(0, options.len() as i64 - 1) as usize;
            return options[i].to_string();
        }
        let choice = free[rng.next_int(0, free.len() as i64 - 1) as usize].to_string();
        used.insert(choice.clone());
        choice
    }

    fn assign<R: RandomSource + ?Sized>(&mut self, rng: &mut R) -> PlayerIdentity {
        PlayerIdentity {
            color: Self::pick(&COLORS, &mut self.used_colors, rng),
            emoji: Self::pick(&EMOJIS, &mut self.used_emojis, rng),
        }
    }

    fn release(&mut self, identity: &PlayerIdentity) {
        self.used_colors.remove(&identity.color);
        self.used_emojis.remove(&identity.emoji);
    }
}

/// All player ledgers of one game, in join order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Ledger {
    players: Vec<PlayerLedger>,
    palette: IdentityPalette,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player with `starting_cash`. Returns false if the id is taken.
    pub fn add_player<R: RandomSource + ?Sized>(
        &mut self,
        id: PlayerId,
        starting_cash: i64,
        rng: &mut R,
    ) -> bool {
        if self.contains(&id) {
            return false;
        }
        let identity = self.palette.assign(rng);
        self.players.push(PlayerLedger::new(id, starting_cash, identity));
        true
    }

    pub fn remove_player(&mut self, id: &PlayerId) -> Option<PlayerLedger> {
        let pos = self.players.iter().position(|p| &p.id == id)?;
        let removed = self.players.remove(pos);
        self.palette.release(&removed.identity);
        Some(removed)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.iter().any(|p| &p.id == id)
    }

    pub fn get(&self, id: &PlayerId) -> Result<&PlayerLedger, ActionError> {
        self.players
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| ActionError::UnknownPlayer(id.0.clone()))
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Result<&mut PlayerLedger, ActionError> {
        self.players
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ActionError::UnknownPlayer(id.0.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerLedger> {
        self.players.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerLedger> {
        self.players.iter_mut()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Units of `stock` held across all players, counted live.
    pub fn ownership_count(&self, stock: &str) -> usize {
        self.players.iter().map(|p| p.units_of(stock)).sum()
    }

    pub fn ownership_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for s in self.players.iter().flat_map(|p| p.portfolio.iter()) {
            *counts.entry(s.stock.name.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Units of `stock` per holder; players holding none are omitted.
    pub fn ownership_by_player(&self, stock: &str) -> BTreeMap<PlayerId, usize> {
        self.players
            .iter()
            .map(|p| (p.id.clone(), p.units_of(stock)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    pub fn cash_balances(&self) -> BTreeMap<PlayerId, i64> {
        self.players.iter().map(|p| (p.id.clone(), p.cash)).collect()
    }

    /// Credits dividends iff `round` is even. Returns one entry per paid player.
    pub fn pay_dividends(&mut self, round: u32) -> Vec<DividendPayment> {
        if round % 2 != 0 {
            return Vec::new();
        }
        let mut payments = Vec::new();
        for p in &mut self.players {
            if let Some(payment) = p.dividends() {
                p.credit(payment.total);
                payments.push(payment);
            }
        }
        payments
    }
}
