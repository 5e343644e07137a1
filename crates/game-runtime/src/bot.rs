//! Greedy autopilot for seats with nobody behind them. Used by the CLI
//! driver, simulations and benchmarks.

use crate::round::Phase;
use crate::session::{GameSession, TurnOutcome};
use crate::SessionError;
use market_core::StockDefinition;
use market_engine::trading;
use market_engine::{OwnedStockRef, PlayerId};
use serde::Serialize;
use tracing::debug;

/// Desirability of holding a stock: dividend yield dominates, scarcity growth
/// (future resale value) breaks ties.
pub fn utility(stock: &StockDefinition, price: i64) -> f64 {
    if price <= 0 {
        return 0.0;
    }
    let yield_ = stock.dividend as f64 / price as f64;
    let growth = stock.growth as f64 / price as f64;
    yield_ * 0.7 + growth * 0.3
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "move", rename_all = "snake_case")]
pub enum BotMove {
    Sold { stock: String, price: i64, profit: i64 },
    Bought { stock: String, price: i64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BotTurn {
    pub player: PlayerId,
    pub moves: Vec<BotMove>,
    pub outcome: TurnOutcome,
}

/// Sells the first unit that would close at a profit, buys the most useful
/// affordable board stocks with the remaining actions, then ends the turn.
pub fn play_turn(session: &mut GameSession) -> Result<BotTurn, SessionError> {
    let player = match (session.phase(), session.current_player()) {
        (Phase::GameEnded, _) => return Err(SessionError::GameOver),
        (_, None) => return Err(SessionError::GameNotStarted),
        (_, Some(p)) => p.clone(),
    };
    let mut moves = Vec::new();

    if let Some(unit) = profitable_unit(session, &player)? {
        let sale = session.sell_stock(&player, &unit)?;
        moves.push(BotMove::Sold {
            stock: unit.name,
            price: sale.sale_price,
            profit: sale.profit_loss,
        });
    }

    while let Some(name) = best_buy(session, &player)? {
        let purchase = session.purchase_stock(&player, &name)?;
        moves.push(BotMove::Bought {
            stock: name,
            price: purchase.price,
        });
    }

    debug!(player = %player, moves = moves.len(), "bot turn");
    let outcome = session.end_turn(&player)?;
    Ok(BotTurn {
        player,
        moves,
        outcome,
    })
}

fn profitable_unit(
    session: &GameSession,
    player: &PlayerId,
) -> Result<Option<OwnedStockRef>, SessionError> {
    let me = session.ledger().get(player)?;
    if !me.has_actions() {
        return Ok(None);
    }
    let unit = me
        .portfolio()
        .iter()
        .filter(|u| me.stock_action(u.name()).is_none())
        .find(|u| {
            let others = session.ledger().ownership_count(u.name()).saturating_sub(1);
            trading::calculate_sell_price(&u.stock, session.indexes(), others) > u.purchase_price
        })
        .map(|u| u.to_ref());
    Ok(unit)
}

fn best_buy(session: &GameSession, player: &PlayerId) -> Result<Option<String>, SessionError> {
    let me = session.ledger().get(player)?;
    if !me.has_actions() {
        return Ok(None);
    }
    let best = session
        .board()
        .stocks()
        .iter()
        .filter(|b| me.stock_action(&b.stock.name).is_none())
        .filter_map(|b| {
            let price = session.price_of(&b.stock.name)?;
            (price <= me.cash()).then(|| (utility(&b.stock, price), b.stock.name.clone()))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, name)| name);
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_catalog::{Catalog, GameRules};
    use market_core::SectorId;

    fn stock(dividend: i64, growth: i64) -> StockDefinition {
        StockDefinition {
            name: "X".to_string(),
            sector: SectorId::Tech,
            base_cost: 4,
            dividend,
            growth,
            description: String::new(),
            archetype: String::new(),
        }
    }

    #[test]
    fn utility_prefers_yield() {
        assert!(utility(&stock(1, 2), 10) < utility(&stock(3, 2), 10));
        assert!(utility(&stock(2, 2), 10) < utility(&stock(2, 4), 10));
        assert!(utility(&stock(2, 2), 20) < utility(&stock(2, 2), 10));
        assert_eq!(utility(&stock(2, 2), 0), 0.0);
    }

    #[test]
    fn bot_spends_its_actions_and_passes() {
        let mut s = GameSession::new(
            "bots",
            Catalog::builtin().unwrap(),
            GameRules {
                rng_seed: Some(11),
                shuffle_turn_order: false,
                ..GameRules::default()
            },
        );
        s.join("ana").unwrap();
        s.join("bo").unwrap();
        s.start_game().unwrap();

        let turn = play_turn(&mut s).unwrap();
        assert_eq!(turn.player, PlayerId::from("ana"));
        assert_eq!(turn.moves.len(), 2);
        assert!(turn
            .moves
            .iter()
            .all(|m| matches!(m, BotMove::Bought { .. })));
        assert_eq!(
            turn.outcome,
            TurnOutcome::NextTurn {
                player: PlayerId::from("bo")
            }
        );
        assert_eq!(s.ledger().get(&"ana".into()).unwrap().portfolio().len(), 2);
    }
}
