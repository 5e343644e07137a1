//! Net worth, rankings and winners.

use crate::ledger::{Ledger, PlayerId, PlayerLedger};
use crate::trading::calculate_price;
use market_core::MarketIndexes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cash plus every held unit at its live scarcity price. No sell tax applies.
pub fn net_worth(player: &PlayerLedger, ledger: &Ledger, indexes: &MarketIndexes) -> i64 {
    let holdings: i64 = player
        .portfolio()
        .iter()
        .map(|unit| calculate_price(&unit.stock, indexes, ledger.ownership_count(unit.name())))
        .sum();
    player.cash() + holdings
}

pub fn net_worths(ledger: &Ledger, indexes: &MarketIndexes) -> BTreeMap<PlayerId, i64> {
    ledger
        .iter()
        .map(|p| (p.id.clone(), net_worth(p, ledger, indexes)))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    pub player: PlayerId,
    pub cash: i64,
    pub net_worth: i64,
    pub stock_count: usize,
}

/// Players by net worth, highest first. Ties keep join order.
pub fn rankings(ledger: &Ledger, indexes: &MarketIndexes) -> Vec<Ranking> {
    let mut out: Vec<Ranking> = ledger
        .iter()
        .map(|p| Ranking {
            player: p.id.clone(),
            cash: p.cash(),
            net_worth: net_worth(p, ledger, indexes),
            stock_count: p.portfolio().len(),
        })
        .collect();
    out.sort_by(|a, b| b.net_worth.cmp(&a.net_worth));
    out
}

/// Every player tied at the top net worth.
pub fn winners(rankings: &[Ranking]) -> Vec<Ranking> {
    let Some(top) = rankings.iter().map(|r| r.net_worth).max() else {
        return Vec::new();
    };
    rankings
        .iter()
        .filter(|r| r.net_worth == top)
        .cloned()
        .collect()
}

/// Final standings announcement.
pub fn end_game_message(rankings: &[Ranking]) -> String {
    let mut msg = String::from("🎉 GAME OVER - Rounds Complete! 🎉\n\n");
    let top = winners(rankings);
    if let Some(first) = top.first() {
        if top.len() == 1 {
            msg.push_str(&format!("👑 WINNER: {} 👑\n", first.player));
        } else {
            let names = top
                .iter()
                .map(|r| r.player.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            msg.push_str(&format!("👑 TIE - Winners: {names} 👑\n"));
        }
        msg.push_str(&format!("Net Worth: ${}\n\n", first.net_worth));
    }
    msg.push_str("📊 Final Standings:\n");
    for (i, r) in rankings.iter().enumerate() {
        let medal = match i {
            0 => "🥇",
            1 => "🥈",
            2 => "🥉",
            _ => "  ",
        };
        msg.push_str(&format!("{medal} {}. {}\n", i + 1, r.player));
        msg.push_str(&format!(
            "   💰 Cash: ${} | 📈 Net Worth: ${} | 📊 Stocks: {}\n",
            r.cash, r.net_worth, r.stock_count
        ));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::OwnedStock;
    use market_core::{MarketIndex, SectorId, SeededRandom, StockDefinition};
    use proptest::prelude::*;

    fn indexes() -> MarketIndexes {
        MarketIndexes::new(vec![MarketIndex::new(SectorId::Tech, 7, "")])
    }

    fn unit(name: &str, paid: i64) -> OwnedStock {
        OwnedStock {
            stock: StockDefinition {
                name: name.to_string(),
                base_cost: 6,
                dividend: 1,
                growth: 3,
                sector: SectorId::Tech,
                description: String::new(),
                archetype: String::new(),
            },
            purchase_price: paid,
            purchase_round: 1,
        }
    }

    fn ledger(cash: &[(&str, i64)]) -> Ledger {
        let mut rng = SeededRandom::new(9);
        let mut ledger = Ledger::new();
        for (name, c) in cash {
            ledger.add_player(PlayerId::from(*name), *c, &mut rng);
        }
        ledger
    }

    #[test]
    fn net_worth_uses_live_scarcity_price() {
        let mut l = ledger(&[("ana", 20), ("bo", 30)]);
        l.get_mut(&"ana".into()).unwrap().add_stock(unit("X", 13));
        l.get_mut(&"bo".into()).unwrap().add_stock(unit("X", 16));
        // 6 + 7 + 3 * 2 owned
        let worths = net_worths(&l, &indexes());
        assert_eq!(worths[&PlayerId::from("ana")], 39);
        assert_eq!(worths[&PlayerId::from("bo")], 49);
    }

    #[test]
    fn ties_produce_co_winners() {
        let l = ledger(&[("ana", 40), ("bo", 40), ("cy", 10)]);
        let ranked = rankings(&l, &indexes());
        assert_eq!(ranked[0].player, PlayerId::from("ana"));
        assert_eq!(ranked[2].player, PlayerId::from("cy"));
        let top = winners(&ranked);
        assert_eq!(top.len(), 2);
        let msg = end_game_message(&ranked);
        assert!(msg.contains("👑 TIE - Winners: ana, bo 👑"));
        assert!(msg.contains("🥉 3. cy"));
    }

    #[test]
    fn single_winner_message() {
        let l = ledger(&[("ana", 12), ("bo", 40)]);
        let msg = end_game_message(&rankings(&l, &indexes()));
        assert!(msg.contains("👑 WINNER: bo 👑\nNet Worth: $40"));
        assert!(winners(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn rankings_sorted_and_winners_share_max(cash in proptest::collection::vec(0i64..100, 1..6)) {
            let names: Vec<String> = (0..cash.len()).map(|i| format!("p{i}")).collect();
            let pairs: Vec<(&str, i64)> = names.iter().map(String::as_str).zip(cash.iter().copied()).collect();
            let ranked = rankings(&ledger(&pairs), &indexes());
            prop_assert!(ranked.windows(2).all(|w| w[0].net_worth >= w[1].net_worth));
            let max = *cash.iter().max().unwrap();
            let top = winners(&ranked);
            prop_assert!(!top.is_empty());
            prop_assert!(top.iter().all(|r| r.net_worth == max));
            prop_assert_eq!(top.len(), cash.iter().filter(|c| **c == max).count());
        }
    }
}
