//! The per-room game aggregate and its round sequence.
//!
//! Turn cycle: each "turn over" advances the seat pointer. When it wraps, the
//! end-of-round sequence runs (dividends, cleanup, end-timed conditionals,
//! bubble growth); the game then either ends or starts the next round (board
//! rotation, event draw, start-timed conditionals, seat rotation).

use crate::log::GameLog;
use crate::notify::{round_summary, BoardView, GameEvent, PlayerView, SessionSnapshot};
use crate::round::{Phase, RoundState};
use crate::SessionError;
use market_catalog::{Catalog, GameRules};
use market_core::{ActionKind, MarketIndexes, RandomSource, SeededRandom, Timing};
use market_engine::actions::{self, ActionContext};
use market_engine::score::{self, Ranking};
use market_engine::trading::{self, Purchase, Sale};
use market_engine::{
    ActionCard, ActionDeck, ActionError, CardEffect, CardId, ConditionalResult, DividendPayment,
    EventEngine, Ledger, OwnedStockRef, PlayerId, PlayerIdentity, StockBoard, StockSource,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// What a "turn over" led to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    NextTurn {
        player: PlayerId,
    },
    NewRound {
        round: u32,
        player: Option<PlayerId>,
    },
    GameEnded {
        rankings: Vec<Ranking>,
        winners: Vec<Ranking>,
    },
}

/// Carried from the end of one round into the summary of the next.
struct RoundReport {
    dividends: Vec<DividendPayment>,
    end_rolls: Vec<ConditionalResult>,
}

pub struct GameSession {
    room: String,
    rules: GameRules,
    catalog: Catalog,
    rng: Box<dyn RandomSource + Send>,
    phase: Phase,
    round: RoundState,
    ledger: Ledger,
    indexes: MarketIndexes,
    events: EventEngine,
    board: StockBoard,
    stock_source: StockSource,
    action_deck: ActionDeck,
    log: GameLog,
    outbox: Vec<GameEvent>,
    final_rankings: Vec<Ranking>,
}

impl GameSession {
    /// Seeds from `rules.rng_seed`, or from OS entropy when unset.
    pub fn new(room: impl Into<String>, catalog: Catalog, rules: GameRules) -> Self {
        let rng: Box<dyn RandomSource + Send> = match rules.rng_seed {
            Some(seed) => Box::new(SeededRandom::new(seed)),
            None => Box::new(SeededRandom::from_entropy()),
        };
        Self::with_random_source(room, catalog, rules, rng)
    }

    pub fn with_random_source(
        room: impl Into<String>,
        catalog: Catalog,
        rules: GameRules,
        rng: Box<dyn RandomSource + Send>,
    ) -> Self {
        let events = EventEngine::new(catalog.events.clone());
        Self {
            room: room.into(),
            rules,
            catalog,
            rng,
            phase: Phase::Lobby,
            round: RoundState::default(),
            ledger: Ledger::new(),
            indexes: MarketIndexes::default(),
            events,
            board: StockBoard::new(),
            stock_source: StockSource::default(),
            action_deck: ActionDeck::default(),
            log: GameLog::new(),
            outbox: Vec::new(),
            final_rankings: Vec::new(),
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round.round
    }

    pub fn round_state(&self) -> &RoundState {
        &self.round
    }

    pub fn current_player(&self) -> Option<&PlayerId> {
        match self.phase {
            Phase::AwaitingTurn => self.round.current_player(),
            _ => None,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn indexes(&self) -> &MarketIndexes {
        &self.indexes
    }

    pub fn board(&self) -> &StockBoard {
        &self.board
    }

    pub fn events(&self) -> &EventEngine {
        &self.events
    }

    pub fn log(&self) -> &GameLog {
        &self.log
    }

    pub fn action_deck_len(&self) -> usize {
        self.action_deck.len()
    }

    /// Rankings frozen at game end; empty while the game runs.
    pub fn final_rankings(&self) -> &[Ranking] {
        &self.final_rankings
    }

    /// Takes every notification queued since the last call.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Units of `stock` held by each player.
    pub fn ownership_by_player(&self, stock: &str) -> BTreeMap<PlayerId, usize> {
        self.ledger.ownership_by_player(stock)
    }

    pub fn net_worths(&self) -> BTreeMap<PlayerId, i64> {
        score::net_worths(&self.ledger, &self.indexes)
    }

    pub fn rankings(&self) -> Vec<Ranking> {
        score::rankings(&self.ledger, &self.indexes)
    }

    /// Live market price of a board stock.
    pub fn price_of(&self, stock: &str) -> Option<i64> {
        let s = self.board.find(stock)?;
        Some(trading::market_price(&s.stock, &self.indexes, &self.ledger))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let players = self
            .ledger
            .iter()
            .map(|p| PlayerView {
                id: p.id.clone(),
                identity: p.identity.clone(),
                cash: p.cash(),
                net_worth: score::net_worth(p, &self.ledger, &self.indexes),
                actions_remaining: p.actions_remaining(),
                portfolio: p.portfolio().to_vec(),
                hand: p.hand().to_vec(),
            })
            .collect();
        let board = self
            .board
            .stocks()
            .iter()
            .map(|s| BoardView {
                stock: s.clone(),
                price: trading::market_price(&s.stock, &self.indexes, &self.ledger),
                owned: self.ledger.ownership_count(&s.stock.name),
            })
            .collect();
        SessionSnapshot {
            room: self.room.clone(),
            phase: self.phase,
            round: self.round.round,
            max_rounds: self.rules.max_rounds,
            turn_order: self.round.turn_order.clone(),
            current_player: self.current_player().cloned(),
            players,
            board,
            indexes: self.indexes.clone(),
            active_events: self.events.active_events().to_vec(),
            visual_effects: self.events.visual_effects(),
        }
    }

    fn emit(&mut self, event: GameEvent) {
        self.outbox.push(event);
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Lobby => Err(SessionError::GameNotStarted),
            Phase::GameEnded => Err(SessionError::GameOver),
            Phase::AwaitingTurn => Ok(()),
        }
    }

    fn ensure_lobby(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Lobby => Ok(()),
            Phase::AwaitingTurn => Err(SessionError::GameAlreadyStarted),
            Phase::GameEnded => Err(SessionError::GameOver),
        }
    }

    fn ensure_turn(&self, player: &PlayerId) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.ledger.get(player)?;
        if !self.round.is_current(player) {
            return Err(SessionError::NotYourTurn(player.to_string()));
        }
        Ok(())
    }

    pub fn join(&mut self, player: impl Into<PlayerId>) -> Result<PlayerIdentity, SessionError> {
        let player = player.into();
        self.ensure_lobby()?;
        if !self
            .ledger
            .add_player(player.clone(), self.rules.starting_cash, &mut *self.rng)
        {
            return Err(SessionError::DuplicatePlayer(player.to_string()));
        }
        self.round.turn_order.push(player.clone());
        let identity = self.ledger.get(&player)?.identity.clone();
        self.log
            .record(format!("{} {player} joined {}", identity.emoji, self.room));
        self.emit(GameEvent::PlayerJoined {
            player,
            identity: identity.clone(),
        });
        self.emit(GameEvent::CashUpdated {
            cash: self.ledger.cash_balances(),
        });
        Ok(identity)
    }

    /// Removes a player at any point. Mid-game the rest of the state is kept;
    /// if the departing player held the turn, play passes on.
    pub fn leave(&mut self, player: &PlayerId) -> Result<(), SessionError> {
        if self.phase == Phase::GameEnded {
            return Err(SessionError::GameOver);
        }
        if self.ledger.remove_player(player).is_none() {
            return Err(ActionError::UnknownPlayer(player.to_string()).into());
        }
        let departure = self.round.remove(player);
        self.log.record(format!("🚪 {player} left {}", self.room));
        self.emit(GameEvent::PlayerLeft {
            player: player.clone(),
        });
        self.emit(GameEvent::CashUpdated {
            cash: self.ledger.cash_balances(),
        });
        if self.phase != Phase::AwaitingTurn {
            return Ok(());
        }
        self.emit(GameEvent::StockOwnershipUpdated {
            counts: self.ledger.ownership_counts(),
        });
        if self.ledger.is_empty() {
            self.finish_game();
            return Ok(());
        }
        if let Some(d) = departure {
            if d.wrapped {
                self.close_round();
            } else if d.was_current {
                self.begin_turn();
            }
        }
        Ok(())
    }

    /// Deals indexes, decks, hands and the opening board, then hands the turn
    /// to the first seat.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        self.ensure_lobby()?;
        let joined = self.ledger.len();
        if joined < self.rules.min_players {
            return Err(SessionError::NotEnoughPlayers {
                required: self.rules.min_players,
                joined,
            });
        }

        if self.rules.shuffle_turn_order {
            self.round.shuffle(&mut *self.rng);
        }
        self.indexes = self.catalog.build_indexes(&mut *self.rng);
        self.events.initialize(&mut *self.rng);
        self.stock_source = StockSource::new(self.catalog.stocks.clone(), &mut *self.rng);
        self.action_deck = ActionDeck::new(self.catalog.action_deck(), &mut *self.rng);
        for p in self.ledger.iter_mut() {
            for _ in 0..self.rules.starting_hand_size {
                if let Some(card) = self.action_deck.draw() {
                    p.add_card(card);
                }
            }
        }
        let opening = self.board.update(
            &self.ledger,
            &mut self.stock_source,
            self.rules.max_board_stocks,
            self.rules.initial_board_stocks,
            &mut *self.rng,
        );

        self.round.round = 1;
        self.round.current_turn = 0;
        self.phase = Phase::AwaitingTurn;
        self.log.set_round(1);
        self.log
            .record(format!("🎮 Game started with {joined} players"));
        self.log.record(format!(
            "📥 New stocks available: {}",
            names(opening.added.iter().map(|s| s.name.as_str()))
        ));
        info!(room = %self.room, players = joined, "game started");

        self.reset_current_player();
        let snapshot = self.snapshot();
        self.emit(GameEvent::GameStarted {
            snapshot: Box::new(snapshot),
        });
        self.announce_turn();
        Ok(())
    }

    /// Buys one unit of a board stock for the player whose turn it is.
    pub fn purchase_stock(
        &mut self,
        player: &PlayerId,
        stock: &str,
    ) -> Result<Purchase, SessionError> {
        self.ensure_turn(player)?;
        let def = self
            .board
            .find(stock)
            .ok_or_else(|| ActionError::StockNotOnBoard(stock.to_string()))?
            .stock
            .clone();
        let purchase =
            trading::purchase(&mut self.ledger, player, &def, &self.indexes, self.round.round)?;
        self.log.record(format!(
            "💰 {player} purchased {} for ${}",
            def.name, purchase.price
        ));
        self.broadcast_trade(player);
        Ok(purchase)
    }

    /// Sells the exact unit identified by `unit`.
    pub fn sell_stock(
        &mut self,
        player: &PlayerId,
        unit: &OwnedStockRef,
    ) -> Result<Sale, SessionError> {
        self.ensure_turn(player)?;
        let sale = trading::sell(&mut self.ledger, player, unit, &self.indexes)?;
        let trend = match sale.profit_loss {
            pl if pl > 0 => "📈",
            pl if pl < 0 => "📉",
            _ => "➖",
        };
        self.log.record(format!(
            "💰 {player} sold {} for ${} ({trend} {})",
            unit.name,
            sale.sale_price,
            market_core::signed(sale.profit_loss)
        ));
        self.broadcast_trade(player);
        Ok(sale)
    }

    /// Draws from the shared action deck into the player's hand. Costs one action.
    pub fn draw_action_card(&mut self, player: &PlayerId) -> Result<ActionCard, SessionError> {
        self.ensure_turn(player)?;
        let max = self.rules.max_hand_size;
        let p = self.ledger.get(player)?;
        if !p.has_actions() {
            return Err(ActionError::NoActionsRemaining.into());
        }
        if p.hand().len() >= max {
            return Err(ActionError::HandFull(max).into());
        }
        let card = self
            .action_deck
            .draw()
            .ok_or(ActionError::ActionDeckEmpty)?;
        let p = self.ledger.get_mut(player)?;
        p.consume_action();
        p.add_card(card.clone());
        self.log
            .record(format!("🃏 {player} drew an action card"));
        self.broadcast_hand(player);
        Ok(card)
    }

    /// Plays a card from the player's hand. `target` names a board stock for
    /// cards that need one.
    pub fn play_action_card(
        &mut self,
        player: &PlayerId,
        card_id: CardId,
        target: Option<&str>,
    ) -> Result<CardEffect, SessionError> {
        self.ensure_turn(player)?;
        let p = self.ledger.get(player)?;
        if !p.has_actions() {
            return Err(ActionError::NoActionsRemaining.into());
        }
        let card = p
            .card(card_id)
            .cloned()
            .ok_or(ActionError::CardNotFound(card_id.0))?;
        let target_def = match (card.needs_target(), target) {
            (false, _) => None,
            (true, None) => return Err(ActionError::MissingTarget(card.name().to_string()).into()),
            (true, Some(name)) => Some(
                self.board
                    .find(name)
                    .ok_or_else(|| ActionError::StockNotOnBoard(name.to_string()))?
                    .stock
                    .clone(),
            ),
        };

        let effect = actions::execute(
            &card.definition,
            ActionContext {
                player,
                target: target_def.as_ref(),
                round: self.round.round,
                ledger: &mut self.ledger,
                indexes: &mut self.indexes,
                events: &mut self.events,
                rng: &mut *self.rng,
            },
        )?;

        let p = self.ledger.get_mut(player)?;
        p.take_card(card_id);
        // the discounted purchase already spent the action
        if !matches!(card.definition.action, ActionKind::InsiderTrading { .. }) {
            p.consume_action();
        }
        self.log
            .record(format!("🎴 {player} played {}", card.name()));
        match card.definition.action {
            ActionKind::InsiderTrading { .. } => self.broadcast_trade(player),
            ActionKind::Manipulate { .. } => {
                self.emit(GameEvent::IndexesUpdated {
                    indexes: self.indexes.clone(),
                });
                self.emit(GameEvent::NetWorthUpdated {
                    net_worths: self.net_worths(),
                });
            }
            ActionKind::Forecast | ActionKind::Shuffle => {}
        }
        self.broadcast_hand(player);
        Ok(effect)
    }

    /// Ends `player`'s turn and advances the game.
    pub fn end_turn(&mut self, player: &PlayerId) -> Result<TurnOutcome, SessionError> {
        self.ensure_turn(player)?;
        self.process_round_cycle()
    }

    /// Advances one seat, running the round boundary when the seats wrap.
    pub fn process_round_cycle(&mut self) -> Result<TurnOutcome, SessionError> {
        self.ensure_in_progress()?;
        if self.round.advance() {
            return Ok(self.close_round());
        }
        self.begin_turn();
        match self.round.current_player().cloned() {
            Some(player) => Ok(TurnOutcome::NextTurn { player }),
            None => Ok(self.close_round()),
        }
    }

    fn close_round(&mut self) -> TurnOutcome {
        let report = self.end_of_round();
        if self.round.round >= self.rules.max_rounds {
            return self.finish_game();
        }
        self.round.round += 1;
        self.log.set_round(self.round.round);
        self.start_of_round(report);
        TurnOutcome::NewRound {
            round: self.round.round,
            player: self.round.current_player().cloned(),
        }
    }

    fn end_of_round(&mut self) -> RoundReport {
        let round = self.round.round;
        debug!(room = %self.room, round, "end of round");

        let dividends = self.ledger.pay_dividends(round);
        for p in &dividends {
            self.log
                .record(format!("💰 {} received ${} in dividends", p.player, p.total));
        }
        if !dividends.is_empty() {
            self.emit(GameEvent::DividendsPaid {
                round,
                payments: dividends.clone(),
            });
            self.emit(GameEvent::CashUpdated {
                cash: self.ledger.cash_balances(),
            });
        }

        let removed = self.events.cleanup_resolved_start_events();
        if removed > 0 {
            self.log.record(format!("✓ {removed} event(s) completed"));
        }

        let end_rolls =
            self.events
                .process_conditional_events(Timing::End, &mut self.indexes, &mut *self.rng);
        self.report_conditionals(&end_rolls);

        for growth in self.events.reapply_bubble_effects(&mut self.indexes) {
            if growth.results.is_empty() {
                continue;
            }
            self.log
                .record_price_changes("Bubble Growth", &growth.event, &growth.results, None);
            self.log.record(format!(
                "📈 {} continues (Round {})",
                growth.event, growth.rounds_active
            ));
        }

        RoundReport {
            dividends,
            end_rolls,
        }
    }

    fn start_of_round(&mut self, report: RoundReport) {
        let round = self.round.round;

        let update = self.board.update(
            &self.ledger,
            &mut self.stock_source,
            self.rules.max_board_stocks,
            self.rules.new_stocks_per_round,
            &mut *self.rng,
        );
        if !update.removed.is_empty() {
            self.log.record(format!(
                "📤 Removed unpurchased stocks: {}",
                names(update.removed.iter().map(|s| s.name.as_str()))
            ));
        }
        if !update.added.is_empty() {
            self.log.record(format!(
                "📥 New stocks available: {}",
                names(update.added.iter().map(|s| s.name.as_str()))
            ));
        } else if self.board.len() >= self.rules.max_board_stocks {
            self.log.record(format!(
                "📊 Stock board at maximum capacity ({} stocks)",
                self.rules.max_board_stocks
            ));
        }
        self.emit(GameEvent::BoardUpdated { update });

        let drawn = self
            .events
            .draw_and_activate(&mut self.indexes, &mut *self.rng);
        if let Some(d) = &drawn {
            let def = &d.event.definition;
            self.log
                .record(format!("📰 Event: {} - {}", def.name, def.description));
            if !d.results.is_empty() {
                self.log
                    .record_price_changes("Initial", &def.name, &d.results, None);
            }
            self.emit(GameEvent::EventDrawn {
                event: d.event.clone(),
                results: d.results.clone(),
            });
        }

        let start_rolls =
            self.events
                .process_conditional_events(Timing::Start, &mut self.indexes, &mut *self.rng);
        self.report_conditionals(&start_rolls);

        self.round.rotate();

        let summary = round_summary(
            round,
            &report.end_rolls,
            drawn.as_ref().map(|d| &d.event),
            self.events.active_events(),
            &report.dividends,
        );
        self.log.record(format!("Round {round} started"));
        self.emit(GameEvent::RoundStarted {
            round,
            summary,
            indexes: self.indexes.clone(),
            active_events: self.events.active_events().to_vec(),
            visual_effects: self.events.visual_effects(),
            recent_log: self.log.recent(5),
        });
        self.emit(GameEvent::StockOwnershipUpdated {
            counts: self.ledger.ownership_counts(),
        });
        self.emit(GameEvent::NetWorthUpdated {
            net_worths: self.net_worths(),
        });
        self.begin_turn();
    }

    fn report_conditionals(&mut self, results: &[ConditionalResult]) {
        for r in results {
            if r.triggered {
                self.log.record_price_changes(
                    "Bubble Pop",
                    r.event.name(),
                    &r.results,
                    Some(r.roll),
                );
                let suffix = if r.discarded { " (discarded)" } else { "" };
                self.log
                    .record(format!("💥 {} popped!{suffix}", r.event.name()));
                self.emit(GameEvent::EventTriggered { result: r.clone() });
            } else {
                self.log
                    .record(format!("✓ {} held (remains active)", r.event.name()));
            }
        }
    }

    fn finish_game(&mut self) -> TurnOutcome {
        let rankings = self.rankings();
        let winners = score::winners(&rankings);
        let message = score::end_game_message(&rankings);
        self.log.record(format!(
            "🎉 Game ended! Winner(s): {}",
            names(winners.iter().map(|w| w.player.as_str()))
        ));
        info!(room = %self.room, round = self.round.round, "game ended");
        self.phase = Phase::GameEnded;
        self.final_rankings = rankings.clone();
        self.emit(GameEvent::GameEnded {
            rankings: rankings.clone(),
            winners: winners.clone(),
            message,
        });
        TurnOutcome::GameEnded { rankings, winners }
    }

    fn reset_current_player(&mut self) {
        let actions = self.rules.actions_per_turn;
        if let Some(player) = self.round.current_player().cloned() {
            if let Ok(p) = self.ledger.get_mut(&player) {
                p.reset_turn(actions);
            }
        }
    }

    fn announce_turn(&mut self) {
        let Some(player) = self.round.current_player().cloned() else {
            return;
        };
        let actions_remaining = self
            .ledger
            .get(&player)
            .map(|p| p.actions_remaining())
            .unwrap_or(0);
        debug!(room = %self.room, player = %player, "turn started");
        self.emit(GameEvent::TurnStarted {
            player: player.clone(),
            round: self.round.round,
        });
        self.emit(GameEvent::ActionsUpdated {
            player,
            actions_remaining,
        });
    }

    fn begin_turn(&mut self) {
        self.reset_current_player();
        self.announce_turn();
    }

    fn broadcast_trade(&mut self, player: &PlayerId) {
        let (portfolio, actions_remaining) = match self.ledger.get(player) {
            Ok(p) => (p.portfolio().to_vec(), p.actions_remaining()),
            Err(_) => return,
        };
        self.emit(GameEvent::CashUpdated {
            cash: self.ledger.cash_balances(),
        });
        self.emit(GameEvent::PortfolioUpdated {
            player: player.clone(),
            portfolio,
        });
        self.emit(GameEvent::StockOwnershipUpdated {
            counts: self.ledger.ownership_counts(),
        });
        self.emit(GameEvent::ActionsUpdated {
            player: player.clone(),
            actions_remaining,
        });
        self.emit(GameEvent::NetWorthUpdated {
            net_worths: self.net_worths(),
        });
    }

    fn broadcast_hand(&mut self, player: &PlayerId) {
        let (hand, actions_remaining) = match self.ledger.get(player) {
            Ok(p) => (p.hand().to_vec(), p.actions_remaining()),
            Err(_) => return,
        };
        self.emit(GameEvent::HandUpdated {
            player: player.clone(),
            hand,
        });
        self.emit(GameEvent::ActionsUpdated {
            player: player.clone(),
            actions_remaining,
        });
    }
}

fn names<'a>(it: impl Iterator<Item = &'a str>) -> String {
    it.collect::<Vec<_>>().join(", ")
}
