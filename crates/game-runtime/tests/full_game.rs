use game_runtime::{bot, GameEvent, GameSession, Phase, SessionError, TurnOutcome};
use market_catalog::{Catalog, GameRules};
use market_engine::PlayerId;

fn seeded_rules(seed: u64) -> GameRules {
    GameRules {
        rng_seed: Some(seed),
        ..GameRules::default()
    }
}

fn play_out(seed: u64, players: &[&str]) -> (GameSession, Vec<GameEvent>) {
    let mut session = GameSession::new("it", Catalog::builtin().unwrap(), seeded_rules(seed));
    for p in players {
        session.join(*p).unwrap();
    }
    session.start_game().unwrap();
    let mut events = session.drain_events();
    let mut turns = 0;
    while session.phase() != Phase::GameEnded {
        bot::play_turn(&mut session).unwrap();
        events.extend(session.drain_events());
        turns += 1;
        assert!(turns <= 6 * players.len(), "game did not terminate");
    }
    (session, events)
}

#[test]
fn two_bot_game_runs_to_completion() {
    let (session, events) = play_out(2024, &["ana", "bo"]);

    assert_eq!(session.round(), 6);
    let ended: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GameEvent::GameEnded {
                rankings,
                winners,
                message,
            } => Some((rankings, winners, message)),
            _ => None,
        })
        .collect();
    assert_eq!(ended.len(), 1);
    let (rankings, winners, message) = ended[0];
    assert_eq!(rankings.len(), 2);
    assert!(rankings[0].net_worth >= rankings[1].net_worth);
    assert!(!winners.is_empty());
    assert!(message.starts_with("🎉 GAME OVER"));

    let rounds_started: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            GameEvent::RoundStarted { round, .. } => Some(*round),
            _ => None,
        })
        .collect();
    assert_eq!(rounds_started, vec![2, 3, 4, 5, 6]);
}

#[test]
fn dividends_only_after_even_rounds() {
    let (_, events) = play_out(7, &["ana", "bo", "cy"]);
    let paid: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            GameEvent::DividendsPaid { round, .. } => Some(*round),
            _ => None,
        })
        .collect();
    assert!(!paid.is_empty());
    assert!(paid.iter().all(|r| r % 2 == 0));
}

#[test]
fn index_prices_stay_above_the_floor() {
    for seed in [1, 2, 3, 4, 5] {
        let (session, events) = play_out(seed, &["ana", "bo"]);
        assert!(session.indexes().iter().all(|i| i.price() >= 1));
        for e in &events {
            if let GameEvent::EventDrawn { results, .. } = e {
                assert!(results.iter().all(|c| c.new_price >= 1));
            }
        }
    }
}

#[test]
fn same_seed_same_game() {
    let (a, _) = play_out(99, &["ana", "bo"]);
    let (b, _) = play_out(99, &["ana", "bo"]);
    assert_eq!(a.final_rankings(), b.final_rankings());
    assert_eq!(a.indexes(), b.indexes());
}

#[test]
fn finished_game_rejects_everything() {
    let (mut session, _) = play_out(5, &["ana", "bo"]);
    let ana = PlayerId::from("ana");
    assert_eq!(session.end_turn(&ana), Err(SessionError::GameOver));
    assert_eq!(session.draw_action_card(&ana), Err(SessionError::GameOver));
    assert_eq!(session.process_round_cycle(), Err(SessionError::GameOver));
    assert!(matches!(
        bot::play_turn(&mut session),
        Err(SessionError::GameOver)
    ));
}

#[test]
fn last_turn_reports_the_end() {
    let mut session = GameSession::new(
        "it",
        Catalog::builtin().unwrap(),
        GameRules {
            max_rounds: 1,
            ..seeded_rules(8)
        },
    );
    session.join("ana").unwrap();
    session.join("bo").unwrap();
    session.start_game().unwrap();
    bot::play_turn(&mut session).unwrap();
    let last = bot::play_turn(&mut session).unwrap();
    assert!(matches!(last.outcome, TurnOutcome::GameEnded { .. }));
}
