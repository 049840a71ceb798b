use chrono::Utc;
use uuid::Uuid;

use matchday_live::game::stats_calculator::{StatsCalculator, StatsError};
use matchday_live::models::match_events::{EventKind, MatchEvent, TeamSide};
use matchday_live::models::statistics::MatchStatsSnapshot;

struct Log {
    match_id: Uuid,
    home_team: Uuid,
    away_team: Uuid,
    events: Vec<MatchEvent>,
}

impl Log {
    fn new() -> Self {
        Self {
            match_id: Uuid::new_v4(),
            home_team: Uuid::new_v4(),
            away_team: Uuid::new_v4(),
            events: Vec::new(),
        }
    }

    fn push(&mut self, kind: EventKind, side: TeamSide, player_id: Option<Uuid>) -> MatchEvent {
        let event = MatchEvent {
            event_id: Uuid::new_v4(),
            match_id: self.match_id,
            sequence_no: self.events.len() as i64 + 1,
            kind,
            minute: self.events.len() as u16,
            team_id: match side {
                TeamSide::Home => self.home_team,
                TeamSide::Away => self.away_team,
            },
            team_side: side,
            player_id,
            timestamp: Utc::now(),
        };
        self.events.push(event.clone());
        event
    }
}

#[test]
fn penalty_goal_on_level_match_only_touches_home() {
    let mut log = Log::new();
    let scorer = Uuid::new_v4();
    let event = log.push(EventKind::Goal { penalty: true }, TeamSide::Home, Some(scorer));

    let empty = MatchStatsSnapshot::empty(log.match_id);
    let next = StatsCalculator::apply_event(&empty, &event).unwrap();

    assert_eq!(next.home.goals, 1);
    assert_eq!(next.home.penalty_goals, 1);
    assert_eq!(next.away, empty.away);
    assert_eq!(next.player(scorer).unwrap().penalty_goals, 1);
    assert_eq!(StatsCalculator::score(&next).home, 1);
    assert_eq!(StatsCalculator::score(&next).away, 0);
}

#[test]
fn shots_count_on_target_only_when_flagged() {
    let mut log = Log::new();
    let shooter = Uuid::new_v4();
    log.push(EventKind::Shot { on_target: true }, TeamSide::Away, Some(shooter));
    log.push(EventKind::Shot { on_target: false }, TeamSide::Away, Some(shooter));

    let stats = StatsCalculator::replay(log.match_id, &log.events).unwrap();

    assert_eq!(stats.away.shots, 2);
    assert_eq!(stats.away.shots_on_target, 1);
    assert_eq!(stats.home.shots, 0);
    let player = stats.player(shooter).unwrap();
    assert_eq!(player.shots, 2);
    assert_eq!(player.shots_on_target, 1);
}

#[test]
fn possession_is_replaced_not_summed() {
    let mut log = Log::new();
    log.push(EventKind::PossessionUpdate { home_percent: 60 }, TeamSide::Home, None);
    log.push(EventKind::PossessionUpdate { home_percent: 45 }, TeamSide::Home, None);

    let stats = StatsCalculator::replay(log.match_id, &log.events).unwrap();

    assert_eq!(stats.home.possession, Some(45));
    assert_eq!(stats.away.possession, Some(55));
}

#[test]
fn fouls_credit_both_players() {
    let mut log = Log::new();
    let offender = Uuid::new_v4();
    let victim = Uuid::new_v4();
    log.push(EventKind::Foul { suffered_by: Some(victim) }, TeamSide::Home, Some(offender));

    let stats = StatsCalculator::replay(log.match_id, &log.events).unwrap();

    assert_eq!(stats.home.fouls, 1);
    assert_eq!(stats.player(offender).unwrap().fouls_committed, 1);
    let victim_stats = stats.player(victim).unwrap();
    assert_eq!(victim_stats.fouls_suffered, 1);
    assert_eq!(victim_stats.team_side, TeamSide::Away);
}

#[test]
fn substitution_marks_both_players() {
    let mut log = Log::new();
    let on = Uuid::new_v4();
    let off = Uuid::new_v4();
    log.push(EventKind::Substitution { player_out: Some(off) }, TeamSide::Away, Some(on));

    let stats = StatsCalculator::replay(log.match_id, &log.events).unwrap();

    assert_eq!(stats.away.substitutions, 1);
    assert!(stats.player(on).unwrap().substituted_on);
    assert!(stats.player(off).unwrap().substituted_off);
}

#[test]
fn incremental_fold_matches_full_replay() {
    let mut log = Log::new();
    let home_player = Uuid::new_v4();
    let away_player = Uuid::new_v4();

    let script = vec![
        (EventKind::Pass { completed: true }, TeamSide::Home, Some(home_player)),
        (EventKind::Pass { completed: false }, TeamSide::Away, Some(away_player)),
        (EventKind::Tackle { won: true }, TeamSide::Away, Some(away_player)),
        (EventKind::Corner, TeamSide::Home, None),
        (EventKind::Shot { on_target: true }, TeamSide::Home, Some(home_player)),
        (EventKind::Goal { penalty: false }, TeamSide::Home, Some(home_player)),
        (EventKind::Assist, TeamSide::Home, Some(Uuid::new_v4())),
        (EventKind::YellowCard, TeamSide::Away, Some(away_player)),
        (EventKind::Offside, TeamSide::Away, Some(away_player)),
        (EventKind::Interception, TeamSide::Home, Some(home_player)),
        (EventKind::Clearance, TeamSide::Away, Some(away_player)),
        (EventKind::Injury, TeamSide::Home, Some(home_player)),
        (EventKind::PossessionUpdate { home_percent: 52 }, TeamSide::Home, None),
        (EventKind::RedCard, TeamSide::Away, Some(away_player)),
        (EventKind::Goal { penalty: true }, TeamSide::Away, None),
    ];

    let mut incremental = MatchStatsSnapshot::empty(log.match_id);
    for (kind, side, player) in script {
        let event = log.push(kind, side, player);
        incremental = StatsCalculator::apply_event(&incremental, &event).unwrap();
    }

    let replayed = StatsCalculator::replay(log.match_id, &log.events).unwrap();
    assert_eq!(replayed, incremental);
    assert_eq!(replayed.last_sequence_no, 15);
    assert_eq!(StatsCalculator::score(&replayed).home, 1);
    assert_eq!(StatsCalculator::score(&replayed).away, 1);
}

#[test]
fn out_of_order_events_are_refused() {
    let mut log = Log::new();
    log.push(EventKind::Corner, TeamSide::Home, None);
    let second = log.push(EventKind::Corner, TeamSide::Home, None);

    let empty = MatchStatsSnapshot::empty(log.match_id);
    let err = StatsCalculator::apply_event(&empty, &second).unwrap_err();

    assert_eq!(err, StatsError::OutOfOrder { expected: 1, got: 2 });
}

#[test]
fn events_of_another_match_are_refused() {
    let mut log = Log::new();
    let event = log.push(EventKind::Corner, TeamSide::Home, None);
    let other = MatchStatsSnapshot::empty(Uuid::new_v4());

    assert!(matches!(
        StatsCalculator::apply_event(&other, &event),
        Err(StatsError::WrongMatch { .. })
    ));
}

#[test]
fn failed_fold_leaves_snapshot_untouched() {
    let mut log = Log::new();
    log.push(EventKind::Corner, TeamSide::Home, None);
    let bad = log.push(EventKind::PossessionUpdate { home_percent: 130 }, TeamSide::Home, None);

    let before = StatsCalculator::replay(log.match_id, &log.events[..1]).unwrap();
    let result = StatsCalculator::apply_event(&before, &bad);

    assert_eq!(result, Err(StatsError::InvalidPossession(130)));
    assert_eq!(before.last_sequence_no, 1);
    assert_eq!(before.home.possession, None);
}
