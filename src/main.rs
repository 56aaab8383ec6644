//! Disk Football headless match runner
//!
//! Plays a short scripted match with the rules core and prints the result.
//! Usage: `disk-football [seed] [settings.json]`

use std::process::ExitCode;

use glam::Vec2;

use disk_football::sim::{FieldGeometry, MatchSession, TeamId, TeamSetup};
use disk_football::{MatchSettings, RulesError};

/// Acts played before the runner gives up on reaching full time
const MAX_ACTS: u32 = 2000;
/// Frames the runner waits for the pieces to stop
const SETTLE_FRAMES: u32 = 3000;
/// Match time a team spends lining up each act
const AIM_MS: f64 = 1500.0;
/// Impulse per unit of distance to the ball
const SHOT_STRENGTH: f32 = 1.2;

fn formation(name: &str, side: f32) -> TeamSetup {
    TeamSetup {
        name: name.to_string(),
        disks: vec![
            Vec2::new(side * 12.0, 5.0),
            Vec2::new(side * 12.0, -5.0),
            Vec2::new(side * 7.0, 0.0),
            Vec2::new(side * 3.0, 6.0),
            Vec2::new(side * 3.0, -6.0),
        ],
        goalkeeper: Some(Vec2::new(side * 15.5, 0.0)),
    }
}

fn load_settings(path: Option<&str>) -> Result<MatchSettings, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(MatchSettings::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(MatchSettings::default()),
    }
}

fn play(seed: u64, settings: MatchSettings) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = MatchSession::new(FieldGeometry::standard(), settings, seed)?;
    // Each team sets up in its own half
    let upper = session.rules().upper_team();
    session.spawn_team(upper, &formation("Upper", 1.0));
    session.spawn_team(upper.other(), &formation("Lower", -1.0));

    let frame_ms = session.world().substep_ms();
    for act in 0..MAX_ACTS {
        let team = session.new_turn();
        let ball = session.world().position(session.ball()).unwrap_or_default();

        // Nearest piece still allowed to act takes the shot
        let Some((disk, at)) = session
            .team(team)
            .into_iter()
            .flat_map(|t| t.pieces())
            .filter(|&id| {
                session
                    .world()
                    .object(id)
                    .is_some_and(|piece| session.rules().can_act(piece).is_ok())
            })
            .filter_map(|id| session.world().position(id).map(|p| (id, p)))
            .min_by(|a, b| a.1.distance(ball).total_cmp(&b.1.distance(ball)))
        else {
            log::warn!("{team:?} has no piece that may act");
            break;
        };

        let attacks_upper = session.rules().upper_team() != team;
        let goal = session.geometry().goal(attacks_upper).center();
        if ball.distance(goal) < 8.0 {
            session.announce_shot();
        }
        session.shoot(disk, (ball - at) * SHOT_STRENGTH)?;

        match session.settle(SETTLE_FRAMES) {
            Ok(frames) => {
                session.update_clock(AIM_MS + f64::from(frames) * frame_ms);
            }
            Err(RulesError::Unsettled { steps }) => {
                session.update_clock(AIM_MS + f64::from(steps) * frame_ms);
                session.freeze();
            }
            Err(err) => return Err(err.into()),
        }

        let resolution = session.ball_at_final_position(false)?;
        println!("act {act:>2}: {team:?} -> {:?}", resolution.outcome);

        if session.rules().clock().expired {
            if session.start_second_half().is_err() {
                break;
            }
            println!("--- second half ---");
        }
    }

    let score = session.rules().score();
    println!("\nFinal score: Home {} - {} Away", score.get(TeamId::Home), score.get(TeamId::Away));
    for team in [TeamId::Home, TeamId::Away] {
        let stats = session.statistics().team(team);
        println!(
            "{team:?}: {} shots, {} fouls, {} corners, {:.0}% of ball touches",
            stats.shots,
            stats.fouls,
            stats.corners,
            session.statistics().possession(team) * 100.0
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(2024);
    let settings_path = args.next();

    let result = load_settings(settings_path.as_deref()).and_then(|settings| play(seed, settings));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Match aborted: {err}");
            ExitCode::FAILURE
        }
    }
}
