use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use slipstream_client::game::GameClient;
use slipstream_core::physics::TickInput;
use slipstream_core::GLOBAL_CONFIG;

fn main() -> Result<()> {
    env_logger::init();

    let ip_addr = format!("{}:{}", GLOBAL_CONFIG.relay_address, GLOBAL_CONFIG.port);
    let mut game_client = GameClient::new(ip_addr)?;

    // fixed-rate loop; headless, so the car coasts where a windowed
    // build would feed steering from the keyboard
    let tick_interval = Duration::from_secs_f64(GLOBAL_CONFIG.tick_seconds());
    let mut last_report = Instant::now();
    loop {
        let tick_start = Instant::now();
        game_client.tick(TickInput::neutral());

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let state = game_client.car_state();
            let status = game_client.race_status();
            log::info!(
                "lap {}/{} at ({:.0}, {:.0}), {} remote cars",
                status.lap_count,
                status.max_laps,
                state.position.x,
                state.position.y,
                game_client.remote_players().len()
            );
            if let Some(winner) = status.winner {
                log::info!("race over, player {} wins", winner);
                break;
            }
        }

        match tick_interval.checked_sub(tick_start.elapsed()) {
            Some(remaining) => thread::sleep(remaining),
            None => log::warn!("tick overran its {}ms slot", tick_interval.as_millis()),
        }
    }
    Ok(())
}
