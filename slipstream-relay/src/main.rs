use anyhow::Result;
use slipstream_core::GLOBAL_CONFIG;

mod coordinator;
mod relay;

fn main() -> Result<()> {
    env_logger::init();

    // kick off the relay loop
    let ip_addr = format!("0.0.0.0:{}", GLOBAL_CONFIG.port);
    let server = relay::RelayServer::new(&ip_addr)?;
    server.run();
    Ok(())
}
