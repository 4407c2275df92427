use board::Board;
use firmware::{
    config::PROFILE,
    dht22::Dht22,
    modem::AtPort,
    ranging::Ranger,
    Controller,
};
use log::info;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Board {
        clock,
        dht_line,
        ranger,
        heater,
        at_modem,
        mut timer,
    } = Board::new(PROFILE.modem());

    info!(
        "shelter controller starting, {:?} profile, {}ms interval",
        PROFILE,
        PROFILE.loop_interval_ms()
    );

    let mut controller = Controller::new(
        Dht22::new(dht_line, clock.clone()),
        Ranger::new(ranger),
        heater,
        AtPort::new(at_modem, clock),
        PROFILE.uplink(),
        PROFILE.loop_interval_ms(),
    );

    // Setup failures are logged; the per-publish steps retry what matters
    let _ = controller.initialize();
    controller.run(&mut timer)
}
