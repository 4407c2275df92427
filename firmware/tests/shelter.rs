use board::{
    frame,
    hal::RangingMeasurement,
    AtModem, DhtLine, HeaterRelay, MicroClock, Response, SimRanger, Timer,
};
use embedded_hal::blocking::delay::DelayMs;
use firmware::{
    config::{self, Profile},
    dht22::Dht22,
    error::StepError,
    modem::{AtPort, Uplink},
    ranging::Ranger,
    Controller, Decicelsius, HeatingState, Permille,
};

type Shelter = Controller<
    DhtLine,
    MicroClock,
    SimRanger,
    HeaterRelay,
    AtPort<AtModem, MicroClock>,
    Uplink,
>;

fn sample(range_mm: u16) -> RangingMeasurement {
    RangingMeasurement {
        range_mm,
        range_status: 0,
    }
}

fn shelter(
    profile: Profile,
    clock: &MicroClock,
    climate: Vec<Response>,
    distances: Vec<u16>,
    fault_percent: u8,
) -> Shelter {
    let modem = AtModem::new(profile.modem(), clock.clone()).with_fault_rate(fault_percent);
    Controller::new(
        Dht22::new(DhtLine::scripted(clock.clone(), climate), clock.clone()),
        Ranger::new(SimRanger::scripted(
            clock.clone(),
            distances.into_iter().map(sample),
        )),
        HeaterRelay::default(),
        AtPort::new(modem, clock.clone()),
        profile.uplink(),
        profile.loop_interval_ms(),
    )
}

#[test]
fn cold_occupied_shelter_is_heated_and_reported_over_http() {
    let clock = MicroClock::new();
    let mut shelter = shelter(
        Profile::Gprs,
        &clock,
        vec![Response::Frame(frame(175, 553))],
        vec![650],
        0,
    );
    assert!(shelter.initialize().is_success());

    let report = shelter.step();
    assert!(report.climate_fresh);
    assert_eq!(report.reading.temperature, Decicelsius(175));
    assert_eq!(report.reading.humidity, Permille(553));
    assert_eq!(report.reading.distance_mm, 650);
    assert_eq!(report.heating, HeatingState::On);
    assert!(report.publish.is_success(), "{:?}", report.publish);
    assert!(shelter.heater().is_energised());

    let deliveries = shelter.link().serial().deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].target, config::HTTP_URL);
    assert_eq!(
        deliveries[0].body_str(),
        r#"{"temp":17.5,"dist":650,"heat":1}"#
    );
}

#[test]
fn wifi_profile_reports_over_tcp() {
    let clock = MicroClock::new();
    let mut shelter = shelter(
        Profile::Wifi,
        &clock,
        vec![Response::Frame(frame(-21, 870))],
        vec![1450],
        0,
    );
    assert!(shelter.initialize().is_success());

    let report = shelter.step();
    assert_eq!(report.heating, HeatingState::Off);
    assert!(report.publish.is_success(), "{:?}", report.publish);
    assert!(!shelter.link().serial().tcp_connected());

    let deliveries = shelter.link().serial().deliveries();
    assert_eq!(deliveries[0].target, "192.168.1.50:8080");
    assert_eq!(
        deliveries[0].body_str(),
        r#"{"temp":-2.1,"humidity":87.0,"distance":1450,"heating":"OFF"}"#
    );
}

#[test]
fn failed_reads_keep_the_last_good_values() {
    let clock = MicroClock::new();
    let mut timer = Timer::simulated(clock.clone());
    let mut corrupted = frame(250, 500);
    corrupted[4] ^= 0xFF;
    let mut shelter = shelter(
        Profile::Gprs,
        &clock,
        vec![
            Response::Frame(frame(160, 610)),
            Response::Silent,
            Response::Frame(corrupted),
        ],
        vec![500],
        0,
    );
    shelter.initialize();

    let first = shelter.step();
    assert_eq!(first.heating, HeatingState::On);

    for _ in 0..2 {
        timer.delay_ms(Profile::Gprs.loop_interval_ms());
        let report = shelter.step();
        assert!(!report.climate_fresh);
        assert_eq!(report.reading, first.reading);
        assert_eq!(report.heating, HeatingState::On);
        assert!(report.publish.is_success());
    }

    assert_eq!(shelter.state().reading, first.reading);
    assert!(shelter.state().heating.is_on());

    // Same snapshot published every cycle
    let deliveries = shelter.link().serial().deliveries();
    assert_eq!(deliveries.len(), 3);
    assert!(deliveries.iter().all(|d| d.body == deliveries[0].body));
}

#[test]
fn heater_follows_the_animal() {
    let clock = MicroClock::new();
    let mut timer = Timer::simulated(clock.clone());
    let climate = (0..3).map(|_| Response::Frame(frame(120, 500))).collect();
    let mut shelter = shelter(Profile::Wifi, &clock, climate, vec![300, 1200, 690], 0);
    shelter.initialize();

    let mut states = Vec::new();
    for _ in 0..3 {
        states.push(shelter.step().heating);
        timer.delay_ms(Profile::Wifi.loop_interval_ms());
    }
    assert_eq!(
        states,
        [HeatingState::On, HeatingState::Off, HeatingState::On]
    );
    assert_eq!(shelter.heater().switch_count(), 3);
}

#[test]
fn unreachable_network_never_stops_the_loop() {
    let clock = MicroClock::new();
    let mut shelter = shelter(
        Profile::Gprs,
        &clock,
        vec![Response::Frame(frame(150, 450))],
        vec![400],
        100,
    );
    assert!(!shelter.initialize().is_success());

    let report = shelter.step();
    // The heater still reacts to the fresh reading
    assert_eq!(report.heating, HeatingState::On);
    assert!(shelter.heater().is_energised());
    assert_eq!(
        report.publish.step("post").map(|step| step.result),
        Some(Err(StepError::CommandMismatch))
    );
    assert!(shelter.link().serial().deliveries().is_empty());
}

#[test]
fn lost_registration_fails_the_publish_only() {
    let clock = MicroClock::new();
    let mut shelter = shelter(
        Profile::Gprs,
        &clock,
        vec![Response::Frame(frame(150, 450))],
        vec![400],
        0,
    );
    shelter.initialize();
    shelter.link_mut().serial_mut().set_registered(false);

    let report = shelter.step();
    assert_eq!(
        report.publish.step("registration").map(|step| step.result),
        Some(Err(StepError::CommandMismatch))
    );
    // The bearer stays up, so the post itself still goes through
    assert!(shelter.link().serial().bearer_open());
    assert!(report.publish.step("post").unwrap().result.is_ok());
    assert_eq!(shelter.link().serial().deliveries().len(), 1);
}
