#![allow(dead_code)]

use std::sync::Arc;

use log::LevelFilter;
use rkotp::{
    logging::initialize_logger,
    sim::{Event, SimOtp},
    Generation,
    Otp,
};

/// Bind a simulated controller of `generation` holding `fuses`
pub fn bind(generation: Generation, fuses: &[u8]) -> (Arc<Otp>, SimOtp) {
    initialize_logger(LevelFilter::Debug);

    let sim = SimOtp::new(generation, fuses);
    let compatible = generation.compatibles().next().unwrap();
    let otp = Otp::probe("otp@sim", compatible, &mut sim.clone()).unwrap();

    // Binding must not touch the hardware.
    assert!(sim.events().is_empty());

    (otp, sim)
}

/// A fuse image where every byte differs from its neighbours
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// Every clock enable, reset assert and user-interface selection in `events`
/// is balanced
pub fn assert_balanced(sim: &SimOtp) {
    let events = sim.events();
    let count = |wanted: Event| events.iter().filter(|e| **e == wanted).count();

    assert_eq!(count(Event::ClockEnable), count(Event::ClockDisable));
    assert_eq!(count(Event::ResetAssert), count(Event::ResetDeassert));
    assert_eq!(sim.clock_depth(), 0);
    assert!(!sim.in_reset());
    assert!(!sim.user_selected());
    assert_eq!(sim.unclocked_accesses(), 0);
}

/// Writes to `offset` in the recorded trace
pub fn writes_to(sim: &SimOtp, offset: usize) -> Vec<u32> {
    sim.writes()
        .into_iter()
        .filter(|(o, _)| *o == offset)
        .map(|(_, value)| value)
        .collect()
}
