use std::thread;

use pretty_assertions::assert_eq;
use rkotp::{
    regs::{auto, user},
    sim::Event,
    Generation,
};

mod common;

use common::{assert_balanced, bind, pattern};

const THREADS: usize = 4;
const READS: usize = 25;

/// Split the trace into the clocked sections of individual reads
fn sections(events: &[Event]) -> Vec<&[Event]> {
    let mut sections = Vec::new();
    let mut start = None;

    for (i, event) in events.iter().enumerate() {
        match event {
            Event::ClockEnable => {
                assert!(start.is_none(), "clock enabled twice at event {i}");
                start = Some(i);
            }
            Event::ClockDisable => {
                let begin = start.take().expect("clock disabled while off");
                sections.push(&events[begin..=i]);
            }
            _ => assert!(start.is_some(), "unclocked {event:?} at event {i}"),
        }
    }
    assert!(start.is_none());

    sections
}

/// Word addresses requested within one section
fn addresses(section: &[Event], generation: Generation) -> Vec<u32> {
    section
        .iter()
        .filter_map(|event| match (generation, *event) {
            (Generation::Rk3588, Event::Write { offset, value }) if offset == auto::AUTO_CTRL => {
                Some(value >> auto::ADDR_SHIFT)
            }
            (Generation::Rk3588, _) => None,
            (_, Event::Write { offset, value }) if offset == user::USER_ADDR => {
                Some(value & 0xFFFF)
            }
            _ => None,
        })
        .collect()
}

#[test]
fn concurrent_reads_never_interleave() {
    for generation in Generation::all() {
        let size = generation.descriptor().size;
        let image = pattern(size);
        let (otp, sim) = bind(generation, &image);

        thread::scope(|s| {
            for t in 0..THREADS {
                let otp = &otp;
                let image = &image;
                s.spawn(move || {
                    for i in 0..READS {
                        let offset = (t * 13 + i * 5) % (size - 16);
                        let len = 1 + (t + i) % 16;

                        let mut buf = vec![0; len];
                        assert_eq!(otp.read(offset as u32, &mut buf).unwrap(), len);
                        assert_eq!(buf, image[offset..][..len]);
                    }
                });
            }
        });

        let events = sim.events();
        let sections = sections(&events);
        assert_eq!(sections.len(), THREADS * READS, "{generation}");

        // Each read walks one run of consecutive words.
        for section in sections {
            let addrs = addresses(section, generation);
            assert!(!addrs.is_empty());
            for pair in addrs.windows(2) {
                assert_eq!(pair[1], pair[0] + 1, "{generation}: {addrs:?}");
            }
        }

        assert_balanced(&sim);
    }
}

#[test]
fn failed_reads_do_not_block_other_callers() {
    let image = pattern(128);
    let (otp, sim) = bind(Generation::Rk3568, &image);
    sim.inject_ecc(3, 0xC0);

    thread::scope(|s| {
        let failing = s.spawn(|| {
            (0..READS)
                .filter(|_| otp.read(4, &mut [0; 4]).is_err())
                .count()
        });
        let healthy = s.spawn(|| {
            for _ in 0..READS {
                let mut buf = [0; 4];
                otp.read(32, &mut buf).unwrap();
                assert_eq!(buf, image[32..36]);
            }
        });

        assert_eq!(failing.join().unwrap(), READS);
        healthy.join().unwrap();
    });

    assert_eq!(sections(&sim.events()).len(), 2 * READS);
    assert_balanced(&sim);
}
