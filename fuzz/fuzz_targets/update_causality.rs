#![no_main]

// Harness: update_causality – a successful chain merge dominates the message, and
// a rejected one leaves the clock untouched.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use logical_clocks::{ChainEntry, ChainOptions, ChainTimestamp, Clock, DynamicChainClock, NodeId};

#[derive(Arbitrary, Debug, Clone)]
struct Entry(u8, u32);

#[derive(Arbitrary, Debug, Clone)]
struct Frame {
    emitter: u8,
    local: Vec<Entry>,
    message: Vec<Entry>,
}

fn entries(raw: &[Entry]) -> Vec<ChainEntry> {
    raw.iter().map(|e| ChainEntry::new(NodeId([e.0; 16]), e.1)).collect()
}

fuzz_target!(|frame: Frame| {
    let Ok(mut clock) = DynamicChainClock::setup(ChainOptions {
        uuid: Some(NodeId([0; 16])),
        counter: 0,
        entries: entries(&frame.local),
    }) else {
        return;
    };
    let msg = ChainTimestamp {
        uuid: NodeId([frame.emitter; 16]),
        entries: entries(&frame.message),
    };

    let before = clock.clone();
    if clock.update(Some(&msg)).is_ok() {
        let after = clock.read();
        assert!(!DynamicChainClock::happens_before(&after, &msg).unwrap_or(false));
        if let Ok(next) = clock.advance(None) {
            assert!(DynamicChainClock::happens_before(&msg, &next).unwrap());
        }
    } else {
        assert_eq!(clock, before);
    }
});
