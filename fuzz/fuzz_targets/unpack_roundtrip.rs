#![no_main]

// Harness: unpack_roundtrip – any buffer a clock accepts must re-pack to the same bytes.

use libfuzzer_sys::fuzz_target;
use logical_clocks::{
    AntichainChainClock, Clock, DynamicChainClock, HybridClock, ManualTimeSource, ScalarClock,
    VariableChainClock, VectorClock,
};

fn roundtrip<C: Clock>(data: &[u8]) {
    if let Ok(clock) = C::unpack(data) {
        assert_eq!(clock.pack(), data);
    }
}

fuzz_target!(|data: &[u8]| {
    roundtrip::<ScalarClock>(data);
    roundtrip::<VectorClock>(data);
    roundtrip::<DynamicChainClock>(data);
    roundtrip::<AntichainChainClock>(data);
    roundtrip::<VariableChainClock>(data);
    roundtrip::<HybridClock<ManualTimeSource>>(data);
});
