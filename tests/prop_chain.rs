use logical_clocks::{
    AntichainChainClock, ChainClock, ChainEntry, ChainOptions, ChainTimestamp, Clock, CounterWidth,
    DynamicChainClock, NodeId, VariableChainClock, VariableOptions,
};
use proptest::prelude::*;

fn id(n: u8) -> NodeId {
    NodeId([n; 16])
}

/// A replica action: tick locally, or receive the current state of replica `from`.
#[derive(Debug, Clone, Copy)]
enum Step {
    Tick(usize),
    Receive { to: usize, from: usize },
}

fn steps(nodes: usize) -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        (0..nodes).prop_map(Step::Tick),
        (0..nodes, 0..nodes).prop_map(|(to, from)| Step::Receive { to, from }),
    ];
    proptest::collection::vec(step, 0..24)
}

fn replay<C: Clock>(clocks: &mut [C], script: &[Step]) {
    for step in script {
        match *step {
            Step::Tick(i) => {
                let next = clocks[i].advance(None).unwrap();
                clocks[i].update(Some(&next)).unwrap();
            }
            Step::Receive { to, from } => {
                let msg = clocks[from].read();
                clocks[to].update(Some(&msg)).unwrap();
            }
        }
    }
}

fn dynamic_nodes(n: u8) -> Vec<DynamicChainClock> {
    (1..=n)
        .map(|i| {
            DynamicChainClock::setup(ChainOptions {
                uuid: Some(id(i)),
                ..Default::default()
            })
            .unwrap()
        })
        .collect()
}

fn antichain_nodes(n: u8) -> Vec<AntichainChainClock> {
    (1..=n)
        .map(|i| {
            AntichainChainClock::setup(ChainOptions {
                uuid: Some(id(i)),
                ..Default::default()
            })
            .unwrap()
        })
        .collect()
}

fn variable_nodes(n: u8) -> Vec<VariableChainClock> {
    (1..=n)
        .map(|i| {
            let width = if i % 2 == 0 { CounterWidth::U64 } else { CounterWidth::U32 };
            VariableChainClock::setup(VariableOptions {
                uuid: Some(id(i)),
                width,
                ..Default::default()
            })
            .unwrap()
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_dynamic_update_is_idempotent(script in steps(3), to in 0usize..3, from in 0usize..3) {
        let mut clocks = dynamic_nodes(3);
        replay(&mut clocks, &script);
        let msg = clocks[from].read();
        clocks[to].update(Some(&msg)).unwrap();
        let once = clocks[to].clone();
        clocks[to].update(Some(&msg)).unwrap();
        prop_assert_eq!(&clocks[to], &once);
    }

    #[test]
    fn prop_dynamic_receiver_dominates_message(script in steps(3), to in 0usize..3, from in 0usize..3) {
        let mut clocks = dynamic_nodes(3);
        replay(&mut clocks, &script);
        let msg = clocks[from].read();
        clocks[to].update(Some(&msg)).unwrap();
        let next = clocks[to].advance(None).unwrap();
        prop_assert!(DynamicChainClock::happens_before(&msg, &next).unwrap());
        for participant in msg.entries.iter().map(|e| e.participant) {
            prop_assert!(clocks[to].participants().contains(&participant));
        }
    }

    /// Learning about an extra participant must not reorder timestamps that never saw it.
    #[test]
    fn prop_unseen_participant_does_not_change_order(
        a in proptest::collection::vec(0u32..5, 2),
        b in proptest::collection::vec(0u32..5, 2),
        extra in 1u32..5,
    ) {
        let mk = |emitter: u8, counts: &[u32], extra: Option<u32>| {
            let mut entries = vec![ChainEntry::new(id(1), counts[0]), ChainEntry::new(id(2), counts[1])];
            if let Some(counter) = extra {
                entries.push(ChainEntry::new(id(9), counter));
            }
            ChainTimestamp { uuid: id(emitter), entries }
        };
        let (ta, tb) = (mk(1, &a[..], None), mk(2, &b[..], None));
        let (ta_zero, tb_zero) = (mk(1, &a[..], Some(0)), mk(2, &b[..], Some(0)));
        prop_assert_eq!(
            DynamicChainClock::happens_before(&ta, &tb).unwrap(),
            DynamicChainClock::happens_before(&ta_zero, &tb_zero).unwrap()
        );
        prop_assert_eq!(
            DynamicChainClock::are_concurrent(&ta, &tb).unwrap(),
            DynamicChainClock::are_concurrent(&ta_zero, &tb).unwrap()
        );

        let grown = mk(2, &b[..], Some(extra));
        prop_assert!(!DynamicChainClock::happens_before(&grown, &ta).unwrap());
        if DynamicChainClock::happens_before(&ta, &tb).unwrap() {
            prop_assert!(DynamicChainClock::happens_before(&ta, &grown).unwrap());
        }
    }

    #[test]
    fn prop_dynamic_pack_roundtrip(script in steps(4), node in 0usize..4) {
        let mut clocks = dynamic_nodes(4);
        replay(&mut clocks, &script);
        let packed = clocks[node].pack();
        prop_assert_eq!(packed.len(), 20 + 20 * clocks[node].entries.len());
        prop_assert_eq!(DynamicChainClock::unpack(&packed).unwrap(), clocks[node].clone());
    }

    #[test]
    fn prop_antichain_frontier_is_covered_and_concurrent(script in steps(3), node in 0usize..3) {
        let mut clocks = antichain_nodes(3);
        replay(&mut clocks, &script);
        let clock = &clocks[node];
        for dot in clock.frontier() {
            let seen = clock.counter_of(&dot.participant).unwrap_or(0);
            prop_assert!(u64::from(dot.counter) <= seen);
            prop_assert!(dot.counter > 0);
        }
        // After a local event nothing else is outstanding.
        let mut ticked = clock.clone();
        let next = ticked.advance(None).unwrap();
        ticked.update(Some(&next)).unwrap();
        prop_assert!(!ticked.has_concurrent_writes());
        prop_assert_eq!(AntichainChainClock::unpack(&clock.pack()).unwrap(), clock.clone());
    }

    #[test]
    fn prop_antichain_update_is_idempotent(script in steps(3), to in 0usize..3, from in 0usize..3) {
        let mut clocks = antichain_nodes(3);
        replay(&mut clocks, &script);
        let msg = clocks[from].read();
        clocks[to].update(Some(&msg)).unwrap();
        let once = clocks[to].clone();
        clocks[to].update(Some(&msg)).unwrap();
        prop_assert_eq!(&clocks[to], &once);
    }

    #[test]
    fn prop_variable_replay_and_roundtrip(script in steps(4), node in 0usize..4) {
        let mut clocks = variable_nodes(4);
        replay(&mut clocks, &script);
        let clock = &clocks[node];
        prop_assert_eq!(VariableChainClock::unpack(&clock.pack()).unwrap(), clock.clone());
        for other in &clocks {
            prop_assert!(!VariableChainClock::are_incomparable(&clock.read(), &other.read()).unwrap()
                || !clock.participants().iter().any(|p| other.participants().contains(p)));
        }
    }
}
