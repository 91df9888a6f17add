//! Property tests over vote accounting: counted ranges stay disjoint,
//! re-adding anything is a no-op, and independent additions commute.

use std::collections::BTreeMap;

use forkbribe_engine::{keep_all, BuildBlock, Engine, Vote};
use forkbribe_primitives::EntityId;
use proptest::prelude::*;

const H: EntityId = EntityId::HONEST;
const A: EntityId = EntityId::ADVERSARY;

const POWER: u64 = 1_000;

/// Engine with two one-slot entities and a block at slot 1 to vote for.
fn voting_engine() -> Engine {
    let powers: BTreeMap<EntityId, u64> = [(H, POWER), (A, POWER)].into_iter().collect();
    Engine::new(&[A, H], powers)
        .build_block(&BuildBlock::new(1, 0).known_by(&[H]), keep_all, keep_all)
        .unwrap()
        .slot_progress()
}

fn arb_vote() -> impl Strategy<Value = Vote> {
    (0..POWER, 1..200u64, prop::bool::ANY).prop_map(|(min_index, len, to_head)| Vote {
        entity: A,
        from_slot: 1,
        min_index,
        max_index: (min_index + len - 1).min(POWER - 1),
        to_slot: if to_head { 1 } else { 0 },
    })
}

proptest! {
    #[test]
    fn counted_ranges_are_pairwise_disjoint(votes in prop::collection::vec(arb_vote(), 1..12)) {
        let mut engine = voting_engine();
        for vote in votes {
            if let Ok(next) = engine.add_votes([vote]) {
                engine = next;
            }
        }
        let counted: Vec<Vote> = engine.all_votes().into_iter().collect();
        for (i, a) in counted.iter().enumerate() {
            prop_assert!(a.max_index < POWER);
            for b in counted.iter().skip(i + 1) {
                let disjoint = a.max_index < b.min_index || b.max_index < a.min_index;
                prop_assert!(disjoint, "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn adding_a_vote_twice_changes_nothing(vote in arb_vote()) {
        let engine = voting_engine();
        let once = engine.add_votes([vote]).unwrap();
        let twice = once.add_votes([vote]).unwrap();
        prop_assert_eq!(&once, &twice);
    }

    #[test]
    fn disjoint_votes_commute(at in 1..POWER - 1) {
        let engine = voting_engine();
        let low = Vote { entity: A, from_slot: 1, min_index: 0, max_index: at - 1, to_slot: 1 };
        let high = Vote { entity: A, from_slot: 1, min_index: at, max_index: POWER - 1, to_slot: 0 };

        let ab = engine.add_votes([low]).unwrap().add_votes([high]).unwrap();
        let ba = engine.add_votes([high]).unwrap().add_votes([low]).unwrap();
        prop_assert_eq!(&ab, &ba);
    }
}
