//! Property-based tests for pool sizing
//! Random operation sequences must never push the pool past its ceiling

use std::time::Duration;

use proptest::collection::vec;
use proptest::prelude::*;
use turbopool::testing::MockConnector;
use turbopool::{Connection, Pool, PoolConfigBuilder, PoolError};

#[derive(Debug, Clone)]
enum Op {
    Lease,
    Revert(usize),
    Prepare(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Lease),
        3 => any::<usize>().prop_map(Op::Revert),
        2 => (0usize..16).prop_map(Op::Prepare),
    ]
}

proptest! {
    #[test]
    fn prop_size_never_exceeds_max(
        core in 0usize..4,
        extra in 0usize..6,
        ops in vec(op(), 1..60)
    ) {
        let max = core + extra + 1;
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let result: Result<(), TestCaseError> = rt.block_on(async {
            let config = PoolConfigBuilder::new()
                .core_size(core)
                .max_size(max)
                .keep_alive(Duration::ZERO)
                .build()
                .unwrap();
            let pool = Pool::new(config, MockConnector::immediate(), ()).unwrap();
            let mut held = Vec::new();

            for op in &ops {
                match op {
                    Op::Lease => match pool.lease() {
                        Ok(lease) => held.push(lease.await.unwrap().id()),
                        Err(e) => prop_assert_eq!(e, PoolError::CapacityExceeded),
                    },
                    Op::Revert(index) => {
                        if !held.is_empty() {
                            let id = held.remove(index % held.len());
                            prop_assert!(pool.revert(&id).is_ok());
                        }
                    }
                    Op::Prepare(n) => prop_assert!(pool.prepare(*n).is_ok()),
                }

                let stats = pool.stats();
                // Property: the ceiling holds after every operation
                prop_assert!(stats.size <= max, "size {} over max {}", stats.size, max);
                // Property: every counted slot is either pending or live
                prop_assert_eq!(stats.size, stats.live + stats.pending);
                // Property: leased connections stay tracked
                prop_assert!(held.len() <= stats.live);
            }

            pool.shutdown().unwrap();
            prop_assert_eq!(pool.size(), 0);
            Ok(())
        });
        result?;
    }
}
