//! Property tests for pool bookkeeping.
//!
//! Random sequences of acquire, release, drop and close-all are replayed
//! against a pool and a simple model of its idle and live counts.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::HashSet;

use proptest::prelude::*;
use toolkit_pool::{Pool, PoolConfig, PoolError, PooledConnection};
use toolkit_testing::MockConnector;

#[derive(Debug, Clone)]
enum Op {
    Acquire,
    Release(usize),
    Drop(usize),
    CloseAll,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Acquire),
        3 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Drop),
        1 => Just(Op::CloseAll),
    ]
}

proptest! {
    #[test]
    fn live_count_matches_model_and_never_exceeds_max(
        max in 1u32..6,
        initial in 0u32..6,
        ops in prop::collection::vec(op_strategy(), 1..80),
    ) {
        let initial = initial.min(max);
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let connector = MockConnector::new();
            let config = PoolConfig::new().max_connections(max).initial_connections(initial);
            let pool = Pool::new(config, connector.clone()).await.unwrap();

            let mut held: Vec<PooledConnection<MockConnector>> = Vec::new();
            let mut idle = initial;
            let mut live = initial;

            for op in ops {
                match op {
                    Op::Acquire => {
                        let result = pool.acquire().await;
                        if idle > 0 {
                            prop_assert!(result.is_ok());
                            idle -= 1;
                        } else if live < max {
                            prop_assert!(result.is_ok());
                            live += 1;
                        } else {
                            let exhausted = matches!(result, Err(PoolError::PoolExhausted { .. }));
                            prop_assert!(exhausted);
                        }
                        if let Ok(conn) = result {
                            held.push(conn);
                        }
                    }
                    Op::Release(i) if !held.is_empty() => {
                        let conn = held.remove(i % held.len());
                        pool.release(conn).unwrap();
                        idle += 1;
                    }
                    Op::Drop(i) if !held.is_empty() => {
                        drop(held.remove(i % held.len()));
                        idle += 1;
                    }
                    Op::CloseAll => {
                        let report = pool.close_all_connections().await;
                        prop_assert_eq!(report.closed as u32, idle);
                        live -= idle;
                        idle = 0;
                    }
                    Op::Release(_) | Op::Drop(_) => {}
                }

                let status = pool.status();
                prop_assert_eq!(status.available, idle);
                prop_assert_eq!(status.total, live);
                prop_assert!(status.total <= max);
                prop_assert_eq!(connector.open_connections() as u32, live);

                let ids: HashSet<u64> = held.iter().map(|c| c.id()).collect();
                prop_assert_eq!(ids.len(), held.len());
            }

            Ok::<(), TestCaseError>(())
        })?;
    }
}
