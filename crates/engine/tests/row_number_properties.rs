// Property tests for row numbering and sort stability through GridSession.
// CI: 64 cases (default). Soak: PROPTEST_CASES=5000 cargo test --release

use proptest::prelude::*;
use tablegrid_engine::*;

fn config_64() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn session() -> GridSession {
    GridSession::with_catalog(
        ColumnCatalog::with_columns(vec![
            ColumnDefinition::row_number("#"),
            ColumnDefinition::integer("key"),
        ])
        .unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Add(i64),
    Insert(usize, i64),
    Delete(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..100i64).prop_map(Op::Add),
        1 => (0..50usize, 0..100i64).prop_map(|(i, k)| Op::Insert(i, k)),
        2 => (0..50usize).prop_map(Op::Delete),
    ]
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_64())]

    /// Whatever sequence of edits ran, regeneration leaves numbers 1..N.
    #[test]
    fn regenerated_numbers_are_dense(ops in prop::collection::vec(arb_op(), 0..40)) {
        let rt = runtime();
        let session = session();
        let cancel = CancelToken::none();

        rt.block_on(async {
            for op in ops {
                match op {
                    Op::Add(k) => {
                        session.add_row(Row::new().with("key", k), &cancel).await.unwrap();
                    }
                    Op::Insert(i, k) => {
                        let index = i.min(session.get_row_count());
                        session.insert_row(index, Row::new().with("key", k), &cancel).await.unwrap();
                    }
                    Op::Delete(i) => {
                        // Stale positions are allowed to fail
                        let _ = session.delete_row(i, &cancel).await;
                    }
                }
            }
            session.regenerate_row_numbers(&cancel).await.unwrap();
        });

        prop_assert!(session.row_numbers().validate_row_numbers());
        prop_assert_eq!(
            session.row_numbers().get_max_row_number(),
            session.get_row_count() as i64
        );
    }

    /// Rows with equal keys keep their relative order after a sort.
    #[test]
    fn sort_is_stable(keys in prop::collection::vec(0..5i64, 0..60)) {
        let rt = runtime();
        let session = session();
        let cancel = CancelToken::none();
        let rows = keys.iter().map(|&k| Row::new().with("key", k)).collect();
        rt.block_on(session.import_rows(rows, &cancel)).unwrap();

        session.sort_by(&[SortDescriptor::ascending("key")], &cancel).unwrap();

        let sorted = session.get_all_rows();
        for pair in sorted.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let (ka, kb) = (a.get("key").to_i64().unwrap(), b.get("key").to_i64().unwrap());
            prop_assert!(ka <= kb);
            if ka == kb {
                prop_assert!(a.row_number().to_i64().unwrap() < b.row_number().to_i64().unwrap());
            }
        }
    }
}
