// End-to-end scenarios through GridSession: import, sort, filter, delete,
// validation automation and batch notification.

use std::sync::Arc;

use tablegrid_config::{GridOptions, ValidationAutomationSettings};
use tablegrid_engine::validation::ValidationRule;
use tablegrid_engine::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn catalog() -> ColumnCatalog {
    ColumnCatalog::with_columns(vec![
        ColumnDefinition::row_number("#"),
        ColumnDefinition::checkbox("selected"),
        ColumnDefinition::integer("id"),
        ColumnDefinition::text("name"),
        ColumnDefinition::integer("age"),
        ColumnDefinition::validation_alerts(),
    ])
    .unwrap()
}

fn session_with(options: GridOptions) -> (Arc<EventCollector>, GridSession) {
    let events = Arc::new(EventCollector::new());
    let session = GridSession::new(options, catalog(), events.clone());
    (events, session)
}

fn person(id: i64, name: &str, age: i64) -> Row {
    Row::new().with("id", id).with("name", name).with("age", age)
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().map(|r| r.get("id").to_i64().unwrap()).collect()
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

#[tokio::test]
async fn import_then_sort_ascending() {
    let (_events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    session
        .import_rows(vec![person(3, "c", 30), person(1, "a", 10), person(2, "b", 20)], &cancel)
        .await
        .unwrap();

    let outcome = session
        .sort_by(&[SortDescriptor::ascending("id")], &cancel)
        .unwrap();
    assert_eq!(outcome.rows_sorted, 3);
    assert_eq!(ids(&session.get_all_rows()), vec![1, 2, 3]);

    // Sorting moves rows, it doesn't renumber them
    let numbers: Vec<_> = session
        .get_all_rows()
        .iter()
        .map(|r| r.row_number().to_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![2, 3, 1]);
    assert!(session.row_numbers().validate_row_numbers());
}

#[tokio::test]
async fn toggle_sort_cycles_and_clears() {
    let (_events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    session
        .import_rows(vec![person(2, "b", 1), person(1, "a", 1), person(3, "c", 1)], &cancel)
        .await
        .unwrap();

    assert_eq!(session.toggle_sort("id", &cancel).unwrap(), SortDirection::Ascending);
    assert_eq!(ids(&session.get_all_rows()), vec![1, 2, 3]);
    assert_eq!(session.toggle_sort("id", &cancel).unwrap(), SortDirection::Descending);
    assert_eq!(ids(&session.get_all_rows()), vec![3, 2, 1]);
    assert_eq!(session.toggle_sort("id", &cancel).unwrap(), SortDirection::None);
    assert!(!session.sort_engine().is_sorted());

    let err = session.toggle_sort("missing", &cancel).unwrap_err();
    assert!(err.is_not_found());
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filter_then_clear_restores_all_rows() {
    let (_events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    let rows = (1..=10).map(|i| person(i, "p", i * 10)).collect();
    session.import_rows(rows, &cancel).await.unwrap();

    let visible = session
        .apply_filters(vec![FilterCriterion::new(
            "age",
            FilterOperator::GreaterThan,
            50i64,
        )])
        .unwrap();
    assert_eq!(visible, 5);
    assert_eq!(ids(&session.get_current_data()), vec![6, 7, 8, 9, 10]);
    assert_eq!(session.get_row_count(), 10);

    session.clear_filters();
    assert_eq!(session.get_current_data().len(), 10);
}

// ---------------------------------------------------------------------------
// Delete / batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_delete_emits_one_notification() {
    let (events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    session
        .validation()
        .add_rule(ValidationRule::required("name-required", "name"))
        .unwrap();
    let rows = (1..=5).map(|i| person(i, "p", 1)).collect();
    session.import_rows(rows, &cancel).await.unwrap();
    events.clear();

    session.begin_batch_update();
    assert_eq!(session.delete_rows(&[1, 3], &cancel).await.unwrap(), 2);
    assert!(events.is_empty());
    session.end_batch_update();

    // Row-delete validation ran inside the batch; its counts ride along
    assert_eq!(events.len(), 1);
    let data = events.data_changed_events();
    assert_eq!(data[0].operation, OperationType::Batch);
    assert_eq!(data[0].affected_row_count, 2);
    assert_eq!(data[0].validation.as_ref().map(|v| v.error_count), Some(0));
    assert_eq!(session.get_row_count(), 3);
    assert_eq!(ids(&session.get_all_rows()), vec![1, 3, 5]);
}

#[tokio::test]
async fn batch_primitives_share_one_notification() {
    let (events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    let rows = (1..=5).map(|i| person(i, "p", 1)).collect();
    session.import_rows(rows, &cancel).await.unwrap();
    events.clear();

    session.begin_batch_update();
    assert_eq!(session.batch_delete_rows(&[1, 3]), 2);
    session
        .batch_update_column("age", CellValue::Int(9), &cancel)
        .unwrap();
    session.end_batch_update();

    assert_eq!(events.len(), 1);
    assert_eq!(events.data_changed_events()[0].affected_row_count, 5);
}

#[tokio::test]
async fn regenerate_after_delete_restores_dense_numbers() {
    let (_events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    let rows = (1..=6).map(|i| person(i, "p", 1)).collect();
    session.import_rows(rows, &cancel).await.unwrap();

    session.delete_rows(&[0, 2], &cancel).await.unwrap();
    assert!(!session.row_numbers().validate_row_numbers());

    assert_eq!(session.regenerate_row_numbers(&cancel).await.unwrap(), 4);
    assert!(session.row_numbers().validate_row_numbers());
    assert_eq!(ids(&session.get_all_rows()), vec![2, 4, 5, 6]);
}

// ---------------------------------------------------------------------------
// Validation automation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn manual_mode_waits_for_explicit_validation() {
    let options = GridOptions::default().with_validation(ValidationAutomationSettings::manual());
    let (events, session) = session_with(options);
    let cancel = CancelToken::none();
    session
        .validation()
        .add_rule(ValidationRule::range("age-range", "age", Some(0.0), Some(120.0)))
        .unwrap();
    session.import_rows(vec![person(1, "a", 30)], &cancel).await.unwrap();

    let edit = session
        .update_cell(0, "age", CellValue::Int(500), &cancel)
        .await
        .unwrap();
    assert!(edit.is_none());
    assert!(events.validation_changed_events().is_empty());
    assert!(session.validation().cached_result(0).is_none());

    let result = session
        .validate_cell(0, "age", CellValue::Int(500), &cancel)
        .await
        .unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.rule_name.as_deref(), Some("age-range"));
}

#[tokio::test]
async fn automatic_import_writes_alerts() {
    let (events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    session
        .validation()
        .add_rule(ValidationRule::required("name-required", "name"))
        .unwrap();

    session
        .import_rows(vec![person(1, "a", 1), Row::new().with("id", 2i64)], &cancel)
        .await
        .unwrap();

    assert!(session.store().get_cell(0, "ValidationAlerts").unwrap().is_null());
    let alerts = session.store().get_cell(1, "ValidationAlerts").unwrap();
    assert!(alerts.display_string().contains("name"));

    let validation = events.validation_changed_events();
    assert_eq!(validation.last().map(|e| e.error_count), Some(1));
    assert!(!events.progress_events().is_empty());
}

#[tokio::test]
async fn validate_all_is_idempotent() {
    let (_events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    session
        .validation()
        .add_rule(ValidationRule::range("age-range", "age", Some(0.0), Some(120.0)))
        .unwrap();
    let rows = vec![person(1, "a", 30), person(2, "b", 300), person(3, "c", -1)];
    session.import_rows(rows, &cancel).await.unwrap();

    let first = session.validate_all(&cancel).await.unwrap();
    let snapshot = session.get_all_rows();
    let second = session.validate_all(&cancel).await.unwrap();

    assert_eq!(first.invalid_rows, 2);
    assert_eq!(second.invalid_rows, first.invalid_rows);
    assert_eq!(second.total_failures, first.total_failures);
    assert_eq!(session.get_all_rows(), snapshot);
}

#[tokio::test]
async fn checked_rows_only() {
    let (_events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    session
        .validation()
        .add_rule(ValidationRule::required("name-required", "name"))
        .unwrap();
    session
        .import_rows(
            vec![
                person(1, "a", 1).with("selected", true),
                Row::new().with("id", 2i64).with("selected", false),
            ],
            &cancel,
        )
        .await
        .unwrap();

    assert!(!session
        .are_all_non_empty_rows_valid(false, false, &cancel)
        .await
        .unwrap());
    assert!(session
        .are_all_non_empty_rows_valid(false, true, &cancel)
        .await
        .unwrap());
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_navigates_matches() {
    let (_events, session) = session_with(GridOptions::default());
    let cancel = CancelToken::none();
    session
        .import_rows(
            vec![person(1, "Alice", 1), person(2, "Bob", 2), person(3, "alicia", 3)],
            &cancel,
        )
        .await
        .unwrap();

    let matches = session.search("ali", SearchOptions::default()).unwrap();
    assert_eq!(matches.len(), 2);

    let search = session.search_engine();
    assert!(search.current_match().is_none());
    let first = search.next_match().unwrap();
    let second = search.next_match().unwrap();
    assert_ne!(first.row_index, second.row_index);
    assert_eq!(search.next_match().unwrap().row_index, first.row_index);
}
