//! Row Number Service - dense 1-based row numbering
//!
//! Regeneration is the recovery path for corrupted, duplicated or gapped
//! numbers: read every row, order by `(__createdAt, position)` and hand out
//! 1..N in that order, all inside one `RowStore::renumber_rows` pass. Rows
//! keep their store positions and their other cells; only the numbers
//! change.
//!
//! Only one regeneration runs at a time. Concurrent callers wait for the
//! running one to finish and then run their own pass; they never fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::cancel::CancelToken;
use crate::error::{GridError, GridResult};
use crate::row::Row;
use crate::row_store::RowStore;

pub struct RowNumberService {
    store: Arc<RowStore>,
    /// Single permit: idle <-> regenerating
    gate: Semaphore,
    regenerating: AtomicBool,
}

impl RowNumberService {
    pub fn new(store: Arc<RowStore>) -> Self {
        Self {
            store,
            gate: Semaphore::new(1),
            regenerating: AtomicBool::new(false),
        }
    }

    pub fn is_regenerating(&self) -> bool {
        self.regenerating.load(Ordering::SeqCst)
    }

    /// Renumber every row. Returns the number of rows renumbered.
    ///
    /// Cancellation is checked before the swap; a cancelled pass leaves the
    /// store untouched.
    pub async fn regenerate_row_numbers(&self, cancel: &CancelToken) -> GridResult<usize> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| GridError::Internal(format!("row number gate closed: {}", e)))?;

        self.regenerating.store(true, Ordering::SeqCst);
        let result = self.regenerate_locked(cancel);
        self.regenerating.store(false, Ordering::SeqCst);

        match &result {
            Ok(count) => log::info!("regenerated row numbers for {} rows", count),
            Err(GridError::Cancelled) => log::info!("row number regeneration cancelled"),
            Err(e) => log::warn!("row number regeneration failed: {}", e),
        }
        result
    }

    fn regenerate_locked(&self, cancel: &CancelToken) -> GridResult<usize> {
        cancel.check()?;
        self.store.renumber_rows(|rows| {
            let mut order: Vec<usize> = (0..rows.len()).collect();
            // Stable sort; ties on __createdAt keep position order
            order.sort_by_key(|&i| rows[i].created_at());
            cancel.check()?;

            let mut numbers = vec![0; rows.len()];
            for (n, &position) in order.iter().enumerate() {
                numbers[position] = n as i64 + 1;
            }
            cancel.check()?;
            Ok(numbers)
        })
    }

    /// True when numbers are exactly a permutation of 1..N. Never errors.
    pub fn validate_row_numbers(&self) -> bool {
        let mut numbers: Vec<i64> = self
            .store
            .get_all_rows()
            .iter()
            .map(read_row_number)
            .collect();
        numbers.sort_unstable();

        numbers
            .iter()
            .enumerate()
            .all(|(i, &n)| n == i as i64 + 1)
    }

    /// Largest row number present; 0 for an empty store.
    pub fn get_max_row_number(&self) -> i64 {
        self.store
            .get_all_rows()
            .iter()
            .map(read_row_number)
            .max()
            .unwrap_or(0)
            .max(0)
    }

    pub fn get_next_row_number(&self) -> i64 {
        self.get_max_row_number() + 1
    }

    /// Give `row` the next free number. Returns the number assigned.
    pub fn assign_next_row_number(&self, row: &mut Row) -> i64 {
        let next = self.get_next_row_number();
        row.set_row_number(next);
        next
    }
}

/// Tolerant read for repair scans: Int, integral Float and numeric text
/// count; anything else reads as 0.
fn read_row_number(row: &Row) -> i64 {
    row.row_number().to_i64().unwrap_or(0)
}
