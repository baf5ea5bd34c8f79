//! Row Store - canonical in-memory row data
//!
//! Locking layout:
//! - outer `RwLock<Vec<..>>` guards structure (count and order)
//! - each row sits behind its own `RwLock`
//!
//! Single-row reads and writes take the outer lock shared plus the row's own
//! lock, so edits to different rows don't block each other. Structural
//! mutations (add/insert/remove/replace/clear) take the outer lock exclusive.
//!
//! Key invariants:
//! - Every single-row operation is atomic with respect to size and order
//! - Positions are only stable between structural mutations;
//!   `structure_version()` changes whenever they may have moved
//! - No cross-row isolation: a reader may observe a multi-row batch half
//!   applied, except through `replace_all_rows`, `reorder_rows` and
//!   `renumber_rows`, which hold the structural lock from read to swap
//! - `reorder_rows` and `renumber_rows` keep the existing row slots, so a
//!   single-row write that returned before them is never lost

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::error::{GridError, GridResult};
use crate::row::{Row, CREATED_AT_KEY, ROW_NUMBER_KEY};
use crate::value::CellValue;

type RowSlot = Arc<RwLock<Row>>;

#[derive(Debug, Default)]
pub struct RowStore {
    rows: RwLock<Vec<RowSlot>>,
    structure_version: AtomicU64,
    /// Last `__createdAt` handed out; stamps are strictly increasing.
    last_stamp: Mutex<Option<NaiveDateTime>>,
}

impl RowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        let store = Self::new();
        store.add_rows(rows);
        store
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn get_row(&self, index: usize) -> Option<Row> {
        let slot = self.rows.read().get(index).cloned()?;
        let row = slot.read().clone();
        Some(row)
    }

    /// Snapshot of every row, in order.
    pub fn get_all_rows(&self) -> Vec<Row> {
        let slots: Vec<RowSlot> = self.rows.read().clone();
        slots.iter().map(|slot| slot.read().clone()).collect()
    }

    /// Read one cell without cloning the whole row.
    pub fn get_cell(&self, index: usize, column: &str) -> Option<CellValue> {
        let slot = self.rows.read().get(index).cloned()?;
        let value = slot.read().get(column).clone();
        Some(value)
    }

    pub fn get_row_count(&self) -> usize {
        self.rows.read().len()
    }

    pub fn row_exists(&self, index: usize) -> bool {
        index < self.get_row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.get_row_count() == 0
    }

    /// Bumped on every insert/remove/replace/clear. Positions captured under
    /// an older version may point at different rows now.
    pub fn structure_version(&self) -> u64 {
        self.structure_version.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Structural mutations
    // -------------------------------------------------------------------------

    /// Append a row and return its position.
    pub fn add_row(&self, mut row: Row) -> usize {
        row.ensure_created_at(self.next_stamp());
        let mut rows = self.rows.write();
        rows.push(Arc::new(RwLock::new(row)));
        self.bump_version();
        rows.len() - 1
    }

    /// Append many rows under one lock. Returns the number appended.
    pub fn add_rows(&self, rows: Vec<Row>) -> usize {
        if rows.is_empty() {
            return 0;
        }
        let stamped: Vec<RowSlot> = rows
            .into_iter()
            .map(|mut row| {
                row.ensure_created_at(self.next_stamp());
                Arc::new(RwLock::new(row))
            })
            .collect();
        let count = stamped.len();

        self.rows.write().extend(stamped);
        self.bump_version();
        count
    }

    /// Insert at `index`. `index == count` appends; anything past that fails.
    pub fn insert_row(&self, index: usize, mut row: Row) -> GridResult<()> {
        row.ensure_created_at(self.next_stamp());
        let mut rows = self.rows.write();
        if index > rows.len() {
            return Err(GridError::IndexOutOfRange {
                index,
                count: rows.len(),
            });
        }
        rows.insert(index, Arc::new(RwLock::new(row)));
        self.bump_version();
        Ok(())
    }

    pub fn remove_row(&self, index: usize) -> GridResult<Row> {
        let mut rows = self.rows.write();
        if index >= rows.len() {
            return Err(GridError::RowNotFound {
                index,
                count: rows.len(),
            });
        }
        let slot = rows.remove(index);
        self.bump_version();
        drop(rows);

        let row = slot.read().clone();
        Ok(row)
    }

    /// Remove several positions at once. Returns how many were removed.
    ///
    /// Duplicates and out-of-range indices are ignored. Removal runs in
    /// descending order so earlier removals don't shift later targets.
    pub fn remove_rows(&self, indices: &[usize]) -> usize {
        let mut rows = self.rows.write();
        let count = rows.len();

        let mut targets: Vec<usize> = indices.iter().copied().filter(|&i| i < count).collect();
        targets.sort_unstable_by(|a, b| b.cmp(a));
        targets.dedup();

        for &index in &targets {
            rows.remove(index);
        }
        if !targets.is_empty() {
            self.bump_version();
        }
        targets.len()
    }

    /// Swap the whole row set in one step.
    pub fn replace_all_rows(&self, rows: Vec<Row>) {
        let slots: Vec<RowSlot> = rows
            .into_iter()
            .map(|mut row| {
                row.ensure_created_at(self.next_stamp());
                Arc::new(RwLock::new(row))
            })
            .collect();

        *self.rows.write() = slots;
        self.bump_version();
    }

    /// Reorder rows in one step. `plan` sees the current rows and returns
    /// their new order as old positions; it must be a permutation.
    ///
    /// The structural lock is held from the read until the swap. Slots move,
    /// row data is not copied back.
    pub fn reorder_rows<F>(&self, plan: F) -> GridResult<usize>
    where
        F: FnOnce(&[Row]) -> GridResult<Vec<usize>>,
    {
        let mut rows = self.rows.write();
        let snapshot: Vec<Row> = rows.iter().map(|slot| slot.read().clone()).collect();
        let order = plan(&snapshot)?;
        check_permutation(&order, rows.len())?;

        let reordered: Vec<RowSlot> = order.iter().map(|&i| rows[i].clone()).collect();
        *rows = reordered;
        self.bump_version();
        Ok(rows.len())
    }

    /// Write `__rowNumber` on every row in one step. `plan` sees the current
    /// rows and returns one number per position.
    ///
    /// Holds the structural lock throughout and only touches `__rowNumber`
    /// through each row's own lock. Positions don't change.
    pub fn renumber_rows<F>(&self, plan: F) -> GridResult<usize>
    where
        F: FnOnce(&[Row]) -> GridResult<Vec<i64>>,
    {
        let rows = self.rows.write();
        let snapshot: Vec<Row> = rows.iter().map(|slot| slot.read().clone()).collect();
        let numbers = plan(&snapshot)?;
        if numbers.len() != rows.len() {
            return Err(GridError::Internal(format!(
                "renumber plan covers {} of {} rows",
                numbers.len(),
                rows.len()
            )));
        }

        for (slot, number) in rows.iter().zip(numbers) {
            slot.write().set_row_number(number);
        }
        Ok(rows.len())
    }

    /// Remove every row. Returns the number removed.
    pub fn clear_all_rows(&self) -> usize {
        let mut rows = self.rows.write();
        let removed = rows.len();
        rows.clear();
        self.bump_version();
        removed
    }

    // -------------------------------------------------------------------------
    // Single-row mutations
    // -------------------------------------------------------------------------

    /// Replace the row at `index`.
    ///
    /// Reserved attributes (`__createdAt`, `__rowNumber`) missing from the new
    /// row are carried over from the old one.
    pub fn update_row(&self, index: usize, mut row: Row) -> GridResult<()> {
        self.with_row_mut(index, |current| {
            for key in [CREATED_AT_KEY, ROW_NUMBER_KEY] {
                if !row.contains(key) && current.contains(key) {
                    row.set(key, current.get(key).clone());
                }
            }
            *current = row;
        })
    }

    /// Write one cell. Returns the previous value.
    pub fn update_cell(
        &self,
        index: usize,
        column: &str,
        value: CellValue,
    ) -> GridResult<CellValue> {
        self.with_row_mut(index, |row| row.set(column, value))
    }

    /// Run `f` against the row at `index` while holding only that row's lock.
    pub fn with_row_mut<R>(&self, index: usize, f: impl FnOnce(&mut Row) -> R) -> GridResult<R> {
        let slot = {
            let rows = self.rows.read();
            match rows.get(index) {
                Some(slot) => slot.clone(),
                None => {
                    return Err(GridError::RowNotFound {
                        index,
                        count: rows.len(),
                    })
                }
            }
        };
        let mut row = slot.write();
        Ok(f(&mut row))
    }

    // -------------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------------

    fn bump_version(&self) {
        self.structure_version.fetch_add(1, Ordering::SeqCst);
    }

    fn next_stamp(&self) -> NaiveDateTime {
        let mut last = self.last_stamp.lock();
        let now = Utc::now().naive_utc();
        let stamp = match *last {
            Some(prev) if now <= prev => prev + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }
}

fn check_permutation(order: &[usize], count: usize) -> GridResult<()> {
    let mut seen = vec![false; count];
    for &i in order {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            _ => {
                return Err(GridError::Internal(format!(
                    "reorder plan is not a permutation of {} rows",
                    count
                )))
            }
        }
    }
    if order.len() != count {
        return Err(GridError::Internal(format!(
            "reorder plan covers {} of {} rows",
            order.len(),
            count
        )));
    }
    Ok(())
}
