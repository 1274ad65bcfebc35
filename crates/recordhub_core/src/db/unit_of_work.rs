//! Explicit transaction handle for multi-step writes.
//!
//! # Invariants
//! - A unit of work is finalized exactly once: `commit`, `rollback`, or drop.
//! - Dropping an unfinished unit of work rolls back every pending change.
//! - Units of work take the SQLite write lock up front (`IMMEDIATE`).

use super::DbResult;
use log::debug;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;

/// Scoped write transaction threaded through store calls.
pub struct UnitOfWork<'conn> {
    // Declared first so the transaction rolls back before the notice logs.
    tx: Transaction<'conn>,
    notice: RollbackNotice,
    started_at: Instant,
}

/// Logs a rollback for units of work dropped without being finalized.
struct RollbackNotice {
    label: &'static str,
    armed: bool,
}

impl Drop for RollbackNotice {
    fn drop(&mut self) {
        if self.armed {
            debug!(
                "event=uow_rollback module=db status=ok op={} reason=dropped",
                self.label
            );
        }
    }
}

impl<'conn> UnitOfWork<'conn> {
    /// Begins an `IMMEDIATE` transaction on a shared connection borrow.
    ///
    /// `label` names the enclosing operation in log events.
    pub fn begin(conn: &'conn Connection, label: &'static str) -> DbResult<Self> {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        debug!("event=uow_begin module=db status=ok op={label}");
        Ok(Self {
            tx,
            notice: RollbackNotice { label, armed: true },
            started_at: Instant::now(),
        })
    }

    /// Connection view scoped to this transaction.
    ///
    /// Statements executed through it become visible to others only after
    /// [`UnitOfWork::commit`].
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    /// Commits every pending change.
    pub fn commit(self) -> DbResult<()> {
        let Self {
            tx,
            mut notice,
            started_at,
        } = self;
        notice.armed = false;
        tx.commit()?;
        debug!(
            "event=uow_commit module=db status=ok op={} duration_ms={}",
            notice.label,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Discards every pending change.
    pub fn rollback(self) -> DbResult<()> {
        let Self { tx, mut notice, .. } = self;
        notice.armed = false;
        tx.rollback()?;
        debug!("event=uow_rollback module=db status=ok op={}", notice.label);
        Ok(())
    }
}
