//! Serialized, retried write transactions.
//!
//! Every mutation of a cap ledger entry or a progress log runs through
//! [`WriteExecutor::run`]:
//!
//! 1. Take a pooled connection and open `BEGIN IMMEDIATE`, which acquires
//!    the database write lock up front (waiting up to `busy_timeout`).
//! 2. Run the caller's read-compute-write closure against the transaction.
//!    Versioned updates inside it report a lost race as
//!    [`TallyError::Contended`].
//! 3. Commit. Any error rolls the transaction back on drop.
//!
//! Contention (busy, locked, lost compare-and-swap, sequence collision)
//! retries with jittered exponential backoff until the [`RetryPolicy`] is
//! spent, then surfaces as [`TallyError::ConcurrencyConflict`]. Every other
//! error returns immediately.

use rusqlite::{Connection, TransactionBehavior};
use tally_core::RetryPolicy;
use tracing::{debug, warn};

use crate::errors::{Result, TallyError};
use crate::sqlite::ConnectionPool;

/// Runs closures as serialized write transactions with bounded retry.
#[derive(Clone)]
pub struct WriteExecutor {
    pool: ConnectionPool,
    policy: RetryPolicy,
}

impl WriteExecutor {
    /// Executor over `pool` retrying per `policy`.
    pub fn new(pool: ConnectionPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Retry policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` in a write transaction, retrying on contention.
    ///
    /// `key` names the contended resource in logs and in the conflict error.
    /// `op` may run more than once, so it must not have effects outside the
    /// transaction.
    pub fn run<T>(&self, key: &str, mut op: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match self.attempt(&mut op) {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(key, attempts, "contended write committed after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_contention() => {
                    if !self.policy.allows_another(attempts) {
                        warn!(key, attempts, error = %err, "write retries exhausted");
                        return Err(TallyError::ConcurrencyConflict {
                            key: key.to_string(),
                            attempts,
                        });
                    }
                    let delay = self.policy.delay_for(attempts - 1, rand::random::<f64>());
                    debug!(
                        key,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "write contended, backing off"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn attempt<T>(&self, op: &mut impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::sqlite::{ConnectionConfig, new_in_memory};
    use std::cell::Cell;

    fn executor(max_attempts: u32) -> WriteExecutor {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        pool.get()
            .unwrap()
            .execute_batch("CREATE TABLE t (v INTEGER NOT NULL)")
            .unwrap();
        WriteExecutor::new(
            pool,
            RetryPolicy {
                max_attempts,
                base_delay_ms: 1,
                max_delay_ms: 2,
                jitter_factor: 0.0,
            },
        )
    }

    fn rows(exec: &WriteExecutor) -> i64 {
        exec.pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn commits_on_success() {
        let exec = executor(3);
        let value = exec
            .run("k", |conn| {
                let _ = conn.execute("INSERT INTO t (v) VALUES (1)", [])?;
                Ok(7)
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(rows(&exec), 1);
    }

    #[test]
    fn retries_contention_then_succeeds() {
        let exec = executor(3);
        let calls = Cell::new(0);
        exec.run("k", |conn| {
            calls.set(calls.get() + 1);
            let _ = conn.execute("INSERT INTO t (v) VALUES (?1)", [calls.get()])?;
            if calls.get() < 3 {
                return Err(TallyError::Contended("k".into()));
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(calls.get(), 3);
        // Failed attempts rolled back their inserts
        assert_eq!(rows(&exec), 1);
    }

    #[test]
    fn exhaustion_is_a_conflict_and_rolls_back() {
        let exec = executor(2);
        let calls = Cell::new(0);
        let err = exec
            .run("cap:e1/2024/medical", |conn| -> Result<()> {
                calls.set(calls.get() + 1);
                let _ = conn.execute("INSERT INTO t (v) VALUES (1)", [])?;
                Err(TallyError::Contended("x".into()))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 2);
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        assert!(matches!(
            err,
            TallyError::ConcurrencyConflict { ref key, attempts: 2 } if key == "cap:e1/2024/medical"
        ));
        assert_eq!(rows(&exec), 0);
    }

    #[test]
    fn non_contention_errors_return_immediately() {
        let exec = executor(5);
        let calls = Cell::new(0);
        let err = exec
            .run("k", |_| -> Result<()> {
                calls.set(calls.get() + 1);
                Err(TallyError::DuplicateClaim("c1".into()))
            })
            .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert_eq!(err.kind(), ErrorKind::DuplicateClaim);
    }
}
