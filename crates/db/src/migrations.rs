use rusqlite::TransactionBehavior;

use crate::Ledger;
use crate::error::Result;

const MIGRATION_0001: &str = include_str!("../migrations/0001_init.sql");
const MIGRATION_0002: &str = include_str!("../migrations/0002_add_indexes.sql");

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_init", MIGRATION_0001),
    ("0002_add_indexes", MIGRATION_0002),
];

impl Ledger {
    /// Applies every schema migration. Safe to run on each startup.
    pub fn migrate(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for (name, sql) in MIGRATIONS {
            tx.execute_batch(sql)?;
            tracing::trace!(migration = *name, "applied migration");
        }
        tx.commit()?;
        Ok(())
    }
}
