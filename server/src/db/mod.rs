//! Storage layer. One `Database` handle over a `PgPool`, with the methods
//! for each aggregate grouped in their own module. All pair-keyed writes go
//! through single-statement upserts so concurrent callers cannot duplicate a
//! grant, a history row, or a pending request.

pub mod audit;
pub mod doctors;
pub mod grants;
pub mod history;
pub mod migrations;
pub mod patients;
pub mod records;
pub mod requests;

#[cfg(test)]
pub(crate) mod test_support;

use sqlx::PgPool;

pub use records::NewMedicalRecord;

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Decode failure for a text column holding a closed enum.
pub(crate) fn bad_column(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(format!("unexpected value {value:?} in column {column}").into())
}
