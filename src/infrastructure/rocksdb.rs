use crate::domain::payment::{Amount, PaidMonth, Payment};
use crate::domain::ports::PaymentRepository;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding one row per payment aggregate.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family holding one row per paid month, keyed by `<payment_id>/<index>`.
pub const CF_PAID_MONTHS: &str = "paid_months";

/// Aggregate row without its paid months.
#[derive(Serialize, Deserialize)]
struct PaymentRow {
    id: String,
    student_id: String,
    student_name: String,
    student_code: String,
    group: String,
    amount: Option<Amount>,
}

#[derive(Serialize, Deserialize)]
struct PaidMonthRow {
    payment_id: String,
    month: String,
    date: chrono::DateTime<chrono::Utc>,
}

fn paid_month_prefix(payment_id: &str) -> String {
    format!("{payment_id}/")
}

fn paid_month_key(payment_id: &str, index: usize) -> String {
    // Zero padding keeps lexicographic key order equal to insertion order.
    format!("{payment_id}/{index:08}")
}

/// A persistent store implementation using RocksDB.
///
/// Payments and paid months live in separate Column Families, mirroring a
/// parent table and a child table joined by payment id. Every write goes
/// through a single `WriteBatch`, so parent and children change atomically.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("payments" and "paid_months") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let cf_paid_months = ColumnFamilyDescriptor::new(CF_PAID_MONTHS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_payments, cf_paid_months])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::storage(format!("{name} column family not found")))
    }

    fn paid_months_of(&self, payment_id: &str) -> Result<Vec<PaidMonth>> {
        let cf = self.cf(CF_PAID_MONTHS)?;
        let prefix = paid_month_prefix(payment_id);
        let iter = self.db.iterator_cf(
            cf,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );

        let mut months = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let row: PaidMonthRow = serde_json::from_slice(&value)?;
            months.push(PaidMonth::new(row.month, row.date));
        }
        Ok(months)
    }

    fn assemble(&self, row: PaymentRow) -> Result<Payment> {
        let months = self.paid_months_of(&row.id)?;
        Payment::from_parts(
            row.id,
            row.student_id,
            row.student_name,
            row.student_code,
            row.group,
            row.amount,
            months,
        )
    }

    fn rows(&self) -> Result<Vec<PaymentRow>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Queues removal of every paid-month row of `payment_id`.
    fn delete_paid_months(&self, batch: &mut WriteBatch, payment_id: &str) -> Result<()> {
        let cf = self.cf(CF_PAID_MONTHS)?;
        let from = paid_month_prefix(payment_id);
        // '0' sorts right after '/', closing the prefix range.
        let to = format!("{payment_id}0");
        batch.delete_range_cf(cf, from.as_bytes(), to.as_bytes());
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for RocksDBStore {
    async fn all(&self) -> Result<Vec<Payment>> {
        self.rows()?
            .into_iter()
            .map(|row| self.assemble(row))
            .collect()
    }

    async fn get(&self, payment_id: &str) -> Result<Option<Payment>> {
        let cf = self.cf(CF_PAYMENTS)?;
        match self.db.get_cf(cf, payment_id.as_bytes())? {
            Some(bytes) => {
                let row: PaymentRow = serde_json::from_slice(&bytes)?;
                Ok(Some(self.assemble(row)?))
            }
            None => Ok(None),
        }
    }

    async fn find_by_student(&self, student_id: &str) -> Result<Option<Payment>> {
        self.rows()?
            .into_iter()
            .find(|row| row.student_id == student_id)
            .map(|row| self.assemble(row))
            .transpose()
    }

    async fn save(&self, payment: &Payment) -> Result<()> {
        let cf_payments = self.cf(CF_PAYMENTS)?;
        let cf_paid_months = self.cf(CF_PAID_MONTHS)?;

        let row = PaymentRow {
            id: payment.id.clone(),
            student_id: payment.student_id.clone(),
            student_name: payment.student_name.clone(),
            student_code: payment.student_code.clone(),
            group: payment.group.clone(),
            amount: payment.amount,
        };

        let mut batch = WriteBatch::default();
        self.delete_paid_months(&mut batch, &payment.id)?;
        for (index, paid) in payment.paid_months().iter().enumerate() {
            let month_row = PaidMonthRow {
                payment_id: payment.id.clone(),
                month: paid.month.clone(),
                date: paid.date,
            };
            batch.put_cf(
                cf_paid_months,
                paid_month_key(&payment.id, index),
                serde_json::to_vec(&month_row)?,
            );
        }
        batch.put_cf(cf_payments, payment.id.as_bytes(), serde_json::to_vec(&row)?);

        self.db.write(batch)?;
        Ok(())
    }

    async fn delete(&self, payment_id: &str) -> Result<bool> {
        let cf = self.cf(CF_PAYMENTS)?;
        if self.db.get_pinned_cf(cf, payment_id.as_bytes())?.is_none() {
            return Ok(false);
        }

        // Children first, then the parent, committed as one batch.
        let mut batch = WriteBatch::default();
        self.delete_paid_months(&mut batch, payment_id)?;
        batch.delete_cf(cf, payment_id.as_bytes());
        self.db.write(batch)?;
        Ok(true)
    }
}
