use super::payment::Payment;
use crate::error::Result;
use async_trait::async_trait;

/// Persistence for payment aggregates.
///
/// Each call is atomic: an aggregate row and its paid-month rows are written
/// or removed together, so a failure never leaves orphans on either side.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn all(&self) -> Result<Vec<Payment>>;
    async fn get(&self, payment_id: &str) -> Result<Option<Payment>>;
    async fn find_by_student(&self, student_id: &str) -> Result<Option<Payment>>;
    /// Inserts or replaces the aggregate together with all of its paid months.
    async fn save(&self, payment: &Payment) -> Result<()>;
    /// Removes the paid months, then the aggregate. Returns `false` if the id
    /// was unknown.
    async fn delete(&self, payment_id: &str) -> Result<bool>;
}

pub type PaymentRepositoryBox = Box<dyn PaymentRepository>;
