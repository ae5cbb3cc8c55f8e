use crate::domain::payment::Payment;
use crate::domain::ports::PaymentRepository;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for payment aggregates.
///
/// Uses `Arc<RwLock<HashMap<String, Payment>>>` keyed by payment id so clones
/// share the same data. Ideal for testing or a single short-lived session.
#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    payments: Arc<RwLock<HashMap<String, Payment>>>,
}

impl InMemoryPaymentRepository {
    /// Creates a new, empty in-memory payment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn all(&self) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let mut all: Vec<Payment> = payments.values().cloned().collect();
        all.sort_by(|a, b| a.student_id.cmp(&b.student_id).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn get(&self, payment_id: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments.get(payment_id).cloned())
    }

    async fn find_by_student(&self, student_id: &str) -> Result<Option<Payment>> {
        let payments = self.payments.read().await;
        Ok(payments
            .values()
            .find(|p| p.student_id == student_id)
            .cloned())
    }

    async fn save(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.write().await;
        payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn delete(&self, payment_id: &str) -> Result<bool> {
        let mut payments = self.payments.write().await;
        Ok(payments.remove(payment_id).is_some())
    }
}
