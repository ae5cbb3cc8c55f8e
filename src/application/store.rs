use crate::config::StoreConfig;
use crate::domain::billing::{LessonNumber, LessonStatus, has_paid_for_lesson};
use crate::domain::payment::{NewPayment, PaidMonth, Payment, PaymentUpdate};
use crate::domain::ports::PaymentRepositoryBox;
use crate::domain::search::StudentQuery;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Default)]
struct Mirror {
    payments: Vec<Payment>,
    loaded_at: Option<Instant>,
}

/// Records and queries student payments.
///
/// `PaymentStore` owns a persistence backend and an in-memory mirror of every
/// aggregate. Reads are served from the mirror. Writes go to the backend
/// first and the mirror is then patched with exactly what was written; the
/// backend is not re-read to confirm.
///
/// Mutations hold the mirror's write lock for their whole duration, so the
/// duplicate-month check and the write it guards cannot interleave with
/// another mutation on the same store.
pub struct PaymentStore {
    repository: PaymentRepositoryBox,
    config: StoreConfig,
    mirror: RwLock<Mirror>,
}

impl PaymentStore {
    /// Creates a new `PaymentStore`. Nothing is read until the first call.
    ///
    /// # Arguments
    ///
    /// * `repository` - The backend holding payment aggregates.
    /// * `config` - Cache settings for the mirror.
    pub fn new(repository: PaymentRepositoryBox, config: StoreConfig) -> Self {
        Self {
            repository,
            config,
            mirror: RwLock::new(Mirror::default()),
        }
    }

    /// Loads the mirror from storage unless it was loaded within the cache TTL.
    pub async fn load(&self) -> Result<()> {
        let mut mirror = self.mirror.write().await;
        self.load_if_stale(&mut mirror).await
    }

    /// Reloads the mirror from storage, ignoring the cache TTL.
    pub async fn refresh(&self) -> Result<()> {
        info!("manual refresh requested");
        let mut mirror = self.mirror.write().await;
        self.reload(&mut mirror).await
    }

    async fn load_if_stale(&self, mirror: &mut Mirror) -> Result<()> {
        let fresh = mirror
            .loaded_at
            .is_some_and(|at| at.elapsed() < self.config.cache_ttl);
        if fresh {
            return Ok(());
        }
        self.reload(mirror).await
    }

    async fn reload(&self, mirror: &mut Mirror) -> Result<()> {
        let payments = self.repository.all().await.inspect_err(log_storage)?;
        info!(count = payments.len(), "loaded payments");
        mirror.payments = payments;
        mirror.loaded_at = Some(Instant::now());
        Ok(())
    }

    /// Mirror index of the student's aggregate. On a miss the backend is asked
    /// directly and a hit is adopted into the mirror, so a stale mirror never
    /// leads to a second aggregate for the same student.
    async fn locate_student(&self, mirror: &mut Mirror, student_id: &str) -> Result<Option<usize>> {
        if let Some(idx) = mirror.payments.iter().position(|p| p.student_id == student_id) {
            return Ok(Some(idx));
        }
        let stored = self
            .repository
            .find_by_student(student_id)
            .await
            .inspect_err(log_storage)?;
        Ok(stored.map(|payment| {
            debug!(student_id, payment_id = %payment.id, "adopted payment missing from mirror");
            mirror.payments.push(payment);
            mirror.payments.len() - 1
        }))
    }

    /// Mirror index of a payment, falling back to the backend like
    /// `locate_student`.
    async fn locate_payment(&self, mirror: &mut Mirror, payment_id: &str) -> Result<usize> {
        if let Some(idx) = mirror.payments.iter().position(|p| p.id == payment_id) {
            return Ok(idx);
        }
        let stored = self
            .repository
            .get(payment_id)
            .await
            .inspect_err(log_storage)?
            .ok_or_else(|| PaymentError::NotFound(payment_id.to_string()))?;
        debug!(payment_id, "adopted payment missing from mirror");
        mirror.payments.push(stored);
        Ok(mirror.payments.len() - 1)
    }

    /// Records a paid month for a student.
    ///
    /// The first payment creates the student's aggregate; later ones append
    /// to it. A label the student already paid yields
    /// [`PaymentError::DuplicateMonth`] with the aggregate untouched.
    pub async fn add_payment(&self, submission: NewPayment) -> Result<Payment> {
        let amount = submission.validate()?;
        let mut mirror = self.mirror.write().await;
        self.load_if_stale(&mut mirror).await?;

        let paid = PaidMonth::new(submission.month.clone(), Utc::now());
        let existing = self
            .locate_student(&mut mirror, &submission.student_id)
            .await?;

        match existing {
            Some(idx) => {
                let mut payment = mirror.payments[idx].clone();
                payment.record_month(paid)?;
                if amount.is_some() {
                    payment.amount = amount;
                }
                self.repository
                    .save(&payment)
                    .await
                    .inspect_err(log_storage)?;
                info!(
                    payment_id = %payment.id,
                    student_id = %payment.student_id,
                    month = %payment.month(),
                    paid_months = payment.paid_month_count(),
                    "recorded paid month"
                );
                mirror.payments[idx] = payment.clone();
                Ok(payment)
            }
            None => {
                let payment = Payment::new(Uuid::new_v4().to_string(), &submission, amount, paid);
                self.repository
                    .save(&payment)
                    .await
                    .inspect_err(log_storage)?;
                info!(
                    payment_id = %payment.id,
                    student_id = %payment.student_id,
                    month = %payment.month(),
                    "created payment record"
                );
                mirror.payments.push(payment.clone());
                Ok(payment)
            }
        }
    }

    /// Edits a payment aggregate. A changed month label renames the last-paid
    /// entry in place instead of appending a new one.
    pub async fn update_payment(&self, payment_id: &str, update: PaymentUpdate) -> Result<Payment> {
        let mut mirror = self.mirror.write().await;
        self.load_if_stale(&mut mirror).await?;

        let idx = self.locate_payment(&mut mirror, payment_id).await?;

        let mut payment = mirror.payments[idx].clone();
        let previous_month = payment.month().to_string();
        payment.apply_update(update)?;
        self.repository
            .save(&payment)
            .await
            .inspect_err(log_storage)?;
        info!(
            payment_id = %payment.id,
            from = %previous_month,
            to = %payment.month(),
            "updated payment"
        );
        mirror.payments[idx] = payment.clone();
        Ok(payment)
    }

    /// Removes a payment aggregate together with all its paid months.
    pub async fn delete_payment(&self, payment_id: &str) -> Result<()> {
        let mut mirror = self.mirror.write().await;
        self.load_if_stale(&mut mirror).await?;

        self.locate_payment(&mut mirror, payment_id).await?;
        let existed = self
            .repository
            .delete(payment_id)
            .await
            .inspect_err(log_storage)?;
        if !existed {
            // Removed elsewhere since our last read; drop it locally too.
            debug!(payment_id, "payment already absent from storage");
        }
        let before = mirror.payments.len();
        mirror.payments.retain(|p| p.id != payment_id);
        info!(
            payment_id,
            before,
            after = mirror.payments.len(),
            "deleted payment"
        );
        Ok(())
    }

    pub async fn all(&self) -> Result<Vec<Payment>> {
        self.load().await?;
        Ok(self.mirror.read().await.payments.clone())
    }

    pub async fn get(&self, payment_id: &str) -> Result<Option<Payment>> {
        self.load().await?;
        let mirror = self.mirror.read().await;
        Ok(mirror.payments.iter().find(|p| p.id == payment_id).cloned())
    }

    /// Payments for one student. At most one is expected.
    pub async fn list_for_student(&self, student_id: &str) -> Result<Vec<Payment>> {
        self.load().await?;
        let mirror = self.mirror.read().await;
        Ok(mirror
            .payments
            .iter()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect())
    }

    pub async fn search(&self, query: &StudentQuery) -> Result<Vec<Payment>> {
        self.load().await?;
        let mirror = self.mirror.read().await;
        Ok(mirror
            .payments
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }

    async fn paid_month_count(&self, student_id: &str) -> Result<usize> {
        self.load().await?;
        let mirror = self.mirror.read().await;
        Ok(mirror
            .payments
            .iter()
            .find(|p| p.student_id == student_id)
            .map_or(0, Payment::paid_month_count))
    }

    /// Whether the student's paid months cover the lesson's billing period.
    pub async fn has_paid_for_lesson(&self, student_id: &str, lesson: LessonNumber) -> Result<bool> {
        let count = self.paid_month_count(student_id).await?;
        let paid = has_paid_for_lesson(count, lesson);
        debug!(
            student_id,
            lesson = lesson.value(),
            paid_months = count,
            paid,
            "checked lesson payment"
        );
        Ok(paid)
    }

    pub async fn lesson_status(&self, student_id: &str, lesson: LessonNumber) -> Result<LessonStatus> {
        let count = self.paid_month_count(student_id).await?;
        Ok(LessonStatus::new(count, lesson))
    }
}

fn log_storage(err: &PaymentError) {
    if let PaymentError::Storage(cause) = err {
        error!(error = %cause, "payment storage operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::PaymentRepository;
    use crate::infrastructure::in_memory::InMemoryPaymentRepository;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn submission(student: &str, month: &str) -> NewPayment {
        NewPayment {
            student_id: student.to_string(),
            student_name: format!("Student {student}"),
            student_code: format!("C-{student}"),
            group: "A".to_string(),
            month: month.to_string(),
            amount: None,
        }
    }

    fn store_over(repo: InMemoryPaymentRepository) -> PaymentStore {
        PaymentStore::new(Box::new(repo), StoreConfig::default())
    }

    /// Counts `all` calls to observe when the mirror reloads.
    #[derive(Clone, Default)]
    struct CountingRepository {
        inner: InMemoryPaymentRepository,
        loads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PaymentRepository for CountingRepository {
        async fn all(&self) -> Result<Vec<Payment>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.inner.all().await
        }
        async fn get(&self, payment_id: &str) -> Result<Option<Payment>> {
            self.inner.get(payment_id).await
        }
        async fn find_by_student(&self, student_id: &str) -> Result<Option<Payment>> {
            self.inner.find_by_student(student_id).await
        }
        async fn save(&self, payment: &Payment) -> Result<()> {
            self.inner.save(payment).await
        }
        async fn delete(&self, payment_id: &str) -> Result<bool> {
            self.inner.delete(payment_id).await
        }
    }

    #[tokio::test]
    async fn test_first_payment_creates_aggregate() {
        let repo = InMemoryPaymentRepository::new();
        let store = store_over(repo.clone());

        let payment = store.add_payment(submission("s1", "January")).await.unwrap();

        assert_eq!(payment.month(), "January");
        assert_eq!(payment.paid_month_count(), 1);
        assert_eq!(repo.get(&payment.id).await.unwrap(), Some(payment));
    }

    #[tokio::test]
    async fn test_second_payment_appends_to_same_aggregate() {
        let store = store_over(InMemoryPaymentRepository::new());

        let first = store.add_payment(submission("s1", "January")).await.unwrap();
        let second = store.add_payment(submission("s1", "February")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.paid_month_count(), 2);
        assert_eq!(second.month(), "February");
        assert_eq!(store.list_for_student("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_month_is_idempotent() {
        let store = store_over(InMemoryPaymentRepository::new());
        let first = store.add_payment(submission("s1", "January")).await.unwrap();

        let err = store
            .add_payment(submission("s1", "January"))
            .await
            .unwrap_err();

        match err {
            PaymentError::DuplicateMonth { payment, .. } => assert_eq!(*payment, first),
            other => panic!("expected DuplicateMonth, got {other:?}"),
        }
        let listed = store.list_for_student("s1").await.unwrap();
        assert_eq!(listed[0].paid_month_count(), 1);
    }

    #[tokio::test]
    async fn test_amount_updates_on_later_payment() {
        let store = store_over(InMemoryPaymentRepository::new());
        store.add_payment(submission("s1", "January")).await.unwrap();

        let mut next = submission("s1", "February");
        next.amount = Some(rust_decimal_macros::dec!(200));
        let payment = store.add_payment(next).await.unwrap();

        assert_eq!(
            payment.amount.map(|a| a.value()),
            Some(rust_decimal_macros::dec!(200))
        );
    }

    #[tokio::test]
    async fn test_update_unknown_payment() {
        let store = store_over(InMemoryPaymentRepository::new());
        let err = store
            .update_payment("missing", PaymentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_renames_in_place() {
        let repo = InMemoryPaymentRepository::new();
        let store = store_over(repo.clone());
        let created = store.add_payment(submission("s1", "January")).await.unwrap();
        let original_date = created.date();

        let updated = store
            .update_payment(
                &created.id,
                PaymentUpdate {
                    month: Some("February".to_string()),
                    group: Some("B".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.paid_months(), &[PaidMonth::new("February", original_date)]);
        assert_eq!(updated.group, "B");
        assert_eq!(repo.get(&created.id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let repo = InMemoryPaymentRepository::new();
        let store = store_over(repo.clone());
        let created = store.add_payment(submission("s1", "January")).await.unwrap();
        store.add_payment(submission("s1", "February")).await.unwrap();

        store.delete_payment(&created.id).await.unwrap();

        assert!(store.list_for_student("s1").await.unwrap().is_empty());
        assert!(repo.get(&created.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_payment(&created.id).await,
            Err(PaymentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_has_paid_for_lesson_counts_months() {
        let store = store_over(InMemoryPaymentRepository::new());
        let lesson = |n| LessonNumber::new(n).unwrap();

        assert!(!store.has_paid_for_lesson("s1", lesson(1)).await.unwrap());

        store.add_payment(submission("s1", "January")).await.unwrap();
        assert!(store.has_paid_for_lesson("s1", lesson(8)).await.unwrap());
        assert!(!store.has_paid_for_lesson("s1", lesson(9)).await.unwrap());

        store.add_payment(submission("s1", "anything")).await.unwrap();
        assert!(store.has_paid_for_lesson("s1", lesson(9)).await.unwrap());

        let status = store.lesson_status("s1", lesson(17)).await.unwrap();
        assert_eq!(status.period, 3);
        assert_eq!(status.paid_months, 2);
        assert!(!status.paid);
    }

    #[tokio::test]
    async fn test_mirror_reload_respects_ttl() {
        let repo = CountingRepository::default();
        let loads = repo.loads.clone();
        let store = PaymentStore::new(
            Box::new(repo.clone()),
            StoreConfig {
                cache_ttl: Duration::from_secs(3600),
            },
        );

        store.all().await.unwrap();
        store.all().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // Written behind the store's back: only visible after refresh.
        let outside = Payment::new(
            "outside",
            &submission("s9", "March"),
            None,
            PaidMonth::new("March", Utc::now()),
        );
        repo.inner.save(&outside).await.unwrap();
        assert!(store.get("outside").await.unwrap().is_none());

        store.refresh().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(store.get("outside").await.unwrap().is_some());
    }

    fn long_ttl_store(repo: &CountingRepository) -> PaymentStore {
        PaymentStore::new(
            Box::new(repo.clone()),
            StoreConfig {
                cache_ttl: Duration::from_secs(3600),
            },
        )
    }

    fn saved_elsewhere(id: &str, student: &str) -> Payment {
        Payment::new(
            id,
            &submission(student, "March"),
            None,
            PaidMonth::new("March", Utc::now()),
        )
    }

    #[tokio::test]
    async fn test_add_payment_appends_to_aggregate_missing_from_mirror() {
        let repo = CountingRepository::default();
        let store = long_ttl_store(&repo);
        store.load().await.unwrap();

        repo.inner.save(&saved_elsewhere("outside", "s9")).await.unwrap();

        let payment = store.add_payment(submission("s9", "April")).await.unwrap();
        assert_eq!(payment.id, "outside");
        assert_eq!(payment.paid_month_count(), 2);
        assert_eq!(repo.inner.all().await.unwrap(), vec![payment.clone()]);
        assert_eq!(store.list_for_student("s9").await.unwrap(), vec![payment]);

        // The adopted label is enforced like any other.
        assert!(matches!(
            store.add_payment(submission("s9", "March")).await,
            Err(PaymentError::DuplicateMonth { .. })
        ));
        assert_eq!(repo.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_reach_payment_missing_from_mirror() {
        let repo = CountingRepository::default();
        let store = long_ttl_store(&repo);
        store.load().await.unwrap();

        repo.inner.save(&saved_elsewhere("outside", "s9")).await.unwrap();

        let updated = store
            .update_payment(
                "outside",
                PaymentUpdate {
                    month: Some("May".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.month(), "May");
        assert_eq!(store.get("outside").await.unwrap(), Some(updated));

        repo.inner.save(&saved_elsewhere("other", "s8")).await.unwrap();
        store.delete_payment("other").await.unwrap();
        assert!(repo.inner.get("other").await.unwrap().is_none());
        assert!(store.get("other").await.unwrap().is_none());
        assert_eq!(repo.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_reloads_every_read() {
        let repo = CountingRepository::default();
        let loads = repo.loads.clone();
        let store = PaymentStore::new(Box::new(repo), StoreConfig::with_cache_ttl_secs(0));

        store.all().await.unwrap();
        store.all().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_search_by_code() {
        let store = store_over(InMemoryPaymentRepository::new());
        store.add_payment(submission("s1", "January")).await.unwrap();
        store.add_payment(submission("s2", "January")).await.unwrap();

        let query: StudentQuery = "code:c-s2".parse().unwrap();
        let found = store.search(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].student_id, "s2");
    }
}
