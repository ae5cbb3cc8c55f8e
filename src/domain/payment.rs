use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A positive amount collected for a payment.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// One paid billing month. The label is free text chosen by the payer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidMonth {
    pub month: String,
    pub date: DateTime<Utc>,
}

impl PaidMonth {
    pub fn new(month: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            month: month.into(),
            date,
        }
    }
}

/// A payment submission coming from the payment form or a CSV import.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewPayment {
    pub student_id: String,
    pub student_name: String,
    pub student_code: String,
    #[serde(default)]
    pub group: String,
    pub month: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

impl NewPayment {
    /// Checks the fields the form requires and returns the validated amount.
    pub fn validate(&self) -> Result<Option<Amount>, PaymentError> {
        if self.student_id.trim().is_empty() {
            return Err(PaymentError::Validation(
                "A student must be selected".to_string(),
            ));
        }
        if self.month.trim().is_empty() {
            return Err(PaymentError::Validation(
                "Month label must not be empty".to_string(),
            ));
        }
        self.amount.map(Amount::new).transpose()
    }
}

/// Partial edit of a payment aggregate. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentUpdate {
    pub student_name: Option<String>,
    pub student_code: Option<String>,
    pub group: Option<String>,
    pub month: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub amount: Option<Amount>,
}

/// All payments recorded for one student.
///
/// `paid_months` is never empty: the aggregate is created with its first
/// paid month and no operation removes entries. The "last paid" month and
/// date are read from the tail of `paid_months` rather than stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payment {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_code: String,
    pub group: String,
    pub amount: Option<Amount>,
    paid_months: Vec<PaidMonth>,
}

impl Payment {
    pub fn new(
        id: impl Into<String>,
        submission: &NewPayment,
        amount: Option<Amount>,
        first: PaidMonth,
    ) -> Self {
        Self {
            id: id.into(),
            student_id: submission.student_id.clone(),
            student_name: submission.student_name.clone(),
            student_code: submission.student_code.clone(),
            group: submission.group.clone(),
            amount,
            paid_months: vec![first],
        }
    }

    /// Rebuilds an aggregate from persisted parts. Fails if `paid_months` is
    /// empty, since such a row can only come from a corrupted store.
    pub fn from_parts(
        id: String,
        student_id: String,
        student_name: String,
        student_code: String,
        group: String,
        amount: Option<Amount>,
        paid_months: Vec<PaidMonth>,
    ) -> Result<Self, PaymentError> {
        if paid_months.is_empty() {
            return Err(PaymentError::storage(format!(
                "payment {id} has no paid months"
            )));
        }
        Ok(Self {
            id,
            student_id,
            student_name,
            student_code,
            group,
            amount,
            paid_months,
        })
    }

    pub fn paid_months(&self) -> &[PaidMonth] {
        &self.paid_months
    }

    pub fn paid_month_count(&self) -> usize {
        self.paid_months.len()
    }

    fn last(&self) -> &PaidMonth {
        // Non-empty by construction.
        &self.paid_months[self.paid_months.len() - 1]
    }

    /// Label of the most recently paid month.
    pub fn month(&self) -> &str {
        &self.last().month
    }

    /// Timestamp of the most recent payment.
    pub fn date(&self) -> DateTime<Utc> {
        self.last().date
    }

    pub fn has_month(&self, month: &str) -> bool {
        self.paid_months.iter().any(|pm| pm.month == month)
    }

    /// Appends a paid month, refusing a label that is already recorded.
    pub fn record_month(&mut self, paid: PaidMonth) -> Result<(), PaymentError> {
        if self.has_month(&paid.month) {
            return Err(self.duplicate(paid.month));
        }
        self.paid_months.push(paid);
        Ok(())
    }

    /// Applies a partial edit.
    ///
    /// A new month label replaces the last-paid entry at the same position,
    /// keeping its date unless `date` is given. A `date` alone rewrites the
    /// last-paid entry's date.
    pub fn apply_update(&mut self, update: PaymentUpdate) -> Result<(), PaymentError> {
        if let Some(month) = &update.month
            && month.trim().is_empty()
        {
            return Err(PaymentError::Validation(
                "Month label must not be empty".to_string(),
            ));
        }

        let idx = self.paid_months.len() - 1;
        if let Some(month) = update.month
            && month != self.paid_months[idx].month
        {
            if self.has_month(&month) {
                return Err(self.duplicate(month));
            }
            self.paid_months[idx].month = month;
        }
        if let Some(date) = update.date {
            self.paid_months[idx].date = date;
        }

        if let Some(name) = update.student_name {
            self.student_name = name;
        }
        if let Some(code) = update.student_code {
            self.student_code = code;
        }
        if let Some(group) = update.group {
            self.group = group;
        }
        if update.amount.is_some() {
            self.amount = update.amount;
        }
        Ok(())
    }

    fn duplicate(&self, month: String) -> PaymentError {
        PaymentError::DuplicateMonth {
            month,
            payment: Box::new(self.clone()),
        }
    }
}
