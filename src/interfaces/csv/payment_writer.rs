use crate::domain::payment::Payment;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Separator between paid-month labels in the `paid_months` column.
pub const MONTH_SEPARATOR: &str = "|";

#[derive(Serialize)]
struct PaymentRecord<'a> {
    id: &'a str,
    student_id: &'a str,
    student_name: &'a str,
    student_code: &'a str,
    group: &'a str,
    month: &'a str,
    date: String,
    amount: Option<rust_decimal::Decimal>,
    paid_months: String,
}

impl<'a> From<&'a Payment> for PaymentRecord<'a> {
    fn from(payment: &'a Payment) -> Self {
        Self {
            id: &payment.id,
            student_id: &payment.student_id,
            student_name: &payment.student_name,
            student_code: &payment.student_code,
            group: &payment.group,
            month: payment.month(),
            date: payment.date().to_rfc3339(),
            amount: payment.amount.map(|a| a.value()),
            paid_months: payment
                .paid_months()
                .iter()
                .map(|pm| pm.month.as_str())
                .collect::<Vec<_>>()
                .join(MONTH_SEPARATOR),
        }
    }
}

/// Writes payment aggregates as CSV, one row per student.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<'a, I>(&mut self, payments: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Payment>,
    {
        let mut wrote_any = false;
        for payment in payments {
            self.writer.serialize(PaymentRecord::from(payment))?;
            wrote_any = true;
        }
        if !wrote_any {
            // Serde only emits headers alongside the first record.
            self.writer.write_record([
                "id",
                "student_id",
                "student_name",
                "student_code",
                "group",
                "month",
                "date",
                "amount",
                "paid_months",
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
