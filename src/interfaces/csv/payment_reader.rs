use crate::domain::payment::NewPayment;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads payment submissions from a CSV source.
///
/// Expected header: `student_id, student_name, student_code, group, month, amount`.
/// `group` and `amount` may be left empty. Whitespace around fields is trimmed.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    /// Creates a new `PaymentReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes submissions.
    pub fn payments(self) -> impl Iterator<Item = Result<NewPayment>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
