#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;
use tutor_billing::domain::payment::NewPayment;

pub const HEADER: &str = "student_id,student_name,student_code,group,month,amount";

/// Writes a payments CSV with the standard header followed by `rows`.
pub fn payments_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file.flush().unwrap();
    file
}

pub fn submission(student_id: &str, month: &str) -> NewPayment {
    NewPayment {
        student_id: student_id.to_string(),
        student_name: format!("Student {student_id}"),
        student_code: format!("C-{student_id}"),
        group: "Sat 4pm".to_string(),
        month: month.to_string(),
        amount: None,
    }
}
