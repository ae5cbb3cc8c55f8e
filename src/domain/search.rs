use super::payment::Payment;
use crate::error::PaymentError;
use std::str::FromStr;

/// Student field a payment search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchField {
    #[default]
    Name,
    Code,
    Group,
}

impl FromStr for SearchField {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "code" => Ok(Self::Code),
            "group" => Ok(Self::Group),
            other => Err(PaymentError::Validation(format!(
                "Unknown search field '{other}', expected name, code or group"
            ))),
        }
    }
}

/// Lowercases, trims and collapses internal whitespace so user input and
/// stored values compare the same way.
pub fn sanitize_search_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentQuery {
    pub field: SearchField,
    text: String,
}

impl StudentQuery {
    pub fn new(field: SearchField, text: &str) -> Self {
        Self {
            field,
            text: sanitize_search_text(text),
        }
    }

    /// An empty query matches nothing, like an untouched search box.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        if self.is_empty() {
            return false;
        }
        let haystack = match self.field {
            SearchField::Name => &payment.student_name,
            SearchField::Code => &payment.student_code,
            SearchField::Group => &payment.group,
        };
        sanitize_search_text(haystack).contains(&self.text)
    }
}

/// Parses `field:text`; a bare `text` searches by name.
impl FromStr for StudentQuery {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((field, text)) => Ok(Self::new(field.parse()?, text)),
            None => Ok(Self::new(SearchField::Name, s)),
        }
    }
}
