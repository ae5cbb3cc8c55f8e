use crate::error::PaymentError;

/// Number of lessons covered by one paid month.
pub const LESSONS_PER_MONTH: u32 = 8;

/// Highest accepted lesson ordinal: the last lesson of the last billing
/// period whose bounds still fit in a `u32`.
pub const MAX_LESSON: u32 = (u32::MAX / LESSONS_PER_MONTH) * LESSONS_PER_MONTH;

/// A student's lesson ordinal, as supplied by the attendance flow.
///
/// Ordinals run from 1 to [`MAX_LESSON`]. Anything outside is rejected at
/// construction so every calculation below works on a valid ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LessonNumber(u32);

impl LessonNumber {
    pub fn new(value: i64) -> Result<Self, PaymentError> {
        match u32::try_from(value) {
            Ok(n) if (1..=MAX_LESSON).contains(&n) => Ok(Self(n)),
            _ => Err(PaymentError::Validation(format!(
                "Lesson number must be a positive integer up to {MAX_LESSON}, got {value}"
            ))),
        }
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for LessonNumber {
    type Error = PaymentError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Billing period (1-based) the lesson falls in: `ceil(lesson / 8)`.
pub fn current_billing_period(lesson: LessonNumber) -> u32 {
    lesson.0.div_ceil(LESSONS_PER_MONTH)
}

pub fn first_lesson_of_period(lesson: LessonNumber) -> u32 {
    (current_billing_period(lesson) - 1) * LESSONS_PER_MONTH + 1
}

pub fn last_lesson_of_period(lesson: LessonNumber) -> u32 {
    current_billing_period(lesson) * LESSONS_PER_MONTH
}

/// Position of the lesson inside its billing period, cycling 1..=8.
pub fn display_lesson_number(lesson: LessonNumber) -> u32 {
    (lesson.0 - 1) % LESSONS_PER_MONTH + 1
}

/// Whether `paid_month_count` paid months cover the lesson's billing period.
///
/// Sufficiency is judged by the number of paid-month entries only. Labels are
/// never matched against periods.
pub fn has_paid_for_lesson(paid_month_count: usize, lesson: LessonNumber) -> bool {
    paid_month_count >= current_billing_period(lesson) as usize
}

/// Snapshot of a student's billing position for one lesson, as shown next to
/// an attendance scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonStatus {
    pub lesson: u32,
    pub display_lesson: u32,
    pub period: u32,
    pub first_lesson: u32,
    pub last_lesson: u32,
    pub paid_months: usize,
    pub paid: bool,
}

impl LessonStatus {
    pub fn new(paid_month_count: usize, lesson: LessonNumber) -> Self {
        Self {
            lesson: lesson.value(),
            display_lesson: display_lesson_number(lesson),
            period: current_billing_period(lesson),
            first_lesson: first_lesson_of_period(lesson),
            last_lesson: last_lesson_of_period(lesson),
            paid_months: paid_month_count,
            paid: has_paid_for_lesson(paid_month_count, lesson),
        }
    }
}
