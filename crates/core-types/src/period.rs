//! Reporting-period arithmetic.
//!
//! Every portal task operates on the previous calendar month; the range is
//! computed once at task construction and threaded through filters and
//! file names.

use chrono::{Datelike, NaiveDate};

/// Inclusive date range covering one reporting month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReportingPeriod {
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl ReportingPeriod {
    /// The calendar month before the one containing `today`.
    pub fn previous_month(today: NaiveDate) -> Self {
        let first_of_current = today.with_day(1).unwrap_or(today);
        let last_day = first_of_current.pred_opt().unwrap_or(first_of_current);
        let first_day = last_day.with_day(1).unwrap_or(last_day);
        Self {
            first_day,
            last_day,
        }
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    /// Whether `date` falls inside this period.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day && date <= self.last_day
    }

    /// `dd/mm/yyyy`, the format the portals expect in date inputs.
    pub fn format_br(date: NaiveDate) -> String {
        date.format("%d/%m/%Y").to_string()
    }

    /// `yyyy-mm`, used in generated report file names.
    pub fn slug(&self) -> String {
        format!("{:04}-{:02}", self.year(), self.month())
    }
}

/// Lower-case Portuguese month name, as shown in portal dropdowns.
pub fn pt_br_month_name(month: u32) -> &'static str {
    match month {
        1 => "janeiro",
        2 => "fevereiro",
        3 => "março",
        4 => "abril",
        5 => "maio",
        6 => "junho",
        7 => "julho",
        8 => "agosto",
        9 => "setembro",
        10 => "outubro",
        11 => "novembro",
        _ => "dezembro",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn previous_month_mid_year() {
        let period = ReportingPeriod::previous_month(date(2025, 8, 15));
        assert_eq!(period.first_day, date(2025, 7, 1));
        assert_eq!(period.last_day, date(2025, 7, 31));
        assert_eq!(period.slug(), "2025-07");
    }

    #[test]
    fn previous_month_crosses_year() {
        let period = ReportingPeriod::previous_month(date(2025, 1, 3));
        assert_eq!(period.first_day, date(2024, 12, 1));
        assert_eq!(period.last_day, date(2024, 12, 31));
        assert_eq!(period.year(), 2024);
        assert_eq!(period.month(), 12);
    }

    #[test]
    fn contains_is_inclusive() {
        let period = ReportingPeriod::previous_month(date(2025, 3, 10));
        assert!(period.contains(date(2025, 2, 1)));
        assert!(period.contains(date(2025, 2, 28)));
        assert!(!period.contains(date(2025, 3, 1)));
    }

    #[test]
    fn br_format() {
        assert_eq!(ReportingPeriod::format_br(date(2025, 2, 5)), "05/02/2025");
    }
}
