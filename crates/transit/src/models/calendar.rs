//! Service calendar for determining when trips run.
//!
//! Exception-only model: a service runs on a date if and only if an additive
//! exception for that date is present. There is no weekly base schedule; a
//! service id with no recorded exceptions never runs.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::identifiers::ServiceIdentifier;

/// A single `calendar_dates` row, already parsed by the static loader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CalendarException {
    pub service_id: ServiceIdentifier,
    pub date: NaiveDate,
    pub exception: ExceptionKind,
}

/// GTFS exception_type: 1 = service added, 2 = service removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    Added,
    Removed,
}

impl ExceptionKind {
    pub fn from_gtfs(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Added),
            2 => Some(Self::Removed),
            _ => None,
        }
    }
}

/// Parse a GTFS `YYYYMMDD` date field.
pub fn parse_gtfs_date(field: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(field.trim(), "%Y%m%d").ok()
}

/// Tracks the dates each service explicitly runs on.
#[derive(Clone, Debug, Default)]
pub struct ServiceCalendar {
    service_dates: HashMap<ServiceIdentifier, HashSet<NaiveDate>>,
}

impl ServiceCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a list of exceptions in order.
    pub fn from_exceptions(exceptions: impl IntoIterator<Item = CalendarException>) -> Self {
        let mut cal = Self::new();
        for ex in exceptions {
            match ex.exception {
                ExceptionKind::Added => cal.add_exception(ex.service_id, ex.date),
                ExceptionKind::Removed => cal.remove_exception(&ex.service_id, ex.date),
            }
        }
        cal
    }

    pub fn add_exception(&mut self, service_id: ServiceIdentifier, date: NaiveDate) {
        self.service_dates.entry(service_id).or_default().insert(date);
    }

    pub fn remove_exception(&mut self, service_id: &ServiceIdentifier, date: NaiveDate) {
        if let Some(dates) = self.service_dates.get_mut(service_id) {
            dates.remove(&date);
            if dates.is_empty() {
                self.service_dates.remove(service_id);
            }
        }
    }

    /// False for service ids with no recorded exceptions.
    pub fn runs_on(&self, service_id: &ServiceIdentifier, date: NaiveDate) -> bool {
        self.service_dates
            .get(service_id)
            .map(|dates| dates.contains(&date))
            .unwrap_or(false)
    }

    pub fn service_count(&self) -> usize {
        self.service_dates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_unknown_service_never_runs() {
        let cal = ServiceCalendar::new();
        assert!(!cal.runs_on(&ServiceIdentifier::new("ghost"), date(2026, 3, 2)));
    }

    #[test]
    fn test_add_and_remove_exceptions() {
        let mut cal = ServiceCalendar::new();
        let svc = ServiceIdentifier::new("feriale");

        cal.add_exception(svc.clone(), date(2026, 3, 2));
        cal.add_exception(svc.clone(), date(2026, 3, 3));
        assert!(cal.runs_on(&svc, date(2026, 3, 2)));
        assert!(cal.runs_on(&svc, date(2026, 3, 3)));
        // No exception recorded for this date
        assert!(!cal.runs_on(&svc, date(2026, 3, 4)));

        cal.remove_exception(&svc, date(2026, 3, 2));
        assert!(!cal.runs_on(&svc, date(2026, 3, 2)));

        // Removing the last date forgets the service entirely
        cal.remove_exception(&svc, date(2026, 3, 3));
        assert_eq!(cal.service_count(), 0);
    }

    #[test]
    fn test_from_exceptions_applies_in_order() {
        let svc = ServiceIdentifier::new("festivo");
        let cal = ServiceCalendar::from_exceptions([
            CalendarException {
                service_id: svc.clone(),
                date: date(2026, 4, 5),
                exception: ExceptionKind::Added,
            },
            CalendarException {
                service_id: svc.clone(),
                date: date(2026, 4, 6),
                exception: ExceptionKind::Added,
            },
            CalendarException {
                service_id: svc.clone(),
                date: date(2026, 4, 5),
                exception: ExceptionKind::Removed,
            },
        ]);

        assert!(!cal.runs_on(&svc, date(2026, 4, 5)));
        assert!(cal.runs_on(&svc, date(2026, 4, 6)));
    }

    #[test]
    fn test_parse_gtfs_date() {
        assert_eq!(parse_gtfs_date("20260302"), Some(date(2026, 3, 2)));
        assert_eq!(parse_gtfs_date(" 20260302 "), Some(date(2026, 3, 2)));
        assert_eq!(parse_gtfs_date("2026-03-02"), None);
        assert_eq!(parse_gtfs_date(""), None);
    }
}
