//! On-call lookup: the first upcoming event of the duty calendar carries the
//! phone identifier of whoever is on duty in its description.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use regex::Regex;

use crate::error::LookupError;
use crate::provider::CalendarProvider;

static DUTY_REGEX: OnceLock<Regex> = OnceLock::new();

/// `+` followed by exactly twelve digits
fn duty_regex() -> &'static Regex {
    DUTY_REGEX.get_or_init(|| Regex::new(r"\+\d{12}").expect("Invalid duty identifier regex"))
}

/// Extract the on-call identifier from an event description.
pub fn extract_identifier(description: &str) -> Option<&str> {
    duty_regex().find(description).map(|m| m.as_str())
}

pub struct DutyLookup {
    calendar: Arc<dyn CalendarProvider>,
}

impl DutyLookup {
    pub fn new(calendar: Arc<dyn CalendarProvider>) -> Self {
        Self { calendar }
    }

    pub async fn get_duty(&self, calendar_id: &str) -> Result<String, LookupError> {
        let events = self
            .calendar
            .upcoming_events(calendar_id, Utc::now(), 1)
            .await?;

        let event = match events.as_slice() {
            [] => return Err(LookupError::NotFound),
            [event] => event,
            [event, ..] => {
                tracing::warn!("Found {} events - using only the first one.", events.len());
                event
            }
        };

        let identifier = event
            .description
            .as_deref()
            .and_then(extract_identifier)
            .ok_or(LookupError::NoIdentifier)?;

        tracing::debug!("{} is on duty (event {:?})", identifier, event.id);
        Ok(identifier.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::fakes::FakeCalendar;
    use crate::provider::CalendarEvent;
    use tokio_test::assert_ok;

    #[test]
    fn test_extract_identifier() {
        assert_eq!(
            extract_identifier("Call +380501234567 if paged"),
            Some("+380501234567")
        );
        assert_eq!(extract_identifier("no number here"), None);
        assert_eq!(extract_identifier("380501234567 has no plus"), None);
        assert_eq!(extract_identifier("+12345 too short"), None);
    }

    #[test]
    fn test_extract_takes_first_twelve_digits() {
        assert_eq!(
            extract_identifier("+3805012345678 then +111111111111"),
            Some("+380501234567")
        );
    }

    #[tokio::test]
    async fn test_single_event_returns_identifier() {
        let calendar = Arc::new(FakeCalendar::with_descriptions(&[
            "Primary: Jane <+380501234567>",
        ]));
        let lookup = DutyLookup::new(calendar.clone());

        let duty = assert_ok!(lookup.get_duty("duty@example.com").await);
        assert_eq!(duty, "+380501234567");
        assert_eq!(calendar.calls(), vec![("duty@example.com".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_no_events_is_not_found() {
        let lookup = DutyLookup::new(Arc::new(FakeCalendar::with_descriptions(&[])));
        let result = lookup.get_duty("duty").await;
        assert!(matches!(result, Err(LookupError::NotFound)));
    }

    #[tokio::test]
    async fn test_multiple_events_use_first() {
        let lookup = DutyLookup::new(Arc::new(FakeCalendar::with_descriptions(&[
            "+111111111111",
            "+222222222222",
        ])));
        assert_eq!(lookup.get_duty("duty").await.unwrap(), "+111111111111");
    }

    #[tokio::test]
    async fn test_missing_identifier_is_an_error() {
        let lookup = DutyLookup::new(Arc::new(FakeCalendar::with_descriptions(&[
            "Nobody assigned yet",
        ])));
        assert!(matches!(
            lookup.get_duty("duty").await,
            Err(LookupError::NoIdentifier)
        ));

        let lookup = DutyLookup::new(Arc::new(FakeCalendar::with_events(vec![CalendarEvent {
            id: Some("e".to_string()),
            summary: Some("On call".to_string()),
            description: None,
        }])));
        assert!(matches!(
            lookup.get_duty("duty").await,
            Err(LookupError::NoIdentifier)
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_is_surfaced() {
        let lookup = DutyLookup::new(Arc::new(FakeCalendar::failing()));
        match lookup.get_duty("duty").await {
            Err(LookupError::Provider(ProviderError::Request { operation, .. })) => {
                assert_eq!(operation, "events.list")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
