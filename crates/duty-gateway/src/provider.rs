//! Collaborator seams for the mail and calendar services.
//!
//! The pipeline only talks to these traits. `crate::google` implements them on
//! top of the Gmail and Calendar APIs; tests use the in-memory fakes below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ProviderError;

/// Label carried by messages that have not been processed yet
pub const UNREAD_LABEL: &str = "UNREAD";

/// One page of a message listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: u32,
}

/// Metadata of a single message as returned by the provider.
#[derive(Debug, Clone, Default)]
pub struct MessageDetail {
    pub id: String,
    pub label_ids: Vec<String>,
    /// Header (name, value) pairs in delivery order
    pub headers: Vec<(String, String)>,
}

/// Message handed from the fetcher to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSummary {
    pub id: String,
    pub date: String,
    pub subject: String,
}

impl MessageSummary {
    pub fn from_detail(detail: MessageDetail) -> Self {
        let mut subject = String::new();
        let mut date = String::new();

        for (name, value) in detail.headers {
            match name.as_str() {
                "Subject" => subject = value,
                "Date" => date = value,
                _ => {}
            }
        }

        Self {
            id: detail.id,
            date,
            subject,
        }
    }
}

/// Upcoming calendar event.
#[derive(Debug, Clone, Default)]
pub struct CalendarEvent {
    pub id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    /// List message ids carrying `label`, continuing from `page_token`.
    async fn list_messages(
        &self,
        label: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, ProviderError>;

    async fn get_message(&self, id: &str) -> Result<MessageDetail, ProviderError>;

    /// Remove `label` from a message. Removing an absent label succeeds.
    async fn remove_label(&self, id: &str, label: &str) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Non-deleted single events starting at or after `time_min`, ordered by
    /// start time.
    async fn upcoming_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        max_results: i32,
    ) -> Result<Vec<CalendarEvent>, ProviderError>;
}
