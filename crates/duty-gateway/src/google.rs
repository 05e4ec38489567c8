//! Gmail and Google Calendar implementations of the provider traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use google_calendar3::CalendarHub;
use google_gmail1::api::ModifyMessageRequest;
use google_gmail1::Gmail;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::credentials::AuthorizedTransport;
use crate::error::{CredentialError, ProviderError};
use crate::provider::{CalendarEvent, CalendarProvider, ListPage, MailProvider, MessageDetail};

const USER_ID: &str = "me";

type GmailConnector = google_gmail1::hyper_rustls::HttpsConnector<HttpConnector>;
type CalendarConnector = google_calendar3::hyper_rustls::HttpsConnector<HttpConnector>;

/// Mailbox of the authorized user, backed by the Gmail API.
pub struct GmailMailbox {
    hub: Gmail<GmailConnector>,
}

impl GmailMailbox {
    pub fn connect(transport: &AuthorizedTransport) -> Result<Self, CredentialError> {
        let connector = google_gmail1::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| CredentialError::Transport(format!("native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            hub: Gmail::new(client, transport.authenticator.clone()),
        })
    }
}

#[async_trait]
impl MailProvider for GmailMailbox {
    async fn list_messages(
        &self,
        label: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, ProviderError> {
        let mut request = self.hub.users().messages_list(USER_ID).add_label_ids(label);
        if let Some(token) = page_token {
            request = request.page_token(token);
        }

        let (_, response) = request
            .doit()
            .await
            .map_err(|e| ProviderError::request("messages.list", e))?;

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect();

        Ok(ListPage {
            ids,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
            result_size_estimate: response.result_size_estimate.unwrap_or(0),
        })
    }

    async fn get_message(&self, id: &str) -> Result<MessageDetail, ProviderError> {
        let (_, message) = self
            .hub
            .users()
            .messages_get(USER_ID, id)
            .format("metadata")
            .doit()
            .await
            .map_err(|e| ProviderError::request("messages.get", e))?;

        let headers = message
            .payload
            .and_then(|p| p.headers)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|h| Some((h.name?, h.value.unwrap_or_default())))
            .collect();

        Ok(MessageDetail {
            id: message.id.ok_or(ProviderError::MissingField {
                operation: "messages.get",
                field: "id",
            })?,
            label_ids: message.label_ids.unwrap_or_default(),
            headers,
        })
    }

    async fn remove_label(&self, id: &str, label: &str) -> Result<(), ProviderError> {
        let modify_request = ModifyMessageRequest {
            remove_label_ids: Some(vec![label.to_string()]),
            add_label_ids: None,
        };

        self.hub
            .users()
            .messages_modify(modify_request, USER_ID, id)
            .doit()
            .await
            .map_err(|e| ProviderError::request("messages.modify", e))?;

        Ok(())
    }
}

/// Google Calendar backed event source.
pub struct GoogleCalendar {
    hub: CalendarHub<CalendarConnector>,
}

impl GoogleCalendar {
    pub fn connect(transport: &AuthorizedTransport) -> Result<Self, CredentialError> {
        let connector = google_calendar3::hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| CredentialError::Transport(format!("native TLS roots: {}", e)))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            hub: CalendarHub::new(client, transport.authenticator.clone()),
        })
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendar {
    async fn upcoming_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        max_results: i32,
    ) -> Result<Vec<CalendarEvent>, ProviderError> {
        let (_, events) = self
            .hub
            .events()
            .list(calendar_id)
            .show_deleted(false)
            .single_events(true)
            .time_min(time_min)
            .max_results(max_results)
            .order_by("startTime")
            .doit()
            .await
            .map_err(|e| ProviderError::request("events.list", e))?;

        Ok(events
            .items
            .unwrap_or_default()
            .into_iter()
            .map(|event| CalendarEvent {
                id: event.id,
                summary: event.summary,
                description: event.description,
            })
            .collect())
    }
}
