//! Unread mail retrieval and acknowledgement.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, MarkError, ProviderError};
use crate::provider::{MailProvider, MessageDetail, MessageSummary, UNREAD_LABEL};

/// Collects every unread message, one listing page at a time.
pub struct MailFetcher {
    mail: Arc<dyn MailProvider>,
    request_timeout: Duration,
}

impl MailFetcher {
    pub fn new(mail: Arc<dyn MailProvider>, request_timeout: Duration) -> Self {
        Self {
            mail,
            request_timeout,
        }
    }

    /// Fetch summaries of all unread messages.
    ///
    /// Pages are processed in order; within a page message details are
    /// fetched concurrently and collected in completion order. A message
    /// whose details cannot be fetched is logged and skipped. A failed
    /// listing ends the fetch, returning what was collected so far inside
    /// the error.
    pub async fn fetch_unread(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageSummary>, FetchError> {
        let mut messages = Vec::new();
        let mut seen = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let list = self.mail.list_messages(UNREAD_LABEL, page_token.as_deref());
            let page = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Err(FetchError::Cancelled { partial: messages });
                }
                result = tokio::time::timeout(self.request_timeout, list) => match result {
                    Ok(Ok(page)) => page,
                    Ok(Err(source)) => {
                        return Err(FetchError::List { partial: messages, source });
                    }
                    Err(_) => {
                        return Err(FetchError::Timeout {
                            partial: messages,
                            timeout: self.request_timeout,
                        });
                    }
                },
            };

            tracing::info!(
                "Number of messages received = {}",
                page.result_size_estimate
            );

            // Listings can shift between pages while workers mark messages
            let ids: Vec<String> = page
                .ids
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect();
            messages.extend(self.fetch_page(ids, cancel).await);

            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled { partial: messages });
            }

            match page.next_page_token {
                Some(token) => {
                    tracing::debug!("Moving to the next page");
                    page_token = Some(token);
                }
                None => break,
            }
        }

        Ok(messages)
    }

    async fn fetch_page(
        &self,
        ids: Vec<String>,
        cancel: &CancellationToken,
    ) -> Vec<MessageSummary> {
        let mut tasks = JoinSet::new();

        for id in ids {
            let mail = Arc::clone(&self.mail);
            let cancel = cancel.clone();
            let timeout = self.request_timeout;

            tasks.spawn(async move {
                tracing::debug!("Requesting message {}", id);
                let result = fetch_detail(mail.as_ref(), &id, timeout, &cancel).await;
                (id, result)
            });
        }

        let mut summaries = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(detail))) => {
                    tracing::debug!("Received {} {:?}", detail.id, detail.label_ids);
                    summaries.push(MessageSummary::from_detail(detail));
                }
                Ok((id, Err(e))) => {
                    tracing::warn!("Unable to retrieve message {}: {}", id, e);
                }
                Err(e) => {
                    tracing::warn!("Message fetch task failed: {}", e);
                }
            }
        }

        summaries
    }
}

async fn fetch_detail(
    mail: &dyn MailProvider,
    id: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<MessageDetail, ProviderError> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(ProviderError::request("messages.get", "cancelled")),
        result = tokio::time::timeout(timeout, mail.get_message(id)) => match result {
            Ok(result) => result,
            Err(_) => Err(ProviderError::request(
                "messages.get",
                format!("timed out after {:?}", timeout),
            )),
        },
    }
}

/// Removes the unread label from processed messages.
pub struct MailMarker {
    mail: Arc<dyn MailProvider>,
    request_timeout: Duration,
}

impl MailMarker {
    pub fn new(mail: Arc<dyn MailProvider>, request_timeout: Duration) -> Self {
        Self {
            mail,
            request_timeout,
        }
    }

    /// Mark a message as read. Marking an already read message succeeds.
    pub async fn mark_read(
        &self,
        message: &MessageSummary,
        cancel: &CancellationToken,
    ) -> Result<(), MarkError> {
        tracing::debug!("Reading message {}", message.id);

        let modify = self.mail.remove_label(&message.id, UNREAD_LABEL);
        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(MarkError::Cancelled { id: message.id.clone() }),
            result = tokio::time::timeout(self.request_timeout, modify) => match result {
                Ok(Ok(())) => {
                    tracing::debug!("Read message {}", message.id);
                    Ok(())
                }
                Ok(Err(source)) => Err(MarkError::Provider {
                    id: message.id.clone(),
                    source,
                }),
                Err(_) => Err(MarkError::Timeout {
                    id: message.id.clone(),
                    timeout: self.request_timeout,
                }),
            },
        }
    }
}
