//! Duty gateway: answers "who is on duty" from a calendar and keeps a
//! mailbox drained by marking unread messages as read.

pub mod api;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod duty;
pub mod error;
pub mod google;
pub mod mail;
pub mod provider;
