use std::collections::HashMap;

use time::format_description::FormatItem;
use time::macros::format_description;

use crate::message::Message;

/// Header names under which message metadata is exposed to the pipeline.
/// Fixed, known in advance; consumers match on these exact strings.
pub const CREATED_DATE: &str = "CreatedDate";
pub const PRIORITY: &str = "Priority";
pub const RETRY_ATTEMPTS: &str = "RetryAttempts";
pub const REPLY_ID: &str = "ReplyId";
pub const REPLY_TO: &str = "ReplyTo";
pub const OPTIONS: &str = "Options";
pub const ERROR: &str = "Error";

/// Long calendar form, e.g. `Thursday, 28 August 2026`
const LONG_DATE_FORMAT: &[FormatItem<'static>] = format_description!("[weekday], [day] [month repr:long] [year]");

/// Message metadata rendered as the request-header set a bridged HTTP request
/// exposes to the pipeline.
///
/// A closed record rather than a string map: the seven fields are known at
/// compile time, and only the serialization boundary ([`to_map`](Self::to_map))
/// flattens them into name/value pairs. Values are rendered once, at
/// derivation, so repeated header reads cost nothing.
///
/// All numeric fields are formatted through Rust's `Display` for integers,
/// which is locale independent; header values compared or logged across hosts
/// come out identical regardless of either side's locale settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeaders {
    created_date: String,
    priority: String,
    retry_attempts: String,
    reply_id: Option<String>,
    reply_to: Option<String>,
    options: String,
    error: Option<String>,
}

impl MessageHeaders {
    /// Derive the header set from a message envelope.
    ///
    /// Total over every message shape: absent optional fields become absent
    /// values, never errors. The error record, when present, is dumped as
    /// JSON.
    pub fn from_message(message: &Message) -> Self {
        MessageHeaders {
            created_date: message
                .created_at()
                .format(&LONG_DATE_FORMAT)
                .unwrap_or_default(),
            priority: message.priority().to_string(),
            retry_attempts: message.retry_attempts().to_string(),
            reply_id: message.reply_id().map(|id| id.to_string()),
            reply_to: message.reply_to().map(str::to_owned),
            options: message.options().bits().to_string(),
            error: message.error().and_then(|e| serde_json::to_string(e).ok()),
        }
    }

    /// Look up a header by name.
    ///
    /// Returns `None` both for a name outside the fixed set and for a known
    /// name whose underlying metadata field is unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            CREATED_DATE => Some(&self.created_date),
            PRIORITY => Some(&self.priority),
            RETRY_ATTEMPTS => Some(&self.retry_attempts),
            REPLY_ID => self.reply_id.as_deref(),
            REPLY_TO => self.reply_to.as_deref(),
            OPTIONS => Some(&self.options),
            ERROR => self.error.as_deref(),
            _ => None,
        }
    }

    #[inline]
    pub fn created_date(&self) -> &str {
        &self.created_date
    }

    #[inline]
    pub fn reply_id(&self) -> Option<&str> {
        self.reply_id.as_deref()
    }

    #[inline]
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    #[inline]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Flatten into the external string-mapping shape.
    ///
    /// All seven keys are always present; unset fields map to `None`.
    pub fn to_map(&self) -> HashMap<&'static str, Option<String>> {
        let mut map = HashMap::with_capacity(7);
        map.insert(CREATED_DATE, Some(self.created_date.clone()));
        map.insert(PRIORITY, Some(self.priority.clone()));
        map.insert(RETRY_ATTEMPTS, Some(self.retry_attempts.clone()));
        map.insert(REPLY_ID, self.reply_id.clone());
        map.insert(REPLY_TO, self.reply_to.clone());
        map.insert(OPTIONS, Some(self.options.clone()));
        map.insert(ERROR, self.error.clone());
        map
    }
}
