use std::{
    any::Any,
    fmt,
    ops::{BitAnd, BitOr, BitOrAssign},
};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Delivery options carried by a message envelope, as a raw bitmask.
///
/// Transports combine flags with `|`; the numeric value crosses process
/// boundaries through the `Options` header, so the bit assignments are part of
/// the wire contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MessageOptions(u32);

impl MessageOptions {
    pub const NONE: MessageOptions = MessageOptions(0);
    /// Fire-and-forget delivery, no reply queue is expected to exist
    pub const NOTIFY_ONE_WAY: MessageOptions = MessageOptions(1);
    pub const ALL: MessageOptions = MessageOptions(u32::MAX);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        MessageOptions(bits)
    }

    #[inline]
    pub const fn contains(self, other: MessageOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MessageOptions {
    type Output = MessageOptions;

    fn bitor(self, rhs: Self) -> Self::Output {
        MessageOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for MessageOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for MessageOptions {
    type Output = MessageOptions;

    fn bitand(self, rhs: Self) -> Self::Output {
        MessageOptions(self.0 & rhs.0)
    }
}

/// Error record attached to a message by a failed upstream handler.
///
/// Travels with the envelope so that retry and dead-letter consumers can see
/// what went wrong without re-reading the originating log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl MessageError {
    pub fn new<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        MessageError {
            code: code.into(),
            message: message.into(),
            stack_trace: None,
        }
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

struct Payload {
    value: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// A unit of work delivered by a queue transport.
///
/// Carries the delivery metadata the broker stamped on the envelope plus an
/// optional typed payload. The payload is type-erased; its short runtime type
/// name is captured at insertion and later becomes the operation name of the
/// bridged request.
///
/// ```rust
/// use courier::message::Message;
///
/// struct GetOrder;
///
/// let msg = Message::new(GetOrder).with_priority(5);
/// assert_eq!(msg.body_type_name(), Some("GetOrder"));
/// ```
pub struct Message {
    created_at: OffsetDateTime,
    priority: i64,
    retry_attempts: u32,
    reply_id: Option<u64>,
    reply_to: Option<String>,
    options: MessageOptions,
    error: Option<MessageError>,
    body: Option<Payload>,
}

impl Message {
    /// Create a message carrying `body` as its typed payload
    pub fn new<T: Any + Send + Sync>(body: T) -> Self {
        let mut msg = Message::empty();
        msg.set_body(body);
        msg
    }

    /// The well-known empty message: no payload, no reply routing, no error.
    ///
    /// Pure-HTTP callers that never touch a queue construct their context over
    /// this, so a context always has a backing envelope.
    pub fn empty() -> Self {
        Message {
            created_at: OffsetDateTime::now_utc(),
            priority: 0,
            retry_attempts: 0,
            reply_id: None,
            reply_to: None,
            options: MessageOptions::NONE,
            error: None,
            body: None,
        }
    }

    #[inline]
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    #[inline]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    #[inline]
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    #[inline]
    pub fn reply_id(&self) -> Option<u64> {
        self.reply_id
    }

    #[inline]
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    #[inline]
    pub fn options(&self) -> MessageOptions {
        self.options
    }

    #[inline]
    pub fn error(&self) -> Option<&MessageError> {
        self.error.as_ref()
    }

    /// Whether the envelope carries a payload
    #[inline]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Short runtime type name of the payload, if one is present
    #[inline]
    pub fn body_type_name(&self) -> Option<&'static str> {
        self.body.as_ref().map(|p| p.type_name)
    }

    /// Borrow the payload as the concrete type it was inserted with
    pub fn body_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.body.as_ref().and_then(|p| p.value.downcast_ref::<T>())
    }

    /// Replace the payload, capturing the new body's runtime type name
    pub fn set_body<T: Any + Send + Sync>(&mut self, body: T) {
        self.body = Some(Payload {
            value: Box::new(body),
            type_name: short_type_name::<T>(),
        });
    }

    pub fn with_created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    pub fn with_reply_id(mut self, reply_id: u64) -> Self {
        self.reply_id = Some(reply_id);
        self
    }

    pub fn with_reply_to<S: Into<String>>(mut self, reply_to: S) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_options(mut self, options: MessageOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_error(mut self, error: MessageError) -> Self {
        self.error = Some(error);
        self
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::empty()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("created_at", &self.created_at)
            .field("priority", &self.priority)
            .field("retry_attempts", &self.retry_attempts)
            .field("reply_id", &self.reply_id)
            .field("reply_to", &self.reply_to)
            .field("options", &self.options)
            .field("error", &self.error)
            .field("body", &self.body.as_ref().map(|p| p.type_name))
            .finish()
    }
}

/// Last path segment of a type's name, generic arguments stripped.
///
/// `my_app::orders::GetOrder` becomes `GetOrder`; this is the identifier
/// handlers are registered under, so it must stay stable across crate moves.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod t {
    use super::*;

    struct GetOrder {
        #[allow(dead_code)]
        id: u64,
    }

    #[test]
    fn empty_message_has_no_payload() {
        let msg = Message::empty();
        assert!(!msg.has_body());
        assert_eq!(msg.body_type_name(), None);
        assert_eq!(msg.priority(), 0);
        assert_eq!(msg.retry_attempts(), 0);
        assert_eq!(msg.reply_id(), None);
        assert_eq!(msg.reply_to(), None);
        assert_eq!(msg.options(), MessageOptions::NONE);
        assert!(msg.error().is_none());
    }

    #[test]
    fn payload_type_name_is_short() {
        let msg = Message::new(GetOrder { id: 1 });
        assert_eq!(msg.body_type_name(), Some("GetOrder"));
    }

    #[test]
    fn payload_downcasts_to_concrete_type() {
        let msg = Message::new(GetOrder { id: 42 });
        let body = msg.body_as::<GetOrder>().expect("payload present");
        assert_eq!(body.id, 42);
        assert!(msg.body_as::<String>().is_none());
    }

    #[test]
    fn generic_payload_name_drops_arguments() {
        let msg = Message::new(vec![1u8, 2, 3]);
        assert_eq!(msg.body_type_name(), Some("Vec"));
    }

    #[test]
    fn options_combine_and_query() {
        let opts = MessageOptions::NOTIFY_ONE_WAY | MessageOptions::from_bits(4);
        assert!(opts.contains(MessageOptions::NOTIFY_ONE_WAY));
        assert_eq!(opts.bits(), 5);
        assert!(MessageOptions::ALL.contains(opts));
        assert!(!MessageOptions::NONE.contains(MessageOptions::NOTIFY_ONE_WAY));
    }

    #[test]
    fn builder_sets_metadata() {
        let msg = Message::empty()
            .with_priority(5)
            .with_retry_attempts(2)
            .with_reply_id(42)
            .with_reply_to("mq:reply.inq")
            .with_options(MessageOptions::NOTIFY_ONE_WAY)
            .with_error(MessageError::new("Timeout", "upstream timed out"));
        assert_eq!(msg.priority(), 5);
        assert_eq!(msg.retry_attempts(), 2);
        assert_eq!(msg.reply_id(), Some(42));
        assert_eq!(msg.reply_to(), Some("mq:reply.inq"));
        assert_eq!(msg.options(), MessageOptions::NOTIFY_ONE_WAY);
        assert_eq!(msg.error().map(|e| e.code.as_str()), Some("Timeout"));
    }
}
