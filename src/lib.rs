//! ### Courier bridges message-queue traffic onto an HTTP-shaped pipeline
//! A pipeline written against an HTTP request/response surface can service
//! dequeued messages unchanged: wrap the message in a [`MessageContext`] and
//! hand the pipeline its request and response views.
//!
//! Just `use` the prelude module, and you're ready to go!
//!
//! ## Quick bridge setup
//! ```rust
//! use courier::prelude::*;
//! use std::sync::Arc;
//!
//! struct GetOrder;
//!
//! struct OrderStore;
//!
//! let mut resolver = BasicResolver::new();
//! resolver.register(OrderStore);
//!
//! // one dequeued message becomes one context
//! let msg = Message::new(GetOrder).with_priority(5);
//! let ctx = MessageContext::with_resolver(msg, Arc::new(resolver));
//!
//! // the pipeline sees an HTTP-shaped request
//! assert_eq!(ctx.request().path_info().as_deref(), Some("/json/oneway/GetOrder"));
//! assert_eq!(ctx.request().get_header(courier::headers::PRIORITY), Some("5"));
//!
//! // and resolves its collaborators through the context
//! assert!(ctx.get::<OrderStore>().is_some());
//!
//! // output accumulates on the response view, transport-agnostically
//! ctx.response().write(b"{}");
//! ctx.dispose();
//! ```
//!
//! [`MessageContext`]: context::MessageContext

#[macro_use]
extern crate log;

/// Context enveloping every bridged unit of work, and its request/response
/// views
pub mod context;
/// Error definitions
pub mod error;
/// Message-metadata header mapping
pub mod headers;
/// The message envelope delivered by queue transports
pub mod message;
/// Capability resolution with a local-override / process-default fallback
/// chain
pub mod resolver;

///
pub use cookie;
///
pub use http;
///
pub use mime;

/// Contains everything you need to bridge a message onto your pipeline
pub mod prelude {
    ///
    pub use crate::context::{HttpFile, MessageContext, RequestAttributes, RequestView, ResponseView};
    ///
    pub use crate::error::CourierError;
    ///
    pub use crate::headers::MessageHeaders;
    ///
    pub use crate::message::{Message, MessageError, MessageOptions};
    ///
    pub use crate::resolver::{set_global_resolver, BasicResolver, Resolver};
    ///
    pub use http::StatusCode;
    ///
    pub use mime::Mime;
}
