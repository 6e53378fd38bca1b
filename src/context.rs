use std::{
    any::{Any, TypeId},
    net::SocketAddr,
    ops::BitOr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
};

use cookie::CookieJar;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use mime::Mime;
use parking_lot::RwLock;

use crate::{
    headers::MessageHeaders,
    message::Message,
    resolver::{global_resolver, Resolver},
};

/// Classification of where an inbound unit of work came from, as a bitmask.
///
/// Policy middleware (auth, access control) branches on these flags; a queue
/// message is always stamped local-subnet + message-queue so it is treated as
/// trusted internal traffic rather than a public network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RequestAttributes(u32);

impl RequestAttributes {
    pub const NONE: RequestAttributes = RequestAttributes(0);
    pub const LOCALHOST: RequestAttributes = RequestAttributes(1);
    pub const LOCAL_SUBNET: RequestAttributes = RequestAttributes(1 << 1);
    pub const EXTERNAL: RequestAttributes = RequestAttributes(1 << 2);
    pub const SECURE: RequestAttributes = RequestAttributes(1 << 3);
    pub const HTTP: RequestAttributes = RequestAttributes(1 << 4);
    pub const MESSAGE_QUEUE: RequestAttributes = RequestAttributes(1 << 5);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: RequestAttributes) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RequestAttributes {
    type Output = RequestAttributes;

    fn bitor(self, rhs: Self) -> Self::Output {
        RequestAttributes(self.0 | rhs.0)
    }
}

/// A file uploaded by the client, exposed through the request view
#[derive(Debug, Clone)]
pub struct HttpFile {
    pub name: String,
    pub filename: String,
    pub content_type: Mime,
    pub data: Vec<u8>,
}

/// Mutable request-side state shared between the facade and its views
struct HttpState {
    content_type: Mime,
    compression_type: Option<String>,
    absolute_uri: Option<String>,
    path_info: Option<String>,
    peer_addr: Option<SocketAddr>,
    files: Vec<HttpFile>,
}

/// Output accumulated by the pipeline through the response view
struct ResponseState {
    status: StatusCode,
    content_type: Mime,
    headers: HeaderMap,
    body: Vec<u8>,
}

struct Shared {
    message: Message,
    resolver: Option<Arc<dyn Resolver>>,
    operation_name: OnceLock<String>,
    headers: OnceLock<MessageHeaders>,
    http: RwLock<HttpState>,
    response: RwLock<ResponseState>,
    disposed: AtomicBool,
}

impl Shared {
    // Caches only on the has-payload branch: a payload-less read returns None
    // without poisoning the cell, so the name can still be derived later.
    fn operation_name(&self) -> Option<&str> {
        if let Some(name) = self.operation_name.get() {
            return Some(name.as_str());
        }
        let name = self.message.body_type_name()?;
        Some(self.operation_name.get_or_init(|| name.to_owned()))
    }

    fn headers(&self) -> &MessageHeaders {
        self.headers.get_or_init(|| MessageHeaders::from_message(&self.message))
    }

    fn resolver(&self) -> Arc<dyn Resolver> {
        self.resolver.clone().unwrap_or_else(global_resolver)
    }
}

/// Context enveloping one inbound unit of work, whatever transport it came in
/// on.
///
/// The pipeline is written against an HTTP request/response shape; this facade
/// gives a dequeued message that same shape. Construction synthesizes the
/// HTTP-ish parts the pipeline expects (content type, one-way path, header
/// set) from the message envelope, and binds a [`RequestView`] and
/// [`ResponseView`] that are guaranteed present for the context's whole life.
///
/// One context is owned by exactly one in-flight unit of work; nothing here is
/// meant to be shared across concurrent operations.
///
/// ```rust
/// use courier::prelude::*;
///
/// struct GetOrder;
///
/// let ctx = MessageContext::new(Message::new(GetOrder));
/// assert_eq!(ctx.operation_name(), Some("GetOrder"));
/// assert_eq!(ctx.request().path_info().as_deref(), Some("/json/oneway/GetOrder"));
/// ```
pub struct MessageContext {
    shared: Arc<Shared>,
    request: Arc<RequestView>,
    response: Arc<ResponseView>,
}

impl MessageContext {
    /// Create a context over `message`, resolving capabilities through the
    /// process-wide default resolver.
    ///
    /// Pure-HTTP callers with no queue involvement pass [`Message::empty`].
    pub fn new(message: Message) -> Self {
        Self::build(message, None)
    }

    /// Create a context with a per-instance resolver override.
    ///
    /// The override takes precedence over the process-wide default for every
    /// capability lookup on this context.
    pub fn with_resolver(message: Message, resolver: Arc<dyn Resolver>) -> Self {
        Self::build(message, Some(resolver))
    }

    fn build(message: Message, resolver: Option<Arc<dyn Resolver>>) -> Self {
        let shared = Arc::new(Shared {
            message,
            resolver,
            operation_name: OnceLock::new(),
            headers: OnceLock::new(),
            http: RwLock::new(HttpState {
                content_type: mime::APPLICATION_JSON,
                compression_type: None,
                absolute_uri: None,
                path_info: None,
                peer_addr: None,
                files: Vec::new(),
            }),
            response: RwLock::new(ResponseState {
                status: StatusCode::OK,
                content_type: mime::APPLICATION_JSON,
                headers: HeaderMap::new(),
                body: Vec::new(),
            }),
            disposed: AtomicBool::new(false),
        });

        if let Some(op) = shared.operation_name() {
            let mut http = shared.http.write();
            let path = format!("/{}/oneway/{}", content_type_short_name(&http.content_type), op);
            trace!("bridging message as {}", path);
            http.path_info = Some(path);
        }

        MessageContext {
            request: Arc::new(RequestView { shared: shared.clone() }),
            response: Arc::new(ResponseView { shared: shared.clone() }),
            shared,
        }
    }

    /// The backing message envelope; always present, possibly empty
    #[inline]
    pub fn message(&self) -> &Message {
        &self.shared.message
    }

    /// Logical handler identifier, the payload's short runtime type name.
    ///
    /// Derived on first access over a payload and never recomputed afterwards;
    /// `None` while the message carries no payload.
    #[inline]
    pub fn operation_name(&self) -> Option<&str> {
        self.shared.operation_name()
    }

    /// The request view bound at construction
    #[inline]
    pub fn request(&self) -> &Arc<RequestView> {
        &self.request
    }

    /// The response view bound at construction
    #[inline]
    pub fn response(&self) -> &Arc<ResponseView> {
        &self.response
    }

    /// The active resolver: the per-instance override if one was given,
    /// otherwise the process-wide default
    #[inline]
    pub fn resolver(&self) -> Arc<dyn Resolver> {
        self.shared.resolver()
    }

    /// Resolve a capability by type.
    ///
    /// The bound [`RequestView`] and [`ResponseView`] short-circuit to the
    /// instances created at construction; any other type delegates to the
    /// active resolver, and its answer comes back untranslated. Nothing is
    /// cached here.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let capability = TypeId::of::<T>();
        if capability == TypeId::of::<RequestView>() {
            return downcast_view(self.request.clone());
        }
        if capability == TypeId::of::<ResponseView>() {
            return downcast_view(self.response.clone());
        }
        self.resolver().try_resolve::<T>()
    }

    /// The message-derived header set, materialized once on first access
    #[inline]
    pub fn headers(&self) -> &MessageHeaders {
        self.shared.headers()
    }

    /// Look up a message-derived header; `None` for unknown names and unset
    /// fields alike
    #[inline]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.shared.headers().get(name)
    }

    /// Queue transports carry no cookies; every call returns a fresh empty jar
    /// so no caller can mutate shared state through it
    pub fn cookies(&self) -> CookieJar {
        CookieJar::new()
    }

    /// Trust classification for bridged messages: always local-subnet +
    /// message-queue
    pub fn request_attributes(&self) -> RequestAttributes {
        RequestAttributes::LOCAL_SUBNET | RequestAttributes::MESSAGE_QUEUE
    }

    #[inline]
    pub fn content_type(&self) -> Mime {
        self.shared.http.read().content_type.clone()
    }

    pub fn set_content_type(&self, content_type: Mime) {
        self.shared.http.write().content_type = content_type;
    }

    #[inline]
    pub fn response_content_type(&self) -> Mime {
        self.shared.response.read().content_type.clone()
    }

    pub fn set_response_content_type(&self, content_type: Mime) {
        self.shared.response.write().content_type = content_type;
    }

    #[inline]
    pub fn compression_type(&self) -> Option<String> {
        self.shared.http.read().compression_type.clone()
    }

    pub fn set_compression_type<S: Into<String>>(&self, compression_type: S) {
        self.shared.http.write().compression_type = Some(compression_type.into());
    }

    #[inline]
    pub fn absolute_uri(&self) -> Option<String> {
        self.shared.http.read().absolute_uri.clone()
    }

    pub fn set_absolute_uri<S: Into<String>>(&self, uri: S) {
        self.shared.http.write().absolute_uri = Some(uri.into());
    }

    /// Synthetic path of the bridged request, `/{format}/oneway/{operation}`
    /// when the message carries a payload
    #[inline]
    pub fn path_info(&self) -> Option<String> {
        self.shared.http.read().path_info.clone()
    }

    pub fn set_path_info<S: Into<String>>(&self, path_info: S) {
        self.shared.http.write().path_info = Some(path_info.into());
    }

    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.http.read().peer_addr
    }

    pub fn set_peer_addr(&self, addr: SocketAddr) {
        self.shared.http.write().peer_addr = Some(addr);
    }

    #[inline]
    pub fn files(&self) -> Vec<HttpFile> {
        self.shared.http.read().files.clone()
    }

    pub fn set_files(&self, files: Vec<HttpFile>) {
        self.shared.http.write().files = files;
    }

    /// Release resources scoped to this unit of work.
    ///
    /// Currently nothing is scoped, so this only flips the disposed flag;
    /// calling it again is a no-op.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!("message context disposed");
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }
}

fn downcast_view<V: Any + Send + Sync, T: Any + Send + Sync>(view: Arc<V>) -> Option<Arc<T>> {
    let view: Arc<dyn Any + Send + Sync> = view;
    view.downcast().ok()
}

/// Read surface of the bridged request.
///
/// Every accessor mirrors a context field; no transformation logic lives here.
pub struct RequestView {
    shared: Arc<Shared>,
}

impl RequestView {
    #[inline]
    pub fn operation_name(&self) -> Option<&str> {
        self.shared.operation_name()
    }

    #[inline]
    pub fn path_info(&self) -> Option<String> {
        self.shared.http.read().path_info.clone()
    }

    #[inline]
    pub fn content_type(&self) -> Mime {
        self.shared.http.read().content_type.clone()
    }

    #[inline]
    pub fn headers(&self) -> &MessageHeaders {
        self.shared.headers()
    }

    #[inline]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.shared.headers().get(name)
    }

    pub fn cookies(&self) -> CookieJar {
        CookieJar::new()
    }

    pub fn request_attributes(&self) -> RequestAttributes {
        RequestAttributes::LOCAL_SUBNET | RequestAttributes::MESSAGE_QUEUE
    }

    #[inline]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.http.read().peer_addr
    }

    #[inline]
    pub fn absolute_uri(&self) -> Option<String> {
        self.shared.http.read().absolute_uri.clone()
    }

    #[inline]
    pub fn files(&self) -> Vec<HttpFile> {
        self.shared.http.read().files.clone()
    }

    #[inline]
    pub fn message(&self) -> &Message {
        &self.shared.message
    }

    #[inline]
    pub fn is_one_way(&self) -> bool {
        self.shared.message.reply_to().is_none()
    }
}

/// Write surface of the bridged response.
///
/// The pipeline accumulates its output here regardless of the originating
/// transport; every method mirrors a context field.
pub struct ResponseView {
    shared: Arc<Shared>,
}

impl ResponseView {
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.shared.response.read().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.shared.response.write().status = status;
    }

    #[inline]
    pub fn content_type(&self) -> Mime {
        self.shared.response.read().content_type.clone()
    }

    pub fn set_content_type(&self, content_type: Mime) {
        self.shared.response.write().content_type = content_type;
    }

    pub fn insert_header(&self, name: HeaderName, value: HeaderValue) {
        self.shared.response.write().headers.insert(name, value);
    }

    #[inline]
    pub fn headers(&self) -> HeaderMap {
        self.shared.response.read().headers.clone()
    }

    /// Append bytes to the accumulated response body
    pub fn write(&self, bytes: &[u8]) {
        self.shared.response.write().body.extend_from_slice(bytes);
    }

    #[inline]
    pub fn body(&self) -> Vec<u8> {
        self.shared.response.read().body.clone()
    }
}

/// Path segment a content type contributes to the synthetic one-way URI:
/// the structured suffix when there is one (`application/vnd.x+json` is still
/// `json` traffic), otherwise the subtype.
fn content_type_short_name(content_type: &Mime) -> &str {
    content_type
        .suffix()
        .map(|s| s.as_str())
        .unwrap_or_else(|| content_type.subtype().as_str())
}

#[cfg(test)]
mod t {
    use super::*;
    use crate::resolver::BasicResolver;

    struct Foo;

    struct Unrelated;

    struct Registered {
        tag: &'static str,
    }

    fn resolver_with<T: Any + Send + Sync>(instance: T) -> Arc<dyn Resolver> {
        let mut resolver = BasicResolver::new();
        resolver.register(instance);
        Arc::new(resolver)
    }

    mod operation {
        use super::*;

        #[test]
        fn name_is_payload_type_name() {
            let ctx = MessageContext::new(Message::new(Foo));
            assert_eq!(ctx.operation_name(), Some("Foo"));
        }

        #[test]
        fn name_is_absent_without_payload() {
            let ctx = MessageContext::new(Message::empty());
            assert_eq!(ctx.operation_name(), None);
            // a payload-less read must not cache
            assert_eq!(ctx.operation_name(), None);
        }

        #[test]
        fn path_is_synthesized_for_payloads() {
            let ctx = MessageContext::new(Message::new(Foo));
            assert_eq!(ctx.path_info().as_deref(), Some("/json/oneway/Foo"));
        }

        #[test]
        fn path_is_absent_without_payload() {
            let ctx = MessageContext::new(Message::empty());
            assert_eq!(ctx.path_info(), None);
        }

        #[test]
        fn content_types_default_to_json() {
            let ctx = MessageContext::new(Message::empty());
            assert_eq!(ctx.content_type(), mime::APPLICATION_JSON);
            assert_eq!(ctx.response_content_type(), mime::APPLICATION_JSON);
        }
    }

    mod capabilities {
        use super::*;

        #[test]
        fn request_capability_is_the_bound_view() {
            let ctx = MessageContext::new(Message::new(Foo));
            let via_get = ctx.get::<RequestView>().expect("always resolvable");
            assert!(Arc::ptr_eq(&via_get, ctx.request()));
        }

        #[test]
        fn response_capability_is_the_bound_view() {
            let ctx = MessageContext::new(Message::new(Foo));
            let via_get = ctx.get::<ResponseView>().expect("always resolvable");
            assert!(Arc::ptr_eq(&via_get, ctx.response()));
        }

        #[test]
        fn other_capabilities_delegate_to_the_resolver() {
            let ctx = MessageContext::with_resolver(Message::new(Foo), resolver_with(Registered { tag: "it" }));
            assert_eq!(ctx.get::<Registered>().map(|r| r.tag), Some("it"));
        }

        #[test]
        fn unresolvable_capability_is_none() {
            let ctx = MessageContext::with_resolver(Message::new(Foo), Arc::new(BasicResolver::new()));
            assert!(ctx.get::<Unrelated>().is_none());
        }

        #[test]
        fn views_resolve_even_with_an_empty_resolver() {
            let ctx = MessageContext::with_resolver(Message::empty(), Arc::new(BasicResolver::new()));
            assert!(ctx.get::<RequestView>().is_some());
            assert!(ctx.get::<ResponseView>().is_some());
        }
    }

    mod surface {
        use super::*;
        use crate::headers;
        use crate::message::MessageOptions;

        #[test]
        fn message_headers_surface_through_get_header() {
            let msg = Message::new(Foo)
                .with_priority(5)
                .with_retry_attempts(2)
                .with_options(MessageOptions::NOTIFY_ONE_WAY);
            let ctx = MessageContext::new(msg);
            assert_eq!(ctx.get_header(headers::PRIORITY), Some("5"));
            assert_eq!(ctx.get_header(headers::RETRY_ATTEMPTS), Some("2"));
            assert_eq!(ctx.get_header("X-Missing"), None);
        }

        #[test]
        fn headers_materialize_once() {
            let ctx = MessageContext::new(Message::new(Foo));
            let first = ctx.headers() as *const MessageHeaders;
            let second = ctx.headers() as *const MessageHeaders;
            assert_eq!(first, second);
        }

        #[test]
        fn cookie_jars_are_independent() {
            let ctx = MessageContext::new(Message::empty());
            let mut first = ctx.cookies();
            first.add(cookie::Cookie::new("session", "abc"));
            let second = ctx.cookies();
            assert!(second.get("session").is_none());
            assert_eq!(second.iter().count(), 0);
        }

        #[test]
        fn bridged_work_is_classified_as_internal() {
            let ctx = MessageContext::new(Message::empty());
            let attrs = ctx.request_attributes();
            assert!(attrs.contains(RequestAttributes::LOCAL_SUBNET));
            assert!(attrs.contains(RequestAttributes::MESSAGE_QUEUE));
            assert!(!attrs.contains(RequestAttributes::EXTERNAL));
        }

        #[test]
        fn dispose_is_idempotent() {
            let ctx = MessageContext::new(Message::empty());
            ctx.dispose();
            ctx.dispose();
            assert!(ctx.is_disposed());
        }

        #[test]
        fn views_proxy_the_context_fields() {
            let ctx = MessageContext::new(Message::new(Foo));
            assert_eq!(ctx.request().operation_name(), Some("Foo"));
            assert_eq!(ctx.request().path_info(), ctx.path_info());
            assert_eq!(ctx.request().content_type(), ctx.content_type());

            ctx.response().set_status(StatusCode::ACCEPTED);
            ctx.response().write(b"queued");
            assert_eq!(ctx.response().status(), StatusCode::ACCEPTED);
            assert_eq!(ctx.response().body(), b"queued");
        }

        #[test]
        fn one_way_tracks_reply_routing() {
            let ctx = MessageContext::new(Message::new(Foo));
            assert!(ctx.request().is_one_way());
            let ctx = MessageContext::new(Message::new(Foo).with_reply_to("mq:reply.inq"));
            assert!(!ctx.request().is_one_way());
        }
    }
}
