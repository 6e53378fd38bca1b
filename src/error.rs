use thiserror::Error;

/// Error type throughout the courier stack.
///
/// The bridging layer itself has no failure taxonomy: missing capabilities
/// surface as `None` from the resolver and missing message fields as absent
/// header values. What remains is process configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CourierError {
    /// The process-wide default resolver was already registered
    #[error("global resolver already set")]
    GlobalResolverAlreadySet,
}
