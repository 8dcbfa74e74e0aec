use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

/// The resolved caller of a request.
///
/// The pipeline treats callers as opaque except for the identity written into
/// the session token and the elevated-privilege flag checked by admin guards.
pub trait Caller: Clone + Send + Sync + 'static {
    /// Identity value stored inside the session token.
    type Id: Serialize + DeserializeOwned + Send + Sync + 'static;

    fn identity(&self) -> Self::Id;

    /// Whether this caller may enter elevated-privilege areas.
    fn is_admin(&self) -> bool {
        false
    }
}

/// Application-supplied lookup from a token identity to a caller.
///
/// Called concurrently from many requests; implementations must be safe for
/// that (the pipeline does not serialize calls). Returning `None` means the
/// identity no longer exists and the request proceeds anonymously.
#[async_trait]
pub trait UserLoader: Send + Sync + 'static {
    type User: Caller;

    async fn load(&self, id: <Self::User as Caller>::Id) -> Option<Self::User>;
}
