use async_trait::async_trait;

use super::error::NetworkError;

/// Raw response body as delivered by the backend, before any caller
/// transform is applied.
pub type RawPayload = serde_json::Value;

/// The injected HTTP capability.
///
/// Sessions never talk to the network directly; they go through this trait,
/// so production code can hand them a real client while tests hand them a
/// scripted fake. Implementations are expected to resolve `endpoint`
/// against whatever base URL they were configured with and to map
/// non-success statuses into [`NetworkError::Status`].
///
/// Request timeouts belong to the implementation. A session never aborts an
/// outstanding request on its own, it only discards the late result.
#[async_trait]
pub trait Fetch: Send + Sync + 'static {
	async fn request(&self, endpoint: &str) -> Result<RawPayload, NetworkError>;
}
