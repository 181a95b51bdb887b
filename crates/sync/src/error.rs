use std::sync::Arc;

use thiserror::Error;

/// Boxed error type accepted from caller-supplied transforms.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure raised by a [`Fetch`](crate::Fetch) implementation.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
	#[error("endpoint returned HTTP {status}")]
	Status { status: u16, body: Option<String> },
	#[error("request failed: {0}")]
	Transport(String),
	#[error("invalid response payload: {0}")]
	Decode(String),
}

impl NetworkError {
	/// HTTP status code, when the backend answered at all.
	#[must_use]
	pub const fn status_code(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::Transport(_) | Self::Decode(_) => None,
		}
	}
}

/// Failure stored in session state after an unsuccessful fetch.
///
/// A successful request with an unusable payload is operationally the same
/// as a failed request, so transform failures flow through the exact same
/// channel as network failures.
#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Network(#[from] NetworkError),
	#[error("transform failed: {0}")]
	Transform(BoxError),
}

impl SyncError {
	/// The underlying network error, if this failure came off the wire.
	#[must_use]
	pub const fn as_network(&self) -> Option<&NetworkError> {
		match self {
			Self::Network(e) => Some(e),
			Self::Transform(_) => None,
		}
	}
}

#[derive(Debug, Error)]
pub enum GroupError {
	#[error("duplicate group key: {0}")]
	DuplicateKey(String),
}

/// Value comparison for stored errors, used for change detection.
///
/// Errors don't implement `PartialEq`, so two slots are considered equal
/// when they point at the same allocation or render to the same message.
pub(crate) fn error_slot_eq(a: Option<&Arc<SyncError>>, b: Option<&Arc<SyncError>>) -> bool {
	match (a, b) {
		(None, None) => true,
		(Some(a), Some(b)) => Arc::ptr_eq(a, b) || a.to_string() == b.to_string(),
		_ => false,
	}
}
