use std::{fmt, sync::Arc, time::Duration};

use super::{
	error::{BoxError, SyncError},
	fetch::RawPayload,
};

/// Pure mapping applied to each successful payload before it is committed.
/// An `Err` here is treated exactly like a failed request.
pub type Transform = Arc<dyn Fn(RawPayload) -> Result<RawPayload, BoxError> + Send + Sync>;

/// Side-effect hook invoked on every failed fetch. Not used for recovery.
pub type ErrorHook = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// Per-session refresh policy, supplied by the caller at construction.
#[derive(Clone, Default)]
pub struct SyncConfig {
	/// Period of the silent-refresh timer. [`Duration::ZERO`] disables
	/// periodic polling entirely.
	pub refresh_interval: Duration,
	/// Refresh silently when the app returns to the foreground.
	pub refresh_on_focus: bool,
	/// Issue a visible fetch as soon as the session is activated.
	pub refresh_on_mount: bool,
	pub transform: Option<Transform>,
	pub on_error: Option<ErrorHook>,
}

impl SyncConfig {
	/// Fetch once on activation, then poll silently at `interval`.
	#[must_use]
	pub fn polling(interval: Duration) -> Self {
		Self {
			refresh_interval: interval,
			refresh_on_mount: true,
			..Self::default()
		}
	}

	/// Fetch once on activation, refresh only on demand afterwards.
	#[must_use]
	pub fn on_mount() -> Self {
		Self {
			refresh_on_mount: true,
			..Self::default()
		}
	}

	#[must_use]
	pub fn with_focus_refresh(mut self) -> Self {
		self.refresh_on_focus = true;
		self
	}

	#[must_use]
	pub fn with_transform(mut self, transform: Transform) -> Self {
		self.transform = Some(transform);
		self
	}

	#[must_use]
	pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
		self.on_error = Some(hook);
		self
	}
}

impl fmt::Debug for SyncConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SyncConfig")
			.field("refresh_interval", &self.refresh_interval)
			.field("refresh_on_focus", &self.refresh_on_focus)
			.field("refresh_on_mount", &self.refresh_on_mount)
			.field("transform", &self.transform.is_some())
			.field("on_error", &self.on_error.is_some())
			.finish()
	}
}

/// Structural equality: scalars by value, hooks by pointer identity.
///
/// This is what keeps group rebuilds identity-stable. A caller that wants a
/// rebuilt entry to reuse its live session must pass the same `Arc` hooks,
/// not freshly allocated closures of equal behavior.
impl PartialEq for SyncConfig {
	fn eq(&self, other: &Self) -> bool {
		self.refresh_interval == other.refresh_interval
			&& self.refresh_on_focus == other.refresh_on_focus
			&& self.refresh_on_mount == other.refresh_on_mount
			&& hook_eq(self.transform.as_ref(), other.transform.as_ref())
			&& hook_eq(self.on_error.as_ref(), other.on_error.as_ref())
	}
}

fn hook_eq<T: ?Sized>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
	match (a, b) {
		(None, None) => true,
		(Some(a), Some(b)) => Arc::ptr_eq(a, b),
		_ => false,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn equality_is_structural_on_scalars() {
		assert_eq!(
			SyncConfig::polling(Duration::from_secs(60)),
			SyncConfig::polling(Duration::from_secs(60))
		);
		assert_ne!(
			SyncConfig::polling(Duration::from_secs(60)),
			SyncConfig::polling(Duration::from_secs(30))
		);
		assert_ne!(SyncConfig::on_mount(), SyncConfig::default());
	}

	#[test]
	fn hooks_compare_by_pointer_identity() {
		let transform: Transform = Arc::new(Ok);

		let a = SyncConfig::on_mount().with_transform(Arc::clone(&transform));
		let b = SyncConfig::on_mount().with_transform(Arc::clone(&transform));
		let fresh = SyncConfig::on_mount().with_transform(Arc::new(Ok));

		assert_eq!(a, b);
		assert_ne!(a, fresh);
		assert_ne!(a, SyncConfig::on_mount());
	}
}
