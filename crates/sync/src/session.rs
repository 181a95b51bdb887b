use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Mutex,
};

use async_channel as chan;
use chrono::{DateTime, Utc};
use tokio::{
	spawn,
	sync::{broadcast::error::RecvError, watch},
	time::{interval, Instant, MissedTickBehavior},
};
use tracing::{debug, instrument, trace, warn};

use super::{
	config::SyncConfig,
	error::{error_slot_eq, SyncError},
	fetch::Fetch,
	lifecycle::{AppLifecycle, AppState},
};

/// Observable snapshot of a session, published through a watch channel.
///
/// `data` and `error` are not mutually exclusive: a failed refresh keeps the
/// last good payload around so the caller can render stale-but-present data
/// next to an error indicator.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
	/// Last successfully transformed payload.
	pub data: Option<serde_json::Value>,
	/// True only while a visible fetch is in flight.
	pub loading: bool,
	/// Most recent failure. Cleared at the start of each new fetch.
	pub error: Option<Arc<SyncError>>,
	/// Wall-clock time of the last successful commit.
	pub last_updated: Option<DateTime<Utc>>,
	/// Monotonic basis for staleness, kept separate from the wall clock so
	/// a host clock jump cannot flip staleness.
	pub(crate) last_commit: Option<Instant>,
}

/// Value comparison over the observable `(data, loading, error)` triple.
/// Timestamps are bookkeeping, not something observers should wake up for.
impl PartialEq for SessionState {
	fn eq(&self, other: &Self) -> bool {
		self.data == other.data
			&& self.loading == other.loading
			&& error_slot_eq(self.error.as_ref(), other.error.as_ref())
	}
}

struct SessionInner {
	endpoint: Option<String>,
	config: SyncConfig,
	fetcher: Arc<dyn Fetch>,
	state: watch::Sender<SessionState>,
	active: AtomicBool,
	in_flight: AtomicBool,
	stop: Mutex<Option<chan::Sender<()>>>,
}

/// Manages one endpoint's cached data under periodic and event-driven
/// refresh, with race-free fetch semantics.
///
/// A session is constructed inert and does nothing until [`activate`]d; from
/// then on it owns its refresh timer and focus listener until
/// [`deactivate`]d. Handles are cheap clones sharing the same state.
///
/// Two guards rule every fetch:
/// - `in_flight` serializes fetch attempts, so for any interleaving of
///   manual refreshes, timer ticks, and focus events, at most one request
///   per session is outstanding;
/// - `active` gates every state mutation, so a request that resolves after
///   deactivation is discarded instead of applied.
///
/// [`activate`]: Self::activate
/// [`deactivate`]: Self::deactivate
#[derive(Clone)]
pub struct SyncSession {
	inner: Arc<SessionInner>,
	lifecycle: Option<AppLifecycle>,
}

impl SyncSession {
	/// Construct an inert session. An empty or absent endpoint yields a
	/// session whose fetches all no-op.
	#[must_use]
	pub fn new(endpoint: Option<String>, config: SyncConfig, fetcher: Arc<dyn Fetch>) -> Self {
		let (state, _) = watch::channel(SessionState::default());

		Self {
			inner: Arc::new(SessionInner {
				endpoint,
				config,
				fetcher,
				state,
				active: AtomicBool::new(false),
				in_flight: AtomicBool::new(false),
				stop: Mutex::new(None),
			}),
			lifecycle: None,
		}
	}

	/// Wire the foreground signal source. Only consulted when the config
	/// asks for focus refreshes.
	#[must_use]
	pub fn with_lifecycle(mut self, lifecycle: &AppLifecycle) -> Self {
		self.lifecycle = Some(lifecycle.clone());
		self
	}

	/// Begin the session: mount fetch, refresh timer, and focus listener,
	/// each only when configured. Must be called from within a tokio
	/// runtime.
	#[instrument(skip(self), fields(endpoint = ?self.inner.endpoint))]
	pub fn activate(&self) {
		if self.inner.active.swap(true, Ordering::AcqRel) {
			warn!("session already active");
			return;
		}

		let (stop_tx, stop_rx) = chan::bounded::<()>(1);
		*self
			.inner
			.stop
			.lock()
			.expect("no panics while holding the session stop lock") = Some(stop_tx);

		// An inert session still counts as active, but there is nothing to
		// fetch and therefore nothing to schedule.
		if !self.inner.has_endpoint() {
			trace!("no endpoint configured, session is inert");
			return;
		}

		if self.inner.config.refresh_on_mount {
			spawn({
				let inner = Arc::clone(&self.inner);

				async move { inner.fetch(true).await }
			});
		}

		if !self.inner.config.refresh_interval.is_zero() {
			spawn(refresh_timer(Arc::clone(&self.inner), stop_rx.clone()));
		}

		if self.inner.config.refresh_on_focus {
			if let Some(lifecycle) = &self.lifecycle {
				spawn(focus_listener(
					Arc::clone(&self.inner),
					lifecycle.subscribe(),
					stop_rx,
				));
			} else {
				warn!("refresh_on_focus set but no lifecycle attached");
			}
		}
	}

	/// End the session. The timer and focus listener are stopped
	/// cooperatively; a fetch already in flight completes but its result is
	/// discarded.
	#[instrument(skip(self), fields(endpoint = ?self.inner.endpoint))]
	pub fn deactivate(&self) {
		if !self.inner.active.swap(false, Ordering::AcqRel) {
			warn!("session already inactive");
			return;
		}

		if let Some(stop_tx) = self
			.inner
			.stop
			.lock()
			.expect("no panics while holding the session stop lock")
			.take()
		{
			stop_tx.close();
		}
	}

	/// Caller-initiated refresh: toggles `loading` around the fetch. Errors
	/// surface through [`error`](Self::error) and the `on_error` hook, never
	/// as a return value.
	pub async fn refresh(&self) {
		self.inner.fetch(true).await;
	}

	/// Timer/focus-style refresh: never touches `loading`.
	pub async fn background_refresh(&self) {
		self.inner.fetch(false).await;
	}

	/// Foreground signal delivered by hand, for hosts that don't go through
	/// an [`AppLifecycle`] subscription.
	pub async fn on_foreground(&self) {
		self.inner.on_foreground().await;
	}

	#[must_use]
	pub fn state(&self) -> SessionState {
		self.inner.state.borrow().clone()
	}

	/// Watch the session's observable state. Notifications fire only when
	/// the `(data, loading, error)` triple actually changes value.
	#[must_use]
	pub fn subscribe(&self) -> watch::Receiver<SessionState> {
		self.inner.state.subscribe()
	}

	#[must_use]
	pub fn data(&self) -> Option<serde_json::Value> {
		self.inner.state.borrow().data.clone()
	}

	#[must_use]
	pub fn loading(&self) -> bool {
		self.inner.state.borrow().loading
	}

	#[must_use]
	pub fn error(&self) -> Option<Arc<SyncError>> {
		self.inner.state.borrow().error.clone()
	}

	#[must_use]
	pub fn last_updated(&self) -> Option<DateTime<Utc>> {
		self.inner.state.borrow().last_updated
	}

	/// Whether the last commit is older than the refresh interval.
	///
	/// Derived, never stored. With polling disabled there is no interval to
	/// measure against, so the data is never considered stale.
	#[must_use]
	pub fn is_stale(&self) -> bool {
		let refresh_interval = self.inner.config.refresh_interval;
		if refresh_interval.is_zero() {
			return false;
		}

		self.inner
			.state
			.borrow()
			.last_commit
			.map_or(false, |at| at.elapsed() > refresh_interval)
	}

	#[must_use]
	pub fn endpoint(&self) -> Option<&str> {
		self.inner.endpoint.as_deref()
	}

	#[must_use]
	pub fn is_active(&self) -> bool {
		self.inner.active.load(Ordering::Acquire)
	}

	#[must_use]
	pub fn config(&self) -> &SyncConfig {
		&self.inner.config
	}
}

impl SessionInner {
	fn has_endpoint(&self) -> bool {
		self.endpoint.as_deref().is_some_and(|e| !e.is_empty())
	}

	/// The core fetch lifecycle.
	///
	/// Exactly one suspension point, at the network call. Everything around
	/// it runs without yielding, so per-session state transitions are
	/// atomic with respect to other operations on the same session.
	#[instrument(skip(self), fields(endpoint = ?self.endpoint))]
	async fn fetch(&self, visible: bool) {
		if !self.active.load(Ordering::Acquire) {
			trace!("session inactive, skipping fetch");
			return;
		}

		let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.is_empty()) else {
			trace!("no endpoint configured, skipping fetch");
			return;
		};

		if self.in_flight.swap(true, Ordering::AcqRel) {
			trace!("fetch already in flight, skipping");
			return;
		}

		self.state.send_if_modified(|state| {
			let cleared = state.error.take().is_some();
			if visible && !state.loading {
				state.loading = true;
				return true;
			}
			cleared
		});

		let result = match self.fetcher.request(endpoint).await {
			Ok(raw) => match &self.config.transform {
				Some(transform) => transform(raw).map_err(SyncError::Transform),
				None => Ok(raw),
			},
			Err(e) => Err(SyncError::Network(e)),
		};

		// Deactivation may have happened across the suspension point; a
		// late result must not be applied.
		let still_active = self.active.load(Ordering::Acquire);

		match result {
			Ok(data) if still_active => {
				debug!("committing fresh data");
				self.state.send_if_modified(|state| {
					let changed = state.data.as_ref() != Some(&data);
					state.data = Some(data);
					state.last_updated = Some(Utc::now());
					state.last_commit = Some(Instant::now());
					changed
				});
			}
			Err(err) if still_active => {
				warn!(%err, "fetch failed");
				let err = Arc::new(err);
				if let Some(hook) = &self.config.on_error {
					hook(&err);
				}
				self.state.send_if_modified(|state| {
					state.error = Some(err);
					true
				});
			}
			Ok(_) => trace!("session deactivated mid-flight, discarding result"),
			Err(err) => trace!(%err, "session deactivated mid-flight, discarding failure"),
		}

		self.in_flight.store(false, Ordering::Release);

		if visible && still_active {
			self.state.send_if_modified(|state| {
				if state.loading {
					state.loading = false;
					return true;
				}
				false
			});
		}
	}

	async fn on_foreground(&self) {
		if !self.config.refresh_on_focus {
			return;
		}

		if self.in_flight.load(Ordering::Acquire) {
			trace!("fetch in flight, skipping focus refresh");
			return;
		}

		self.fetch(false).await;
	}
}

/// Silent-refresh timer. The immediate first tick is consumed so the first
/// poll lands one full interval after activation; the mount fetch covers
/// activation itself when requested.
async fn refresh_timer(inner: Arc<SessionInner>, stop_rx: chan::Receiver<()>) {
	let mut ticker = interval(inner.config.refresh_interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	ticker.tick().await;

	loop {
		tokio::select! {
			_ = stop_rx.recv() => break,
			_ = ticker.tick() => {
				if inner.in_flight.load(Ordering::Acquire) {
					trace!(endpoint = ?inner.endpoint, "fetch in flight, skipping tick");
					continue;
				}

				inner.fetch(false).await;
			}
		}
	}

	trace!(endpoint = ?inner.endpoint, "refresh timer stopped");
}

async fn focus_listener(
	inner: Arc<SessionInner>,
	mut lifecycle_rx: tokio::sync::broadcast::Receiver<AppState>,
	stop_rx: chan::Receiver<()>,
) {
	loop {
		tokio::select! {
			_ = stop_rx.recv() => break,
			event = lifecycle_rx.recv() => match event {
				Ok(AppState::Foreground) => inner.on_foreground().await,
				Ok(AppState::Background) => {}
				// Missed transitions only matter if the latest one was a
				// foregrounding, and the host will keep reporting; carry on.
				Err(RecvError::Lagged(_)) => {}
				Err(RecvError::Closed) => break,
			}
		}
	}

	trace!(endpoint = ?inner.endpoint, "focus listener stopped");
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn state_equality_ignores_timestamps() {
		let committed = SessionState {
			data: Some(serde_json::json!({"count": 1})),
			last_updated: Some(Utc::now()),
			last_commit: Some(Instant::now()),
			..SessionState::default()
		};
		let recommitted = SessionState {
			last_updated: None,
			last_commit: None,
			..committed.clone()
		};

		assert_eq!(committed, recommitted);
		assert_ne!(committed, SessionState::default());
	}
}
