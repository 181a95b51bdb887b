use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};

use async_channel as chan;
use futures::{stream::select_all, StreamExt};
use futures_concurrency::future::Join;
use tokio::{spawn, sync::watch};
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use super::{
	config::SyncConfig,
	error::{error_slot_eq, GroupError, SyncError},
	fetch::Fetch,
	lifecycle::AppLifecycle,
	session::{SessionState, SyncSession},
};

/// One logical data source of a group: a caller-chosen key, the endpoint it
/// polls, and its refresh policy.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
	pub key: String,
	pub endpoint: Option<String>,
	pub config: SyncConfig,
}

impl GroupEntry {
	#[must_use]
	pub fn new(key: impl Into<String>, endpoint: impl Into<String>, config: SyncConfig) -> Self {
		Self {
			key: key.into(),
			endpoint: Some(endpoint.into()),
			config,
		}
	}
}

/// Derived aggregate over all children of a group.
#[derive(Debug, Clone, Default)]
pub struct GroupState {
	/// Every configured key is present; the value stays `None` until that
	/// child commits its first payload.
	pub data: HashMap<String, Option<serde_json::Value>>,
	/// True while any child has a visible fetch in flight.
	pub loading: bool,
	/// First non-null child error in key order. Callers needing full
	/// diagnostics must inspect the individual sessions.
	pub error: Option<Arc<SyncError>>,
}

impl PartialEq for GroupState {
	fn eq(&self, other: &Self) -> bool {
		self.data == other.data
			&& self.loading == other.loading
			&& error_slot_eq(self.error.as_ref(), other.error.as_ref())
	}
}

/// Deterministic aggregation, factored out so it is testable without
/// timers or I/O. `states` must come in entry order.
fn aggregate<'a>(states: impl IntoIterator<Item = (&'a str, SessionState)>) -> GroupState {
	let mut combined = GroupState::default();

	for (key, state) in states {
		combined.loading |= state.loading;
		if combined.error.is_none() {
			combined.error = state.error;
		}
		combined.data.insert(key.to_string(), state.data);
	}

	combined
}

struct Child {
	entry: GroupEntry,
	session: SyncSession,
}

/// Composes independently configured [`SyncSession`]s into one observable
/// aggregate, without cross-session coupling: a failing child neither
/// blocks its siblings' fetches nor evicts them from the combined view.
///
/// The group owns a watcher task that recomputes the aggregate whenever any
/// child's observable state changes value. Recomputation never triggers
/// fetches.
pub struct SyncGroup {
	children: Vec<Child>,
	aggregate: Arc<watch::Sender<GroupState>>,
	watcher_stop: Option<chan::Sender<()>>,
	fetcher: Arc<dyn Fetch>,
	lifecycle: Option<AppLifecycle>,
}

impl SyncGroup {
	/// Build a group with one activated session per entry. Must be called
	/// from within a tokio runtime.
	pub fn build(
		entries: Vec<GroupEntry>,
		fetcher: Arc<dyn Fetch>,
		lifecycle: Option<&AppLifecycle>,
	) -> Result<Self, GroupError> {
		let (aggregate, _) = watch::channel(GroupState::default());

		let mut group = Self {
			children: Vec::new(),
			aggregate: Arc::new(aggregate),
			watcher_stop: None,
			fetcher,
			lifecycle: lifecycle.cloned(),
		};
		group.rebuild(entries)?;

		Ok(group)
	}

	/// Reconcile the group against a new entry list.
	///
	/// Identity-stable: an entry structurally equal to the live child under
	/// the same key keeps that child's session, so its interval timer,
	/// `last_updated`, and in-flight guard all survive the rebuild. Changed
	/// entries replace their session; removed keys are deactivated.
	pub fn rebuild(&mut self, entries: Vec<GroupEntry>) -> Result<(), GroupError> {
		let mut seen = HashSet::new();
		for entry in &entries {
			if !seen.insert(entry.key.as_str()) {
				return Err(GroupError::DuplicateKey(entry.key.clone()));
			}
		}

		self.stop_watcher();

		let mut existing = self
			.children
			.drain(..)
			.map(|child| (child.entry.key.clone(), child))
			.collect::<HashMap<_, _>>();

		for entry in entries {
			let child = match existing.remove(&entry.key) {
				Some(live)
					if live.entry.endpoint == entry.endpoint
						&& live.entry.config == entry.config =>
				{
					trace!(key = %entry.key, "reusing live session");
					live
				}
				stale => {
					if let Some(stale) = stale {
						stale.session.deactivate();
					}

					let mut session = SyncSession::new(
						entry.endpoint.clone(),
						entry.config.clone(),
						Arc::clone(&self.fetcher),
					);
					if let Some(lifecycle) = &self.lifecycle {
						session = session.with_lifecycle(lifecycle);
					}
					session.activate();

					Child { entry, session }
				}
			};

			self.children.push(child);
		}

		for (key, removed) in existing {
			trace!(%key, "dropping removed session");
			removed.session.deactivate();
		}

		self.start_watcher();
		self.recompute();

		Ok(())
	}

	/// Recompute the aggregate from current child states. Deterministic,
	/// idempotent, and fetch-free; the watcher task calls this on every
	/// child change, but it is also safe to call directly.
	pub fn recompute(&self) {
		let next = aggregate(
			self.children
				.iter()
				.map(|child| (child.entry.key.as_str(), child.session.state())),
		);

		self.aggregate.send_if_modified(|current| {
			if *current == next {
				return false;
			}
			*current = next;
			true
		});
	}

	/// Visible refresh of every child, run concurrently. No ordering is
	/// guaranteed between which child's result commits first.
	pub async fn refresh_all(&self) {
		self.children
			.iter()
			.map(|child| child.session.refresh())
			.collect::<Vec<_>>()
			.join()
			.await;
	}

	/// Deactivate every child and stop the watcher. Called once when the
	/// group is torn down.
	pub fn deactivate_all(&mut self) {
		self.stop_watcher();

		for child in &self.children {
			if child.session.is_active() {
				child.session.deactivate();
			}
		}
	}

	#[must_use]
	pub fn state(&self) -> GroupState {
		self.aggregate.borrow().clone()
	}

	/// Watch the aggregate. Notifications fire only when it changes value.
	#[must_use]
	pub fn subscribe(&self) -> watch::Receiver<GroupState> {
		self.aggregate.subscribe()
	}

	#[must_use]
	pub fn data(&self) -> HashMap<String, Option<serde_json::Value>> {
		self.aggregate.borrow().data.clone()
	}

	#[must_use]
	pub fn loading(&self) -> bool {
		self.aggregate.borrow().loading
	}

	#[must_use]
	pub fn error(&self) -> Option<Arc<SyncError>> {
		self.aggregate.borrow().error.clone()
	}

	/// Ordered child handles, for callers needing per-source state.
	pub fn sessions(&self) -> impl Iterator<Item = (&str, &SyncSession)> {
		self.children
			.iter()
			.map(|child| (child.entry.key.as_str(), &child.session))
	}

	#[must_use]
	pub fn session(&self, key: &str) -> Option<&SyncSession> {
		self.children
			.iter()
			.find(|child| child.entry.key == key)
			.map(|child| &child.session)
	}

	fn start_watcher(&mut self) {
		if self.children.is_empty() {
			return;
		}

		let receivers = self
			.children
			.iter()
			.map(|child| (child.entry.key.clone(), child.session.subscribe()))
			.collect::<Vec<_>>();

		let (stop_tx, stop_rx) = chan::bounded::<()>(1);
		self.watcher_stop = Some(stop_tx);

		let aggregate_tx = Arc::clone(&self.aggregate);

		spawn(async move {
			let mut changes = select_all(
				receivers
					.iter()
					.map(|(_, rx)| WatchStream::from_changes(rx.clone())),
			);

			loop {
				tokio::select! {
					_ = stop_rx.recv() => break,
					change = changes.next() => {
						if change.is_none() {
							break;
						}

						let next = aggregate(
							receivers
								.iter()
								.map(|(key, rx)| (key.as_str(), rx.borrow().clone())),
						);
						aggregate_tx.send_if_modified(|current| {
							if *current == next {
								return false;
							}
							*current = next;
							true
						});
					}
				}
			}

			trace!("group watcher stopped");
		});
	}

	fn stop_watcher(&mut self) {
		if let Some(stop_tx) = self.watcher_stop.take() {
			stop_tx.close();
		}
	}
}

impl Drop for SyncGroup {
	fn drop(&mut self) {
		self.deactivate_all();
	}
}
