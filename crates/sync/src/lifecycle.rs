use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 16;

/// Host application visibility, as reported by the platform shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
	Foreground,
	Background,
}

/// Broadcast hub for app foreground/background transitions.
///
/// The platform shell owns one of these and feeds it every visibility
/// change; sessions configured with `refresh_on_focus` subscribe while
/// active. Repeated reports of the current state are suppressed, so a noisy
/// host cannot trigger redundant focus refreshes.
#[derive(Debug, Clone)]
pub struct AppLifecycle {
	tx: broadcast::Sender<AppState>,
	current: Arc<Mutex<AppState>>,
}

impl AppLifecycle {
	#[must_use]
	pub fn new() -> Self {
		let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);

		Self {
			tx,
			current: Arc::new(Mutex::new(AppState::Foreground)),
		}
	}

	/// Report a visibility change. No-op when `next` matches the current
	/// state.
	pub fn set_state(&self, next: AppState) {
		{
			let mut current = self
				.current
				.lock()
				.expect("no panics while holding the lifecycle lock");
			if *current == next {
				return;
			}
			*current = next;
		}

		trace!(?next, "app visibility changed");

		if self.tx.send(next).is_err() {
			trace!("no active lifecycle subscribers");
		}
	}

	#[must_use]
	pub fn state(&self) -> AppState {
		*self
			.current
			.lock()
			.expect("no panics while holding the lifecycle lock")
	}

	pub(crate) fn subscribe(&self) -> broadcast::Receiver<AppState> {
		self.tx.subscribe()
	}
}

impl Default for AppLifecycle {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn repeated_states_are_suppressed() {
		let lifecycle = AppLifecycle::new();
		let mut rx = lifecycle.subscribe();

		// Already foregrounded, so this must not fire.
		lifecycle.set_state(AppState::Foreground);
		assert!(rx.try_recv().is_err());

		lifecycle.set_state(AppState::Background);
		lifecycle.set_state(AppState::Background);
		lifecycle.set_state(AppState::Foreground);

		assert_eq!(rx.try_recv().unwrap(), AppState::Background);
		assert_eq!(rx.try_recv().unwrap(), AppState::Foreground);
		assert!(rx.try_recv().is_err());
	}
}
