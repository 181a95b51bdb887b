use std::{
	collections::{HashMap, VecDeque},
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use rc_sync::{Fetch, NetworkError, RawPayload};
use serde_json::Value;
use tokio::time::sleep;

/// One scripted answer for an endpoint.
#[derive(Debug, Clone)]
pub enum Script {
	Ok { payload: Value, delay: Duration },
	Fail { error: NetworkError, delay: Duration },
}

/// Deterministic [`Fetch`] implementation for tests.
///
/// Each endpoint gets a queue of scripted responses, consumed in order,
/// plus an optional repeating response used once the queue runs dry.
/// Delays run on the tokio clock, so tests under a paused runtime control
/// them exactly. The fake also accounts for concurrency, which is how the
/// no-overlapping-fetches property is observed from the outside.
#[derive(Default)]
pub struct ScriptedFetch {
	scripts: Mutex<HashMap<String, VecDeque<Script>>>,
	repeats: Mutex<HashMap<String, Script>>,
	hits: Mutex<HashMap<String, usize>>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

impl ScriptedFetch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn ok(self, endpoint: &str, payload: Value) -> Self {
		self.ok_after(endpoint, payload, Duration::ZERO)
	}

	pub fn ok_after(self, endpoint: &str, payload: Value, delay: Duration) -> Self {
		self.push(endpoint, Script::Ok { payload, delay });
		self
	}

	pub fn fail(self, endpoint: &str, error: NetworkError) -> Self {
		self.fail_after(endpoint, error, Duration::ZERO)
	}

	pub fn fail_after(self, endpoint: &str, error: NetworkError, delay: Duration) -> Self {
		self.push(endpoint, Script::Fail { error, delay });
		self
	}

	/// Answer every request beyond the scripted queue with `payload`.
	pub fn repeat_ok(self, endpoint: &str, payload: Value) -> Self {
		self.repeats.lock().unwrap().insert(
			endpoint.to_string(),
			Script::Ok {
				payload,
				delay: Duration::ZERO,
			},
		);
		self
	}

	/// Answer every request beyond the scripted queue with `error`.
	pub fn repeat_fail(self, endpoint: &str, error: NetworkError) -> Self {
		self.repeats.lock().unwrap().insert(
			endpoint.to_string(),
			Script::Fail {
				error,
				delay: Duration::ZERO,
			},
		);
		self
	}

	fn push(&self, endpoint: &str, script: Script) {
		self.scripts
			.lock()
			.unwrap()
			.entry(endpoint.to_string())
			.or_default()
			.push_back(script);
	}

	/// How many requests this endpoint has received.
	pub fn hits(&self, endpoint: &str) -> usize {
		self.hits.lock().unwrap().get(endpoint).copied().unwrap_or(0)
	}

	/// Highest number of simultaneously outstanding requests observed.
	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Fetch for ScriptedFetch {
	async fn request(&self, endpoint: &str) -> Result<RawPayload, NetworkError> {
		let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(current, Ordering::SeqCst);
		*self
			.hits
			.lock()
			.unwrap()
			.entry(endpoint.to_string())
			.or_default() += 1;

		let script = self
			.scripts
			.lock()
			.unwrap()
			.get_mut(endpoint)
			.and_then(VecDeque::pop_front)
			.or_else(|| self.repeats.lock().unwrap().get(endpoint).cloned());

		let result = match script {
			Some(Script::Ok { payload, delay }) => {
				if !delay.is_zero() {
					sleep(delay).await;
				}
				Ok(payload)
			}
			Some(Script::Fail { error, delay }) => {
				if !delay.is_zero() {
					sleep(delay).await;
				}
				Err(error)
			}
			None => Err(NetworkError::Transport(format!(
				"no scripted response for {endpoint}"
			))),
		};

		self.in_flight.fetch_sub(1, Ordering::SeqCst);

		result
	}
}
