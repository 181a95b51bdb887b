//!
//! # Rollcall API client
//!
//! The production [`Fetch`] implementation: a thin `reqwest` wrapper around
//! the Rollcall backend. Sessions receive it as an injected capability
//! rather than reaching for a shared global client, so everything above
//! this crate stays testable against a fake.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::time::Duration;

use async_trait::async_trait;
use rc_sync::{Fetch, NetworkError, RawPayload};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the Rollcall backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
	pub base_url: String,
	/// Per-request deadline. Sessions never abort requests themselves, so
	/// this is the only thing bounding a hung fetch.
	pub timeout_secs: u64,
	pub bearer_token: Option<String>,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			base_url: "http://localhost:3000".to_string(),
			timeout_secs: DEFAULT_TIMEOUT_SECS,
			bearer_token: None,
		}
	}
}

/// HTTP client resolving endpoints against the configured base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
	client: reqwest::Client,
	config: ApiConfig,
}

impl HttpClient {
	pub fn new(config: ApiConfig) -> Result<Self, NetworkError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(config.timeout_secs))
			.build()
			.map_err(|e| NetworkError::Transport(e.to_string()))?;

		Ok(Self { client, config })
	}

	#[must_use]
	pub const fn config(&self) -> &ApiConfig {
		&self.config
	}

	fn url_for(&self, endpoint: &str) -> String {
		format!(
			"{}/{}",
			self.config.base_url.trim_end_matches('/'),
			endpoint.trim_start_matches('/')
		)
	}
}

#[async_trait]
impl Fetch for HttpClient {
	#[instrument(skip(self))]
	async fn request(&self, endpoint: &str) -> Result<RawPayload, NetworkError> {
		let mut request = self.client.get(self.url_for(endpoint));
		if let Some(token) = &self.config.bearer_token {
			request = request.bearer_auth(token);
		}

		let response = request
			.send()
			.await
			.map_err(|e| NetworkError::Transport(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.ok().filter(|body| !body.is_empty());
			return Err(NetworkError::Status {
				status: status.as_u16(),
				body,
			});
		}

		debug!(%status, "request succeeded");

		response
			.json()
			.await
			.map_err(|e| NetworkError::Decode(e.to_string()))
	}
}
