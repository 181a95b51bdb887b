//!
//! # Rollcall Sync
//!
//! The real-time data-synchronization layer of the Rollcall client: a
//! reusable polling engine that keeps remote attendance data fresh on
//! screens that outlive any single request.
//!
//! A [`SyncSession`] manages one endpoint: it fetches on activation and on
//! a timer, reacts to app foreground transitions, serializes fetch attempts
//! so at most one request per endpoint is ever outstanding, and discards
//! results that arrive after deactivation. A [`SyncGroup`] composes several
//! sessions into one combined view with aggregate loading and error flags.
//!
//! The network is reached only through the [`Fetch`] capability, injected
//! at construction, so the whole engine runs deterministically against a
//! scripted fake in tests.
//!
//! ## Basic example
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use rc_sync::{Fetch, NetworkError, RawPayload, SyncConfig, SyncSession};
//! use serde_json::json;
//!
//! struct StaticFetch;
//!
//! #[async_trait]
//! impl Fetch for StaticFetch {
//!     async fn request(&self, _endpoint: &str) -> Result<RawPayload, NetworkError> {
//!         Ok(json!(["ward-a", "ward-b"]))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let session = SyncSession::new(
//!         Some("/wards".into()),
//!         SyncConfig::on_mount(),
//!         Arc::new(StaticFetch),
//!     );
//!
//!     let mut updates = session.subscribe();
//!     session.activate();
//!
//!     let state = updates.wait_for(|state| state.data.is_some()).await.unwrap();
//!     assert_eq!(state.data, Some(json!(["ward-a", "ward-b"])));
//!
//!     session.deactivate();
//! }
//! ```

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

mod config;
mod error;
mod fetch;
mod group;
mod lifecycle;
mod session;

pub use config::{ErrorHook, SyncConfig, Transform};
pub use error::{BoxError, GroupError, NetworkError, SyncError};
pub use fetch::{Fetch, RawPayload};
pub use group::{GroupEntry, GroupState, SyncGroup};
pub use lifecycle::{AppLifecycle, AppState};
pub use session::{SessionState, SyncSession};
