//! Bearer-token HTTP client that keeps requests alive across token expiry.
//!
//! [`AuthClient`](client::AuthClient) decorates an HTTP transport: every outbound request
//! carries the session's access token (or the static API key), and any `401`/`403` routes the
//! request into a single-flight refresh cycle. The first failing request exchanges the refresh
//! credential with the identity provider, every request that fails while the exchange runs
//! waits for its outcome, and all of them are replayed with the new token.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod http;
pub mod obs;
pub mod session;
pub mod token;

pub use client::AuthClient;
pub use session::Session;
pub use token::{TokenPair, TokenSecret};

mod _prelude {
	pub use std::{
		collections::VecDeque,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
