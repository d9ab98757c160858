//! Networking core for the Quire encyclopedia reader.
//!
//! Everything feature code needs to talk to wiki servers goes through one
//! shared [`Session`]: cookie storage and central-auth cloning, request
//! construction, a bounded task queue, typed response decoding, forced
//! logout on `401`, and the CSRF token pipeline for writes. Background
//! refresh work is coordinated separately by a
//! [`BackgroundFetchCoordinator`].
//!
//! # Example
//!
//! ```no_run
//! use quire_config::Configuration;
//! use quire_net::{Method, BodyEncoding, Network, Session, Result};
//!
//! # async fn example() -> Result<()> {
//! let session = Session::new(Configuration::default())?;
//!
//! let endpoint = session.rest_api_endpoint(None, "page/summary/Rust")?;
//! let request = session.request(&endpoint, Method::Get, None, BodyEncoding::Json)?;
//! if let Some(summary) = session.json_dictionary_task(request, Network::Default).await? {
//!     println!("{}", summary["title"]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod background;
pub mod cookies;
pub mod csrf;
pub mod decode;
pub mod error;
pub mod queue;
pub mod request;
pub mod response;
pub mod session;
pub mod transport;

pub use background::{
    BackgroundFetchCoordinator, BackgroundFetcher, ChangeFetcher, FetchObserver, FetchResult,
};
pub use cookies::{Cookie, CookieJar};
pub use csrf::{
    ApiTokenFetcher, CsrfHandle, CsrfOperation, CsrfOutcome, CsrfState, CsrfToken, TokenContext,
    TokenFetch, TokenFetcher, TokenPlacement,
};
pub use decode::Decoded;
pub use error::{Error, Result};
pub use queue::{TaskHandle, TaskQueue};
pub use request::{BodyEncoding, Endpoint, Method, Request, RequestTemplate};
pub use response::Response;
pub use session::{ForcedLogoutHook, Session, SessionBuilder, SessionEvent};
pub use transport::{HttpTransport, Network, Transport};
