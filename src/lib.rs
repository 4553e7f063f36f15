//! # tsu-common
//!
//! Shared plumbing for tsu web services: the pieces every site ends up
//! writing once and copying everywhere.
//!
//! ## What's in the box
//!
//! - [`tasks`]: a fire-and-forget task queue backed by a fixed pool of
//!   worker threads. Send the email after the response, not before.
//! - [`cache`]: memoized function calls and whole-view caching with
//!   `Expires` / `Cache-Control` headers.
//! - [`middleware`]: HTTPS redirect, language-by-TLD and HTML whitespace
//!   compression, layered onto a [`Router`].
//! - [`jsonp`]: JSON views with optional `callback(...)` wrapping.
//! - [`assets`], [`collect`] and [`cdn`]: the deploy-time static pipeline.
//!   Collect files, compress CSS / JS / images, invalidate what changed on
//!   the CDN. The `tsu-collect` binary runs all three.
//!
//! The HTTP layer is deliberately small: radix-tree routing via
//! [`matchit`], hyper for the wire, graceful shutdown on SIGTERM / Ctrl-C.
//! TLS and body limits belong to the reverse proxy in front.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, StatusCode};
//! use tsu_common::{Request, Response, Router, Server};
//! use tsu_common::config::Settings;
//! use tsu_common::middleware::{CompressHtml, HttpsRedirect};
//! use tsu_common::tasks::TaskQueue;
//!
//! #[tokio::main]
//! async fn main() -> tsu_common::Result<()> {
//!     let settings = Settings::load(None)?;
//!     let queue = TaskQueue::start((&settings.tasks).into())?;
//!
//!     let signup = {
//!         let queue = queue.clone();
//!         move |req: Request| {
//!             let queue = queue.clone();
//!             async move {
//!                 let email = String::from_utf8_lossy(req.body()).into_owned();
//!                 // Runs on a worker thread; the response does not wait for it.
//!                 match queue.submit(move || send_welcome(&email)) {
//!                     Ok(()) => Response::text("welcome"),
//!                     Err(_) => Response::status(StatusCode::SERVICE_UNAVAILABLE),
//!                 }
//!             }
//!         }
//!     };
//!
//!     let app = Router::new()
//!         .on(Method::POST, "/signup", signup)
//!         .layer(HttpsRedirect::skip(settings.secure.skip_https))
//!         .layer(CompressHtml::new(settings.debug));
//!
//!     Server::bind("0.0.0.0:3000").with_task_queue(queue).serve(app).await
//! }
//!
//! fn send_welcome(_email: &str) -> Result<(), std::io::Error> {
//!     Ok(())
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod assets;
pub mod cache;
pub mod cdn;
pub mod collect;
pub mod config;
pub mod health;
pub mod jsonp;
pub mod middleware;
pub mod tasks;

pub use error::{Error, Result};
pub use handler::{BoxFuture, Handler};
pub use request::{Request, Session, User};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
