//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Register layers with [`Router::layer`](crate::Router::layer).
//!
//! Built-in middleware:
//! - [`HttpsRedirect`]: sends insecure `GET`s to their `https://` twin
//! - [`LocaleByTld`]: picks a language from the host's top-level domain
//! - [`CompressHtml`]: strips whitespace between HTML tags
//!
//! [`force_secure`] applies the HTTPS redirect to a single handler instead
//! of the whole router.

mod html;
mod locale;
mod secure;

pub use html::{CompressHtml, strip_spaces_between_tags};
pub use locale::LocaleByTld;
pub use secure::{HttpsRedirect, force_secure};

use crate::request::Request;
use crate::response::Response;

/// A request/response hook pair.
///
/// Both hooks default to doing nothing, so implementations override only
/// the side they care about.
pub trait Middleware: Send + Sync + 'static {
    /// Called before routing. Returning a response skips the handler.
    fn on_request(&self, _req: &mut Request) -> Option<Response> {
        None
    }

    /// Called with the handler's (or an earlier layer's) response.
    fn on_response(&self, res: Response) -> Response {
        res
    }
}
