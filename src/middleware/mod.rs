//! HTTP middleware.

pub mod legacy_redirect;
pub mod request_logger;

pub use legacy_redirect::LegacyRedirect;
pub use request_logger::RequestLogger;
