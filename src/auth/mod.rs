//! Authentication capabilities for the origin client.
//!
//! Acquiring a session (browser login, SSO) happens outside this crate. This
//! module only turns what the user already has, a token or an exported
//! cookie file, into a [`Credentials`] value the client can attach.

mod cookies;
mod credentials;

pub use cookies::{
    CookieError, CookieRecord, jar_from_records, load_cookie_file, parse_cookie_lines,
};
pub use credentials::{Credentials, SecretToken};
