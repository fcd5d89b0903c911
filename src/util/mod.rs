//! Small helpers shared by the network, content and CLI layers.
//!
//! - **URL validation**: absolute http(s) URLs only, with a host policy that
//!   keeps feeds from steering requests at internal addresses
//! - **Text**: control-character stripping for untrusted text and
//!   display-width truncation for terminal output

mod text;
mod url_validator;

pub use text::{strip_control_chars, truncate_to_width};
pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
