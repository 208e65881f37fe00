//! Request and response messages.

mod method;
mod request;
mod response;
mod version;

pub use method::Method;
pub use request::Request;
pub use response::Response;
pub use version::Version;
pub use response::{parse_status_line, reason_phrase};
