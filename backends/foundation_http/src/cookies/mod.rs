//! Cookie model and cookie jars.

mod cookie;
mod set_cookie;
mod store;

pub use cookie::{default_path, path_matches, Cookie};
pub use set_cookie::{parse_cookie_date, SetCookie};
pub use store::{CookieStore, MemoryCookieStore, SharedCookieStore};
