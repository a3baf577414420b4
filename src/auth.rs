//! Session primitives: redacting token secrets and the session record built from them.

pub mod secret;
pub mod session;

pub use secret::*;
pub use session::*;
