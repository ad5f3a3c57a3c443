//! Transport endpoints and listeners (TCP and Unix domain sockets).

pub mod endpoint;
pub mod listener;

pub use endpoint::{BoxedReader, BoxedWriter, DEFAULT_ENDPOINT, Endpoint};
pub use listener::{BoundListener, Listener};
