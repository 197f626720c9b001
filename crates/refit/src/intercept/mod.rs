//! Load interception: request descriptors, the dispatch router with its
//! registration and suspension guards, and the streams an open yields.

mod request;
mod router;
mod stream;

pub use request::{OpenMode, OpenRequest};
pub use router::{LoadInterceptor, LoadRouter, LoadStrategy, Registration, Suspension};
pub use stream::{OpenedLoad, SourceStream};
