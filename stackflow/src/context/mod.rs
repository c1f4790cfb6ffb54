//! Caller context.
//!
//! [`RequestContext`] identifies the user an operation runs on behalf of.
//! The engine treats it as opaque apart from handing it to the identity
//! service and deriving a stored context from saved credentials.

mod request;

pub use request::RequestContext;
