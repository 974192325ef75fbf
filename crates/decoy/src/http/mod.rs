//! Request and response data exchanged with the transport shim.

mod request;
mod response;

pub use request::Request;
pub use response::{IntoMockResponse, MockResponse, ResponseTemplate};

pub(crate) use request::parse_pairs;
