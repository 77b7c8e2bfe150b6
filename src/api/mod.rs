//! Client for the remote library API.
//!
//! Every structured response carries a `Last-Modified-Version` header and,
//! for collection endpoints, a `Total-Results` header driving pagination.
//! The sync core interprets nothing else about the wire format.

mod client;
mod error;
mod transport;

pub use client::{ApiClient, PageData, Paged, VERSIONS_PAGE_LIMIT};
pub use error::ApiError;
pub use transport::{ApiRequest, HttpTransport, MockTransport, RawResponse, Transport};
