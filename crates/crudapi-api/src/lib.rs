//! JSON:API surface of crudapi.
//!
//! - [`document`]: wire types for resource and error documents
//! - [`serializer`]: renders records as resource objects using registered serializer metadata
//! - [`request`]: parses request documents back into records
//! - [`error`]: [`ApiError`] and its mapping to JSON:API error objects

pub mod document;
pub mod error;
pub mod request;
pub mod serializer;

pub use document::{
    Document, ErrorDocument, ErrorObject, ErrorSource, JSONAPI_MEDIA_TYPE, JsonApi, PrimaryData,
    Relationship, RelationshipData, ResourceIdentifier, ResourceLinks, ResourceObject,
};
pub use error::ApiError;
pub use request::RequestParser;
pub use serializer::{DocumentSerializer, SerializeError};
