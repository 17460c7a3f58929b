//! Archive — attachment staging, identifier selection, metadata assembly,
//! and upload to the Internet Archive.

pub mod client;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod metadata;
pub mod mime;
pub mod schema;
pub mod storage;

pub use client::{ArchiveService, IaClient, IaCredentials};
pub use error::UploadError;
pub use executor::UploadExecutor;
pub use metadata::MetadataAssembler;
pub use schema::{AttachmentDescriptor, Invocation, MetadataRecord, MetadataValue};
pub use storage::{AttachmentFetcher, HttpFetcher, StagingArea};
