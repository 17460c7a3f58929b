//! Archive Discord attachments to the Internet Archive.
//!
//! [`command::UploadCommand`] drives the pipeline; [`archive`] holds the
//! pieces it composes and [`discord`] wires it to a serenity client.

pub mod archive;
pub mod command;
pub mod config;
pub mod discord;

pub use command::{Reply, UploadCommand, UploadLimits};
pub use config::Config;
