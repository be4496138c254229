//! Core data model types: the parsed email record, addresses, and attachments.

pub mod address;
pub mod attachment;
pub mod email;
