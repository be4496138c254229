//! Raw message parsing: header blocks, media-type negotiation, transfer
//! decoding, multipart traversal, and the envelope entry point.

pub mod content_type;
pub mod eml;
pub mod header;
pub mod mime;
pub mod transfer;
