//! Writing parsed message content to disk.

pub mod attachment;
