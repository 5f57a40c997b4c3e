//! Storage Module - Quota Store and key records

pub mod quota;

pub use quota::*;
