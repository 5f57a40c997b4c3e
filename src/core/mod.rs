//! Core Module - Classification, live sessions and key gating

pub mod gateway;
pub mod risk_classifier;
pub mod session;

pub use gateway::{ApiKeyGateway, Rejection, ValidatedKey, Verdict};
pub use risk_classifier::classify;
pub use session::{SessionHandle, SessionInfo, SessionManager, SessionSettings};
