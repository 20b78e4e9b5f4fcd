//! Upload pipeline and outbound notification

pub mod email;
pub mod upload;
