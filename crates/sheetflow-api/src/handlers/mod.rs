pub mod root;
pub mod status;
pub mod upload;
