pub mod account;
pub mod common;
pub mod init;
pub mod queue;
pub mod scan;
pub mod status;
pub mod upload;
