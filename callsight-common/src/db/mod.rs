//! Database bootstrap shared by callsight services

pub mod init;

pub use init::*;
