pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod emulation;
pub mod error_handling;
pub mod events;
pub mod ingestion;
pub mod network;
pub mod session_management;
pub mod storage;
pub mod web_interface;

pub use session_management::SessionStatus;
