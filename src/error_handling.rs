//! Error types shared across the honeypot.
//!
//! Nothing in here is fatal to the process: session errors stay inside their
//! task, bind errors skip one service, storage errors are logged and dropped.

pub mod types;
