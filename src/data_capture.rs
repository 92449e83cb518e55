pub mod credentials;
pub mod recorder;

pub use credentials::Credentials;
pub use recorder::SessionRecorder;
