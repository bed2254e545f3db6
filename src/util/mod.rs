pub mod backoff;
pub mod thread;

pub use backoff::Backoff;
pub use thread::current_token;
