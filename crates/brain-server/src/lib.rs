pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

pub use registry::{SessionRegistry, SessionSummary};
pub use server::{start, ServerConfig, ServerHandle};
pub use session::{SessionController, SessionError};
