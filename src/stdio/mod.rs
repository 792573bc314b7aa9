pub mod server;
pub mod session_registry;

pub use server::{OpenApiMcpServer, serve_stdio};
pub use session_registry::{SessionGuard, SessionHandle, SessionRegistry};
