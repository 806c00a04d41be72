pub mod automation;
pub mod core;

// --- Primary core exports ---
pub use automation::controller;
pub use automation::session::SessionStore;
pub use automation::AutomationError;
pub use core::types;
pub use core::types::*;
pub use core::AppState;
