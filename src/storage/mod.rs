//! Storage module for persistent hub state.
//!
//! ## Backends
//!
//! - **InMemoryStore**: ordered, ephemeral storage for testing
//! - **FileStore**: JSON file-based persistence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mintinghub::storage::{FileStore, StateManager};
//!
//! let manager = StateManager::new(FileStore::new("/var/lib/hub")?);
//! let positions = manager.load_all_positions()?;
//! ```

pub mod backend;
pub mod state;

pub use backend::*;
pub use state::*;
