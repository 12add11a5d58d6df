pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::{Direction, MigrationState};
