pub mod apply;
pub mod archiver;
pub mod builder;
pub mod cancel;
pub mod config;
pub mod culture;
pub mod error;
pub mod lock;
pub mod manifest;
pub mod pak;
pub mod path_safety;
pub mod persist;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod reconcile;
pub mod source;
pub mod stamp;

pub use error::{Result, StageError};
