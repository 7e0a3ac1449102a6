//! Ports - the seams between the core and its collaborators.

pub mod callback;
pub mod store;

pub use self::callback::{Callback, Item};
pub use self::store::{KeyValueStore, StoreError};
