//! Object store
//!
//! Thread-safe arena of media object records grouped into token-scoped
//! ownership trees. See [`ObjectStore`].

pub mod ids;
pub mod record;
pub mod store;

pub use ids::{IdAllocator, MAX_ID};
pub use record::{NewObject, ObjectInfo, ReleasedObject};
pub use store::ObjectStore;
