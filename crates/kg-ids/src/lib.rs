mod fingerprint;
mod generator;
mod id;

pub use fingerprint::{poi_fingerprint, relationship_fingerprint, Fingerprint};
pub use generator::{next_id, IdGenerator};
pub use id::Id;
