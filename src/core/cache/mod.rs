// ─── Cache ───
// Paths of every artifact the pipeline produces, content fingerprints used as
// the staleness oracle, and temp-then-rename writes.

pub mod atomic;
pub mod fingerprint;
pub mod layout;

pub use atomic::{write_atomic, StagedFile};
pub use fingerprint::FingerprintCache;
pub use layout::{ArtifactRole, CacheLayout, CachedArtifact};
