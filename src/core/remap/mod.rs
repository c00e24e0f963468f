// ─── Symbol Remap ───
// Renames classes and members inside jars according to a mapping table.
//
//   hierarchy : supertype graph over input + classpath
//   remapper  : per-class rewrite
//   stage     : jar-level driver

pub mod hierarchy;
pub mod remapper;
pub mod stage;

pub use hierarchy::{ClassHierarchy, ClassNode};
pub use remapper::Remapper;
pub use stage::{remap_jar, RemapDirection, RemapReport};
