// ─── Jar Merge ───
// Reconciles the client and server variants of one version.
//
//   jar_merger   : entry-level driver and the resource-overlay shortcut
//   class_merger : member-level merge of classes both sides ship
//   markers      : side annotations
//   synthetic    : constructor parameter annotation offset

pub mod class_merger;
pub mod jar_merger;
pub mod markers;
pub mod synthetic;

pub use class_merger::merge_classes;
pub use jar_merger::{merge_jars, overlay_resources, MergeReport, MergeStrategy};
