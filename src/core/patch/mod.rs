// ─── Patch Application ───
// Binary patches over archive entries, grouped into bundles.

pub mod binpatch;
pub mod patch_set;

pub use binpatch::BinPatch;
pub use patch_set::{apply_patches, copy_missing, inject, PatchReport, PatchSet};
