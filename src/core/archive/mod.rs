// ─── Archive Utilities ───
// Reading, writing and copying entries between jar files.

pub mod copy;
pub mod reader;
pub mod writer;

pub use copy::{copy_entries, copy_entry, merge_archives, reopen, update_archive, CopyMode};
pub use reader::{
    for_each_entry, is_class_entry, normalize_entry_path, open_archive, read_all, read_entry, Archive,
    ArchiveEntry,
};
pub use writer::JarWriter;
