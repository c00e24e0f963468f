// ─── Jarloom Core ───
// Staged provisioning of merged, deobfuscated game jars.
//
// Architecture:
//   core/
//     archive/    : Jar entry reading, deterministic writing, copy policies
//     cache/      : Cache layout, content fingerprints, staged writes
//     classfile/  : Class file model shared by merge and remap
//     downloader/ : Download-if-changed with SHA-1 validation and retries
//     version/    : Version catalog, descriptors, libraries, resolver
//     mappings/   : Mapping tables and the TSRG reader
//     remap/      : Hierarchy-aware symbol remapping of jars
//     merge/      : Client + server jar merge
//     patch/      : Binary patch bundles
//     worker/     : Transform requests and the bounded worker pool
//     pipeline/   : Stage orchestration
//     state/      : Settings

pub mod archive;
pub mod cache;
pub mod classfile;
pub mod codec;
pub mod downloader;
pub mod error;
pub mod http;
pub mod mappings;
pub mod merge;
pub mod patch;
pub mod pipeline;
pub mod remap;
pub mod state;
pub mod version;
pub mod worker;

#[cfg(test)]
pub mod testing;
