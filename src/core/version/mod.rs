pub mod libraries;
pub mod manifest;
pub mod resolver;
pub mod version_file;

pub use libraries::{LibraryProvider, MavenCoordinate};
pub use manifest::{VersionEntry, VersionManifest, VERSION_MANIFEST_URL};
pub use resolver::{ManifestResolver, ResolveOptions, ResolvedVersion};
pub use version_file::{LibraryEntry, PartRef, VersionDescriptor, VersionInfo};
