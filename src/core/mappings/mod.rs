// ─── Mappings ───
// Symbol tables consumed by the remap stage.

pub mod table;
pub mod tsrg;

pub use table::{ClassMapping, FieldMapping, MappingTable};
