pub mod settings;

pub use settings::{PatchProfile, ProvisionSettings, SETTINGS_FILE};
