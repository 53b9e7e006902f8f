//! Source of the locally installed mods checked for updates.

use crate::types::models::InstalledMod;

/// Provides the list of installed mods.
///
/// Read once per update check, so implementations may change between checks.
pub trait InstalledMods: Send + Sync {
    fn installed_mods(&self) -> Vec<InstalledMod>;
}

impl InstalledMods for Vec<InstalledMod> {
    fn installed_mods(&self) -> Vec<InstalledMod> {
        self.clone()
    }
}
