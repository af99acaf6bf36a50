//! Built-in device drivers.

pub mod kana;
pub mod rival;
pub mod steelseries;

pub use kana::KanaV2;
pub use rival::Rival310;

use crate::device::RegistryEntry;

/// Registry entries for every driver shipped with this crate.
pub fn builtin_entries() -> Vec<RegistryEntry> {
    vec![RegistryEntry::of::<Rival310>(), RegistryEntry::of::<KanaV2>()]
}
