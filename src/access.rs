//! Generic-to-specific access-mask mapping and the synthesized default
//! security descriptor (spec §4.10, §4.11).

/// Concrete key access bits (a small subset of the real registry's rights,
/// enough for the mapping this engine needs to perform).
pub const KEY_READ: u32 = 0x0002_0019;
pub const KEY_WRITE: u32 = 0x0002_0006;
pub const KEY_EXECUTE: u32 = KEY_READ;
pub const KEY_ALL_ACCESS: u32 = 0x000F_003F;

const GENERIC_READ: u32 = 1 << 31;
const GENERIC_WRITE: u32 = 1 << 30;
const GENERIC_EXECUTE: u32 = 1 << 29;
const GENERIC_ALL: u32 = 1 << 28;

/// WoW64 view-selector bits, cleared from the effective mask after mapping
/// (spec §4.10) but consulted beforehand to pick a lookup view (spec §4.3).
pub const KEY_WOW64_64KEY: u32 = 1 << 8;
pub const KEY_WOW64_32KEY: u32 = 1 << 9;

/// Maps generic rights onto concrete `KEY_*` bits and strips the generic
/// and WoW64 view-selector bits from the result, per spec §4.10.
pub fn map_generic_rights(requested: u32) -> u32 {
    let mut mask = requested;
    if mask & GENERIC_READ != 0 {
        mask |= KEY_READ;
    }
    if mask & GENERIC_WRITE != 0 {
        mask |= KEY_WRITE;
    }
    if mask & GENERIC_EXECUTE != 0 {
        mask |= KEY_EXECUTE;
    }
    if mask & GENERIC_ALL != 0 {
        mask |= KEY_ALL_ACCESS;
    }
    mask & !(GENERIC_READ | GENERIC_WRITE | GENERIC_EXECUTE | GENERIC_ALL | KEY_WOW64_64KEY | KEY_WOW64_32KEY)
}

/// Whether `access` carries either WoW64 view-selector bit.
pub fn requests_32bit_view(access: u32) -> bool {
    access & KEY_WOW64_32KEY != 0
}

/// An opaque security-descriptor blob. Full ACE evaluation is out of
/// scope (spec §1); this crate only needs to hand back a stable default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDescriptor(pub Vec<u8>);

/// Built-in administrators / built-in users SIDs, as opaque tags; real ACE
/// evaluation is not implemented (spec §4.11, §1 "access ... policy" is an
/// external collaborator's concern).
const BUILTIN_ADMINISTRATORS: &str = "BA";
const BUILTIN_USERS: &str = "BU";

/// Synthesizes the shared default security descriptor once and returns a
/// clone of it on each call, matching spec §4.11's "synthesized once and
/// reused" wording at the call-site level (the actual sharing happens in
/// [`crate::engine::Engine`], which caches the first result).
pub fn default_security_descriptor() -> SecurityDescriptor {
    let text = format!(
        "owner={ADM};group={ADM};dacl=[allow({READ},inherit,container-inherit,{USR}),allow({ALL},{ADM})]",
        ADM = BUILTIN_ADMINISTRATORS,
        READ = "GENERIC_READ",
        USR = BUILTIN_USERS,
        ALL = "KEY_ALL_ACCESS",
    );
    SecurityDescriptor(text.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_read_maps_and_clears() {
        let mapped = map_generic_rights(GENERIC_READ | KEY_WOW64_64KEY);
        assert_eq!(mapped & GENERIC_READ, 0);
        assert_eq!(mapped & KEY_WOW64_64KEY, 0);
        assert_ne!(mapped & KEY_READ, 0);
    }

    #[test]
    fn generic_all_maps_to_full_access() {
        let mapped = map_generic_rights(GENERIC_ALL);
        assert_eq!(mapped, KEY_ALL_ACCESS);
    }

    #[test]
    fn wow64_view_bit_detected() {
        assert!(requests_32bit_view(KEY_WOW64_32KEY));
        assert!(!requests_32bit_view(KEY_WOW64_64KEY));
    }
}
