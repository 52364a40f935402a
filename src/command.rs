//! Request/reply command surface exposed to external clients (spec §6.1).
//!
//! This is a direct, non-XDR rendition of spec.md's request shapes: a
//! concrete `Command`/`Reply` pair serialized by the transport layer
//! (spec §6.4), not tied to any particular wire format.

use serde::{Deserialize, Serialize};

use crate::value::ValueType;
use crate::StatusCode;

/// Info classes for `enum_key` (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyInfoClass {
    /// Name only.
    Basic,
    /// Name and class.
    Node,
    /// Stats only (subkey/value counts, modification time).
    Full,
    /// Stats plus name.
    Cached,
    /// Fully-qualified path reconstructed by walking the parent chain.
    Name,
}

/// Info classes for `enum_key_value` (spec §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueInfoClass {
    Basic,
    Full,
    Partial,
}

/// A single inbound request. `hkey`/`parent` fields carry opaque handles
/// minted by a prior `CreateKey`/`OpenKey` (spec §6.1, §4.12).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    CreateKey {
        parent: Option<u64>,
        path: String,
        class: Option<String>,
        volatile: bool,
        create_link: bool,
        /// `REG_OPTION_OPEN_LINK`: if the terminal segment already exists
        /// as a symlink, return the link itself rather than its target.
        open_link: bool,
        access: u32,
    },
    OpenKey {
        parent: Option<u64>,
        path: String,
        open_link: bool,
        access: u32,
    },
    CloseKey {
        hkey: u64,
    },
    DeleteKey {
        hkey: u64,
        recursive: bool,
    },
    FlushKey {
        hkey: u64,
    },
    EnumKey {
        hkey: u64,
        index: u32,
        info_class: KeyInfoClass,
    },
    SetKeyValue {
        hkey: u64,
        name: String,
        value_type: ValueType,
        data: Vec<u8>,
    },
    GetKeyValue {
        hkey: u64,
        name: String,
    },
    EnumKeyValue {
        hkey: u64,
        index: u32,
        info_class: ValueInfoClass,
    },
    DeleteKeyValue {
        hkey: u64,
        name: String,
    },
    LoadRegistry {
        parent: Option<u64>,
        path: String,
        file_path: String,
    },
    UnloadRegistry {
        hkey: u64,
    },
    SaveRegistry {
        hkey: u64,
        file_path: String,
    },
    SetRegistryNotification {
        hkey: u64,
        subtree: bool,
        filter: u32,
    },
}

/// Operation-specific success payload, one variant per [`Command`] variant
/// that returns data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReplyPayload {
    None,
    CreatedKey { hkey: u64, created: bool },
    OpenedKey { hkey: u64 },
    EnumKey { name: String, class: Option<String>, n_subkeys: u32, n_values: u32, modif: u64 },
    KeyValue { value_type: ValueType, data: Vec<u8> },
    EnumValue { name: String, value_type: ValueType, data: Vec<u8> },
}

/// A reply to a single [`Command`], carrying the status code copied from
/// the engine's `Result` (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub status: Option<StatusCode>,
    pub payload: ReplyPayload,
}

impl Reply {
    pub fn ok(payload: ReplyPayload) -> Self {
        Self { status: None, payload }
    }

    pub fn err(status: StatusCode) -> Self {
        Self { status: Some(status), payload: ReplyPayload::None }
    }

    /// `Pending` is a success status carrying no payload (spec §7); every
    /// other status is an error.
    pub fn pending() -> Self {
        Self { status: Some(StatusCode::Pending), payload: ReplyPayload::None }
    }
}
