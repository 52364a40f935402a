//! The single task that owns the tree and serializes every mutation
//! through one channel (spec §5).
//!
//! [`EngineTask`] holds the only `Engine` and `HandleTable` in the process.
//! It is driven by [`EngineTask::run`], which must be polled from a
//! `tokio::task::LocalSet` since the tree underneath is built on `Rc`, not
//! `Arc`: a command and the periodic save tick can never interleave with
//! each other because both arrive through the same queue.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use crate::access;
use crate::command::{Command, KeyInfoClass, Reply, ReplyPayload, ValueInfoClass};
use crate::engine::{Engine, LookupAttr};
use crate::error::Result;
use crate::handle::HandleTable;
use crate::key::{full_path, KeyRef};
use crate::notify::{self, ChangeFilter};
use crate::StatusCode;

/// A single request, paired with the channel its reply goes back on.
///
/// `SetRegistryNotification`'s immediate reply is `Pending`; the actual
/// fired event arrives later on the accompanying oneshot receiver, which
/// the caller (the connection task in [`crate::server`]) awaits separately.
pub struct Envelope {
    pub command: Command,
    pub reply_tx: oneshot::Sender<DispatchReply>,
}

pub type DispatchReply = (Reply, Option<oneshot::Receiver<()>>);

/// Everything that can arrive on the task's single inbound queue: client
/// commands and the scheduler's save tick, so a save can never interleave
/// with a command (spec §5).
pub enum Message {
    Command(Envelope),
    Tick,
}

pub struct EngineTask {
    engine: Engine,
    handles: HandleTable,
}

impl EngineTask {
    pub fn new(engine: Engine) -> Self {
        Self { engine, handles: HandleTable::new() }
    }

    /// Drains `rx` until every sender has dropped, dispatching each message
    /// in order. Must run to completion on the same `LocalSet` the tree
    /// was built on.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        while let Some(message) = rx.recv().await {
            match message {
                Message::Command(envelope) => {
                    let reply = self.dispatch(envelope.command);
                    let _ = envelope.reply_tx.send(reply);
                }
                Message::Tick => self.engine.save_dirty_branches(),
            }
        }
    }

    fn resolve_handle(&self, hkey: u64) -> Result<KeyRef> {
        let entry = self.handles.resolve(hkey)?;
        if entry.key.borrow().is_deleted() {
            return Err(StatusCode::KeyDeleted);
        }
        Ok(entry.key.clone())
    }

    fn resolve_parent(&self, parent: Option<u64>) -> Result<KeyRef> {
        match parent {
            Some(hkey) => self.resolve_handle(hkey),
            None => Ok(self.engine.root.clone()),
        }
    }

    fn dispatch(&mut self, command: Command) -> DispatchReply {
        let (reply, event) = match command {
            Command::CreateKey { parent, path, class, volatile, create_link, open_link, access } => {
                (self.create_key(parent, &path, class, volatile, create_link, open_link, access), None)
            }
            Command::OpenKey { parent, path, open_link, access } => {
                (self.open_key(parent, &path, open_link, access), None)
            }
            Command::CloseKey { hkey } => (self.close_key(hkey), None),
            Command::DeleteKey { hkey, recursive } => (self.delete_key(hkey, recursive), None),
            Command::FlushKey { hkey } => (self.flush_key(hkey), None),
            Command::EnumKey { hkey, index, info_class } => (self.enum_key(hkey, index, info_class), None),
            Command::SetKeyValue { hkey, name, value_type, data } => {
                (self.set_key_value(hkey, &name, value_type, data), None)
            }
            Command::GetKeyValue { hkey, name } => (self.get_key_value(hkey, &name), None),
            Command::EnumKeyValue { hkey, index, info_class } => {
                (self.enum_key_value(hkey, index, info_class), None)
            }
            Command::DeleteKeyValue { hkey, name } => (self.delete_key_value(hkey, &name), None),
            Command::LoadRegistry { parent, path, file_path } => {
                (self.load_registry(parent, &path, file_path), None)
            }
            Command::UnloadRegistry { hkey } => (self.unload_registry(hkey), None),
            Command::SaveRegistry { hkey, file_path } => (self.save_registry(hkey, &file_path), None),
            Command::SetRegistryNotification { hkey, subtree, filter } => {
                return self.set_registry_notification(hkey, subtree, filter);
            }
        };
        (reply, event)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_key(
        &mut self,
        parent: Option<u64>,
        path: &str,
        class: Option<String>,
        volatile: bool,
        create_link: bool,
        open_link: bool,
        access: u32,
    ) -> Reply {
        let parent = match self.resolve_parent(parent) {
            Ok(key) => key,
            Err(status) => return Reply::err(status),
        };
        let attr = LookupAttr { open_link, wow64: access::requests_32bit_view(access) };
        match self.engine.create_key(&parent, path, class, volatile, create_link, attr) {
            Ok((key, created)) => {
                let hkey = self.handles.open(key, access::map_generic_rights(access));
                Reply::ok(ReplyPayload::CreatedKey { hkey, created })
            }
            Err(status) => Reply::err(status),
        }
    }

    fn open_key(&mut self, parent: Option<u64>, path: &str, open_link: bool, access: u32) -> Reply {
        let parent = match self.resolve_parent(parent) {
            Ok(key) => key,
            Err(status) => return Reply::err(status),
        };
        let attr = LookupAttr { open_link, wow64: access::requests_32bit_view(access) };
        match self.engine.open_key(&parent, path, attr) {
            Ok(key) => {
                let hkey = self.handles.open(key, access::map_generic_rights(access));
                Reply::ok(ReplyPayload::OpenedKey { hkey })
            }
            Err(status) => Reply::err(status),
        }
    }

    fn close_key(&mut self, hkey: u64) -> Reply {
        let subscriber = self.handles.subscriber_id(hkey);
        match self.handles.close(hkey) {
            Some(entry) => {
                notify::remove_subscriber(&entry.key, subscriber);
                Reply::ok(ReplyPayload::None)
            }
            None => Reply::err(StatusCode::ObjectNameNotFound),
        }
    }

    fn delete_key(&mut self, hkey: u64, recursive: bool) -> Reply {
        match self.resolve_handle(hkey).and_then(|key| self.engine.delete_key(&key, recursive)) {
            Ok(()) => Reply::ok(ReplyPayload::None),
            Err(status) => Reply::err(status),
        }
    }

    /// A no-op: this engine has no separate write-behind buffer to flush,
    /// so `FlushKey` only validates that the handle is still live.
    fn flush_key(&self, hkey: u64) -> Reply {
        match self.resolve_handle(hkey) {
            Ok(_) => Reply::ok(ReplyPayload::None),
            Err(status) => Reply::err(status),
        }
    }

    fn enum_key(&self, hkey: u64, index: u32, info_class: KeyInfoClass) -> Reply {
        let key = match self.resolve_handle(hkey) {
            Ok(key) => key,
            Err(status) => return Reply::err(status),
        };

        if info_class == KeyInfoClass::Name {
            let child = key.borrow().children.get(index as usize).cloned();
            return match child {
                Some(child) => Reply::ok(ReplyPayload::EnumKey {
                    name: full_path(&child),
                    class: None,
                    n_subkeys: 0,
                    n_values: 0,
                    modif: 0,
                }),
                None => Reply::err(StatusCode::NoMoreEntries),
            };
        }

        match self.engine.enum_key(&key, index as usize) {
            Ok(entry) => Reply::ok(ReplyPayload::EnumKey {
                name: if info_class == KeyInfoClass::Full { String::new() } else { entry.name },
                class: if info_class == KeyInfoClass::Node { entry.class } else { None },
                n_subkeys: if matches!(info_class, KeyInfoClass::Full | KeyInfoClass::Cached) {
                    entry.n_subkeys as u32
                } else {
                    0
                },
                n_values: if matches!(info_class, KeyInfoClass::Full | KeyInfoClass::Cached) {
                    entry.n_values as u32
                } else {
                    0
                },
                modif: if matches!(info_class, KeyInfoClass::Full | KeyInfoClass::Cached) {
                    entry.modif
                } else {
                    0
                },
            }),
            Err(status) => Reply::err(status),
        }
    }

    fn set_key_value(&self, hkey: u64, name: &str, value_type: crate::value::ValueType, data: Vec<u8>) -> Reply {
        match self.resolve_handle(hkey).and_then(|key| self.engine.set_key_value(&key, name, value_type, data)) {
            Ok(()) => Reply::ok(ReplyPayload::None),
            Err(status) => Reply::err(status),
        }
    }

    fn get_key_value(&self, hkey: u64, name: &str) -> Reply {
        match self.resolve_handle(hkey).and_then(|key| self.engine.get_key_value(&key, name)) {
            Ok((value_type, data)) => Reply::ok(ReplyPayload::KeyValue { value_type, data }),
            Err(status) => Reply::err(status),
        }
    }

    fn enum_key_value(&self, hkey: u64, index: u32, info_class: ValueInfoClass) -> Reply {
        let key = match self.resolve_handle(hkey) {
            Ok(key) => key,
            Err(status) => return Reply::err(status),
        };
        match self.engine.enum_key_value(&key, index as usize) {
            Ok(entry) => Reply::ok(ReplyPayload::EnumValue {
                name: if info_class == ValueInfoClass::Partial { String::new() } else { entry.name },
                value_type: entry.value_type,
                data: if info_class == ValueInfoClass::Basic { Vec::new() } else { entry.data },
            }),
            Err(status) => Reply::err(status),
        }
    }

    fn delete_key_value(&self, hkey: u64, name: &str) -> Reply {
        match self.resolve_handle(hkey).and_then(|key| self.engine.delete_key_value(&key, name)) {
            Ok(()) => Reply::ok(ReplyPayload::None),
            Err(status) => Reply::err(status),
        }
    }

    fn load_registry(&mut self, parent: Option<u64>, path: &str, file_path: String) -> Reply {
        let parent = match self.resolve_parent(parent) {
            Ok(key) => key,
            Err(status) => return Reply::err(status),
        };
        match self.engine.load_registry(&parent, path, PathBuf::from(file_path)) {
            Ok(key) => {
                let hkey = self.handles.open(key, access::KEY_ALL_ACCESS);
                Reply::ok(ReplyPayload::OpenedKey { hkey })
            }
            Err(status) => Reply::err(status),
        }
    }

    fn unload_registry(&mut self, hkey: u64) -> Reply {
        match self.resolve_handle(hkey).and_then(|key| self.engine.unload_registry(&key)) {
            Ok(()) => Reply::ok(ReplyPayload::None),
            Err(status) => Reply::err(status),
        }
    }

    fn save_registry(&self, hkey: u64, file_path: &str) -> Reply {
        match self.resolve_handle(hkey).and_then(|key| self.engine.save_registry(&key, Path::new(file_path))) {
            Ok(()) => Reply::ok(ReplyPayload::None),
            Err(status) => Reply::err(status),
        }
    }

    fn set_registry_notification(&mut self, hkey: u64, subtree: bool, filter: u32) -> DispatchReply {
        let key = match self.resolve_handle(hkey) {
            Ok(key) => key,
            Err(status) => return (Reply::err(status), None),
        };
        let subscriber = self.handles.subscriber_id(hkey);
        let (tx, rx) = oneshot::channel();
        notify::arm(&key, subscriber, ChangeFilter::from_bits_truncate(filter), subtree, tx);
        (Reply::pending(), Some(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Arch;
    use crate::value::ValueType;

    fn mk() -> EngineTask {
        EngineTask::new(Engine::new(Arch::Win64))
    }

    #[test]
    fn create_then_open_reuses_the_same_key() {
        let mut task = mk();
        let reply = task.dispatch(Command::CreateKey {
            parent: None,
            path: "Machine\\SOFTWARE".into(),
            class: None,
            volatile: false,
            create_link: false,
            open_link: false,
            access: access::KEY_ALL_ACCESS,
        });
        let hkey = match reply.0.payload {
            ReplyPayload::CreatedKey { hkey, created } => {
                assert!(created);
                hkey
            }
            _ => panic!("expected CreatedKey"),
        };

        let reply = task.dispatch(Command::OpenKey {
            parent: None,
            path: "Machine\\SOFTWARE".into(),
            open_link: false,
            access: access::KEY_READ,
        });
        assert!(matches!(reply.0.payload, ReplyPayload::OpenedKey { .. }));

        task.dispatch(Command::CloseKey { hkey });
        let reply = task.dispatch(Command::SetKeyValue { hkey, name: "x".into(), value_type: ValueType::Sz, data: vec![] });
        assert_eq!(reply.0.status, Some(StatusCode::ObjectNameNotFound));
    }

    #[test]
    fn delete_then_operate_reports_key_deleted() {
        let mut task = mk();
        let create = task.dispatch(Command::CreateKey {
            parent: None,
            path: "A".into(),
            class: None,
            volatile: false,
            create_link: false,
            open_link: false,
            access: access::KEY_ALL_ACCESS,
        });
        let hkey = match create.0.payload {
            ReplyPayload::CreatedKey { hkey, .. } => hkey,
            _ => panic!(),
        };
        let delete = task.dispatch(Command::DeleteKey { hkey, recursive: false });
        assert_eq!(delete.0.status, None);

        let get = task.dispatch(Command::GetKeyValue { hkey, name: "x".into() });
        assert_eq!(get.0.status, Some(StatusCode::KeyDeleted));
    }

    #[test]
    fn set_registry_notification_returns_pending_and_an_armed_receiver() {
        let mut task = mk();
        let create = task.dispatch(Command::CreateKey {
            parent: None,
            path: "A".into(),
            class: None,
            volatile: false,
            create_link: false,
            open_link: false,
            access: access::KEY_ALL_ACCESS,
        });
        let hkey = match create.0.payload {
            ReplyPayload::CreatedKey { hkey, .. } => hkey,
            _ => panic!(),
        };

        let (reply, rx) = task.dispatch(Command::SetRegistryNotification {
            hkey,
            subtree: false,
            filter: ChangeFilter::LAST_SET.bits(),
        });
        assert_eq!(reply.status, Some(StatusCode::Pending));
        let mut rx = rx.expect("notification receiver");

        task.dispatch(Command::SetKeyValue { hkey, name: "v".into(), value_type: ValueType::Sz, data: vec![0] });
        assert!(rx.try_recv().is_ok());
    }
}
