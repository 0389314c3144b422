//! Platform objects delivered by the XO object feed
//!
//! Every object carries a `type` discriminator. Only the fields the console
//! reads are modelled; everything else is ignored during deserialization.

use serde::{Deserialize, Deserializer, Serialize};

use crate::sr::StorageRepository;

/// Deserialize a missing or `null` field as the type's default
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A resource pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    #[serde(default)]
    pub name_label: String,
}

/// Physical CPU topology of a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostCpus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub cores: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sockets: u64,
}

/// Memory figures reported for a host, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostMemory {
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub usage: u64,
}

/// A physical host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub id: String,
    #[serde(default)]
    pub name_label: String,
    #[serde(rename = "$pool", default)]
    pub pool: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cpus: HostCpus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub memory: HostMemory,
    #[serde(default)]
    pub power_state: String,
}

/// Virtual CPU allocation of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VmCpus {
    #[serde(default, deserialize_with = "null_as_default")]
    pub number: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max: u64,
}

/// A virtual machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    pub id: String,
    #[serde(default)]
    pub name_label: String,
    #[serde(rename = "$pool", default)]
    pub pool: String,
    #[serde(default)]
    pub power_state: String,
    #[serde(rename = "CPUs", default, deserialize_with = "null_as_default")]
    pub cpus: VmCpus,
}

impl Vm {
    pub const RUNNING: &'static str = "Running";
    pub const HALTED: &'static str = "Halted";

    pub fn is_running(&self) -> bool {
        self.power_state == Self::RUNNING
    }

    pub fn is_halted(&self) -> bool {
        self.power_state == Self::HALTED
    }
}

/// A platform message (alarms, notices)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "$object", default)]
    pub object: Option<String>,
}

impl Message {
    pub fn is_alarm(&self) -> bool {
        self.name == "ALARM"
    }
}

/// A server-side task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub name_label: String,
    #[serde(default)]
    pub status: String,
}

impl Task {
    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }
}

/// An XO user account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub permission: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.permission == "admin"
    }
}

/// Any object of the live collection feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum XoObject {
    #[serde(rename = "pool")]
    Pool(Pool),
    #[serde(rename = "host")]
    Host(Host),
    #[serde(rename = "VM")]
    Vm(Vm),
    #[serde(rename = "SR")]
    Sr(StorageRepository),
    #[serde(rename = "message")]
    Message(Message),
    #[serde(rename = "task")]
    Task(Task),
    /// Object kinds the console does not display (VDIs, networks, ...)
    #[serde(other)]
    Other,
}

impl XoObject {
    /// Identifier of the object, `None` for kinds that are not tracked
    pub fn id(&self) -> Option<&str> {
        match self {
            XoObject::Pool(p) => Some(&p.id),
            XoObject::Host(h) => Some(&h.id),
            XoObject::Vm(v) => Some(&v.id),
            XoObject::Sr(s) => Some(&s.id),
            XoObject::Message(m) => Some(&m.id),
            XoObject::Task(t) => Some(&t.id),
            XoObject::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_object() {
        let json = r#"{
            "type": "VM",
            "id": "vm-1",
            "name_label": "db1",
            "$pool": "pool-1",
            "power_state": "Running",
            "CPUs": { "number": 4, "max": 8 },
            "addresses": {}
        }"#;

        let object: XoObject = serde_json::from_str(json).unwrap();
        match object {
            XoObject::Vm(vm) => {
                assert_eq!(vm.id, "vm-1");
                assert!(vm.is_running());
                assert_eq!(vm.cpus.number, 4);
            }
            other => panic!("unexpected object {other:?}"),
        }
    }

    #[test]
    fn test_null_numbers_keep_the_object() {
        let json = r#"{
            "type": "host",
            "id": "h1",
            "name_label": "xcp-01",
            "$pool": "pool-1",
            "cpus": { "cores": 8, "sockets": null },
            "memory": { "size": null, "usage": 1024 },
            "power_state": "Running"
        }"#;

        let object: XoObject = serde_json::from_str(json).unwrap();
        match object {
            XoObject::Host(host) => {
                assert_eq!(host.cpus, HostCpus { cores: 8, sockets: 0 });
                assert_eq!(host.memory, HostMemory { size: 0, usage: 1024 });
            }
            other => panic!("unexpected object {other:?}"),
        }

        let json = r#"{ "type": "VM", "id": "vm-1", "CPUs": null }"#;
        match serde_json::from_str::<XoObject>(json).unwrap() {
            XoObject::Vm(vm) => assert_eq!(vm.cpus, VmCpus::default()),
            other => panic!("unexpected object {other:?}"),
        }

        let json = r#"{ "type": "SR", "id": "sr-1", "size": null, "physical_usage": null }"#;
        match serde_json::from_str::<XoObject>(json).unwrap() {
            XoObject::Sr(sr) => {
                assert_eq!(sr.size, 0);
                assert_eq!(sr.usage_ratio(), 0.0);
            }
            other => panic!("unexpected object {other:?}"),
        }
    }

    #[test]
    fn test_unknown_object_kind() {
        let json = r#"{ "type": "VDI", "id": "vdi-1", "name_label": "disk" }"#;
        let object: XoObject = serde_json::from_str(json).unwrap();
        assert_eq!(object, XoObject::Other);
        assert_eq!(object.id(), None);
    }

    #[test]
    fn test_host_defaults_missing_metrics() {
        let json = r#"{ "type": "host", "id": "h1" }"#;
        let object: XoObject = serde_json::from_str(json).unwrap();
        match object {
            XoObject::Host(host) => {
                assert_eq!(host.cpus.cores, 0);
                assert_eq!(host.memory.size, 0);
            }
            other => panic!("unexpected object {other:?}"),
        }
    }

    #[test]
    fn test_admin_user() {
        let admin = User {
            id: "u1".into(),
            email: "admin@example.org".into(),
            permission: "admin".into(),
        };
        let user = User {
            permission: "none".into(),
            ..admin.clone()
        };
        assert!(admin.is_admin());
        assert!(!user.is_admin());
    }
}
