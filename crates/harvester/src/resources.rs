//! Resource kinds left behind on Harvester when a guest cluster is destroyed.

use std::fmt;

use kube::discovery::ApiResource;

/// Kinds of Harvester resources that can outlive their cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OrphanKind {
    /// KubeVirt `VirtualMachine`.
    VirtualMachine,
    /// KubeVirt `VirtualMachineInstance` (the running guest).
    VirtualMachineInstance,
    /// CDI `DataVolume` backing a VM disk.
    DataVolume,
    /// Core `PersistentVolumeClaim`.
    PersistentVolumeClaim,
}

impl OrphanKind {
    /// Kinds cleaned up after the VMs, dependents first.
    pub const CASCADE: [Self; 3] = [
        Self::VirtualMachineInstance,
        Self::DataVolume,
        Self::PersistentVolumeClaim,
    ];

    /// API coordinates for dynamic access.
    #[must_use]
    pub fn api_resource(self) -> ApiResource {
        let (group, version, kind, plural) = match self {
            Self::VirtualMachine => ("kubevirt.io", "v1", "VirtualMachine", "virtualmachines"),
            Self::VirtualMachineInstance => (
                "kubevirt.io",
                "v1",
                "VirtualMachineInstance",
                "virtualmachineinstances",
            ),
            Self::DataVolume => ("cdi.kubevirt.io", "v1beta1", "DataVolume", "datavolumes"),
            Self::PersistentVolumeClaim => ("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
        };

        let api_version = if group.is_empty() {
            version.to_string()
        } else {
            format!("{group}/{version}")
        };

        ApiResource {
            group: group.to_string(),
            version: version.to_string(),
            api_version,
            kind: kind.to_string(),
            plural: plural.to_string(),
        }
    }

    /// Short name as used by kubectl.
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            Self::VirtualMachine => "vm",
            Self::VirtualMachineInstance => "vmi",
            Self::DataVolume => "dv",
            Self::PersistentVolumeClaim => "pvc",
        }
    }
}

impl fmt::Display for OrphanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A resource observed on Harvester. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrphanResource {
    pub kind: OrphanKind,
    pub name: String,
    pub namespace: String,
}

impl OrphanResource {
    #[must_use]
    pub fn new(kind: OrphanKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for OrphanResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}
