//! # Platform Descriptor
//!
//! The hardware facts the `SiP` service reports, read once from the minimal
//! device tree the virtual platform passes to firmware:
//!
//! ```text
//! / {
//!     machine-version-major = <0>;
//!     machine-version-minor = <3>;
//!
//!     intc {
//!         reg = <0x00 0x40060000 0x00 0x10000      // GICD
//!                0x00 0x40080000 0x00 0x4000000>;  // GICR
//!         its {
//!             reg = <0x00 0x44081000 0x00 0x20000>;
//!         };
//!     };
//!
//!     cpus {
//!         #address-cells = <2>;
//!         #size-cells = <0>;
//!         cpu@0 { reg = <0x00 0x00>; numa-node-id = <0>; };
//!         cpu@1 { reg = <0x00 0x01>; };     // inherits node 0
//!         cpu-map { ... };                  // not a CPU
//!     };
//! };
//! ```
//!
//! This is not a kernel device tree; it only carries what the QEMU command
//! line changes about the platform.

use boot_fdt::{Fdt, Node};
use log::{error, info};

/// Maximum number of CPUs the platform supports.
pub const PLATFORM_CORE_COUNT: usize = 512;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("no information about cpus in the device tree")]
    MissingCpus,
    #[error("device tree lists more than {limit} cpus")]
    TooManyCpus { limit: usize },
    #[error("platform descriptor already initialized")]
    AlreadyInitialized,
}

/// Topology of one CPU.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct CpuInfo {
    pub node_id: u32,
    /// MPIDR affinity value from the `reg` property.
    pub affinity: u64,
}

/// Interrupt controller placement.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct GicBases {
    pub distributor: u64,
    pub redistributor: u64,
}

/// Facts discovered once at boot, read-only afterwards.
///
/// `N` bounds the number of CPUs; entries past [`cpu_count`](Self::cpu_count)
/// stay at their zero default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor<const N: usize = PLATFORM_CORE_COUNT> {
    version_major: u32,
    version_minor: u32,
    gic: Option<GicBases>,
    its: Option<u64>,
    cpu_count: usize,
    cpus: [CpuInfo; N],
}

impl<const N: usize> Default for PlatformDescriptor<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PlatformDescriptor<N> {
    /// Version 0.0, no interrupt controller, no CPUs.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            version_major: 0,
            version_minor: 0,
            gic: None,
            its: None,
            cpu_count: 0,
            cpus: [CpuInfo {
                node_id: 0,
                affinity: 0,
            }; N],
        }
    }

    /// Read the descriptor from a device-tree blob.
    ///
    /// A blob that does not open is logged and yields the defaults. Missing
    /// version, GIC or ITS information leaves those fields at their defaults.
    ///
    /// # Errors
    /// No `/cpus` node, or more CPUs than `N`.
    pub fn discover(blob: &[u8]) -> Result<Self, DescriptorError> {
        let mut desc = Self::new();

        let fdt = match Fdt::new(blob) {
            Ok(fdt) => fdt,
            Err(e) => {
                error!("Invalid Device Tree: {e}");
                return Ok(desc);
            }
        };

        desc.read_version(&fdt);
        info!(
            "Platform version: {}.{}",
            desc.version_major, desc.version_minor
        );

        desc.read_interrupt_controller(&fdt);
        desc.read_cpus(&fdt)?;
        Ok(desc)
    }

    fn read_version(&mut self, fdt: &Fdt<'_>) {
        let root = fdt.root();
        self.version_major = root.read_u32("machine-version-major").unwrap_or(0);
        self.version_minor = root.read_u32("machine-version-minor").unwrap_or(0);
    }

    fn read_interrupt_controller(&mut self, fdt: &Fdt<'_>) {
        let Some(intc) = fdt.find_node("/intc") else {
            return;
        };
        if intc.property("reg").is_none() {
            return;
        }

        let Ok(gicd) = intc.reg(0) else {
            error!("Failed to read GICD reg property of GIC node");
            return;
        };
        info!("GICD base = {:#x}", gicd.address);

        let Ok(gicr) = intc.reg(1) else {
            error!("Failed to read GICR reg property of GIC node");
            return;
        };
        info!("GICR base = {:#x}", gicr.address);

        self.gic = Some(GicBases {
            distributor: gicd.address,
            redistributor: gicr.address,
        });

        let Some(its) = fdt.find_node("/intc/its") else {
            return;
        };
        match its.reg(0) {
            Ok(reg) => {
                info!("GICI base = {:#x}", reg.address);
                self.its = Some(reg.address);
            }
            Err(_) => error!("Failed to read GICI reg property of GIC node"),
        }
    }

    /// Walk `cpu@N` siblings starting at `cpu@0`, in blob order.
    ///
    /// `numa-node-id` is sparse: a CPU without one belongs to the node of the
    /// CPU before it.
    fn read_cpus(&mut self, fdt: &Fdt<'_>) -> Result<(), DescriptorError> {
        if fdt.find_node("/cpus").is_none() {
            error!("No information about cpus in DeviceTree");
            return Err(DescriptorError::MissingCpus);
        }

        let mut current = CpuInfo::default();
        let mut count = 0;
        let mut node = fdt.find_node("/cpus/cpu@0");

        while let Some(cpu) = node {
            node = cpu.next_sibling();
            if !is_cpu_node(&cpu) {
                continue;
            }

            if let Ok(reg) = cpu.reg(0) {
                current.affinity = reg.address;
            }
            if let Ok(node_id) = cpu.read_u32("numa-node-id") {
                current.node_id = node_id;
            }

            let slot = self
                .cpus
                .get_mut(count)
                .ok_or(DescriptorError::TooManyCpus { limit: N })?;
            *slot = current;
            info!(
                "CPU {count}: node-id: {}, mpidr: {:#x}",
                current.node_id, current.affinity
            );
            count += 1;
        }

        self.cpu_count = count;
        info!("Found {count} cpus");
        Ok(())
    }

    #[must_use]
    pub const fn version(&self) -> (u32, u32) {
        (self.version_major, self.version_minor)
    }

    /// Distributor and redistributor bases, if the GIC was described.
    #[must_use]
    pub const fn gic(&self) -> Option<GicBases> {
        self.gic
    }

    #[must_use]
    pub const fn its(&self) -> Option<u64> {
        self.its
    }

    #[must_use]
    pub const fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// The discovered CPUs, in traversal order.
    #[must_use]
    pub fn cpus(&self) -> &[CpuInfo] {
        &self.cpus[..self.cpu_count]
    }

    /// Slot `index` of the CPU table, `None` at or past the capacity `N`.
    ///
    /// Slots in `cpu_count..N` hold the zero default.
    #[must_use]
    pub fn cpu_slot(&self, index: u64) -> Option<&CpuInfo> {
        self.cpus.get(usize::try_from(index).ok()?)
    }
}

fn is_cpu_node(node: &Node<'_>) -> bool {
    node.name().starts_with("cpu@")
}
