use boot_fdt::builder::FdtBuilder;

pub const GICD: u64 = 0x4006_0000;
pub const GICR: u64 = 0x4008_0000;
pub const ITS: u64 = 0x4408_1000;

/// Shape of the QEMU SBSA device tree to build.
pub struct Platform {
    pub version: Option<(u32, u32)>,
    /// Number of `reg` entries on `/intc`; `None` drops the node.
    pub gic_regs: Option<usize>,
    pub its: bool,
    pub cpus: Option<Vec<(u64, Option<u32>)>>,
    /// Insert a `cpu-map` node after this many CPUs.
    pub cpu_map_at: Option<usize>,
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            version: Some((0, 3)),
            gic_regs: Some(2),
            its: true,
            cpus: Some(vec![(0x0, Some(0)), (0x1, None), (0x100, Some(1))]),
            cpu_map_at: Some(2),
        }
    }
}

fn split(v: u64) -> [u32; 2] {
    [(v >> 32) as u32, v as u32]
}

impl Platform {
    pub fn build(&self) -> Vec<u8> {
        let mut b = FdtBuilder::new();
        b.begin_node("")
            .prop_u32("#address-cells", 2)
            .prop_u32("#size-cells", 2);
        if let Some((major, minor)) = self.version {
            b.prop_u32("machine-version-major", major)
                .prop_u32("machine-version-minor", minor);
        }

        if let Some(regs) = self.gic_regs {
            b.begin_node("intc")
                .prop_u32("#address-cells", 2)
                .prop_u32("#size-cells", 2);
            if regs > 0 {
                let mut cells = Vec::new();
                for (base, size) in [(GICD, 0x1_0000), (GICR, 0x400_0000)].into_iter().take(regs) {
                    cells.extend(split(base));
                    cells.extend(split(size));
                }
                b.prop_cells("reg", &cells);
            }
            if self.its {
                let mut cells = Vec::from(split(ITS));
                cells.extend(split(0x2_0000));
                b.begin_node("its").prop_cells("reg", &cells).end_node();
            }
            b.end_node();
        }

        if let Some(cpus) = &self.cpus {
            b.begin_node("cpus")
                .prop_u32("#address-cells", 2)
                .prop_u32("#size-cells", 0);
            for (i, &(mpidr, node)) in cpus.iter().enumerate() {
                if self.cpu_map_at == Some(i) {
                    b.begin_node("cpu-map")
                        .begin_node("socket0")
                        .end_node()
                        .end_node();
                }
                b.begin_node(&format!("cpu@{i}"))
                    .prop_cells("reg", &split(mpidr));
                if let Some(node) = node {
                    b.prop_u32("numa-node-id", node);
                }
                b.end_node();
            }
            b.end_node();
        }

        b.end_node();
        b.finish()
    }
}
