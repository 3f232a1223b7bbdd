//! # Silicon Provider Call Gate
//!
//! Answers platform queries from the normal world out of a
//! [`PlatformDescriptor`]. Every call is a bounded table lookup; nothing is
//! mutated.
//!
//! | function                  | `x1`  | result                          |
//! |---------------------------|-------|---------------------------------|
//! | [`SIP_SVC_VERSION`]       |       | `0, major, minor`               |
//! | [`SIP_SVC_GET_GIC`]       |       | `0, gicd, gicr`                 |
//! | [`SIP_SVC_GET_GIC_ITS`]   |       | `0, its`                        |
//! | [`SIP_SVC_GET_CPU_COUNT`] |       | `0, count`                      |
//! | [`SIP_SVC_GET_CPU_NODE`]  | index | `0, node, mpidr` or `INVAL_PARAM` |
//!
//! Unset addresses read as zero.

use crate::descriptor::PlatformDescriptor;
use crate::smccc::{
    FunctionId, SIP_SVC_GET_CPU_COUNT, SIP_SVC_GET_CPU_NODE, SIP_SVC_GET_GIC, SIP_SVC_GET_GIC_ITS,
    SIP_SVC_VERSION, SMC_ARCH_CALL_INVAL_PARAM, SMC_RESERVED, SMC_UNK, SmcReturn, World,
};
use log::{error, info};

/// Dispatcher over a borrowed descriptor.
#[derive(Debug, Copy, Clone)]
pub struct CallGate<'d, const N: usize> {
    platform: &'d PlatformDescriptor<N>,
}

impl<'d, const N: usize> CallGate<'d, N> {
    #[must_use]
    pub const fn new(platform: &'d PlatformDescriptor<N>) -> Self {
        Self { platform }
    }

    /// Serve one `SiP` call.
    ///
    /// Calls from anywhere but the non-secure world get [`SMC_UNK`], whatever
    /// the function.
    #[must_use]
    pub fn handle(&self, fid: u32, caller: World, args: [u64; 4]) -> SmcReturn {
        if caller != World::NonSecure {
            error!("wrong world SMC ({fid:#x})");
            return SmcReturn::one(SMC_UNK);
        }

        let p = self.platform;
        match fid {
            SIP_SVC_VERSION => {
                info!("Platform version requested");
                let (major, minor) = p.version();
                SmcReturn::three(SMC_RESERVED, major.into(), minor.into())
            }
            SIP_SVC_GET_GIC => {
                let gic = p.gic().unwrap_or_default();
                SmcReturn::three(SMC_RESERVED, gic.distributor, gic.redistributor)
            }
            SIP_SVC_GET_GIC_ITS => SmcReturn::two(SMC_RESERVED, p.its().unwrap_or(0)),
            SIP_SVC_GET_CPU_COUNT => SmcReturn::two(SMC_RESERVED, p.cpu_count() as u64),
            SIP_SVC_GET_CPU_NODE => match p.cpu_slot(args[0]) {
                Some(cpu) => SmcReturn::three(SMC_RESERVED, cpu.node_id.into(), cpu.affinity),
                None => SmcReturn::one(SMC_ARCH_CALL_INVAL_PARAM),
            },
            _ => {
                error!(
                    "unhandled SMC ({fid:#x}) (function id: {})",
                    FunctionId::from_bits(fid).number()
                );
                SmcReturn::one(SMC_UNK)
            }
        }
    }
}
