//! # SMC Calling Convention
//!
//! Function identifiers, caller flags and result registers as the secure
//! monitor sees them.
//!
//! ```text
//!  31  30  29‒24   23‒16   15‒0
//! ┌───┬───┬───────┬───────┬──────────┐
//! │ F │ W │ owner │  MBZ  │  number  │
//! └───┴───┴───────┴───────┴──────────┘
//!   F = fast call, W = SMC64
//! ```

use bitfield_struct::bitfield;

/// Owning entity number of silicon-provider services.
pub const OEN_SIP: u8 = 2;

/// A 32-bit SMC function identifier.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct FunctionId {
    /// Function number within the owner's range.
    pub number: u16,
    #[bits(8)]
    __: u8,
    /// Owning entity number.
    #[bits(6)]
    pub owner: u8,
    /// SMC64 (`true`) or SMC32 calling convention.
    pub smc64: bool,
    /// Fast (atomic) call rather than yielding.
    pub fast_call: bool,
}

impl FunctionId {
    /// A fast SMC64 `SiP` call with function number `n`.
    #[must_use]
    pub const fn sip64(n: u16) -> Self {
        Self::new()
            .with_fast_call(true)
            .with_smc64(true)
            .with_owner(OEN_SIP)
            .with_number(n)
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.into_bits()
    }
}

/// Flags the dispatcher passes along with every call.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct SmcFlags {
    /// The call was made from the non-secure world.
    pub non_secure: bool,
    #[bits(63)]
    __: u64,
}

/// Security state of the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum World {
    Secure,
    NonSecure,
}

impl World {
    #[must_use]
    pub const fn from_flags(flags: SmcFlags) -> Self {
        if flags.non_secure() {
            Self::NonSecure
        } else {
            Self::Secure
        }
    }
}

/// Unknown function, or a caller that may not use it.
pub const SMC_UNK: u64 = (-1_i64).cast_unsigned();

/// A parameter is out of range.
pub const SMC_ARCH_CALL_INVAL_PARAM: u64 = (-3_i64).cast_unsigned();

/// First result word of calls that return only data.
pub const SMC_RESERVED: u64 = 0;

pub const SIP_SVC_VERSION: u32 = FunctionId::sip64(1).raw();
pub const SIP_SVC_GET_GIC: u32 = FunctionId::sip64(100).raw();
pub const SIP_SVC_GET_GIC_ITS: u32 = FunctionId::sip64(101).raw();
pub const SIP_SVC_GET_CPU_COUNT: u32 = FunctionId::sip64(200).raw();
pub const SIP_SVC_GET_CPU_NODE: u32 = FunctionId::sip64(201).raw();

/// Result registers `x0..x3`; only the first `len` are meaningful.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SmcReturn {
    regs: [u64; 4],
    len: usize,
}

impl SmcReturn {
    #[must_use]
    pub const fn one(x0: u64) -> Self {
        Self {
            regs: [x0, 0, 0, 0],
            len: 1,
        }
    }

    #[must_use]
    pub const fn two(x0: u64, x1: u64) -> Self {
        Self {
            regs: [x0, x1, 0, 0],
            len: 2,
        }
    }

    #[must_use]
    pub const fn three(x0: u64, x1: u64, x2: u64) -> Self {
        Self {
            regs: [x0, x1, x2, 0],
            len: 3,
        }
    }

    #[must_use]
    pub const fn four(x0: u64, x1: u64, x2: u64, x3: u64) -> Self {
        Self {
            regs: [x0, x1, x2, x3],
            len: 4,
        }
    }

    /// The returned words.
    #[must_use]
    pub fn values(&self) -> &[u64] {
        &self.regs[..self.len]
    }

    /// All four registers, unused ones zero.
    #[must_use]
    pub const fn registers(&self) -> [u64; 4] {
        self.regs
    }
}
