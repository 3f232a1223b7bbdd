//! # Reset Reason
//!
//! Decoding of the MPU reset-status register (`RCC_MP_RSTSCLRR`). Several bits
//! can be set at once; exactly one reason is reported, chosen by a fixed
//! precedence.

use log::{error, info, warn};

const PORRSTF: u32 = 1 << 0;
const BORRSTF: u32 = 1 << 1;
const PADRSTF: u32 = 1 << 2;
const HCSSRSTF: u32 = 1 << 3;
const VCORERSTF: u32 = 1 << 4;
const MPSYSRSTF: u32 = 1 << 6;
const MCSYSRSTF: u32 = 1 << 7;
const IWDG1RSTF: u32 = 1 << 8;
const IWDG2RSTF: u32 = 1 << 9;
const STDBYRSTF: u32 = 1 << 11;
const CSTDBYRSTF: u32 = 1 << 12;
const MPUP0RSTF: u32 = 1 << 13;
const MPUP1RSTF: u32 = 1 << 14;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResetReason {
    /// No flag set.
    Unknown,
    StandbyExit,
    CStandbyExit,
    PowerOn,
    BrownOut,
    McuSystem,
    McuLocal,
    MpuSystem,
    HseClockFailure,
    Iwdg1,
    Iwdg2,
    MpuProcessor0,
    MpuProcessor1,
    Pad,
    VddCoreFailure,
    /// Flags set, but none that maps to a reason.
    Unidentified(u32),
}

impl ResetReason {
    #[must_use]
    pub fn decode(rstsclrr: u32) -> Self {
        let set = |mask: u32| rstsclrr & mask != 0;

        if rstsclrr == 0 {
            return Self::Unknown;
        }

        // Standby flags only count when no pad reset followed.
        if !set(PADRSTF) {
            if set(STDBYRSTF) {
                return Self::StandbyExit;
            }
            if set(CSTDBYRSTF) {
                return Self::CStandbyExit;
            }
        }

        if set(PORRSTF) {
            Self::PowerOn
        } else if set(BORRSTF) {
            Self::BrownOut
        } else if set(MCSYSRSTF) {
            if set(PADRSTF) {
                Self::McuSystem
            } else {
                Self::McuLocal
            }
        } else if set(MPSYSRSTF) {
            Self::MpuSystem
        } else if set(HCSSRSTF) {
            Self::HseClockFailure
        } else if set(IWDG1RSTF) {
            Self::Iwdg1
        } else if set(IWDG2RSTF) {
            Self::Iwdg2
        } else if set(MPUP0RSTF) {
            Self::MpuProcessor0
        } else if set(MPUP1RSTF) {
            Self::MpuProcessor1
        } else if set(PADRSTF) {
            Self::Pad
        } else if set(VCORERSTF) {
            Self::VddCoreFailure
        } else {
            Self::Unidentified(rstsclrr)
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::StandbyExit => "System exits from STANDBY",
            Self::CStandbyExit => "MPU exits from CSTANDBY",
            Self::PowerOn => "Power-on Reset (rst_por)",
            Self::BrownOut => "Brownout Reset (rst_bor)",
            Self::McuSystem => "System reset generated by MCU (MCSYSRST)",
            Self::McuLocal => "Local reset generated by MCU (MCSYSRST)",
            Self::MpuSystem => "System reset generated by MPU (MPSYSRST)",
            Self::HseClockFailure => "Reset due to a clock failure on HSE",
            Self::Iwdg1 => "IWDG1 Reset (rst_iwdg1)",
            Self::Iwdg2 => "IWDG2 Reset (rst_iwdg2)",
            Self::MpuProcessor0 => "MPU Processor 0 Reset",
            Self::MpuProcessor1 => "MPU Processor 1 Reset",
            Self::Pad => "Pad Reset from NRST",
            Self::VddCoreFailure => "Reset due to a failure of VDD_CORE",
            Self::Unidentified(_) => "Unidentified reset reason",
        }
    }

    /// Decode `rstsclrr` and report the reason on the log.
    pub fn report(rstsclrr: u32) -> Self {
        let reason = Self::decode(rstsclrr);
        match reason {
            Self::Unknown => warn!("Reset reason unknown"),
            Self::Unidentified(_) => error!("Unidentified reset reason ({rstsclrr:#x})"),
            other => info!("Reset reason ({rstsclrr:#x}): {}", other.description()),
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flags() {
        assert_eq!(ResetReason::decode(0), ResetReason::Unknown);
        assert_eq!(ResetReason::decode(PORRSTF), ResetReason::PowerOn);
        assert_eq!(ResetReason::decode(BORRSTF), ResetReason::BrownOut);
        assert_eq!(ResetReason::decode(MCSYSRSTF), ResetReason::McuLocal);
        assert_eq!(ResetReason::decode(MPSYSRSTF), ResetReason::MpuSystem);
        assert_eq!(ResetReason::decode(HCSSRSTF), ResetReason::HseClockFailure);
        assert_eq!(ResetReason::decode(IWDG1RSTF), ResetReason::Iwdg1);
        assert_eq!(ResetReason::decode(IWDG2RSTF), ResetReason::Iwdg2);
        assert_eq!(ResetReason::decode(MPUP0RSTF), ResetReason::MpuProcessor0);
        assert_eq!(ResetReason::decode(MPUP1RSTF), ResetReason::MpuProcessor1);
        assert_eq!(ResetReason::decode(PADRSTF), ResetReason::Pad);
        assert_eq!(ResetReason::decode(VCORERSTF), ResetReason::VddCoreFailure);
        assert_eq!(ResetReason::decode(1 << 5), ResetReason::Unidentified(1 << 5));
    }

    #[test]
    fn standby_needs_pad_clear() {
        assert_eq!(
            ResetReason::decode(STDBYRSTF | PORRSTF),
            ResetReason::StandbyExit
        );
        assert_eq!(
            ResetReason::decode(CSTDBYRSTF | IWDG1RSTF),
            ResetReason::CStandbyExit
        );
        assert_eq!(
            ResetReason::decode(STDBYRSTF | PADRSTF | BORRSTF),
            ResetReason::BrownOut
        );
        assert_eq!(ResetReason::decode(STDBYRSTF | PADRSTF), ResetReason::Pad);
    }

    #[test]
    fn mcu_reset_scope_follows_pad() {
        assert_eq!(
            ResetReason::decode(MCSYSRSTF | PADRSTF),
            ResetReason::McuSystem
        );
        assert_eq!(
            ResetReason::decode(MCSYSRSTF | IWDG2RSTF),
            ResetReason::McuLocal
        );
    }

    #[test]
    fn precedence() {
        assert_eq!(
            ResetReason::decode(PORRSTF | BORRSTF | PADRSTF),
            ResetReason::PowerOn
        );
        assert_eq!(
            ResetReason::decode(IWDG1RSTF | MPUP0RSTF | VCORERSTF),
            ResetReason::Iwdg1
        );
        assert_eq!(
            ResetReason::decode(PADRSTF | VCORERSTF),
            ResetReason::Pad
        );
    }
}
