use bl2::OrHalt;
use bl2::platform::{
    AuthStatus, Bl2Platform, BootContext, BootInterface, CacheMaintenance, HwError, MapAttributes,
    MapError, MemoryKind, MemoryMapper,
};
use bl2::reset_reason::ResetReason;
use bl2::setup::{Bl2Setup, SetupError};
use boot_fdt::builder::FdtBuilder;
use boot_fdt::{Fdt, FdtError};
use boot_info::memory::{
    BL_CODE_BASE, DDR_BASE, DDR_MAX_SIZE, DTB_BASE, DTB_SIZE, DWL_BUFFER_BASE, DWL_BUFFER_SIZE,
    MMC_OVERRUN, PhysRegion,
};

const CTX_ADDR: u64 = 0x2ffc_0400;
const DDR_SIZE: u64 = 0x2000_0000;

struct FakeBoard {
    dtb: Vec<u8>,
    interface: BootInterface,
    fail: Option<&'static str>,
    reset_status: u32,
    ddr_size: u64,
    calls: Vec<&'static str>,
}

impl FakeBoard {
    fn new(interface: BootInterface) -> Self {
        let mut b = FdtBuilder::new();
        b.begin_node("").prop_str("model", "STM32MP157C-DK2").end_node();
        Self {
            dtb: b.finish(),
            interface,
            fail: None,
            reset_status: 1,
            ddr_size: DDR_SIZE,
            calls: Vec::new(),
        }
    }

    fn failing(mut self, step: &'static str) -> Self {
        self.fail = Some(step);
        self
    }

    fn step(&mut self, name: &'static str) -> Result<(), HwError> {
        self.calls.push(name);
        if self.fail == Some(name) {
            Err(HwError(-5))
        } else {
            Ok(())
        }
    }
}

impl Bl2Platform for FakeBoard {
    fn boot_context(&self, arg0: u64) -> Option<BootContext> {
        (arg0 == CTX_ADDR).then_some(BootContext {
            boot_interface: self.interface,
            instance: 1,
            auth_status: AuthStatus::Succeeded,
        })
    }

    fn open_device_tree(&mut self, base: u64) -> Result<Fdt<'_>, FdtError> {
        assert_eq!(base, DTB_BASE);
        self.calls.push("dt");
        Fdt::new(&self.dtb)
    }

    fn bsec_probe(&mut self) -> Result<(), HwError> {
        self.step("bsec")
    }

    fn clock_init(&mut self) -> Result<(), HwError> {
        self.step("clock")
    }

    fn console_setup(&mut self) -> Result<(), HwError> {
        self.step("console")
    }

    fn board_model(&self) -> Option<&str> {
        Some("STM32MP157C-DK2")
    }

    fn watchdog_init(&mut self) -> Result<(), HwError> {
        self.step("watchdog")
    }

    fn arch_security_setup(&mut self) -> Result<(), HwError> {
        self.step("arch security")
    }

    fn reset_status(&self) -> u32 {
        self.reset_status
    }

    fn ddr_probe(&mut self) -> Result<u64, HwError> {
        self.step("ddr").map(|()| self.ddr_size)
    }

    fn security_setup(&mut self) -> Result<(), HwError> {
        self.step("security")
    }
}

#[derive(Default)]
struct FakeMapper {
    maps: Vec<(PhysRegion, MapAttributes)>,
    fail_at: Option<u64>,
}

impl MemoryMapper for FakeMapper {
    fn map(&mut self, region: PhysRegion, attributes: MapAttributes) -> Result<(), MapError> {
        if self.fail_at == Some(region.base) {
            return Err(MapError(-12));
        }
        self.maps.push((region, attributes));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingCache(Vec<(u64, u64)>);

impl CacheMaintenance for RecordingCache {
    fn invalidate_dcache_range(&mut self, base: u64, size: u64) {
        self.0.push((base, size));
    }
}

fn setup(board: FakeBoard) -> Bl2Setup<FakeBoard, FakeMapper> {
    let mut setup = Bl2Setup::new(board, FakeMapper::default());
    setup.early_platform_setup(CTX_ADDR);
    setup
}

#[test]
fn sd_boot_sequence() {
    let mut bl2 = setup(FakeBoard::new(BootInterface::Sd));

    assert_eq!(bl2.arch_setup(), Ok(ResetReason::PowerOn));
    assert_eq!(
        bl2.platform().calls,
        ["dt", "bsec", "clock", "console", "watchdog", "arch security"]
    );
    assert_eq!(bl2.saved_boot_interface(), Some(BootInterface::Sd));

    let maps = &bl2.mapper().maps;
    assert_eq!(maps.len(), 2);
    assert_eq!(maps[0].0.base, BL_CODE_BASE);
    assert_eq!(maps[0].1, MapAttributes::secure(MemoryKind::Code));
    assert_eq!(maps[1].0, PhysRegion::new(DTB_BASE, DTB_SIZE));
    assert_eq!(maps[1].1, MapAttributes::secure(MemoryKind::RoData));

    let layout = bl2.platform_setup().unwrap();
    assert_eq!(layout.ddr_size, DDR_SIZE);
    assert_eq!(layout.block_overrun, Some(MMC_OVERRUN));
    assert_eq!(
        bl2.mapper().maps[2],
        (
            PhysRegion::new(DDR_BASE, DDR_MAX_SIZE),
            MapAttributes::secure(MemoryKind::RwData)
        )
    );

    let mut cache = RecordingCache::default();
    bl2.prepare_exit(BootInterface::Sd, &mut cache).unwrap();
    assert!(cache.0.is_empty());
    assert_eq!(bl2.platform().calls.last(), Some(&"security"));
}

#[test]
fn serial_boot_drops_download_buffer() {
    let mut bl2 = setup(FakeBoard::new(BootInterface::SerialUsb));
    bl2.arch_setup().unwrap();

    let layout = bl2.platform_setup().unwrap();
    assert_eq!(layout.block_overrun, None);

    let mut cache = RecordingCache::default();
    bl2.prepare_exit(BootInterface::SerialUsb, &mut cache).unwrap();
    assert_eq!(cache.0, [(DWL_BUFFER_BASE, DWL_BUFFER_SIZE)]);
}

#[test]
fn console_failure_is_not_fatal() {
    let mut bl2 = setup(FakeBoard::new(BootInterface::Emmc).failing("console"));

    assert!(bl2.arch_setup().is_ok());
    assert!(boot_console::is_muted());
    assert!(bl2.platform().calls.contains(&"watchdog"));
}

#[test]
fn hardware_failures_are_fatal() {
    for (step, stage) in [
        ("bsec", "BSEC probe"),
        ("clock", "clock init"),
        ("watchdog", "watchdog init"),
        ("arch security", "security setup"),
    ] {
        let mut bl2 = setup(FakeBoard::new(BootInterface::Sd).failing(step));
        assert_eq!(
            bl2.arch_setup(),
            Err(SetupError::Hardware {
                stage,
                source: HwError(-5)
            }),
            "{step}"
        );
    }

    let mut bl2 = setup(FakeBoard::new(BootInterface::Sd).failing("security"));
    bl2.arch_setup().unwrap();
    assert!(
        bl2.prepare_exit(BootInterface::Sd, &mut RecordingCache::default())
            .is_err()
    );
}

#[test]
fn mapping_failure_is_fatal() {
    let mut bl2 = Bl2Setup::new(
        FakeBoard::new(BootInterface::Sd),
        FakeMapper {
            fail_at: Some(DTB_BASE),
            ..FakeMapper::default()
        },
    );
    bl2.early_platform_setup(CTX_ADDR);

    assert_eq!(
        bl2.arch_setup(),
        Err(SetupError::Map {
            region: "device tree",
            source: MapError(-12)
        })
    );
    assert!(bl2.platform().calls.is_empty());
}

#[test]
fn invalid_device_tree_is_fatal() {
    let mut board = FakeBoard::new(BootInterface::Sd);
    board.dtb = vec![0xff; 64];
    let mut bl2 = setup(board);

    assert_eq!(
        bl2.arch_setup(),
        Err(SetupError::DeviceTree(FdtError::BadMagic(0xffff_ffff)))
    );
}

#[test]
fn boot_context_is_required() {
    let mut bl2 = Bl2Setup::new(FakeBoard::new(BootInterface::Sd), FakeMapper::default());
    bl2.early_platform_setup(0x1234);

    assert_eq!(bl2.arch_setup(), Err(SetupError::BootContext(0x1234)));
    assert_eq!(bl2.saved_boot_interface(), None);
}

#[test]
fn reset_reason_is_reported() {
    let mut board = FakeBoard::new(BootInterface::Sd);
    board.reset_status = (1 << 2) | (1 << 7);
    let mut bl2 = setup(board);

    assert_eq!(bl2.arch_setup(), Ok(ResetReason::McuSystem));
}

#[test]
fn ddr_size_is_checked() {
    let mut board = FakeBoard::new(BootInterface::Sd);
    board.ddr_size = DDR_MAX_SIZE + 1;
    let mut bl2 = setup(board);
    bl2.arch_setup().unwrap();

    assert_eq!(
        bl2.platform_setup(),
        Err(SetupError::DdrSize(DDR_MAX_SIZE + 1))
    );
}

#[test]
#[should_panic(expected = "DDR init: hardware returned status -5")]
fn ddr_failure_halts() {
    let mut bl2 = setup(FakeBoard::new(BootInterface::Sd).failing("ddr"));
    bl2.arch_setup().unwrap();
    bl2.platform_setup().or_halt("platform setup");
}
