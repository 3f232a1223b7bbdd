mod common;

use common::{GICD, GICR, Platform};
use sip_svc::smccc::{SIP_SVC_GET_CPU_COUNT, SIP_SVC_GET_GIC, SIP_SVC_VERSION, SMC_UNK};
use sip_svc::{DescriptorError, SmcFlags};

const NS: SmcFlags = SmcFlags::new().with_non_secure(true);

// The descriptor is process-wide, so the whole lifecycle is one test.
#[test]
fn publish_once_then_serve() {
    assert!(sip_svc::platform().is_none());
    assert_eq!(
        sip_svc::handle_smc(SIP_SVC_VERSION, 0, 0, 0, 0, NS).values(),
        &[SMC_UNK]
    );

    // a failed discovery publishes nothing
    let no_cpus = Platform {
        cpus: None,
        ..Platform::default()
    };
    assert_eq!(
        sip_svc::init(&no_cpus.build()),
        Err(DescriptorError::MissingCpus)
    );
    assert!(sip_svc::platform().is_none());

    sip_svc::init(&Platform::default().build()).unwrap();
    assert_eq!(
        sip_svc::init(&Platform::default().build()),
        Err(DescriptorError::AlreadyInitialized)
    );

    assert_eq!(
        sip_svc::handle_smc(SIP_SVC_VERSION, 0, 0, 0, 0, NS).values(),
        &[0, 0, 3]
    );
    assert_eq!(
        sip_svc::handle_smc(SIP_SVC_GET_GIC, 0, 0, 0, 0, NS).values(),
        &[0, GICD, GICR]
    );
    assert_eq!(
        sip_svc::handle_smc(SIP_SVC_GET_CPU_COUNT, 0, 0, 0, 0, NS).values(),
        &[0, 3]
    );
    assert_eq!(
        sip_svc::handle_smc(SIP_SVC_GET_CPU_COUNT, 0, 0, 0, 0, SmcFlags::new()).values(),
        &[SMC_UNK]
    );
    assert_eq!(sip_svc::platform().map(|p| p.cpu_count()), Some(3));
}
