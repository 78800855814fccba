// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use tracing::debug;
use uuid::Uuid;

use crate::constants::{CODELESS_SERVICE, DSPS_SERVICE};
use crate::event::ServiceSupport;

/// Whether a scanned device advertises the CodeLess service.
pub fn advertises_codeless(uuids: &[Uuid]) -> bool {
    uuids.contains(&CODELESS_SERVICE)
}

/// Whether a scanned device advertises the DSPS service.
pub fn advertises_dsps(uuids: &[Uuid]) -> bool {
    uuids.contains(&DSPS_SERVICE)
}

/// Services a scanned device advertises, as a flag set.
pub fn advertised_support(uuids: &[Uuid]) -> ServiceSupport {
    let mut support = ServiceSupport::empty();
    support.set(ServiceSupport::CODELESS, advertises_codeless(uuids));
    support.set(ServiceSupport::DSPS, advertises_dsps(uuids));
    debug!("Advertised services: {:?}", support);
    support
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertised_services() {
        let uuids = [Uuid::from_u128(0x1800), DSPS_SERVICE];
        assert!(!advertises_codeless(&uuids));
        assert!(advertises_dsps(&uuids));
        assert_eq!(advertised_support(&uuids), ServiceSupport::DSPS);
        assert!(advertised_support(&[]).is_empty());
        assert_eq!(
            advertised_support(&[CODELESS_SERVICE, DSPS_SERVICE]),
            ServiceSupport::CODELESS | ServiceSupport::DSPS
        );
    }
}
