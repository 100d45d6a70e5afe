//! Gateway pool: an ordered, mutex-guarded list of HTTP gateways with cached
//! health, used to turn a content identifier into a browsable URL.

mod error;
pub mod clock;
pub mod pool;
pub mod probe;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::GatewayError;
pub use pool::{
    GatewayEntry, GatewayPool, GatewaySelection, LocalNode, NoLocalNode, DEFAULT_GATEWAYS,
    HEALTH_TTL_SECS, RESOURCE_PATH,
};
pub use probe::{HealthProbe, HttpHealthProbe, PROBE_TIMEOUT, WELL_KNOWN_CID};
