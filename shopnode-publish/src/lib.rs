//! Shop publication: adding a shop directory to the local daemon, recording
//! the result next to the shop, and reading that record back.

mod error;
pub mod inspector;
pub mod manager;
pub mod pipeline;

pub use error::PublishError;
pub use inspector::{inspect, report, ShopReport};
pub use manager::{NodeStatus, ShopNode};
pub use pipeline::{publish, shop_dir_of, unpublish, Published};
