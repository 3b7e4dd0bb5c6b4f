pub mod collector;
pub mod feed;
pub mod kill;
pub mod permission;
pub mod platform;
pub mod record;
pub mod sampler;
pub mod snapshot;
pub mod units;
pub mod updater;
