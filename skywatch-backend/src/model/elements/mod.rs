//! Element acquisition: ordered network sources, durable disk records and the
//! tiered cache in front of both.

mod cache;
mod chain;
mod disk;
mod sources;

pub use cache::ElementCache;
pub use chain::SourceChain;
pub use disk::{DISK_SOURCE, DiskStore};
pub use sources::{
    BulletinSource, CelestrakSource, ElementSource, TleApiSource, build_http_client,
};

#[cfg(test)]
pub(crate) use chain::tests as testing;
