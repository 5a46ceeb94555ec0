mod client;
mod enrich;
mod npmrc;
mod server;

pub use client::{ChecksumLookup, RegistryClient, RemoteChecksum};
pub use enrich::{
    enrich_checksums, EnrichOptions, EnrichSummary, ErrorCollector, DEFAULT_THREADS,
};
pub use npmrc::{translate_npm_config, RegistryConfigDocument, TranslatedConfig};
pub use server::{NpmAuth, RegistryServer};

#[cfg(test)]
mod tests;
