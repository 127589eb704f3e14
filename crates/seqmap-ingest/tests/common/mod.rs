//! Shared helpers for integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use seqmap_ingest::config::{Endpoint, SourceConfig};
use seqmap_ingest::fetch::{FetchConfig, Fetcher};
use std::io::Write;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Nothing listens here; any request fails fast
pub const DEAD_URL: &str = "http://127.0.0.1:9/unreachable";

pub fn fetcher() -> Fetcher {
    Fetcher::new(FetchConfig::no_retry()).unwrap()
}

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub async fn serve(server: &MockServer, route: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

/// Every primary under `/primary`, every fallback under `/fallback`.
/// Unmounted routes answer 404.
pub fn mirrored_sources(base: &str) -> SourceConfig {
    let both = |name: &str| {
        Endpoint::new(
            format!("{}/primary/{}", base, name),
            Some(&format!("{}/fallback/{}", base, name)),
        )
    };
    SourceConfig {
        pfam_clans: both("Pfam-A.clans.tsv.gz"),
        pfam_mapping: both("pdb_pfam_mapping.tsv.gz"),
        interpro_entries: both("entry.list"),
        interpro_tree: both("ParentChildTreeFile.txt"),
        glygen: Endpoint::new(format!("{}/primary/glygen/", base), Some(&format!("{}/fallback/glygen/", base))),
        id_mapping: both("idmapping_selected.tab.gz"),
        id_mapping_legacy: Endpoint::single(format!("{}/primary/idmapping_selected.tab.2015_03.gz", base)),
    }
}

/// Sources that cannot be reached, for cache-only loads
pub fn dead_sources() -> SourceConfig {
    mirrored_sources(DEAD_URL)
}
