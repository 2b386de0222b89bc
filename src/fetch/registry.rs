//! npm-style HTTP registry client.
//!
//! This is deliberately the smallest client that makes `npmi install` usable:
//! one `GET <registry>/<name>` for the package document, a local choice of a
//! single version, then a streamed `GET` of that version's tarball. There is no
//! tree-wide range solving; each dependency is looked up on its own.

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;

use super::{ArchiveStream, Fetcher};

/// The subset of a registry package document used for version selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    /// Named tags such as `latest` or `next`
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    /// Published versions keyed by version string
    #[serde(default)]
    pub versions: HashMap<String, VersionMeta>,
}

/// Metadata of one published version.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionMeta {
    /// Distribution information
    pub dist: Dist,
}

/// Where the archive of a version lives.
#[derive(Debug, Clone, Deserialize)]
pub struct Dist {
    /// Absolute URL of the `.tgz`
    pub tarball: String,
}

/// HTTP registry fetcher.
#[derive(Debug, Clone)]
pub struct RegistryFetcher {
    client: reqwest::Client,
    registry: String,
}

impl RegistryFetcher {
    /// Create a fetcher for `registry` (e.g. `https://registry.npmjs.org`).
    pub fn new(registry: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("npmi/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            registry: registry.into().trim_end_matches('/').to_string(),
        })
    }

    fn packument_url(&self, name: &str) -> String {
        // Scoped packages keep the '@' but escape the separator.
        format!("{}/{}", self.registry, name.replace('/', "%2f"))
    }

    async fn packument(&self, name: &str) -> Result<Packument> {
        let url = self.packument_url(name);
        tracing::debug!(target: "npmi::fetch", "GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.npm.install-v1+json, application/json")
            .send()
            .await
            .with_context(|| format!("Request to {url} failed"))?;

        if !response.status().is_success() {
            return Err(anyhow!("registry returned HTTP {} for {}", response.status(), url));
        }

        response
            .json::<Packument>()
            .await
            .with_context(|| format!("Invalid package document from {url}"))
    }
}

impl Fetcher for RegistryFetcher {
    async fn fetch(&self, name: &str, spec: &str) -> Result<ArchiveStream> {
        let packument = self.packument(name).await?;
        let version = select_version(&packument, spec)
            .ok_or_else(|| anyhow!("no published version of {name} matches '{spec}'"))?;
        let tarball = &packument.versions[&version].dist.tarball;

        tracing::debug!(target: "npmi::fetch", "{}@{} resolved to {} ({})", name, spec, version, tarball);

        let response = self
            .client
            .get(tarball)
            .send()
            .await
            .with_context(|| format!("Request to {tarball} failed"))?;

        if !response.status().is_success() {
            return Err(anyhow!("registry returned HTTP {} for {}", response.status(), tarball));
        }

        let stream = futures::stream::try_unfold(response, |mut response| async move {
            match response.chunk().await {
                Ok(Some(chunk)) => Ok(Some((chunk.to_vec(), response))),
                Ok(None) => Ok(None),
                Err(e) => Err(std::io::Error::other(e)),
            }
        });

        Ok(stream.boxed())
    }
}

/// Pick the version of `packument` that `spec` refers to.
///
/// In order of preference:
/// 1. an exact published version (`1.2.3`, or `v1.2.3`)
/// 2. a dist-tag (`latest`, `next`, ...); empty and `*` mean `latest`
/// 3. the highest published version satisfying `spec` as a semver range
///
/// npm writes multi-comparator ranges with spaces (`>=1.0.0 <2.0.0`) and
/// alternatives with `||`; both are translated for the `semver` crate.
#[must_use]
pub fn select_version(packument: &Packument, spec: &str) -> Option<String> {
    let spec = spec.trim();

    if packument.versions.contains_key(spec) {
        return Some(spec.to_string());
    }
    if let Some(bare) = spec.strip_prefix('v')
        && packument.versions.contains_key(bare)
    {
        return Some(bare.to_string());
    }

    let tag = if spec.is_empty() || spec == "*" { "latest" } else { spec };
    if let Some(version) = packument.dist_tags.get(tag)
        && packument.versions.contains_key(version)
    {
        return Some(version.clone());
    }

    let requirements: Vec<semver::VersionReq> = spec
        .split("||")
        .filter_map(|alternative| semver::VersionReq::parse(&npm_range_to_semver(alternative)).ok())
        .collect();
    if requirements.is_empty() {
        return None;
    }

    packument
        .versions
        .keys()
        .filter_map(|v| semver::Version::parse(v).ok().map(|parsed| (parsed, v)))
        .filter(|(parsed, _)| requirements.iter().any(|req| req.matches(parsed)))
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, v)| v.clone())
}

fn npm_range_to_semver(range: &str) -> String {
    let range = range.trim();
    if range.contains(',') {
        return range.to_string();
    }

    // Re-attach operators separated from their version (">= 1.0.0").
    let mut comparators: Vec<String> = Vec::new();
    for token in range.split_whitespace() {
        match comparators.last_mut() {
            Some(last) if last.chars().all(|c| "<>=~^".contains(c)) => last.push_str(token),
            _ => comparators.push(token.to_string()),
        }
    }
    comparators.join(", ")
}
