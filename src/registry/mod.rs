//! Canonical-URL to local-path registry.
//!
//! Three synchronised structures back the mirror: url -> path, path -> url,
//! and the set of paths already handed out. Registration is idempotent per
//! canonical URL and a path, once claimed, is never reused for a different
//! URL. The registry performs no I/O; storage materialises the paths.

pub mod local_path;

use std::collections::{HashMap, HashSet};

use anyhow::{Result, anyhow};
use url::Url;

use crate::utils::constants::COLLISION_SUFFIX_CEILING;
use crate::utils::url_utils::canonical_string;
use local_path::{derive_candidate, short_hash};

/// Bijective map between canonical URLs and unique local paths.
#[derive(Debug, Default)]
pub struct PathRegistry {
    url_to_path: HashMap<String, String>,
    path_to_url: HashMap<String, String>,
    used_paths: HashSet<String>,
}

impl PathRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a URL and return its local path.
    ///
    /// Idempotent: registering the same canonical URL again returns the
    /// previously chosen path. Collisions after sanitisation get `_1`,
    /// `_2`, ... suffixes, then a canonical-URL hash once the suffix
    /// ceiling is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error for URLs that cannot be parsed or have no host.
    pub fn register(&mut self, url: &Url) -> Result<String> {
        let canonical =
            canonical_string(url).ok_or_else(|| anyhow!("cannot canonicalise URL '{url}'"))?;

        if let Some(existing) = self.url_to_path.get(&canonical) {
            return Ok(existing.clone());
        }

        let candidate = derive_candidate(url)
            .ok_or_else(|| anyhow!("cannot derive a local path for '{url}'"))?;
        let path = self.resolve_collision(candidate, &canonical);

        self.url_to_path.insert(canonical.clone(), path.clone());
        self.path_to_url.insert(path.clone(), canonical);
        self.used_paths.insert(path.clone());
        Ok(path)
    }

    /// Map an additional canonical URL onto an already-registered path.
    ///
    /// Used when a redirect makes two URLs name the same content: links to
    /// the pre-redirect URL must rewrite to the post-redirect file. The
    /// reverse map keeps its original owner.
    pub fn alias(&mut self, url: &Url, path: &str) {
        if let Some(canonical) = canonical_string(url)
            && self.used_paths.contains(path)
        {
            self.url_to_path.entry(canonical).or_insert_with(|| path.to_string());
        }
    }

    /// Look up the local path for a URL, if registered.
    #[must_use]
    pub fn lookup(&self, url: &Url) -> Option<&str> {
        let canonical = canonical_string(url)?;
        self.url_to_path.get(&canonical).map(String::as_str)
    }

    /// Look up by a pre-canonicalised key.
    #[must_use]
    pub fn lookup_canonical(&self, canonical: &str) -> Option<&str> {
        self.url_to_path.get(canonical).map(String::as_str)
    }

    /// Reverse lookup: which canonical URL owns a local path.
    #[must_use]
    pub fn url_for_path(&self, path: &str) -> Option<&str> {
        self.path_to_url.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.url_to_path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.url_to_path.is_empty()
    }

    fn resolve_collision(&self, candidate: String, canonical: &str) -> String {
        if !self.used_paths.contains(&candidate) {
            return candidate;
        }

        let (stem, ext) = split_extension(&candidate);
        for n in 1..=COLLISION_SUFFIX_CEILING {
            let attempt = format!("{stem}_{n}{ext}");
            if !self.used_paths.contains(&attempt) {
                return attempt;
            }
        }

        // Pathological collision pile-up: derive a suffix from the canonical
        // URL itself, which is unique by construction.
        format!("{stem}_{}{ext}", short_hash(canonical))
    }
}

/// Compute the relative path from one local path to another.
///
/// Walks off the longest common directory prefix, emits `../` for each
/// remaining directory of `from`, then appends the tail of `to`.
#[must_use]
pub fn relative(from: &str, to: &str) -> String {
    let from_dirs: Vec<&str> = {
        let mut segments: Vec<&str> = from.split('/').collect();
        segments.pop();
        segments
    };
    let to_segments: Vec<&str> = to.split('/').collect();

    let mut common = 0;
    while common < from_dirs.len()
        && common < to_segments.len().saturating_sub(1)
        && from_dirs[common] == to_segments[common]
    {
        common += 1;
    }

    let mut out = String::new();
    for _ in common..from_dirs.len() {
        out.push_str("../");
    }
    out.push_str(&to_segments[common..].join("/"));
    out
}

fn split_extension(path: &str) -> (&str, &str) {
    let filename_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[filename_start..].rfind('.') {
        Some(dot) if dot > 0 => path.split_at(filename_start + dot),
        _ => (path, ""),
    }
}
