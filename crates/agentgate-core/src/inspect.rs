//! Artifact inspector: reads an agent definition file, extracts its declared
//! version tag, and computes a content digest for attestation.
//!
//! The digest is SHA-256 over the full file bytes, so two inspections of
//! unchanged bytes always agree. Nothing is cached; callers re-inspect when
//! artifacts may have changed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::{PolicyError, Result};
use crate::registry::Version;

/// The result of inspecting one agent definition file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub declared_version: Version,
    /// SHA-256 hex digest of the full file bytes.
    pub content_digest: String,
}

/// Inspect an agent definition file.
///
/// # Errors
///
/// - `ARTIFACT.UNREADABLE` — the file is missing or cannot be read.
/// - `ARTIFACT.NO_VERSION` — no version tag is present.
pub fn inspect(path: impl AsRef<Path>) -> Result<ArtifactInfo> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| PolicyError::ArtifactUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let text = String::from_utf8_lossy(&bytes);
    let declared = extract_version_tag(&text).ok_or_else(|| PolicyError::ArtifactNoVersion {
        path: path.display().to_string(),
    })?;

    Ok(ArtifactInfo {
        path: path.to_path_buf(),
        declared_version: declared,
        content_digest: digest,
    })
}

/// Extract the declared version from an agent definition.
///
/// Accepted forms, first match wins:
/// - a frontmatter/plain line `version: 1.2.0`
/// - an HTML comment `<!-- version: 1.2.0 -->`
fn extract_version_tag(text: &str) -> Option<Version> {
    for line in text.lines() {
        let line = line.trim();
        let candidate = if let Some(rest) = line.strip_prefix("version:") {
            Some(rest.trim())
        } else if let Some(rest) = line.strip_prefix("<!-- version:") {
            rest.strip_suffix("-->").map(str::trim)
        } else {
            None
        };
        if let Some(raw) = candidate {
            let raw = raw.trim_matches(|c| c == '"' || c == '\'');
            if let Ok(v) = Version::parse(raw) {
                return Some(v);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_artifact(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_inspect_frontmatter_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(
            dir.path(),
            "a.md",
            "---\nname: agent-a\nversion: 1.0.0\n---\n# Agent A\n",
        );
        let info = inspect(&path).unwrap();
        assert_eq!(info.declared_version, Version::parse("1.0.0").unwrap());
        assert_eq!(info.content_digest.len(), 64);
    }

    #[test]
    fn test_inspect_html_comment_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(
            dir.path(),
            "b.md",
            "# Agent B\n<!-- version: 2.3.1 -->\ninstructions here\n",
        );
        let info = inspect(&path).unwrap();
        assert_eq!(info.declared_version, Version::parse("2.3.1").unwrap());
    }

    #[test]
    fn test_inspect_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspect(dir.path().join("ghost.md")).unwrap_err();
        assert_eq!(err.kind(), "ARTIFACT.UNREADABLE");
    }

    #[test]
    fn test_inspect_no_version_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), "c.md", "# No version here\n");
        let err = inspect(&path).unwrap_err();
        assert_eq!(err.kind(), "ARTIFACT.NO_VERSION");
    }

    #[test]
    fn test_digest_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), "d.md", "version: 1.0.0\nbody\n");
        let first = inspect(&path).unwrap();
        let second = inspect(&path).unwrap();
        assert_eq!(first.content_digest, second.content_digest);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let p1 = write_artifact(dir.path(), "e.md", "version: 1.0.0\nbody\n");
        let p2 = write_artifact(dir.path(), "f.md", "version: 1.0.0\nbody changed\n");
        assert_ne!(
            inspect(&p1).unwrap().content_digest,
            inspect(&p2).unwrap().content_digest
        );
    }

    #[test]
    fn test_first_version_tag_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(
            dir.path(),
            "g.md",
            "version: 1.0.0\nversion: 9.9.9\n",
        );
        let info = inspect(&path).unwrap();
        assert_eq!(info.declared_version, Version::parse("1.0.0").unwrap());
    }

    #[test]
    fn test_quoted_version_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(dir.path(), "h.md", "version: \"1.4.2\"\n");
        let info = inspect(&path).unwrap();
        assert_eq!(info.declared_version, Version::parse("1.4.2").unwrap());
    }
}
