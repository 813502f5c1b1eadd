//! Registry store: the declarative mapping of agent name to required version
//! and artifact path, plus skill-level version constraints.
//!
//! The registry is an explicit value passed by reference into every call —
//! there is no process-wide singleton. It is reloaded per invocation batch;
//! nothing here caches across calls.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::{PolicyError, Result};

/// A parsed `major.minor.patch` version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Parse `"1.2.0"`. Anything else is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(PolicyError::RegistryNotFound(format!(
                "unsupported version syntax: '{s}'"
            )));
        }
        let nums: Vec<u64> = parts
            .iter()
            .map(|p| {
                p.parse::<u64>().map_err(|_| {
                    PolicyError::RegistryNotFound(format!("unsupported version syntax: '{s}'"))
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            major: nums[0],
            minor: nums[1],
            patch: nums[2],
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A version constraint: exact (`"1.2.0"`) or major-range (`"1.x"`).
///
/// Unsupported constraint syntax is a configuration error surfaced at
/// registry load time, never a runtime fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionReq {
    Exact { version: Version },
    MajorRange { major: u64 },
}

impl VersionReq {
    /// Parse `"1.2.0"` or `"1.x"`.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(major) = s.strip_suffix(".x") {
            let major = major.parse::<u64>().map_err(|_| {
                PolicyError::RegistryNotFound(format!("unsupported constraint syntax: '{s}'"))
            })?;
            return Ok(VersionReq::MajorRange { major });
        }
        Ok(VersionReq::Exact {
            version: Version::parse(s)?,
        })
    }

    /// Whether a declared version satisfies this constraint.
    pub fn matches(&self, declared: &Version) -> bool {
        match self {
            VersionReq::Exact { version } => version == declared,
            VersionReq::MajorRange { major } => declared.major == *major,
        }
    }
}

impl std::fmt::Display for VersionReq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionReq::Exact { version } => write!(f, "{version}"),
            VersionReq::MajorRange { major } => write!(f, "{major}.x"),
        }
    }
}

/// One registry entry: an agent name bound to an artifact path and the
/// version that artifact must declare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    /// Absolute artifact path, resolved inside the registry root.
    pub path: PathBuf,
    pub required_version: VersionReq,
}

/// Skill-level constraint table: skill name to per-agent version constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillSpec {
    pub name: String,
    pub depends_on: BTreeMap<String, VersionReq>,
}

// On-disk YAML shape.
#[derive(Debug, Deserialize)]
struct RegistryDoc {
    agents: BTreeMap<String, AgentEntry>,
    #[serde(default)]
    skills: BTreeMap<String, SkillEntry>,
}

#[derive(Debug, Deserialize)]
struct AgentEntry {
    version: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct SkillEntry {
    depends_on: BTreeMap<String, String>,
}

/// The loaded registry: sole source of truth for what may be invoked.
#[derive(Debug, Clone)]
pub struct Registry {
    root: PathBuf,
    agents: BTreeMap<String, AgentSpec>,
    skills: BTreeMap<String, SkillSpec>,
}

impl Registry {
    /// Load and validate a registry YAML file.
    ///
    /// Fails with `REGISTRY.NOT_FOUND` when the file is unreadable, does not
    /// parse, carries an unsupported version constraint, or registers a path
    /// that escapes the registry root.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PolicyError::RegistryNotFound(format!("{}: {e}", path.display()))
        })?;
        let doc: RegistryDoc = serde_yaml::from_str(&text).map_err(|e| {
            PolicyError::RegistryNotFound(format!("{}: {e}", path.display()))
        })?;

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut agents = BTreeMap::new();
        for (name, entry) in doc.agents {
            let resolved = resolve_inside_root(&root, &entry.path).ok_or_else(|| {
                PolicyError::RegistryNotFound(format!(
                    "agent '{name}' path '{}' escapes the registry root",
                    entry.path
                ))
            })?;
            let required_version = VersionReq::parse(&entry.version)?;
            agents.insert(
                name.clone(),
                AgentSpec {
                    name,
                    path: resolved,
                    required_version,
                },
            );
        }

        let mut skills = BTreeMap::new();
        for (name, entry) in doc.skills {
            let mut depends_on = BTreeMap::new();
            for (agent, constraint) in entry.depends_on {
                depends_on.insert(agent, VersionReq::parse(&constraint)?);
            }
            skills.insert(
                name.clone(),
                SkillSpec { name, depends_on },
            );
        }

        Ok(Self {
            root,
            agents,
            skills,
        })
    }

    /// Directory every registered artifact path must stay inside.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up an agent spec by name.
    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.get(name)
    }

    /// All registered agent names, sorted.
    pub fn agent_names(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    /// Look up a skill constraint table by name.
    pub fn skill(&self, name: &str) -> Option<&SkillSpec> {
        self.skills.get(name)
    }

    /// Check a skill's `depends_on` constraints against the registered agent
    /// versions. Returns the first unsatisfied constraint as an error.
    pub fn resolve_skill(&self, name: &str) -> Result<()> {
        let skill = self.skill(name).ok_or_else(|| {
            PolicyError::RegistryResolution(format!("skill '{name}' not in registry"))
        })?;
        for (agent, constraint) in &skill.depends_on {
            let spec = self.agent(agent).ok_or_else(|| {
                PolicyError::RegistryResolution(format!(
                    "skill '{name}' depends on unregistered agent '{agent}'"
                ))
            })?;
            let satisfied = match &spec.required_version {
                VersionReq::Exact { version } => constraint.matches(version),
                // A range-registered agent satisfies a range constraint on
                // the same major; an exact constraint cannot be proven.
                VersionReq::MajorRange { major } => match constraint {
                    VersionReq::MajorRange { major: want } => major == want,
                    VersionReq::Exact { version } => version.major == *major,
                },
            };
            if !satisfied {
                return Err(PolicyError::RegistryResolution(format!(
                    "skill '{name}' requires {agent} {constraint}, registry has {}",
                    spec.required_version
                )));
            }
        }
        Ok(())
    }
}

/// Join `rel` onto `root`, rejecting absolute paths and `..` traversal.
fn resolve_inside_root(root: &Path, rel: &str) -> Option<PathBuf> {
    let rel = Path::new(rel);
    if rel.is_absolute() {
        return None;
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return None,
        }
    }
    Some(root.join(rel))
}
