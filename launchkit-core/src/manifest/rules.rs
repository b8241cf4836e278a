//! OS rules attached to libraries and manifests.
//!
//! A rule list starts out disallowed; every rule whose `os` clause matches the
//! platform (or that has no `os` clause) overwrites the verdict with its own
//! action. An empty list allows everything.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::platform::{OsFamily, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

/// OS clause of a rule. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Regular expression matched against the OS version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl OsRule {
    fn matches(&self, platform: &Platform) -> bool {
        if let Some(name) = &self.name {
            match name.parse::<OsFamily>() {
                Ok(os) if os == platform.os => {}
                _ => return false,
            }
        }

        if let Some(pattern) = &self.version {
            let Some(version) = platform.os_version.as_deref() else {
                return false;
            };
            match Regex::new(pattern) {
                Ok(re) if re.is_match(version) => {}
                Ok(_) => return false,
                Err(e) => {
                    warn!("Ignoring rule with invalid version pattern {:?}: {}", pattern, e);
                    return false;
                }
            }
        }

        if let Some(arch) = &self.arch {
            let bits = match arch.as_str() {
                "x86" => "32",
                "x64" | "x86_64" | "amd64" => "64",
                other => other,
            };
            if bits != platform.arch_bits {
                return false;
            }
        }

        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
}

impl Rule {
    fn applies(&self, platform: &Platform) -> bool {
        self.os.as_ref().map_or(true, |os| os.matches(platform))
    }
}

/// Evaluates a rule list against a platform.
pub fn rules_allow(rules: &[Rule], platform: &Platform) -> bool {
    if rules.is_empty() {
        return true;
    }

    rules
        .iter()
        .filter(|rule| rule.applies(platform))
        .fold(false, |_, rule| rule.action == RuleAction::Allow)
}
