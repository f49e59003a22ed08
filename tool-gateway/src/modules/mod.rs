//! Licensable feature modules and the toolsets each one unlocks.

use std::collections::{BTreeSet, HashSet};

pub const CORE_MODULE_ID: &str = "CORE";
pub const UNLICENSED_MODULE_ID: &str = "UNLICENSED";

/// Static descriptor of a licensable module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Module {
    pub id: &'static str,
    pub display_name: &'static str,
    pub toolsets: &'static [&'static str],
    /// Unlocked regardless of license state.
    pub is_default: bool,
}

impl Module {
    /// Identifier the licensing service uses for this module.
    ///
    /// Cloud cost management is `CCM` here but `CE` in license records.
    pub fn license_id(&self) -> &'static str {
        match self.id {
            "CCM" => "CE",
            other => other,
        }
    }
}

pub const DEFAULT_MODULES: &[Module] = &[
    Module {
        id: CORE_MODULE_ID,
        display_name: "Platform Core",
        toolsets: &["default", "pipelines", "templates", "audit", "connectors"],
        is_default: true,
    },
    Module {
        id: UNLICENSED_MODULE_ID,
        display_name: "Unlicensed Features",
        toolsets: &["dashboards"],
        is_default: true,
    },
    Module {
        id: "CI",
        display_name: "Continuous Integration",
        toolsets: &["ci"],
        is_default: false,
    },
    Module {
        id: "CD",
        display_name: "Continuous Delivery",
        toolsets: &["services", "environments", "infrastructure"],
        is_default: false,
    },
    Module {
        id: "CCM",
        display_name: "Cloud Cost Management",
        toolsets: &["ccm"],
        is_default: false,
    },
    Module {
        id: "CODE",
        display_name: "Code Repository",
        toolsets: &["repositories", "pullrequests"],
        is_default: false,
    },
    Module {
        id: "STO",
        display_name: "Security Testing Orchestration",
        toolsets: &["sto"],
        is_default: false,
    },
    Module {
        id: "SSCA",
        display_name: "Supply Chain Security",
        toolsets: &["scs"],
        is_default: false,
    },
    Module {
        id: "CHAOS",
        display_name: "Chaos Engineering",
        toolsets: &["chaos"],
        is_default: false,
    },
    Module {
        id: "IDP",
        display_name: "Internal Developer Portal",
        toolsets: &["idp"],
        is_default: false,
    },
    Module {
        id: "HAR",
        display_name: "Artifact Registry",
        toolsets: &["registries"],
        is_default: false,
    },
    Module {
        id: "SEI",
        display_name: "Software Engineering Insights",
        toolsets: &["sei"],
        is_default: false,
    },
    Module {
        id: "DBOPS",
        display_name: "Database DevOps",
        toolsets: &["dbops"],
        is_default: false,
    },
    Module {
        id: "IACM",
        display_name: "Infrastructure as Code Management",
        toolsets: &["iacm"],
        is_default: false,
    },
    Module {
        id: "FME",
        display_name: "Feature Management and Experimentation",
        toolsets: &["fme"],
        is_default: false,
    },
];

/// Immutable module catalog. Safe to share across requests without locking.
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    modules: Vec<Module>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MODULES.to_vec())
    }
}

impl ModuleRegistry {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    pub fn all_modules(&self) -> &[Module] {
        &self.modules
    }

    /// Module ids that stand in for "no confirmed entitlement".
    pub fn baseline_module_ids(&self) -> HashSet<String> {
        self.modules
            .iter()
            .filter(|m| m.is_default)
            .map(|m| m.id.to_string())
            .collect()
    }

    /// Toolsets of the default modules.
    pub fn baseline_toolsets(&self) -> BTreeSet<String> {
        self.modules
            .iter()
            .filter(|m| m.is_default)
            .flat_map(|m| m.toolsets.iter().map(|t| t.to_string()))
            .collect()
    }

    /// Toolsets unlocked by `licensed_module_ids`.
    ///
    /// An empty license set yields the baseline only. Otherwise every default
    /// module contributes, plus every module whose license id is licensed.
    pub fn compute_allowed_toolsets(&self, licensed_module_ids: &HashSet<String>) -> BTreeSet<String> {
        if licensed_module_ids.is_empty() {
            return self.baseline_toolsets();
        }

        self.modules
            .iter()
            .filter(|m| {
                m.is_default
                    || licensed_module_ids.contains(m.license_id())
                    || licensed_module_ids.contains(m.id)
            })
            .flat_map(|m| m.toolsets.iter().map(|t| t.to_string()))
            .collect()
    }
}
