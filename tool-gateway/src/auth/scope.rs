//! Tenant scope attached to each authenticated request.

use service_core::config::non_empty;

/// The account/organization/project hierarchy addressed by one request.
///
/// `account_id` is always non-empty. `org_id` and `project_id` are either
/// absent or non-empty; blank overrides collapse to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub account_id: String,
    pub org_id: Option<String>,
    pub project_id: Option<String>,
}

impl Scope {
    /// Account-level scope.
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            org_id: None,
            project_id: None,
        }
    }

    pub fn with_org(mut self, org_id: Option<String>) -> Self {
        self.org_id = non_empty(org_id);
        self
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = non_empty(project_id);
        self
    }

    /// Apply caller overrides; absent or blank overrides keep the current value.
    pub fn overridden(&self, org_id: Option<String>, project_id: Option<String>) -> Self {
        Self {
            account_id: self.account_id.clone(),
            org_id: non_empty(org_id).or_else(|| self.org_id.clone()),
            project_id: non_empty(project_id).or_else(|| self.project_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_ids_are_absent() {
        let scope = Scope::account("acc")
            .with_org(Some("".into()))
            .with_project(Some("  ".into()));
        assert_eq!(scope.org_id, None);
        assert_eq!(scope.project_id, None);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let scope = Scope::account("acc")
            .with_org(Some("default-org".into()))
            .with_project(Some("default-project".into()));

        let narrowed = scope.overridden(Some("org-2".into()), None);
        assert_eq!(narrowed.account_id, "acc");
        assert_eq!(narrowed.org_id.as_deref(), Some("org-2"));
        assert_eq!(narrowed.project_id.as_deref(), Some("default-project"));

        let unchanged = scope.overridden(Some("".into()), Some("".into()));
        assert_eq!(unchanged, scope);
    }
}
