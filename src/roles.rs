use crate::types::Role;

/// Maps identity-provider groups to an application role and access decision.
pub trait RoleMapper: Send + Sync {
    /// Whether any of `groups` grants access to the application.
    fn has_app_access(&self, groups: &[String]) -> bool;

    /// The role granted by `groups`, or [`Role::none`] if none is recognized.
    fn map_groups_to_role(&self, groups: &[String]) -> Role;
}

/// Ordered group-to-role table; the first matching rule wins.
///
/// Group names match case-insensitively and ignore a leading `/`
/// (path-style group names).
#[derive(Debug, Clone)]
pub struct GroupRoleMapper {
    rules: Vec<(String, Role)>,
}

impl Default for GroupRoleMapper {
    fn default() -> Self {
        Self::new()
            .with_rule("admins", "admin")
            .with_rule("property-managers", "manager")
            .with_rule("accountants", "accountant")
            .with_rule("maintenance", "maintenance")
            .with_rule("staff", "staff")
    }
}

impl GroupRoleMapper {
    /// Empty table: denies everyone until rules are added.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule at the lowest priority.
    #[must_use]
    pub fn with_rule(mut self, group: impl AsRef<str>, role: impl Into<Role>) -> Self {
        self.rules.push((normalize(group.as_ref()), role.into()));
        self
    }

    fn matching_rule(&self, groups: &[String]) -> Option<&Role> {
        let groups: Vec<String> = groups.iter().map(|g| normalize(g)).collect();
        self.rules
            .iter()
            .find(|(group, _)| groups.contains(group))
            .map(|(_, role)| role)
    }
}

impl RoleMapper for GroupRoleMapper {
    fn has_app_access(&self, groups: &[String]) -> bool {
        self.matching_rule(groups).is_some()
    }

    fn map_groups_to_role(&self, groups: &[String]) -> Role {
        self.matching_rule(groups).cloned().unwrap_or_else(Role::none)
    }
}

fn normalize(group: &str) -> String {
    group.trim().trim_start_matches('/').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn staff_has_access() {
        let mapper = GroupRoleMapper::default();
        assert!(mapper.has_app_access(&groups(&["staff"])));
        assert_eq!(mapper.map_groups_to_role(&groups(&["staff"])).as_str(), "staff");
    }

    #[test]
    fn unknown_groups_denied() {
        let mapper = GroupRoleMapper::default();
        assert!(!mapper.has_app_access(&groups(&["tenants-only"])));
        assert!(!mapper.has_app_access(&[]));
        assert!(mapper.map_groups_to_role(&groups(&["tenants-only"])).is_none());
    }

    #[test]
    fn highest_priority_rule_wins() {
        let mapper = GroupRoleMapper::default();
        let role = mapper.map_groups_to_role(&groups(&["staff", "admins"]));
        assert_eq!(role.as_str(), "admin");
    }

    #[test]
    fn path_style_and_case_insensitive() {
        let mapper = GroupRoleMapper::default();
        assert_eq!(
            mapper
                .map_groups_to_role(&groups(&["/Property-Managers"]))
                .as_str(),
            "manager"
        );
    }

    #[test]
    fn empty_table_denies() {
        let mapper = GroupRoleMapper::new();
        assert!(!mapper.has_app_access(&groups(&["admins"])));
    }
}
