//! Scope parsing.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Default,
    OpenId,
    Profile,
    Email,
    Custom(String),
}

impl Scope {
    pub fn as_str(&self) -> &str {
        match self {
            Scope::Default => "default",
            Scope::OpenId => "openid",
            Scope::Profile => "profile",
            Scope::Email => "email",
            Scope::Custom(s) => s,
        }
    }
}

impl From<&str> for Scope {
    fn from(s: &str) -> Self {
        match s {
            "default" => Scope::Default,
            "openid" => Scope::OpenId,
            "profile" => Scope::Profile,
            "email" => Scope::Email,
            other => Scope::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, de-duplicated set of requested scopes.
///
/// An absent or blank scope parameter means `default`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeSet(Vec<Scope>);

impl ScopeSet {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut scopes: Vec<Scope> = Vec::new();
        for part in raw.unwrap_or_default().split_whitespace() {
            let scope = Scope::from(part);
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        if scopes.is_empty() {
            scopes.push(Scope::Default);
        }
        Self(scopes)
    }

    pub fn contains(&self, scope: &Scope) -> bool {
        self.0.contains(scope)
    }

    /// Scope names, for the access token `scope` claim.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().map(|s| s.as_str().to_string()).collect()
    }

    /// Every scope is `default` or listed in `allowed`.
    pub fn is_subset_of(&self, allowed: &[String]) -> bool {
        self.0
            .iter()
            .all(|s| *s == Scope::Default || allowed.iter().any(|a| a == s.as_str()))
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self.0.iter().map(Scope::as_str).collect::<Vec<_>>().join(" ");
        f.write_str(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_blank_scope_means_default() {
        assert_eq!(ScopeSet::parse(None).to_vec(), vec!["default"]);
        assert_eq!(ScopeSet::parse(Some("")).to_vec(), vec!["default"]);
        assert_eq!(ScopeSet::parse(Some("   ")).to_vec(), vec!["default"]);
    }

    #[test]
    fn parsing_keeps_order_and_drops_duplicates() {
        let set = ScopeSet::parse(Some("openid  email openid api:read"));
        assert_eq!(set.to_vec(), vec!["openid", "email", "api:read"]);
        assert_eq!(set.to_string(), "openid email api:read");
        assert!(set.contains(&Scope::Email));
        assert!(set.contains(&Scope::Custom("api:read".into())));
    }

    #[test]
    fn subset_check_always_allows_default() {
        let allowed = vec!["openid".to_string(), "email".to_string()];
        assert!(ScopeSet::parse(Some("openid email")).is_subset_of(&allowed));
        assert!(ScopeSet::parse(Some("default openid")).is_subset_of(&allowed));
        assert!(ScopeSet::parse(None).is_subset_of(&[]));
        assert!(!ScopeSet::parse(Some("openid profile")).is_subset_of(&allowed));
    }
}
