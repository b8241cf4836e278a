//! Registry of available authentication methods.

use std::fmt;
use tracing::debug;

use super::{OfflineAuth, ServerAuth};

/// Builds an auth instance from a user name and password.
pub type AuthConstructor = fn(&str, &str) -> Box<dyn ServerAuth>;

/// A registered authentication method.
#[derive(Clone)]
pub struct AuthType {
    alias: String,
    display_name: String,
    constructor: AuthConstructor,
}

impl AuthType {
    /// Discriminator stored in settings (`offline`, ...).
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn create(&self, user: &str, password: &str) -> Box<dyn ServerAuth> {
        (self.constructor)(user, password)
    }
}

impl fmt::Debug for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthType")
            .field("alias", &self.alias)
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Ordered alias-to-constructor mapping. The first entry is the fallback.
#[derive(Debug, Clone, Default)]
pub struct AuthRegistry {
    types: Vec<AuthType>,
}

impl AuthRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in methods.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(OfflineAuth::ALIAS, OfflineAuth::DISPLAY_NAME, OfflineAuth::boxed);
        registry
    }

    /// Adds a method, replacing any existing one with the same alias.
    pub fn register(
        &mut self,
        alias: impl Into<String>,
        display_name: impl Into<String>,
        constructor: AuthConstructor,
    ) {
        let auth_type = AuthType {
            alias: alias.into(),
            display_name: display_name.into(),
            constructor,
        };
        debug!("Registering auth type {}", auth_type.alias);

        match self.types.iter_mut().find(|t| t.alias == auth_type.alias) {
            Some(existing) => *existing = auth_type,
            None => self.types.push(auth_type),
        }
    }

    pub fn get(&self, alias: &str) -> Option<&AuthType> {
        self.types.iter().find(|t| t.alias == alias)
    }

    /// Looks up an alias, falling back to the first registered method.
    pub fn resolve(&self, alias: &str) -> Option<&AuthType> {
        self.get(alias).or_else(|| self.types.first())
    }

    pub fn types(&self) -> &[AuthType] {
        &self.types
    }

    pub fn create(&self, alias: &str, user: &str, password: &str) -> Option<Box<dyn ServerAuth>> {
        self.get(alias).map(|t| t.create(user, password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Session};

    struct StubAuth(String);

    impl ServerAuth for StubAuth {
        fn alias(&self) -> &'static str {
            "stub"
        }

        fn player_name(&self) -> &str {
            &self.0
        }

        fn login(&self) -> Result<Session, AuthError> {
            Err(AuthError::Rejected("stub".to_string()))
        }
    }

    fn stub(user: &str, _password: &str) -> Box<dyn ServerAuth> {
        Box::new(StubAuth(user.to_string()))
    }

    #[test]
    fn test_defaults_contain_offline() {
        let registry = AuthRegistry::with_defaults();
        let offline = registry.get("offline").unwrap();

        assert_eq!(offline.display_name(), "Offline");
        let auth = registry.create("offline", "Steve", "").unwrap();
        assert_eq!(auth.alias(), "offline");
        assert_eq!(auth.login().unwrap().player_name, "Steve");
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = AuthRegistry::with_defaults();
        registry.register("stub", "Stub", stub);

        assert_eq!(registry.types().len(), 2);
        assert_eq!(registry.resolve("stub").unwrap().alias(), "stub");
        assert_eq!(registry.resolve("nope").unwrap().alias(), "offline");
        assert!(registry.create("nope", "a", "b").is_none());

        let auth = registry.create("stub", "Alex", "pw").unwrap();
        assert_eq!(auth.player_name(), "Alex");
        assert!(matches!(auth.login(), Err(AuthError::Rejected(_))));
    }

    #[test]
    fn test_register_replaces_alias() {
        let mut registry = AuthRegistry::new();
        registry.register("offline", "First", stub);
        registry.register("offline", "Second", OfflineAuth::boxed);

        assert_eq!(registry.types().len(), 1);
        assert_eq!(registry.get("offline").unwrap().to_string(), "Second");
        assert!(AuthRegistry::new().resolve("offline").is_none());
    }
}
