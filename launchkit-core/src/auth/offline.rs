//! Offline play: no server round trip, identity derived from the name.

use uuid::Uuid;

use super::{AuthError, ServerAuth, Session};

const MAX_NAME_LEN: usize = 16;

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Clone)]
pub struct OfflineAuth {
    player_name: String,
}

impl OfflineAuth {
    pub const ALIAS: &'static str = "offline";
    pub const DISPLAY_NAME: &'static str = "Offline";

    /// The password is ignored.
    pub fn new(player_name: &str, _password: &str) -> Self {
        Self {
            player_name: player_name.trim().to_string(),
        }
    }

    /// Registry constructor.
    pub fn boxed(player_name: &str, password: &str) -> Box<dyn ServerAuth> {
        Box::new(Self::new(player_name, password))
    }

    /// Stable per-name UUID.
    pub fn player_uuid(player_name: &str) -> Uuid {
        Uuid::new_v3(
            &Uuid::NAMESPACE_OID,
            format!("OfflinePlayer:{}", player_name).as_bytes(),
        )
    }
}

impl ServerAuth for OfflineAuth {
    fn alias(&self) -> &'static str {
        Self::ALIAS
    }

    fn player_name(&self) -> &str {
        &self.player_name
    }

    fn login(&self) -> Result<Session, AuthError> {
        let name = &self.player_name;
        if !is_valid_name(name) {
            return Err(AuthError::InvalidPlayerName(name.clone()));
        }

        let uuid = Self::player_uuid(name);
        Ok(Session {
            player_name: name.clone(),
            access_token: uuid.simple().to_string(),
            uuid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_login_is_stable() {
        let first = OfflineAuth::new("Notch", "").login().unwrap();
        let second = OfflineAuth::new(" Notch ", "ignored").login().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.player_name, "Notch");
        assert_eq!(first.uuid.get_version_num(), 3);
        assert_ne!(first.uuid, OfflineAuth::player_uuid("jeb_"));
    }

    #[test]
    fn test_offline_rejects_bad_names() {
        assert!(OfflineAuth::new("", "").login().is_err());
        assert!(OfflineAuth::new("has space", "").login().is_err());
        assert!(OfflineAuth::new("a_name_that_is_far_too_long", "").login().is_err());
    }
}
