//! Who the store acts for.
//!
//! A configured user id wins. Without one, a guest id is generated once and
//! kept in the configuration so later runs see the same tests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity section of the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySettings {
    /// Explicit user id, e.g. one shared with another installation
    pub user_id: Option<String>,

    /// Generated id used when no user id is configured
    pub guest_id: Option<String>,

    pub display_name: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            user_id: None,
            guest_id: None,
            display_name: "Guest".to_string(),
        }
    }
}

/// Resolved acting user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub is_guest: bool,
}

impl Identity {
    /// Resolve the acting identity, creating a guest id when needed.
    ///
    /// Returns `true` alongside the identity when `settings` was changed and
    /// should be saved.
    pub fn resolve(settings: &mut IdentitySettings) -> (Self, bool) {
        if let Some(user_id) = settings.user_id.as_deref().filter(|id| !id.trim().is_empty()) {
            return (
                Self {
                    user_id: user_id.trim().to_string(),
                    display_name: settings.display_name.clone(),
                    is_guest: false,
                },
                false,
            );
        }

        let mut created = false;
        let guest_id = match settings.guest_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => {
                let id = format!("guest-{}", Uuid::new_v4());
                tracing::info!(guest_id = %id, "Created guest identity");
                settings.guest_id = Some(id.clone());
                created = true;
                id
            }
        };

        (
            Self {
                user_id: guest_id,
                display_name: settings.display_name.clone(),
                is_guest: true,
            },
            created,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_user_wins() {
        let mut settings = IdentitySettings {
            user_id: Some("coach-7".to_string()),
            guest_id: Some("guest-old".to_string()),
            display_name: "Coach".to_string(),
        };
        let (identity, changed) = Identity::resolve(&mut settings);
        assert_eq!(identity.user_id, "coach-7");
        assert!(!identity.is_guest);
        assert!(!changed);
    }

    #[test]
    fn test_guest_id_is_created_once() {
        let mut settings = IdentitySettings::default();

        let (first, changed) = Identity::resolve(&mut settings);
        assert!(changed);
        assert!(first.is_guest);
        assert!(first.user_id.starts_with("guest-"));

        let (second, changed) = Identity::resolve(&mut settings);
        assert!(!changed);
        assert_eq!(second.user_id, first.user_id);
    }
}
