//! Per-user generation settings.

use std::collections::HashMap;

use bot_core::{GenerationSettings, Parameter, SettingsError};
use tokio::sync::Mutex;

use crate::transport::UserId;

#[derive(Debug, Clone)]
struct Session {
    current: GenerationSettings,
    /// Settings of the most recent generation request.
    last: Option<GenerationSettings>,
}

/// Settings every user edits before generating. Users without a session
/// see the defaults.
#[derive(Debug)]
pub struct SessionStore {
    defaults: GenerationSettings,
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    pub fn new(defaults: GenerationSettings) -> Self {
        Self {
            defaults,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self) -> Session {
        Session {
            current: self.defaults.clone(),
            last: None,
        }
    }

    pub async fn current(&self, user: UserId) -> GenerationSettings {
        self.sessions
            .lock()
            .await
            .get(&user)
            .map_or_else(|| self.defaults.clone(), |s| s.current.clone())
    }

    pub async fn last(&self, user: UserId) -> Option<GenerationSettings> {
        self.sessions
            .lock()
            .await
            .get(&user)
            .and_then(|s| s.last.clone())
    }

    /// Validate and apply one parameter. On error the settings are unchanged.
    pub async fn set(
        &self,
        user: UserId,
        param: Parameter,
        value: &str,
    ) -> Result<GenerationSettings, SettingsError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user).or_insert_with(|| self.fresh());
        session.current.set(param, value)?;
        Ok(session.current.clone())
    }

    pub async fn apply_default(&self, user: UserId) -> GenerationSettings {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user).or_insert_with(|| self.fresh());
        session.current = self.defaults.clone();
        session.current.clone()
    }

    /// Restore the last generated settings. `None`, and no change, if the
    /// user never generated.
    pub async fn apply_last(&self, user: UserId) -> Option<GenerationSettings> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&user)?;
        let last = session.last.clone()?;
        session.current = last.clone();
        Some(last)
    }

    /// Record the current settings as the last ones and return them for a
    /// new generation request.
    pub async fn start_generation(&self, user: UserId) -> GenerationSettings {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.entry(user).or_insert_with(|| self.fresh());
        session.last = Some(session.current.clone());
        session.current.clone()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    const USER: UserId = UserId(42);

    #[tokio::test]
    async fn last_settings_follow_generation() -> Result<(), SettingsError> {
        let store = SessionStore::new(GenerationSettings::default());
        assert_eq!(store.apply_last(USER).await, None);

        store.set(USER, Parameter::Steps, "40").await?;
        let started = store.start_generation(USER).await;
        assert_eq!(started.steps, 40);

        store.set(USER, Parameter::Steps, "10").await?;
        store.apply_default(USER).await;
        assert_eq!(store.current(USER).await.steps, 24);

        let restored = store.apply_last(USER).await.expect("last settings");
        assert_eq!(restored.steps, 40);
        assert_eq!(store.current(USER).await, restored);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_values_leave_settings_alone() {
        let store = SessionStore::new(GenerationSettings::default());
        assert!(store.set(USER, Parameter::Size, "huge").await.is_err());
        assert_eq!(store.current(USER).await, GenerationSettings::default());
        assert_eq!(store.last(USER).await, None);
    }
}
