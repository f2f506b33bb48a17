use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user_id: Uuid,
    pub phone_number: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted sign-in state. Tokens are long-lived; a 401 from the server
/// is the signal to clear and re-authenticate, not a local clock check.
pub struct Session {
    data_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            data: None,
        }
    }

    /// Load session from disk. Returns whether a session was found.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents =
                std::fs::read_to_string(&path).context("Failed to read session file")?;
            let data: SessionData =
                serde_json::from_str(&contents).context("Failed to parse session file")?;
            self.data = Some(data);
            return Ok(true);
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data and remove the file
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Update session with new data
    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    /// Get the bearer token if signed in
    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.data.as_ref().map(|d| d.user_id)
    }

    pub fn is_signed_in(&self) -> bool {
        self.data.is_some()
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> SessionData {
        SessionData {
            token: "tok-123".to_string(),
            user_id: Uuid::new_v4(),
            phone_number: "+15551234567".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let data = sample();

        let mut session = Session::new(dir.path().to_path_buf());
        session.update(data.clone());
        session.save().unwrap();

        let mut restored = Session::new(dir.path().to_path_buf());
        assert!(restored.load().unwrap());
        assert_eq!(restored.token(), Some("tok-123"));
        assert_eq!(restored.user_id(), Some(data.user_id));
    }

    #[test]
    fn test_load_without_file() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(dir.path().to_path_buf());
        assert!(!session.load().unwrap());
        assert!(!session.is_signed_in());
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(sample());
        session.save().unwrap();

        session.clear().unwrap();
        assert!(!session.is_signed_in());

        let mut reloaded = Session::new(dir.path().to_path_buf());
        assert!(!reloaded.load().unwrap());
    }
}
