//! Collaborators the tracker consumes from its host page
//!
//! - [`VisibilityHost`]: installs and removes the page-visibility listener.
//! - [`DurationCatalog`]: nominal duration per video, when known.

use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::types::Platform;

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Host-side registration of the single shared visibility listener.
pub trait VisibilityHost {
    fn install_listener(&mut self);
    fn remove_listener(&mut self);
}

/// Host that only counts registrations; used headless and in tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordingHost {
    pub installs: usize,
    pub removals: usize,
    pub installed: bool,
}

impl VisibilityHost for RecordingHost {
    fn install_listener(&mut self) {
        self.installs += 1;
        self.installed = true;
    }

    fn remove_listener(&mut self) {
        self.removals += 1;
        self.installed = false;
    }
}

/// Per-video nominal durations.
pub trait DurationCatalog: Send + Sync {
    fn duration_of(&self, video_id: &str) -> Option<Duration>;
}

/// Fixed in-memory catalog.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    durations: HashMap<String, Duration>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, video_id: impl Into<String>, duration: Duration) -> Self {
        self.durations.insert(video_id.into(), duration);
        self
    }

    pub fn insert(&mut self, video_id: impl Into<String>, duration: Duration) {
        self.durations.insert(video_id.into(), duration);
    }
}

impl DurationCatalog for StaticCatalog {
    fn duration_of(&self, video_id: &str) -> Option<Duration> {
        self.durations.get(video_id).copied()
    }
}

/// The outbound video a visitor clicked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoRef {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub platform: Option<Platform>,
    /// Duration known to the page itself, used after the catalog
    pub duration: Option<Duration>,
}

impl VideoRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Visitor session fields stamped onto every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: Option<String>,
    pub referrer: String,
    pub user_agent: String,
}

impl SessionInfo {
    /// Anonymous session with a fresh id
    pub fn anonymous() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: None,
            referrer: String::new(),
            user_agent: String::new(),
        }
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_catalog_lookup() {
        let catalog = StaticCatalog::new().with("v1", Duration::from_secs(42));
        assert_eq!(catalog.duration_of("v1"), Some(Duration::from_secs(42)));
        assert_eq!(catalog.duration_of("v2"), None);
    }

    #[test]
    fn test_anonymous_sessions_are_distinct() {
        assert_ne!(SessionInfo::anonymous().session_id, SessionInfo::anonymous().session_id);
    }
}
