//! In-memory browser sessions
//!
//! Each browser gets a random session id in a cookie. A session holds at most
//! one uploaded image and one download artifact; uploading a new image drops
//! the previous result. Idle sessions expire after the configured TTL and the
//! least recently used session is evicted when the store is full.

use crate::services::{DownloadArtifact, UploadedImage};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Identifier stored in the session cookie
pub type SessionId = Uuid;

/// Per-browser state
#[derive(Debug, Clone)]
pub struct Session {
    /// Current validated upload
    pub upload: Option<Arc<UploadedImage>>,
    /// Result of the last successful removal for `upload`
    pub result: Option<Arc<DownloadArtifact>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last request time
    pub last_seen: DateTime<Utc>,
}

impl Session {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            upload: None,
            result: None,
            created_at: now,
            last_seen: now,
        }
    }
}

/// Thread-safe session store
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    ttl: ChronoDuration,
    max_sessions: usize,
}

impl SessionStore {
    /// Create a store with an idle timeout and a session cap
    #[must_use]
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::weeks(52 * 100)),
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        // The map stays consistent even if a holder panicked
        self.sessions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Look up a live session, refreshing its access time
    ///
    /// Returns `None` when the id is unknown or expired, so the caller starts
    /// a fresh session.
    pub fn touch(&self, id: Option<SessionId>) -> Option<(SessionId, Session)> {
        self.touch_at(id, Utc::now())
    }

    fn touch_at(&self, id: Option<SessionId>, now: DateTime<Utc>) -> Option<(SessionId, Session)> {
        let id = id?;
        let mut sessions = self.lock();
        Self::evict_expired(&mut sessions, now, self.ttl);
        let session = sessions.get_mut(&id)?;
        session.last_seen = now;
        Some((id, session.clone()))
    }

    /// Return the caller's session, creating one when missing or expired
    pub fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, Session) {
        self.get_or_create_at(id, Utc::now())
    }

    fn get_or_create_at(&self, id: Option<SessionId>, now: DateTime<Utc>) -> (SessionId, Session) {
        if let Some(found) = self.touch_at(id, now) {
            return found;
        }

        let mut sessions = self.lock();
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_seen)
                .map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&oldest);
            debug!(session = %oldest, "Evicted least recently used session");
        }

        let id = Uuid::new_v4();
        let session = Session::new(now);
        sessions.insert(id, session.clone());
        debug!(session = %id, live = sessions.len(), "Created session");
        (id, session)
    }

    /// Store a new upload, clearing any previous result
    pub fn set_upload(&self, id: SessionId, upload: UploadedImage) {
        self.update(id, |session| {
            session.upload = Some(Arc::new(upload));
            session.result = None;
        });
    }

    /// Store the download artifact produced from `source`
    ///
    /// The artifact is dropped when the session's upload is no longer
    /// `source`, i.e. a new image was uploaded or the session was reset
    /// while the removal ran. Returns whether the artifact was stored.
    pub fn set_result_for(
        &self,
        id: SessionId,
        source: &Arc<UploadedImage>,
        artifact: DownloadArtifact,
    ) -> bool {
        let mut stored = false;
        self.update(id, |session| {
            if session
                .upload
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, source))
            {
                session.result = Some(Arc::new(artifact));
                stored = true;
            }
        });
        if !stored {
            debug!(session = %id, "Discarded result for a superseded upload");
        }
        stored
    }

    /// Clear upload and result
    pub fn clear(&self, id: SessionId) {
        self.update(id, |session| {
            session.upload = None;
            session.result = None;
        });
    }

    /// Current download artifact for a session
    #[must_use]
    pub fn result(&self, id: SessionId) -> Option<Arc<DownloadArtifact>> {
        self.lock().get(&id).and_then(|session| session.result.clone())
    }

    /// Number of sessions currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no sessions are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Apply a change to a live session
    ///
    /// Sessions evicted in the meantime are not brought back; the write is
    /// dropped so the cap and expiry stay with `get_or_create`.
    fn update(&self, id: SessionId, apply: impl FnOnce(&mut Session)) {
        let mut sessions = self.lock();
        let Some(session) = sessions.get_mut(&id) else {
            debug!(session = %id, "Dropped write to an evicted session");
            return;
        };
        apply(session);
        session.last_seen = Utc::now();
    }

    fn evict_expired(
        sessions: &mut HashMap<SessionId, Session>,
        now: DateTime<Utc>,
        ttl: ChronoDuration,
    ) {
        let before = sessions.len();
        sessions.retain(|_, session| now.signed_duration_since(session.last_seen) <= ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, "Expired idle sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::services::{OutputFormatHandler, UploadPolicy};
    use image::RgbaImage;

    fn artifact() -> DownloadArtifact {
        OutputFormatHandler::encode_png(&RgbaImage::new(1, 1)).unwrap()
    }

    #[test]
    fn test_create_and_reuse() {
        let store = SessionStore::new(Duration::from_secs(60), 8);
        let (id, session) = store.get_or_create(None);
        assert!(session.upload.is_none());

        let (same, _) = store.get_or_create(Some(id));
        assert_eq!(same, id);
        assert_eq!(store.len(), 1);

        let (fresh, _) = store.get_or_create(Some(Uuid::new_v4()));
        assert_ne!(fresh, id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_idle_sessions_expire() {
        let store = SessionStore::new(Duration::from_secs(60), 8);
        let start = Utc::now();
        let (id, _) = store.get_or_create_at(None, start);

        assert!(store
            .touch_at(Some(id), start + ChronoDuration::seconds(30))
            .is_some());
        assert!(store
            .touch_at(Some(id), start + ChronoDuration::seconds(120))
            .is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_least_recently_used_evicted_at_capacity() {
        let store = SessionStore::new(Duration::from_secs(3600), 2);
        let start = Utc::now();
        let (first, _) = store.get_or_create_at(None, start);
        let (second, _) = store.get_or_create_at(None, start + ChronoDuration::seconds(1));
        store.touch_at(Some(first), start + ChronoDuration::seconds(2));

        let (third, _) = store.get_or_create_at(None, start + ChronoDuration::seconds(3));
        assert_eq!(store.len(), 2);
        assert!(store.touch_at(Some(second), start + ChronoDuration::seconds(4)).is_none());
        assert!(store.touch_at(Some(first), start + ChronoDuration::seconds(4)).is_some());
        assert!(store.touch_at(Some(third), start + ChronoDuration::seconds(4)).is_some());
    }

    fn uploaded(name: &str) -> UploadedImage {
        UploadedImage::from_upload(Some(name), png_bytes(), &UploadPolicy::from_config(&ServerConfig::default())).unwrap()
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(RgbaImage::new(2, 2))
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn current_upload(store: &SessionStore, id: SessionId) -> Arc<UploadedImage> {
        store.get_or_create(Some(id)).1.upload.unwrap()
    }

    #[test]
    fn test_result_and_clear() {
        let store = SessionStore::new(Duration::from_secs(60), 8);
        let (id, _) = store.get_or_create(None);
        store.set_upload(id, uploaded("a.png"));
        let upload = current_upload(&store, id);

        assert!(store.set_result_for(id, &upload, artifact()));
        assert!(store.result(id).is_some());

        store.clear(id);
        assert!(store.result(id).is_none());
        assert!(store.get_or_create(Some(id)).1.upload.is_none());
    }

    #[test]
    fn test_result_for_superseded_upload_is_dropped() {
        let store = SessionStore::new(Duration::from_secs(60), 8);
        let (id, _) = store.get_or_create(None);
        store.set_upload(id, uploaded("first.png"));
        let first = current_upload(&store, id);

        store.set_upload(id, uploaded("second.png"));
        assert!(!store.set_result_for(id, &first, artifact()));
        assert!(store.result(id).is_none());

        store.clear(id);
        assert!(!store.set_result_for(id, &first, artifact()));
        assert!(store.result(id).is_none());
    }

    #[test]
    fn test_writes_do_not_revive_evicted_sessions() {
        let store = SessionStore::new(Duration::from_secs(3600), 1);
        let (evicted, _) = store.get_or_create(None);
        let (kept, _) = store.get_or_create(None);
        assert_ne!(evicted, kept);
        assert_eq!(store.len(), 1);

        store.set_upload(evicted, uploaded("late.png"));
        assert_eq!(store.len(), 1);
        assert!(store.touch(Some(evicted)).is_none());
        assert!(store.touch(Some(kept)).is_some());
    }
}
