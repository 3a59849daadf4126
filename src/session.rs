//! Visit sessions and the first-visit survey.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{self, LookupCache};
use crate::clock;
use crate::error::{PortalError, PortalResult};
use crate::models::{NewSession, Session, Survey};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub session: Session,
    /// No survey on record for the user
    pub is_first_time: bool,
}

pub struct SessionManager {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn LookupCache>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<dyn LookupCache>) -> Self {
        Self { storage, cache }
    }

    /// Open a session for an already-resolved user.
    pub async fn open(&self, visit: NewSession) -> PortalResult<OpenedSession> {
        let session = self.storage.create_session(&visit, clock::now()).await?;

        self.cache
            .set(
                &cache::session_key(session.id),
                &session.user_id.to_string(),
                cache::SESSION_TTL,
            )
            .await?;

        let is_first_time = self.is_first_time(session.user_id).await?;
        debug!(
            "Opened session {} for user {} (first time: {})",
            session.id, session.user_id, is_first_time
        );

        Ok(OpenedSession {
            session,
            is_first_time,
        })
    }

    /// Close a session. Unknown ids are not an error; the return value says
    /// whether the session exists. Closing twice keeps the first `ended_at`.
    pub async fn close(&self, session_id: i64) -> PortalResult<bool> {
        let closed = self.storage.end_session(session_id, clock::now()).await?;
        if !closed {
            warn!("Ignoring end of unknown session {}", session_id);
        }
        Ok(closed)
    }

    pub async fn is_first_time(&self, user_id: i64) -> PortalResult<bool> {
        Ok(!self.storage.has_survey(user_id).await?)
    }

    /// Owning user of a session, cache first.
    pub async fn owner_of(&self, session_id: i64) -> PortalResult<Option<i64>> {
        let key = cache::session_key(session_id);

        if let Some(cached) = self.cache.get(&key).await? {
            if let Ok(user_id) = cached.parse::<i64>() {
                return Ok(Some(user_id));
            }
            warn!("Ignoring unparseable cache entry {}: {:?}", key, cached);
        }

        let Some(session) = self.storage.get_session(session_id).await? else {
            return Ok(None);
        };

        self.cache
            .set(&key, &session.user_id.to_string(), cache::SESSION_TTL)
            .await?;

        Ok(Some(session.user_id))
    }

    /// Record the one survey a user may ever submit.
    pub async fn submit_survey(&self, session_id: i64, answers: Value) -> PortalResult<Survey> {
        let user_id = self
            .owner_of(session_id)
            .await?
            .ok_or(PortalError::NotFound("session"))?;

        match self
            .storage
            .create_survey(user_id, session_id, &answers, clock::now())
            .await
        {
            Ok(survey) => {
                info!("Survey {} submitted by user {}", survey.id, user_id);
                Ok(survey)
            }
            Err(StorageError::Conflict) => Err(PortalError::AlreadySubmitted),
            Err(StorageError::Other(e)) => Err(PortalError::DependencyUnavailable(e)),
        }
    }
}
