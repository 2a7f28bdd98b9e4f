use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::provider::{DialogueKey, ProviderMessage};

pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// Bounds on how many dialogue contexts are retained and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub idle_ttl: Duration,
    pub max_sessions: usize,
}

impl SessionPolicy {
    pub fn new(idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            idle_ttl,
            max_sessions: max_sessions.max(1),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE_TTL, DEFAULT_MAX_SESSIONS)
    }
}

struct DialogueSession {
    history: Vec<ProviderMessage>,
    last_used: Instant,
}

/// Snapshot handed to one reply: the turns the provider should see as context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCheckout {
    pub history: Vec<ProviderMessage>,
    pub created: bool,
}

/// Per-conversation dialogue contexts with idle expiry and an LRU bound.
pub struct SessionRegistry {
    preamble: String,
    policy: SessionPolicy,
    sessions: Mutex<HashMap<DialogueKey, DialogueSession>>,
}

impl SessionRegistry {
    pub fn new(preamble: impl Into<String>, policy: SessionPolicy) -> Self {
        Self {
            preamble: preamble.into(),
            policy,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// System instruction shared by every session in this registry.
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Returns the session for `key`, creating it from `seed` on first use.
    ///
    /// Expired sessions are evicted before the lookup, so a conversation that
    /// idled past the TTL starts over with a fresh context.
    pub async fn checkout<F>(&self, key: &DialogueKey, seed: F) -> SessionCheckout
    where
        F: FnOnce() -> Vec<ProviderMessage>,
    {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        self.evict_idle(&mut sessions, now);

        if !sessions.contains_key(key) {
            Self::evict_least_recent(&mut sessions, self.policy.max_sessions.saturating_sub(1));
        }

        let mut created = false;
        let session = sessions.entry(key.clone()).or_insert_with(|| {
            created = true;
            DialogueSession {
                history: seed(),
                last_used: now,
            }
        });
        session.last_used = now;

        if created {
            tracing::info!(
                dialogue_key = %key,
                seeded_turns = session.history.len(),
                "created dialogue session"
            );
        }

        SessionCheckout {
            history: session.history.clone(),
            created,
        }
    }

    /// Appends one completed exchange to the session, if it still exists.
    pub async fn record_turn(
        &self,
        key: &DialogueKey,
        prompt: impl Into<String>,
        reply: impl Into<String>,
    ) {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(key) else {
            tracing::debug!(dialogue_key = %key, "session evicted before turn was recorded");
            return;
        };

        session.history.push(ProviderMessage::user(prompt));
        session.history.push(ProviderMessage::assistant(reply));
        session.last_used = Instant::now();
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn contains(&self, key: &DialogueKey) -> bool {
        self.sessions.lock().await.contains_key(key)
    }

    fn evict_idle(&self, sessions: &mut HashMap<DialogueKey, DialogueSession>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, session| now.duration_since(session.last_used) < self.policy.idle_ttl);

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle dialogue sessions");
        }
    }

    fn evict_least_recent(sessions: &mut HashMap<DialogueKey, DialogueSession>, keep: usize) {
        while sessions.len() > keep {
            let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };

            sessions.remove(&oldest);
            tracing::debug!(dialogue_key = %oldest, "evicted least recently used dialogue session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(idle_ttl: Duration, max_sessions: usize) -> SessionRegistry {
        SessionRegistry::new("be brief", SessionPolicy::new(idle_ttl, max_sessions))
    }

    #[tokio::test(start_paused = true)]
    async fn checkout_reuses_existing_session_and_ignores_later_seed() {
        let registry = registry(Duration::from_secs(60), 4);
        let key = DialogueKey::new("c1");

        let first = registry
            .checkout(&key, || vec![ProviderMessage::assistant("Hello!")])
            .await;
        assert!(first.created);
        assert_eq!(first.history, vec![ProviderMessage::assistant("Hello!")]);

        registry.record_turn(&key, "hi", "hey there").await;

        let second = registry
            .checkout(&key, || vec![ProviderMessage::user("should not be used")])
            .await;
        assert!(!second.created);
        assert_eq!(
            second.history,
            vec![
                ProviderMessage::assistant("Hello!"),
                ProviderMessage::user("hi"),
                ProviderMessage::assistant("hey there"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire_on_next_checkout() {
        let registry = registry(Duration::from_secs(60), 4);
        let stale = DialogueKey::new("c1");
        let fresh = DialogueKey::new("c2");

        registry.checkout(&stale, Vec::new).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        registry.checkout(&fresh, Vec::new).await;

        assert!(!registry.contains(&stale).await);
        assert!(registry.contains(&fresh).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_bound_evicts_least_recently_used() {
        let registry = registry(Duration::from_secs(3600), 2);
        let first = DialogueKey::new("c1");
        let second = DialogueKey::new("c2");
        let third = DialogueKey::new("c3");

        registry.checkout(&first, Vec::new).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        registry.checkout(&second, Vec::new).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        // Touching the first session makes the second one the eviction candidate.
        registry.checkout(&first, Vec::new).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        registry.checkout(&third, Vec::new).await;

        assert_eq!(registry.len().await, 2);
        assert!(registry.contains(&first).await);
        assert!(!registry.contains(&second).await);
        assert!(registry.contains(&third).await);
    }

    #[tokio::test]
    async fn recording_into_an_evicted_session_is_a_noop() {
        let registry = registry(Duration::from_secs(60), 1);
        registry
            .record_turn(&DialogueKey::new("missing"), "hi", "hello")
            .await;
        assert!(registry.is_empty().await);
    }

    #[test]
    fn policy_keeps_at_least_one_session() {
        assert_eq!(SessionPolicy::new(Duration::ZERO, 0).max_sessions, 1);
    }
}
