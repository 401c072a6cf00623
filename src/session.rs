//! Conversation session: ordered, capped chat history mediated through the
//! inference gateway.

use crate::gateway::{ChatReply, ChatRole, ChatTurn, Gateway, GatewayError};
use crate::models::{Message, Sender, UserProfile};
use crate::prompts::{ASSISTANT_SYSTEM_PROMPT, PERSONALIZATION_PROMPT, WELCOME_MESSAGES};
use crate::store::{ProfileStore, CHAT_HISTORY_CAP};
use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

/// Number of prior messages sent along with a new user turn
pub const CONTEXT_WINDOW: usize = 10;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("No pending user message to reply to")]
    NoPendingTurn,
    #[error("Assistant reply failed: {0}")]
    Gateway(#[from] GatewayError),
}

/// Anything that can turn a list of chat turns into a reply
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete_chat(&self, messages: &[ChatTurn]) -> Result<ChatReply, GatewayError>;
}

#[async_trait]
impl ChatProvider for Gateway {
    async fn complete_chat(&self, messages: &[ChatTurn]) -> Result<ChatReply, GatewayError> {
        Gateway::complete_chat(self, messages).await
    }
}

pub struct ConversationSession {
    store: ProfileStore,
    provider: Arc<dyn ChatProvider>,
    profile: Option<UserProfile>,
    history: Vec<Message>,
}

impl ConversationSession {
    /// Restores persisted history and the profile, then adds the welcome
    /// messages. Welcome messages count toward the history cap.
    pub fn open(store: ProfileStore, provider: Arc<dyn ChatProvider>) -> Result<Self, String> {
        let profile = store.load_profile()?;
        let restored = store.load_chat_history()?;
        info!(
            "[ConversationSession::open] restored {} messages, profile loaded: {}",
            restored.len(),
            profile.is_some()
        );

        let mut session = Self {
            store,
            provider,
            profile,
            history: Vec::with_capacity(CHAT_HISTORY_CAP + 1),
        };
        // Seeds from earlier sessions are dropped so at most one pair is stored
        for message in restored.into_iter().filter(|m| !is_welcome(m)) {
            session.push(message);
        }
        for text in WELCOME_MESSAGES {
            session.push(Message::new(Sender::Assistant, text));
        }
        Ok(session)
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// Re-reads the profile after an edit elsewhere in the app
    pub fn reload_profile(&mut self) -> Result<(), String> {
        self.profile = self.store.load_profile()?;
        Ok(())
    }

    fn push(&mut self, message: Message) {
        self.history.push(message);
        if self.history.len() > CHAT_HISTORY_CAP {
            let excess = self.history.len() - CHAT_HISTORY_CAP;
            self.history.drain(..excess);
        }
    }

    /// Appends a user message. Blank text is ignored; returns whether a
    /// message was added.
    pub fn append_user_turn(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.push(Message::new(Sender::User, text));
        true
    }

    /// Asks the provider to answer the trailing user message.
    ///
    /// On success the reply is appended, history is persisted and the reply is
    /// returned. On failure history is left untouched.
    pub async fn request_assistant_reply(&mut self) -> Result<Message, AssistantError> {
        let turns = self.build_request()?;

        let reply = self.provider.complete_chat(&turns).await.map_err(|e| {
            warn!("[request_assistant_reply] {}", e);
            AssistantError::Gateway(e)
        })?;

        if reply.simulated {
            info!("[request_assistant_reply] using simulated reply");
        }

        let message = Message::new(Sender::Assistant, reply.text);
        self.push(message.clone());

        if let Err(e) = self.persist() {
            error!("[request_assistant_reply] Failed to save chat history: {}", e);
        }

        Ok(message)
    }

    /// System instruction, the last `CONTEXT_WINDOW` prior messages and the
    /// pending user turn
    fn build_request(&self) -> Result<Vec<ChatTurn>, AssistantError> {
        let (pending, prior) = match self.history.split_last() {
            Some((last, prior)) if last.sender == Sender::User => (last, prior),
            _ => return Err(AssistantError::NoPendingTurn),
        };

        let window_start = prior.len().saturating_sub(CONTEXT_WINDOW);
        let mut turns = Vec::with_capacity(CONTEXT_WINDOW + 2);
        turns.push(ChatTurn::new(
            ChatRole::System,
            build_system_prompt(self.profile.as_ref()),
        ));
        turns.extend(prior[window_start..].iter().map(|m| {
            let role = match m.sender {
                Sender::User => ChatRole::User,
                Sender::Assistant => ChatRole::Assistant,
            };
            ChatTurn::new(role, m.text.clone())
        }));
        turns.push(ChatTurn::new(ChatRole::User, pending.text.clone()));
        Ok(turns)
    }

    /// Writes the last `CHAT_HISTORY_CAP` messages to the store
    pub fn persist(&self) -> Result<(), String> {
        self.store.save_chat_history(&self.history)
    }

    /// Forgets every message, in memory and on disk
    pub fn clear(&mut self) -> Result<(), String> {
        self.history.clear();
        self.store.clear_chat_history()
    }
}

fn is_welcome(message: &Message) -> bool {
    message.sender == Sender::Assistant && WELCOME_MESSAGES.contains(&message.text.as_str())
}

/// System instruction enriched with whatever the profile tells us
pub fn build_system_prompt(profile: Option<&UserProfile>) -> String {
    let mut prompt = String::from(ASSISTANT_SYSTEM_PROMPT);

    if let Some(profile) = profile {
        let name = if profile.name.trim().is_empty() {
            "User"
        } else {
            profile.name.trim()
        };
        prompt.push_str(&format!(" User profile: Name: {}.", name));

        let mut preferences: Vec<String> = Vec::new();
        if let Some(style) = &profile.style {
            preferences.push(format!("style: {}", style));
        }
        if let Some(body_type) = &profile.body_type {
            preferences.push(format!("bodyType: {}", body_type));
        }
        if let Some(height) = profile.height {
            preferences.push(format!("height: {} cm", height));
        }
        if let Some(weight) = profile.weight {
            preferences.push(format!("weight: {} kg", weight));
        }
        if !profile.favorite_colors.is_empty() {
            let colors: Vec<&str> = profile.favorite_colors.iter().map(String::as_str).collect();
            preferences.push(format!("favoriteColors: {}", colors.join(", ")));
        }
        if !preferences.is_empty() {
            prompt.push_str(&format!(" User preferences: {}.", preferences.join(", ")));
        }
    }

    prompt.push(' ');
    prompt.push_str(PERSONALIZATION_PROMPT);

    if let Some(profile) = profile {
        prompt.push_str(&format!(
            " Reply in the user's language ({}).",
            profile.preferences.language
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies "reply N" by default, or pops scripted outcomes first
    #[derive(Default)]
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ChatReply, GatewayError>>>,
        requests: Mutex<Vec<Vec<ChatTurn>>>,
    }

    impl ScriptedProvider {
        fn failing_once(error: GatewayError) -> Self {
            let provider = Self::default();
            provider.script.lock().unwrap().push_back(Err(error));
            provider
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> Vec<ChatTurn> {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete_chat(&self, messages: &[ChatTurn]) -> Result<ChatReply, GatewayError> {
            let n = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(messages.to_vec());
                requests.len()
            };
            if let Some(outcome) = self.script.lock().unwrap().pop_front() {
                return outcome;
            }
            Ok(ChatReply {
                text: format!("reply {}", n),
                model: "test-model".to_string(),
                simulated: false,
            })
        }
    }

    fn open_session(provider: Arc<ScriptedProvider>) -> (tempfile::TempDir, ConversationSession) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        let session = ConversationSession::open(store, provider).unwrap();
        (dir, session)
    }

    async fn run_turns(session: &mut ConversationSession, turns: usize) {
        for i in 1..=turns {
            assert!(session.append_user_turn(&format!("question {}", i)));
            session.request_assistant_reply().await.unwrap();
        }
    }

    #[test]
    fn test_session_starts_with_welcome_messages() {
        let (_dir, session) = open_session(Arc::new(ScriptedProvider::default()));
        assert_eq!(session.history().len(), 2);
        assert!(session.history().iter().all(|m| m.sender == Sender::Assistant));
    }

    #[test]
    fn test_blank_user_turn_is_noop() {
        let (_dir, mut session) = open_session(Arc::new(ScriptedProvider::default()));
        let before = session.history().to_vec();

        assert!(!session.append_user_turn(""));
        assert!(!session.append_user_turn("   \n\t"));
        assert_eq!(session.history(), before.as_slice());
    }

    #[test]
    fn test_user_turn_is_trimmed() {
        let (_dir, mut session) = open_session(Arc::new(ScriptedProvider::default()));
        assert!(session.append_user_turn("  what should I wear?  "));
        let last = session.history().last().unwrap();
        assert_eq!(last.sender, Sender::User);
        assert_eq!(last.text, "what should I wear?");
    }

    #[tokio::test]
    async fn test_history_is_capped_and_ordered() {
        let provider = Arc::new(ScriptedProvider::default());
        let (_dir, mut session) = open_session(provider);
        run_turns(&mut session, 30).await;

        let history = session.history();
        assert_eq!(history.len(), CHAT_HISTORY_CAP);

        // last 25 turns, alternating user/assistant in submission order
        for (k, pair) in history.chunks(2).enumerate() {
            let turn = 6 + k;
            assert_eq!(pair[0].sender, Sender::User);
            assert_eq!(pair[0].text, format!("question {}", turn));
            assert_eq!(pair[1].sender, Sender::Assistant);
            assert_eq!(pair[1].text, format!("reply {}", turn));
        }
    }

    #[tokio::test]
    async fn test_welcome_plus_49_turns_persists_last_50() {
        let provider = Arc::new(ScriptedProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        let mut session = ConversationSession::open(store.clone(), provider).unwrap();

        run_turns(&mut session, 49).await;
        session.persist().unwrap();

        let stored = store.load_chat_history().unwrap();
        assert_eq!(stored.len(), 50);
        // 100 messages total; the window starts at the 25th user turn
        assert_eq!(stored[0].sender, Sender::User);
        assert_eq!(stored[0].text, "question 25");
        assert_eq!(stored[49].sender, Sender::Assistant);
        assert!(stored
            .windows(2)
            .all(|w| w[0].sender != w[1].sender));
    }

    #[tokio::test]
    async fn test_failed_reply_leaves_history_untouched() {
        let provider = Arc::new(ScriptedProvider::failing_once(GatewayError::Timeout(
            std::time::Duration::from_secs(30),
        )));
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        let mut session = ConversationSession::open(store.clone(), provider.clone()).unwrap();

        session.append_user_turn("hello");
        let len_before = session.history().len();

        let err = session.request_assistant_reply().await.unwrap_err();
        assert!(matches!(err, AssistantError::Gateway(GatewayError::Timeout(_))));
        assert_eq!(session.history().len(), len_before);
        assert_eq!(session.history().last().unwrap().sender, Sender::User);
        assert!(store.load_chat_history().unwrap().is_empty());

        // the same pending turn can be retried
        let reply = session.request_assistant_reply().await.unwrap();
        assert_eq!(reply.text, "reply 2");
        assert_eq!(provider.calls(), 2);
        assert_eq!(store.load_chat_history().unwrap().len(), len_before + 1);
    }

    #[tokio::test]
    async fn test_reply_requires_pending_user_turn() {
        let provider = Arc::new(ScriptedProvider::default());
        let (_dir, mut session) = open_session(provider.clone());

        let err = session.request_assistant_reply().await.unwrap_err();
        assert!(matches!(err, AssistantError::NoPendingTurn));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_request_uses_profile_and_context_window() {
        let provider = Arc::new(ScriptedProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        let profile = UserProfile {
            name: "Ayse".to_string(),
            style: Some("minimal".to_string()),
            body_type: Some("pear".to_string()),
            favorite_colors: ["navy".to_string(), "beige".to_string()].into(),
            ..Default::default()
        };
        store.save_profile(&profile).unwrap();

        let mut session = ConversationSession::open(store, provider.clone()).unwrap();
        run_turns(&mut session, 8).await;
        session.append_user_turn("final question");
        session.request_assistant_reply().await.unwrap();

        let request = provider.last_request();
        assert_eq!(request.len(), 1 + CONTEXT_WINDOW + 1);
        assert_eq!(request[0].role, ChatRole::System);
        assert!(request[0].content.contains("Name: Ayse"));
        assert!(request[0].content.contains("style: minimal"));
        assert!(request[0].content.contains("favoriteColors: beige, navy"));
        assert_eq!(request[CONTEXT_WINDOW].content, "reply 8");
        assert_eq!(request[CONTEXT_WINDOW + 1].role, ChatRole::User);
        assert_eq!(request[CONTEXT_WINDOW + 1].content, "final question");
    }

    #[tokio::test]
    async fn test_restored_history_precedes_welcome() {
        let provider = Arc::new(ScriptedProvider::default());
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        store
            .save_chat_history(&[
                Message::new(Sender::User, "old question"),
                Message::new(Sender::Assistant, "old answer"),
            ])
            .unwrap();

        let mut session = ConversationSession::open(store.clone(), provider).unwrap();
        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[0].text, "old question");

        session.clear().unwrap();
        assert!(session.history().is_empty());
        assert!(store.load_chat_history().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopening_keeps_a_single_welcome_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();

        for i in 1..=5 {
            let provider = Arc::new(ScriptedProvider::default());
            let mut session = ConversationSession::open(store.clone(), provider).unwrap();
            assert!(session.append_user_turn(&format!("question {}", i)));
            session.request_assistant_reply().await.unwrap();
        }

        let stored = store.load_chat_history().unwrap();
        let welcome = stored.iter().filter(|m| is_welcome(m)).count();
        assert_eq!(welcome, WELCOME_MESSAGES.len());
        assert_eq!(stored.len(), 5 * 2 + WELCOME_MESSAGES.len());

        let session =
            ConversationSession::open(store, Arc::new(ScriptedProvider::default())).unwrap();
        let history = session.history();
        assert_eq!(history[0].text, "question 1");
        assert!(history[..10].iter().all(|m| !is_welcome(m)));
        assert!(history[10..].iter().all(is_welcome));
    }

    #[test]
    fn test_reload_profile_picks_up_saved_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("chat.db")).unwrap();
        let mut session =
            ConversationSession::open(store.clone(), Arc::new(ScriptedProvider::default()))
                .unwrap();
        assert!(session.profile().is_none());

        store
            .save_profile(&UserProfile {
                name: "Deniz".to_string(),
                ..Default::default()
            })
            .unwrap();
        session.reload_profile().unwrap();
        assert_eq!(session.profile().map(|p| p.name.as_str()), Some("Deniz"));
    }

    #[test]
    fn test_system_prompt_without_profile() {
        let prompt = build_system_prompt(None);
        assert!(prompt.starts_with(ASSISTANT_SYSTEM_PROMPT));
        assert!(prompt.ends_with(PERSONALIZATION_PROMPT));
        assert!(!prompt.contains("User profile"));
    }
}
