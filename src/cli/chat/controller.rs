use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tracing::{debug, error};

use super::busy::BusyFlag;
use super::conversation_state::{ConversationState, Message};
use super::view::{ConversationChange, ConversationView};
use crate::error::{ChatError, Result};
use crate::gemini_client::ChatSession;

/// How a call to [`ChatController::send_message`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Busy or blank input; nothing changed.
    Rejected,
    Completed,
    Failed,
}

/// Drives one round-trip per user message: user turn, placeholder, streamed
/// fragments, and the error bubble if anything goes wrong.
pub struct ChatController {
    conversation: Mutex<ConversationState>,
    busy: BusyFlag,
    session: tokio::sync::Mutex<Option<Box<dyn ChatSession>>>,
    view: Arc<dyn ConversationView>,
}

impl ChatController {
    pub fn new(session: Option<Box<dyn ChatSession>>, view: Arc<dyn ConversationView>) -> Self {
        Self {
            conversation: Mutex::new(ConversationState::new()),
            busy: BusyFlag::new(),
            session: tokio::sync::Mutex::new(session),
            view,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Copy of the transcript for rendering.
    pub fn snapshot(&self) -> ConversationState {
        self.lock_conversation().clone()
    }

    pub async fn send_message(&self, user_input: &str) -> SendOutcome {
        if user_input.trim().is_empty() {
            return SendOutcome::Rejected;
        }

        let view = Arc::clone(&self.view);
        let _busy = match self.busy.try_acquire() {
            Some(guard) => guard.on_release(move || view.busy_changed(false)),
            None => {
                debug!("Rejecting message while a reply is still streaming");
                return SendOutcome::Rejected;
            }
        };
        self.view.busy_changed(true);

        self.update(|state| {
            state.append(Message::user(user_input));
            state.last().cloned().map(ChangeOwned::Appended)
        });
        self.update(|state| {
            state.append(Message::assistant(""));
            state.last().cloned().map(ChangeOwned::Appended)
        });

        match self.stream_reply(user_input).await {
            Ok(()) => {
                debug!("Reply completed");
                SendOutcome::Completed
            }
            Err(e) => {
                error!("Gemini API error: {}", e);
                self.update(|state| {
                    state.replace_last(Message::error());
                    state.last().cloned().map(ChangeOwned::ReplacedLast)
                });
                SendOutcome::Failed
            }
        }
    }

    async fn stream_reply(&self, user_input: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        let session = session.as_mut().ok_or(ChatError::SessionNotInitialized)?;

        let mut stream = session.send_message_stream(user_input).await?;
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            self.update(move |state| {
                state.append_to_last(&fragment);
                Some(ChangeOwned::Extended(fragment))
            });
        }

        Ok(())
    }

    /// Apply `mutate` and tell the view about it while the state is still locked.
    fn update<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ConversationState) -> Option<ChangeOwned>,
    {
        let mut state = self.lock_conversation();
        if let Some(change) = mutate(&mut state) {
            self.view.conversation_changed(change.as_change(), &state);
        }
    }

    fn lock_conversation(&self) -> std::sync::MutexGuard<'_, ConversationState> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

enum ChangeOwned {
    Appended(Message),
    Extended(String),
    ReplacedLast(Message),
}

impl ChangeOwned {
    fn as_change(&self) -> ConversationChange<'_> {
        match self {
            ChangeOwned::Appended(message) => ConversationChange::Appended(message),
            ChangeOwned::Extended(fragment) => ConversationChange::Extended(fragment),
            ChangeOwned::ReplacedLast(message) => ConversationChange::ReplacedLast(message),
        }
    }
}
