//! Conversation continuation: follow-up turns against a cached generation

use super::{Gateway, GatewayError, StreamEvent, MAX_TURNS, TURN_CAP_REPLY};
use crate::llm::{ProviderKind, Turn};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// End-user view of a conversation: the priming turns and the first
/// synthetic exchange are stripped.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub history: Vec<Turn>,
}

impl Gateway {
    /// Serve one follow-up turn as an event stream.
    ///
    /// Terminates with `Done` on every path. A capped conversation gets the
    /// fixed reply as ordinary content; an unknown id or upstream failure
    /// surfaces as an `Error` event before the sentinel.
    pub fn continue_chat(
        &self,
        conversation_id: String,
        user_text: String,
        provider: ProviderKind,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let gateway = self.clone();

        tokio::spawn(async move {
            if let Err(e) = gateway
                .run_continue(&tx, conversation_id, user_text, provider)
                .await
            {
                tracing::error!(error = %e, "Continuation failed");
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        ReceiverStream::new(rx)
    }

    async fn run_continue(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        conversation_id: String,
        user_text: String,
        provider: ProviderKind,
    ) -> Result<(), GatewayError> {
        let Some(entry) = self.db().find_by_conversation_id(&conversation_id)? else {
            return Err(GatewayError::ConversationNotFound);
        };

        // Soft cap: no provider call, no history mutation, normal completion.
        if entry.history.len() >= MAX_TURNS {
            tracing::info!(conversation_id = %conversation_id, turns = entry.history.len(), "Turn cap reached");
            let _ = tx.send(StreamEvent::Chunk(TURN_CAP_REPLY.to_string())).await;
            return Ok(());
        }

        let client = self.client(provider)?;
        let mut messages = entry.history;
        messages.push(Turn::user(user_text.clone()));

        let mut stream = client.stream_chat(&messages).await?;
        let mut assistant_text = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            assistant_text.push_str(&delta);
            if tx.send(StreamEvent::Chunk(delta)).await.is_err() {
                // Client disconnected mid-reply; the pair is only ever
                // persisted once the full assistant text is known.
                return Ok(());
            }
            sleep(self.pacing().live_delay).await;
        }

        // Single atomic append of the (user, assistant) pair against the
        // currently stored history.
        let stored_turns = self
            .db()
            .append_turns(&conversation_id, &user_text, &assistant_text)?;
        tracing::info!(conversation_id = %conversation_id, turns = stored_turns, "Continuation persisted");

        Ok(())
    }

    /// Resolve the visible history for a generation fingerprint.
    pub fn conversation_view(&self, fingerprint: &str) -> Result<ConversationView, GatewayError> {
        let Some(entry) = self.db().find_by_fingerprint(fingerprint)? else {
            return Err(GatewayError::ConversationNotFound);
        };

        let hidden = entry.priming_turns + 1;
        let history = if entry.history.len() > hidden {
            entry.history[hidden..].to_vec()
        } else {
            Vec::new()
        };

        Ok(ConversationView {
            conversation_id: entry.conversation_id,
            history,
        })
    }
}
