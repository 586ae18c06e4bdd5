//! Generation dispatch: cache-hit replay and cache-miss live generation

use super::{Gateway, GatewayError, StreamEvent, PRIMING_TURNS};
use crate::db::{CacheEntry, UserProfile};
use crate::llm::{ProviderKind, Turn};
use crate::prompt;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

impl Gateway {
    /// Serve one generation request as an event stream.
    ///
    /// The stream always terminates with `Done`; failures surface as a
    /// single `Error` event directly before it. Dropping the returned
    /// stream cancels the work: an unfinished generation is abandoned
    /// without persisting, a finished one is persisted best-effort.
    pub fn generate(
        &self,
        fingerprint: String,
        provider: ProviderKind,
        profile: UserProfile,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let gateway = self.clone();

        tokio::spawn(async move {
            if let Err(e) = gateway.run_generate(&tx, fingerprint, provider, profile).await {
                tracing::error!(error = %e, "Generation failed");
                let _ = tx.send(StreamEvent::Error(e.to_string())).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
        });

        ReceiverStream::new(rx)
    }

    async fn run_generate(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        fingerprint: String,
        provider: ProviderKind,
        profile: UserProfile,
    ) -> Result<(), GatewayError> {
        // Serialize identical fingerprints across the miss window: the
        // second arrival waits here, then finds the first one's entry.
        let lock = self.lock_for(&fingerprint);
        let guard = lock.lock().await;

        if let Some(entry) = self.db().find_by_fingerprint(&fingerprint)? {
            drop(guard);
            tracing::info!(fingerprint = %fingerprint, "Cache hit, replaying");
            self.replay(tx, &entry.final_text).await;
            return Ok(());
        }

        tracing::info!(fingerprint = %fingerprint, provider = provider.as_str(), "Cache miss, generating");
        let client = self.client(provider)?;

        let system = Turn::system(prompt::SYSTEM_PROMPT);
        let user = Turn::user(prompt::daily_prompt(&profile));
        let mut stream = client.stream_chat(&[system.clone(), user.clone()]).await?;

        let mut final_text = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta?;
            final_text.push_str(&delta);
            if tx.send(StreamEvent::Chunk(delta)).await.is_err() {
                // Client disconnected before the generation finished.
                return Ok(());
            }
            sleep(self.pacing().live_delay).await;
        }

        // The work is complete; persist it even if the client has since
        // gone away (the trailing Done send may fail, which is fine).
        let entry = CacheEntry {
            fingerprint,
            conversation_id: new_conversation_id(),
            history: vec![system, user, Turn::assistant(final_text.clone())],
            final_text,
            priming_turns: PRIMING_TURNS,
            created_at: Utc::now(),
        };
        if !self.db().create_if_absent(&entry)? {
            tracing::warn!(fingerprint = %entry.fingerprint, "Entry already present, keeping first writer's");
        }

        Ok(())
    }

    /// Replay a stored result as a simulated stream: fixed-size slices at a
    /// fixed cadence, no provider call, no persistence.
    async fn replay(&self, tx: &mpsc::Sender<StreamEvent>, final_text: &str) {
        let pacing = self.pacing();
        for chunk in chunk_by_chars(final_text, pacing.replay_chunk_chars) {
            if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
                return;
            }
            sleep(pacing.replay_delay).await;
        }
    }
}

/// Split into slices of at most `size` code points, preserving order and
/// never cutting inside a character.
pub(crate) fn chunk_by_chars(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn new_conversation_id() -> String {
    format!("{}_{}", Uuid::new_v4(), Utc::now().format("%Y%m%d%H%M%S"))
}
