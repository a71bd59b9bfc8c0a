//! The chat runtime collaborator.
//!
//! The runtime owns the conversation (launch, status, prior turns). The voice
//! core only hands it a transcript and waits for the text of its answer.

use async_trait::async_trait;

use crate::error::VoiceError;

#[async_trait]
pub trait ChatRuntime: Send + Sync {
    /// Submit the user's transcript and resolve with the runtime's reply.
    async fn reply(&self, text: &str) -> Result<String, VoiceError>;
}
