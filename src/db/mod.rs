//! Frame persistence.
//!
//! The pipeline only needs [`FrameStore`]; [`Database`] is the SQLite
//! implementation, which also keeps the task clusters callers choose to save.

pub mod connection;
pub mod helpers;
mod migrations;
pub mod repositories;

use async_trait::async_trait;

use crate::models::Frame;

pub use connection::Database;

/// Read access to captured frames.
#[async_trait]
pub trait FrameStore: Send + Sync {
    /// Every frame of `session_id`, ordered by frame number.
    async fn frames_for_session(&self, session_id: &str) -> anyhow::Result<Vec<Frame>>;
}

#[async_trait]
impl FrameStore for Database {
    async fn frames_for_session(&self, session_id: &str) -> anyhow::Result<Vec<Frame>> {
        self.get_frames_for_session(session_id).await
    }
}
