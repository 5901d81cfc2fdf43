//! Renderer capability
//!
//! Turning a template+config pair into resource documents is an external
//! concern. The engine treats a render failure as unrecoverable for that
//! attempt; it is recorded as a failure condition and retried through the
//! dispatcher's bounded-retry path like any cluster error.

use async_trait::async_trait;
use stevedore_core::{ResourceDoc, Values};

use crate::error::Result;

/// Renders a release version into its resource document set
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render the documents for one release version
    async fn render(
        &self,
        namespace: &str,
        name: &str,
        version: u32,
        template: &[u8],
        config: &Values,
    ) -> Result<Vec<ResourceDoc>>;
}
