//! Script resolution and ownership checks.
//!
//! The supervisor never decides who may run a script on its own. It asks a
//! [`ScriptAccess`] implementation, which in production fronts the script
//! repository and its sharing rules.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use sv_protocol::script_models::ScriptSource;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{SupervisorError, SupervisorResult};

/// Resolves scripts on behalf of an authenticated caller.
#[async_trait]
pub trait ScriptAccess: Send + Sync {
    /// Return the script if `caller` may run it.
    ///
    /// # Errors
    ///
    /// `SupervisorError::AccessDenied` when the script is unknown or not
    /// visible to the caller.
    async fn resolve_script_for_caller(
        &self,
        caller: Uuid,
        script_id: Uuid,
    ) -> SupervisorResult<ScriptSource>;
}

/// In-memory script catalog with owner/share semantics.
///
/// A caller may resolve a script if they own it or it has been shared with
/// them.
#[derive(Default)]
pub struct InMemoryScriptCatalog {
    scripts: RwLock<HashMap<Uuid, ScriptSource>>,
    shares: RwLock<HashSet<(Uuid, Uuid)>>,
}

impl InMemoryScriptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a script.
    pub async fn insert(&self, script: ScriptSource) {
        self.scripts.write().await.insert(script.id, script);
    }

    /// Allow `user_id` to run `script_id`.
    pub async fn share(&self, script_id: Uuid, user_id: Uuid) {
        self.shares.write().await.insert((script_id, user_id));
    }

    /// Withdraw a previous share.
    pub async fn revoke(&self, script_id: Uuid, user_id: Uuid) {
        self.shares.write().await.remove(&(script_id, user_id));
    }
}

#[async_trait]
impl ScriptAccess for InMemoryScriptCatalog {
    async fn resolve_script_for_caller(
        &self,
        caller: Uuid,
        script_id: Uuid,
    ) -> SupervisorResult<ScriptSource> {
        let script = self
            .scripts
            .read()
            .await
            .get(&script_id)
            .cloned()
            .ok_or_else(|| SupervisorError::AccessDenied(format!("script {script_id} not found")))?;

        if script.owner_id == caller || self.shares.read().await.contains(&(script_id, caller)) {
            Ok(script)
        } else {
            Err(SupervisorError::AccessDenied(format!(
                "script {script_id} is not shared with user {caller}"
            )))
        }
    }
}
