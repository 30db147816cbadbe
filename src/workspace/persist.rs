//! Layout persistence: reopen a workspace the way it was left.
//!
//! A layout is a JSON snapshot of the open views (kind, scope,
//! presentation state) plus the session's binary identity. Restoring
//! against a binary whose content hash differs is refused; analysis
//! results are deliberately not persisted, since they are re-derived by
//! re-running analysis.

use super::Workspace;
use crate::error::{Result, SessionError};
use crate::session::BinaryIdentity;
use crate::views::{Presentation, ViewId, ViewKind, ViewScope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One persisted view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedView {
    pub kind: ViewKind,
    pub scope: ViewScope,
    pub presentation: Presentation,
}

/// A persisted workspace layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceLayout {
    pub saved_at: DateTime<Utc>,
    pub binary: BinaryIdentity,
    pub views: Vec<SavedView>,
}

impl WorkspaceLayout {
    /// Snapshot the currently open views and the session identity.
    pub fn capture(workspace: &Workspace) -> WorkspaceLayout {
        let views = workspace
            .views()
            .views()
            .into_iter()
            .map(|(_, snapshot)| SavedView {
                kind: snapshot.kind,
                scope: snapshot.scope,
                presentation: snapshot.presentation,
            })
            .collect();
        WorkspaceLayout {
            saved_at: Utc::now(),
            binary: workspace.session().identity().clone(),
            views,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), views = self.views.len(), "layout saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<WorkspaceLayout> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Reopen the saved views against `workspace`. Fails with
    /// `LayoutMismatch` when the layout was saved against a binary with
    /// a different content hash.
    pub fn restore(&self, workspace: &Workspace) -> Result<Vec<ViewId>> {
        let identity = workspace.session().identity();
        if self.binary.sha256 != identity.sha256 {
            return Err(SessionError::LayoutMismatch {
                saved: self.binary.sha256.clone(),
                loaded: identity.sha256.clone(),
            });
        }
        let mut opened = Vec::with_capacity(self.views.len());
        for saved in &self.views {
            let id = workspace.views().open(saved.kind, saved.scope);
            let presentation = saved.presentation.clone();
            workspace
                .views()
                .update_presentation(id, move |p| *p = presentation)?;
            opened.push(id);
        }
        info!(views = opened.len(), "layout restored");
        Ok(opened)
    }
}
