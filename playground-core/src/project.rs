//! Saved snippets and the identity gate in front of them.
//!
//! The store itself is an external collaborator; [`ProjectStore`] is the
//! narrow interface the playground needs, and [`InMemoryProjectStore`] backs
//! the tests. Store failures are opaque: they are forwarded to the
//! caller without interpretation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock as StdRwLock;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::language::{self, LanguageId};

pub type ProjectId = Uuid;

/// A signed-in user as seen by the playground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            id: id.into(),
            display_name,
        }
    }

    /// Name shown to other room participants.
    pub fn participant_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Anonymous")
    }
}

/// Identity provider.
pub trait Identity: Send + Sync {
    fn current_user(&self) -> Option<User>;

    fn sign_out(&self);
}

/// Identity fixed at construction, until signed out.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    user: StdRwLock<Option<User>>,
}

impl StaticIdentity {
    pub fn signed_in(user: User) -> Self {
        Self {
            user: StdRwLock::new(Some(user)),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl Identity for StaticIdentity {
    fn current_user(&self) -> Option<User> {
        self.user.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn sign_out(&self) {
        *self.user.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Data sent to the store on save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub owner_id: String,
    pub name: String,
    pub language: LanguageId,
    pub source: String,
    /// Present when updating an existing project.
    pub project_id: Option<ProjectId>,
}

/// A stored project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: String,
    pub name: String,
    pub language: LanguageId,
    pub source: String,
    /// Seconds since epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub name: String,
    pub language: LanguageId,
    pub updated_at: u64,
}

impl From<&Project> for ProjectSummary {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            language: p.language,
            updated_at: p.updated_at,
        }
    }
}

/// Store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    NotFound(ProjectId),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_or_update_project(&self, draft: ProjectDraft) -> Result<ProjectId, StoreError>;

    /// Projects owned by `owner_id`, most recently updated first.
    async fn list_projects(&self, owner_id: &str) -> Result<Vec<ProjectSummary>, StoreError>;

    async fn get_project(&self, project_id: ProjectId) -> Result<Project, StoreError>;

    async fn delete_project(&self, project_id: ProjectId) -> Result<(), StoreError>;
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<ProjectId, (u64, Project)>>,
    /// Write sequence; orders listings when timestamps tie.
    sequence: AtomicU64,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.projects.read().await.len()
    }
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn create_or_update_project(&self, draft: ProjectDraft) -> Result<ProjectId, StoreError> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let now = now_secs();
        let mut projects = self.projects.write().await;

        match draft.project_id {
            Some(id) => {
                let (slot_seq, project) =
                    projects.get_mut(&id).ok_or(StoreError::NotFound(id))?;
                project.name = draft.name;
                project.language = draft.language;
                project.source = draft.source;
                project.updated_at = now;
                *slot_seq = seq;
                log::debug!("Updated project {id}");
                Ok(id)
            }
            None => {
                let id = Uuid::new_v4();
                let project = Project {
                    id,
                    owner_id: draft.owner_id,
                    name: draft.name,
                    language: draft.language,
                    source: draft.source,
                    created_at: now,
                    updated_at: now,
                };
                projects.insert(id, (seq, project));
                log::debug!("Created project {id}");
                Ok(id)
            }
        }
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<ProjectSummary>, StoreError> {
        let projects = self.projects.read().await;
        let mut owned: Vec<&(u64, Project)> = projects
            .values()
            .filter(|(_, p)| p.owner_id == owner_id)
            .collect();
        owned.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(owned.into_iter().map(|(_, p)| ProjectSummary::from(p)).collect())
    }

    async fn get_project(&self, project_id: ProjectId) -> Result<Project, StoreError> {
        self.projects
            .read()
            .await
            .get(&project_id)
            .map(|(_, p)| p.clone())
            .ok_or(StoreError::NotFound(project_id))
    }

    async fn delete_project(&self, project_id: ProjectId) -> Result<(), StoreError> {
        self.projects
            .write()
            .await
            .remove(&project_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(project_id))
    }
}

/// User-facing save/load failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    #[error("Please sign in to save projects")]
    AuthenticationRequired,
    #[error("Please write some code before saving")]
    NoCode,
    #[error("Please enter a project name")]
    NameRequired,
    #[error("Failed to save project: {0}")]
    SaveFailed(StoreError),
    #[error("Failed to load projects: {0}")]
    LoadFailed(StoreError),
    #[error("Failed to delete project: {0}")]
    DeleteFailed(StoreError),
}

/// Project currently open in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenProject {
    pub id: ProjectId,
    pub name: String,
}

/// Editor-side project state plus the save/load workflow.
pub struct ProjectWorkspace<S, I> {
    store: S,
    identity: I,
    current: Option<OpenProject>,
    name: String,
    language: LanguageId,
    source: String,
}

impl<S: ProjectStore, I: Identity> ProjectWorkspace<S, I> {
    pub fn new(store: S, identity: I) -> Self {
        let start = language::default_language();
        Self {
            store,
            identity,
            current: None,
            name: String::new(),
            language: start.id,
            source: start.default_source.to_string(),
        }
    }

    pub fn current_project(&self) -> Option<&OpenProject> {
        self.current.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> LanguageId {
        self.language
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
    }

    pub fn set_language(&mut self, language: LanguageId) {
        self.language = language;
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    fn require_user(&self) -> Result<User, SaveError> {
        self.identity
            .current_user()
            .ok_or(SaveError::AuthenticationRequired)
    }

    /// Save the editor contents; the first save creates the project and
    /// later saves update it in place.
    pub async fn save(&mut self) -> Result<ProjectId, SaveError> {
        let user = self.require_user()?;
        if self.source.is_empty() {
            return Err(SaveError::NoCode);
        }
        if self.name.trim().is_empty() {
            return Err(SaveError::NameRequired);
        }

        let draft = ProjectDraft {
            owner_id: user.id,
            name: self.name.clone(),
            language: self.language,
            source: self.source.clone(),
            project_id: self.current.as_ref().map(|p| p.id),
        };
        let id = self
            .store
            .create_or_update_project(draft)
            .await
            .map_err(|e| {
                log::error!("Saving project '{}' failed: {e}", self.name);
                SaveError::SaveFailed(e)
            })?;

        log::info!("Project '{}' saved as {id}", self.name);
        self.current = Some(OpenProject {
            id,
            name: self.name.clone(),
        });
        Ok(id)
    }

    /// The signed-in user's projects.
    pub async fn list(&self) -> Result<Vec<ProjectSummary>, SaveError> {
        let user = self.require_user()?;
        self.store
            .list_projects(&user.id)
            .await
            .map_err(SaveError::LoadFailed)
    }

    /// Load a project into the editor.
    pub async fn open(&mut self, project_id: ProjectId) -> Result<(), SaveError> {
        self.require_user()?;
        let project = self
            .store
            .get_project(project_id)
            .await
            .map_err(SaveError::LoadFailed)?;
        self.select(project);
        Ok(())
    }

    /// Make `project` the open project.
    pub fn select(&mut self, project: Project) {
        self.current = Some(OpenProject {
            id: project.id,
            name: project.name.clone(),
        });
        self.name = project.name;
        self.language = project.language;
        self.source = project.source;
    }

    pub async fn delete(&mut self, project_id: ProjectId) -> Result<(), SaveError> {
        self.require_user()?;
        self.store.delete_project(project_id).await.map_err(|e| {
            log::error!("Deleting project {project_id} failed: {e}");
            SaveError::DeleteFailed(e)
        })?;
        if self.current.as_ref().is_some_and(|p| p.id == project_id) {
            self.current = None;
        }
        Ok(())
    }
}
