//! Lazy loading of questionnaires referenced through form links.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use crate::error::FormError;
use crate::spec::form::Questionnaire;

/// Source of linked questionnaire artifacts.
pub trait LinkLoader {
    fn load(&self, target: &str) -> Result<Questionnaire, FormError>;
}

/// Loads `<root>/<target>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LinkLoader for DirectoryLoader {
    fn load(&self, target: &str) -> Result<Questionnaire, FormError> {
        if target.is_empty() || target.contains(['/', '\\']) || target.starts_with('.') {
            return Err(FormError::LinkLoad {
                target: target.to_string(),
                message: "invalid link target".into(),
            });
        }
        let path = self.root.join(format!("{target}.json"));
        let text = fs::read_to_string(&path).map_err(|source| FormError::Io { path, source })?;
        serde_json::from_str(&text).map_err(FormError::ArtifactParse)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkState {
    InFlight,
    Loaded(Questionnaire),
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Caller must start a fetch and report it through [`LinkCache::complete`].
    Issue,
    /// A fetch for this target has not completed yet.
    InFlight,
    Cached,
}

/// At most one outstanding fetch per link target; results are kept for the session.
#[derive(Debug, Clone, Default)]
pub struct LinkCache {
    entries: BTreeMap<String, LinkState>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `target`. Failed fetches are retried on the next request.
    pub fn request(&mut self, target: &str) -> FetchDecision {
        match self.entries.get(target) {
            Some(LinkState::InFlight) => FetchDecision::InFlight,
            Some(LinkState::Loaded(_)) => FetchDecision::Cached,
            Some(LinkState::Failed(_)) | None => {
                self.entries.insert(target.to_string(), LinkState::InFlight);
                tracing::debug!(link = %target, "fetching linked questionnaire");
                FetchDecision::Issue
            }
        }
    }

    /// Record the result of a fetch issued by [`LinkCache::request`].
    pub fn complete(&mut self, target: &str, result: Result<Questionnaire, FormError>) {
        if !matches!(self.entries.get(target), Some(LinkState::InFlight)) {
            tracing::debug!(link = %target, "ignoring fetch result with no pending request");
            return;
        }
        let state = match result {
            Ok(questionnaire) => LinkState::Loaded(questionnaire),
            Err(err) => {
                tracing::warn!(link = %target, "linked questionnaire failed to load: {}", err);
                LinkState::Failed(err.to_string())
            }
        };
        self.entries.insert(target.to_string(), state);
    }

    pub fn state(&self, target: &str) -> Option<&LinkState> {
        self.entries.get(target)
    }

    pub fn get(&self, target: &str) -> Option<&Questionnaire> {
        match self.entries.get(target) {
            Some(LinkState::Loaded(questionnaire)) => Some(questionnaire),
            _ => None,
        }
    }

    /// Synchronous expand: fetch through `loader` when needed and return the cached state.
    pub fn expand(&mut self, target: &str, loader: &impl LinkLoader) -> Option<&LinkState> {
        if self.request(target) == FetchDecision::Issue {
            let result = loader.load(target);
            self.complete(target, result);
        }
        self.state(target)
    }
}
