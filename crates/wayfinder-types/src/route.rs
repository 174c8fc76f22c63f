//! Routes, sessions and the documents derived from them.
//!
//! A [`Route`] is a navigable destination; a [`Session`] is a (synthesized)
//! user interaction that ended on one route. A [`NavigationContext`] pairs
//! the two and is the unit of training data. [`RouteDocument`] and
//! [`RouteScored`] only exist inside a trained engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A navigable destination in the target application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Stable identifier, unique within a navigation context.
    pub id: String,
    /// Hierarchical `/`-delimited path (e.g. `/flights/search`).
    pub path: String,
    /// Short descriptive tags, typically 5-10 per route.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Route {
    pub fn new(id: impl Into<String>, path: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            tags,
        }
    }
}

/// What the user was doing when the session was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    /// The context mimics a typed search query.
    Search,
    /// The context mimics a click or other navigation action.
    Navigation,
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => f.write_str("search"),
            Self::Navigation => f.write_str("navigation"),
        }
    }
}

/// A user interaction associated with exactly one route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// The [`Route::id`] this session ended on.
    pub route_id: String,
    /// Free text: a search utterance or a description of a navigation action.
    pub context: String,
    /// Optional intent classification.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "intention_type")]
    pub intent: Option<IntentType>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        route_id: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            route_id: route_id.into(),
            context: context.into(),
            intent: None,
        }
    }

    /// Builder: attach an intent type.
    pub fn with_intent(mut self, intent: IntentType) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// An immutable pairing of routes and sessions used as one training set.
///
/// There are no mutators. Consumers that need to "use up" sessions work on
/// their own copy of [`sessions()`](Self::sessions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationContext {
    routes: Vec<Route>,
    sessions: Vec<Session>,
}

impl NavigationContext {
    pub fn new(routes: Vec<Route>, sessions: Vec<Session>) -> Self {
        Self { routes, sessions }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Sessions whose `route_id` matches `route_id`, in stored order.
    pub fn sessions_for<'a>(&'a self, route_id: &'a str) -> impl Iterator<Item = &'a Session> + 'a {
        self.sessions.iter().filter(move |s| s.route_id == route_id)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.sessions.is_empty()
    }
}

/// The merged text representation of one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDocument {
    /// The originating [`Route::id`].
    pub id: String,
    /// The originating [`Route::path`].
    pub path: String,
    /// Path segments, tags and filtered session tokens, space-joined.
    pub context: String,
}

impl RouteDocument {
    /// Attach a prediction score.
    pub fn with_score(&self, score: f64) -> RouteScored {
        RouteScored {
            id: self.id.clone(),
            path: self.path.clone(),
            context: self.context.clone(),
            score,
        }
    }
}

/// A route document annotated with a prediction score.
///
/// Produced at prediction time only; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteScored {
    pub id: String,
    pub path: String,
    pub context: String,
    /// Engine-specific confidence; higher is better.
    pub score: f64,
}
