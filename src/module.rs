use std::fmt;

use axum::Router;
use sea_orm::EntityTrait;

use crate::{app::App, database::ModelRegistration};

/// A feature area of a service: its routes plus the models they persist.
///
/// Routes are mounted under `path`; a path of `/` merges them into the root.
#[derive(Clone)]
pub struct Module {
    pub name: &'static str,
    pub path: &'static str,
    pub routes: fn(App) -> Router,
    pub models: Vec<ModelRegistration>,
}

impl Module {
    #[must_use]
    pub const fn new(name: &'static str, path: &'static str, routes: fn(App) -> Router) -> Self {
        Self {
            name,
            path,
            routes,
            models: Vec::new(),
        }
    }

    /// Registers an entity so its table is created on sync.
    #[must_use]
    pub fn model<E: EntityTrait>(mut self) -> Self {
        self.models.push(ModelRegistration::of::<E>());
        self
    }

    pub(crate) fn is_root(&self) -> bool {
        self.path.is_empty() || self.path == "/"
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}
