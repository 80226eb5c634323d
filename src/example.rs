//! Example module shipped with the scaffold: a small CRUD resource that
//! exercises validation, persistence and the response envelope.

pub mod entity;
pub mod handlers;

use axum::{routing::get, Router};

use crate::{app::App, module::Module};

pub const PATH: &str = "/api/examples";

fn routes(app: App) -> Router {
    Router::new()
        .route("/", get(handlers::list).post(handlers::create))
        .route("/{id}", get(handlers::show))
        .with_state(app)
}

#[must_use]
pub fn module() -> Module {
    Module::new("examples", PATH, routes).model::<entity::Entity>()
}
