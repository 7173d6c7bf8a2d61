//! CRUD routes for one model, mounted under the caller's chosen prefix.

use crate::handlers::entity::{bulk_create, bulk_delete, bulk_update, create, delete, list, read, update};
use crate::service::Repository;
use axum::{routing::get, routing::post, Router};

/// `GET|POST /`, `POST|PUT|DELETE /bulk`, `GET|PUT|DELETE /:id`.
pub fn entity_routes<M>(repo: Repository<M>) -> Router
where
    M: Send + Sync + 'static,
{
    Router::new()
        .route("/", get(list::<M>).post(create::<M>))
        .route(
            "/bulk",
            post(bulk_create::<M>).put(bulk_update::<M>).delete(bulk_delete::<M>),
        )
        .route("/:id", get(read::<M>).put(update::<M>).delete(delete::<M>))
        .with_state(repo)
}
