//! Entity CRUD handlers over a [`Repository`]: list, read, create, update, delete, bulk.

use crate::error::AppError;
use crate::query::QueryParams;
use crate::response::{success_created, success_one, success_page};
use crate::service::{Identifier, Repository};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

/// Header carrying the acting user's id, written to `deleted_by` on soft delete.
pub const ACTOR_HEADER: &str = "x-actor-id";

fn actor(headers: &HeaderMap) -> Result<Option<u64>, AppError> {
    match headers.get(ACTOR_HEADER) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("invalid {} header", ACTOR_HEADER))),
    }
}

fn body_to_items(body: Value) -> Result<Vec<Value>, AppError> {
    match body {
        Value::Array(items) => Ok(items),
        _ => Err(AppError::BadRequest("bulk body must be a JSON array".into())),
    }
}

fn item_to_identifier(v: &Value) -> Result<Identifier, AppError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .map(Identifier::Id)
            .ok_or_else(|| AppError::BadRequest(format!("invalid id {}", n))),
        Value::String(s) => s.parse(),
        Value::Object(m) => m
            .get("id")
            .or_else(|| m.get("uuid"))
            .ok_or_else(|| AppError::BadRequest("item must carry id or uuid".into()))
            .and_then(item_to_identifier),
        _ => Err(AppError::BadRequest("ids must be numbers or uuid strings".into())),
    }
}

pub async fn list<M>(
    State(repo): State<Repository<M>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let params = QueryParams::from_pairs(pairs)?;
    let (rows, meta) = repo.find_many(&params).await?;
    Ok(success_page(rows, meta))
}

pub async fn read<M>(
    State(repo): State<Repository<M>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id: Identifier = id.parse()?;
    Ok(success_one(repo.find_one(&id).await?))
}

pub async fn create<M>(
    State(repo): State<Repository<M>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_created(repo.create_one(body).await?))
}

pub async fn update<M>(
    State(repo): State<Repository<M>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let id: Identifier = id.parse()?;
    Ok(success_one(repo.update_one(&id, body).await?))
}

pub async fn delete<M>(
    State(repo): State<Repository<M>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let id: Identifier = id.parse()?;
    repo.delete_one_by(&id, actor(&headers)?).await?;
    Ok(success_one(json!({ "message": "deleted" })))
}

pub async fn bulk_create<M>(
    State(repo): State<Repository<M>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let rows = repo.create_many(body_to_items(body)?).await?;
    Ok(success_created(rows))
}

pub async fn bulk_update<M>(
    State(repo): State<Repository<M>>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    Ok(success_one(repo.update_many(body_to_items(body)?).await?))
}

/// Body is an array of ids, uuids, or objects carrying either.
pub async fn bulk_delete<M>(
    State(repo): State<Repository<M>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let ids = body_to_items(body)?
        .iter()
        .map(item_to_identifier)
        .collect::<Result<Vec<_>, _>>()?;
    let deleted = repo.delete_many(&ids, actor(&headers)?).await?;
    Ok(success_one(json!({ "deleted": deleted })))
}
