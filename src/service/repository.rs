//! Generic repository: list queries with pagination metadata plus single and bulk writes over JSON rows.

use crate::error::{AppError, ConfigError};
use crate::model::{read_model, Model, ModelDef, ModelDescriptor, RelationKind};
use crate::query::{Meta, QueryParams};
use crate::service::rows::row_to_json;
use crate::sql::{self, BindValue, BuiltQuery, IncludePlan, QueryBuf, QueryBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sqlx::mysql::{MySqlConnection, MySqlQueryResult};
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

pub const SOFT_DELETE_COLUMN: &str = "deleted_at";
pub const DELETED_BY_COLUMN: &str = "deleted_by";
pub const UUID_COLUMN: &str = "uuid";
const BULK_LIMIT: usize = 100;

#[derive(Clone, Copy, Debug, Default)]
pub struct RepositoryOptions {
    /// Finds skip rows with `deleted_at` set; deletes set it instead of removing the row.
    pub soft_delete: bool,
}

impl RepositoryOptions {
    pub fn soft_delete() -> Self {
        RepositoryOptions { soft_delete: true }
    }
}

/// Row lookup key: numeric primary key or the `uuid` column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    Id(u64),
    Uuid(String),
}

impl FromStr for Identifier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u64>() {
            return Ok(Identifier::Id(n));
        }
        uuid::Uuid::parse_str(s)
            .map(|u| Identifier::Uuid(u.to_string()))
            .map_err(|_| AppError::BadRequest(format!("invalid id '{}'", s)))
    }
}

impl Identifier {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_u64().map(Identifier::Id),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Marker for repositories over models loaded at runtime rather than declared by a Rust type.
#[derive(Clone, Copy, Debug)]
pub struct Dynamic;

pub type DynRepository = Repository<Dynamic>;

pub struct Repository<M> {
    pool: MySqlPool,
    model: Arc<ModelDescriptor>,
    soft_delete: bool,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Repository {
            pool: self.pool.clone(),
            model: self.model.clone(),
            soft_delete: self.soft_delete,
            _model: PhantomData,
        }
    }
}

impl<M: Model> Repository<M> {
    pub fn new(pool: MySqlPool, options: RepositoryOptions) -> Result<Self, AppError> {
        Self::with_definition(pool, &M::definition(), options)
    }
}

impl<M> Repository<M> {
    pub fn with_definition(pool: MySqlPool, def: &ModelDef, options: RepositoryOptions) -> Result<Self, AppError> {
        let model = read_model(def)?;
        if options.soft_delete && !model.has_column(SOFT_DELETE_COLUMN) {
            return Err(ConfigError::Unsupported {
                model: model.name.clone(),
                reason: format!("soft delete requires a {} column", SOFT_DELETE_COLUMN),
            }
            .into());
        }
        Ok(Repository {
            pool,
            model: Arc::new(model),
            soft_delete: options.soft_delete,
            _model: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.model
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn is_soft_delete(&self) -> bool {
        self.soft_delete
    }

    fn soft_delete_column(&self) -> Option<&'static str> {
        self.soft_delete.then_some(SOFT_DELETE_COLUMN)
    }

    /// One page of rows plus pagination metadata. The count uses the page query's predicates.
    pub async fn find_many(&self, params: &QueryParams) -> Result<(Vec<Value>, Meta), AppError> {
        let (params, built) = self.list_query(params)?;
        let mut conn = self.pool.acquire().await?;
        let total = fetch_count(&mut conn, &built.count).await?;
        let mut rows = fetch_all(&mut conn, &built.select).await?;
        for include in &built.includes {
            attach_include(&mut conn, &mut rows, include).await?;
        }
        Ok((rows, Meta::new(params.page, params.page_size, total)))
    }

    /// Normalised parameters and the page and count statements for them.
    fn list_query(&self, params: &QueryParams) -> Result<(QueryParams, BuiltQuery), AppError> {
        let params = params.clone().normalized();
        let mut builder = QueryBuilder::new(&self.model, &params);
        if let Some(col) = self.soft_delete_column() {
            builder = builder.soft_delete(col);
        }
        let built = builder.build()?;
        Ok((params, built))
    }

    pub async fn find_one(&self, id: &Identifier) -> Result<Value, AppError> {
        let mut conn = self.pool.acquire().await?;
        self.find_in(&mut conn, id).await
    }

    /// `find_one` decoded into a typed struct.
    pub async fn fetch<T: DeserializeOwned>(&self, id: &Identifier) -> Result<T, AppError> {
        let row = self.find_one(id).await?;
        serde_json::from_value(row).map_err(|e| AppError::Db(sqlx::Error::Decode(Box::new(e))))
    }

    pub async fn count(&self) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_count(&mut conn, &sql::count(&self.model, self.soft_delete_column())).await
    }

    pub async fn create_one(&self, body: Value) -> Result<Value, AppError> {
        let mut conn = self.pool.acquire().await?;
        self.create_in(&mut conn, body).await
    }

    /// All-or-nothing insert of up to 100 rows.
    pub async fn create_many(&self, bodies: Vec<Value>) -> Result<Vec<Value>, AppError> {
        check_bulk(bodies.len(), "create")?;
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(bodies.len());
        for body in bodies {
            out.push(self.create_in(&mut tx, body).await?);
        }
        tx.commit().await?;
        Ok(out)
    }

    /// Replace the supplied columns of one row. Repeating the same update yields the same row.
    pub async fn update_one(&self, id: &Identifier, body: Value) -> Result<Value, AppError> {
        let mut conn = self.pool.acquire().await?;
        self.update_in(&mut conn, id, body).await
    }

    /// All-or-nothing update; each item names its row by primary key or `uuid`.
    pub async fn update_many(&self, bodies: Vec<Value>) -> Result<Vec<Value>, AppError> {
        check_bulk(bodies.len(), "update")?;
        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(bodies.len());
        for body in bodies {
            let id = self.identifier_in_body(&body)?;
            out.push(self.update_in(&mut tx, &id, body).await?);
        }
        tx.commit().await?;
        Ok(out)
    }

    pub async fn delete_one(&self, id: &Identifier) -> Result<(), AppError> {
        self.delete_one_by(id, None).await
    }

    /// Delete with an optional acting user, written to `deleted_by` on soft delete.
    pub async fn delete_one_by(&self, id: &Identifier, actor: Option<u64>) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        self.delete_in(&mut conn, id, actor).await
    }

    /// All-or-nothing delete. Returns how many rows were deleted.
    pub async fn delete_many(&self, ids: &[Identifier], actor: Option<u64>) -> Result<u64, AppError> {
        check_bulk(ids.len(), "delete")?;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            self.delete_in(&mut tx, id, actor).await?;
        }
        tx.commit().await?;
        Ok(ids.len() as u64)
    }

    fn key_for(&self, id: &Identifier) -> Result<(String, BindValue), AppError> {
        match id {
            Identifier::Id(n) => {
                let pk = self.model.primary_key().ok_or_else(|| ConfigError::Unsupported {
                    model: self.model.name.clone(),
                    reason: "numeric lookup needs a single-column primary key".into(),
                })?;
                Ok((pk.column.clone(), BindValue::U64(*n)))
            }
            Identifier::Uuid(u) if self.model.has_column(UUID_COLUMN) => {
                Ok((UUID_COLUMN.to_string(), BindValue::String(u.clone())))
            }
            Identifier::Uuid(_) => Err(AppError::BadRequest(format!("{} has no {} column", self.model.table, UUID_COLUMN))),
        }
    }

    fn identifier_in_body(&self, body: &Value) -> Result<Identifier, AppError> {
        let pk = self.model.primary_key().map(|f| f.column.as_str());
        [pk, Some(UUID_COLUMN)]
            .into_iter()
            .flatten()
            .find_map(|col| body.get(col).and_then(Identifier::from_value))
            .ok_or_else(|| AppError::BadRequest("each item must carry its id or uuid".into()))
    }

    fn not_found(&self, id: &Identifier) -> AppError {
        let id = match id {
            Identifier::Id(n) => n.to_string(),
            Identifier::Uuid(u) => u.clone(),
        };
        AppError::NotFound(format!("{}/{}", self.model.table, id))
    }

    async fn find_in(&self, conn: &mut MySqlConnection, id: &Identifier) -> Result<Value, AppError> {
        let (col, key) = self.key_for(id)?;
        let q = sql::select_by_key(&self.model, &col, key, self.soft_delete_column());
        fetch_optional(conn, &q).await?.ok_or_else(|| self.not_found(id))
    }

    /// Primary key of a live row, so writes are keyed the same way whichever identifier was given.
    async fn locate(&self, conn: &mut MySqlConnection, id: &Identifier) -> Result<(String, BindValue), AppError> {
        let row = self.find_in(conn, id).await?;
        match self.model.primary_key() {
            Some(pk) => {
                let value = row.get(&pk.column).cloned().unwrap_or(Value::Null);
                Ok((pk.column.clone(), BindValue::for_column(pk, &value)?))
            }
            None => self.key_for(id),
        }
    }

    async fn create_in(&self, conn: &mut MySqlConnection, body: Value) -> Result<Value, AppError> {
        let mut body = into_object(body)?;
        if self.model.has_column(UUID_COLUMN) {
            let missing = match body.get(UUID_COLUMN) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                body.insert(UUID_COLUMN.into(), Value::String(uuid::Uuid::new_v4().to_string()));
            }
        }
        let q = sql::insert(&self.model, &body)?;
        let result = execute(conn, &q).await?;

        let pk = self.model.primary_key();
        let lookup = match pk.and_then(|f| body.get(&f.column).filter(|v| !v.is_null())) {
            Some(v) => Identifier::from_value(v),
            None if pk.is_some_and(|f| f.auto_increment) && result.last_insert_id() > 0 => {
                Some(Identifier::Id(result.last_insert_id()))
            }
            None => None,
        };
        let lookup = lookup.or_else(|| body.get(UUID_COLUMN).and_then(Identifier::from_value));
        match lookup {
            Some(id) => self.find_in(conn, &id).await,
            None => Ok(Value::Object(body)),
        }
    }

    async fn update_in(&self, conn: &mut MySqlConnection, id: &Identifier, body: Value) -> Result<Value, AppError> {
        let body = into_object(body)?;
        let (col, key) = self.locate(conn, id).await?;
        let q = sql::update(&self.model, &col, key.clone(), &body, self.soft_delete_column())?;
        execute(conn, &q).await?;
        let q = sql::select_by_key(&self.model, &col, key, self.soft_delete_column());
        fetch_optional(conn, &q).await?.ok_or_else(|| self.not_found(id))
    }

    async fn delete_in(&self, conn: &mut MySqlConnection, id: &Identifier, actor: Option<u64>) -> Result<(), AppError> {
        let (col, key) = self.locate(conn, id).await?;
        execute(conn, &self.delete_statement(&col, key, actor)).await?;
        Ok(())
    }

    /// Soft delete stamps `deleted_at` (and `deleted_by` when known); otherwise the row is removed.
    fn delete_statement(&self, col: &str, key: BindValue, actor: Option<u64>) -> QueryBuf {
        match self.soft_delete_column() {
            Some(deleted_at) => {
                let actor = actor
                    .filter(|_| self.model.has_column(DELETED_BY_COLUMN))
                    .map(|a| (DELETED_BY_COLUMN, BindValue::U64(a)));
                sql::soft_delete(&self.model, col, key, deleted_at, actor)
            }
            None => sql::delete(&self.model, col, key),
        }
    }
}

fn check_bulk(len: usize, op: &str) -> Result<(), AppError> {
    if len > BULK_LIMIT {
        return Err(AppError::BadRequest(format!("bulk {} limited to {} items", op, BULK_LIMIT)));
    }
    Ok(())
}

fn into_object(body: Value) -> Result<Map<String, Value>, AppError> {
    match body {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

async fn fetch_all(conn: &mut MySqlConnection, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    let rows = query.fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(row_to_json).collect())
}

async fn fetch_optional(conn: &mut MySqlConnection, q: &QueryBuf) -> Result<Option<Value>, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    let row = query.fetch_optional(&mut *conn).await?;
    Ok(row.map(|r| row_to_json(&r)))
}

async fn fetch_count(conn: &mut MySqlConnection, q: &QueryBuf) -> Result<i64, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "count");
    let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    Ok(query.fetch_one(&mut *conn).await?)
}

async fn execute(conn: &mut MySqlConnection, q: &QueryBuf) -> Result<MySqlQueryResult, AppError> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    Ok(query.execute(&mut *conn).await?)
}

/// Batch-load related rows with one `IN (...)` query and attach them under the include name.
async fn attach_include(conn: &mut MySqlConnection, rows: &mut [Value], include: &IncludePlan) -> Result<(), AppError> {
    let mut keys: Vec<Value> = Vec::new();
    for row in rows.iter() {
        if let Some(v) = row.get(&include.local_key).filter(|v| !v.is_null()) {
            if !keys.contains(v) {
                keys.push(v.clone());
            }
        }
    }
    let related = if keys.is_empty() {
        Vec::new()
    } else {
        fetch_all(conn, &sql::select_by_column_in(&include.table, &include.remote_key, &keys)).await?
    };

    let mut by_key: HashMap<String, Vec<Value>> = HashMap::new();
    for r in related {
        if let Some(k) = r.get(&include.remote_key).map(Value::to_string) {
            by_key.entry(k).or_default().push(r);
        }
    }
    for row in rows.iter_mut() {
        let matched = row
            .get(&include.local_key)
            .and_then(|k| by_key.get(&k.to_string()))
            .cloned()
            .unwrap_or_default();
        let attached = match include.kind {
            RelationKind::HasMany => Value::Array(matched),
            RelationKind::BelongsTo | RelationKind::HasOne => matched.into_iter().next().unwrap_or(Value::Null),
        };
        if let Value::Object(map) = row {
            map.insert(include.name.clone(), attached);
        }
    }
    Ok(())
}
