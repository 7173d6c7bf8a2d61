//! Builds parameterized SELECT, COUNT, INSERT, UPDATE and DELETE from a model descriptor.
//! Identifiers come only from descriptors; values are always bound.

use crate::error::AppError;
use crate::model::{FieldDescriptor, ModelDescriptor, RelationKind};
use crate::query::{QueryParams, SortSpec};
use crate::sql::params::BindValue;
use serde_json::{Map, Value};

/// Quote identifier for MySQL.
pub(crate) fn quoted(s: &str) -> String {
    format!("`{}`", s.replace('`', "``"))
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<BindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: BindValue) {
        self.params.push(v);
    }
}

/// One relation to pre-fetch after the page is loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncludePlan {
    /// Key the related rows are attached under in each parent row.
    pub name: String,
    pub table: String,
    pub kind: RelationKind,
    /// Parent column whose values are collected.
    pub local_key: String,
    /// Related-table column matched with `IN (...)`.
    pub remote_key: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuiltQuery {
    pub select: QueryBuf,
    /// Same predicates as `select`, without ordering or pagination.
    pub count: QueryBuf,
    pub includes: Vec<IncludePlan>,
    /// Selected columns when `fields` was given.
    pub projection: Option<Vec<String>>,
}

/// Composes a list query in fixed stages: search, filter, sort, pagination, includes, projection.
pub struct QueryBuilder<'a> {
    model: &'a ModelDescriptor,
    params: QueryParams,
    soft_delete: Option<&'a str>,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(model: &'a ModelDescriptor, params: &QueryParams) -> Self {
        QueryBuilder {
            model,
            params: params.clone().normalized(),
            soft_delete: None,
        }
    }

    /// Exclude rows whose `column` is set.
    pub fn soft_delete(mut self, column: &'a str) -> Self {
        self.soft_delete = Some(column);
        self
    }

    pub fn build(&self) -> Result<BuiltQuery, AppError> {
        let table = quoted(&self.model.table);
        let mut where_parts = Vec::new();
        let mut params = Vec::new();

        if let Some(term) = self.params.search_term() {
            let columns = self.model.searchable_columns();
            if !columns.is_empty() {
                let pattern = format!("%{}%", term);
                let ors: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        params.push(BindValue::String(pattern.clone()));
                        format!("{} LIKE ?", quoted(c))
                    })
                    .collect();
                where_parts.push(format!("({})", ors.join(" OR ")));
            }
        }

        for (key, value) in &self.params.filter {
            let field = self
                .model
                .column(key)
                .ok_or_else(|| AppError::BadRequest(format!("unknown filter field '{}'", key)))?;
            if value.is_null() {
                where_parts.push(format!("{} IS NULL", quoted(&field.column)));
            } else {
                params.push(BindValue::for_column(field, value)?);
                where_parts.push(format!("{} = ?", quoted(&field.column)));
            }
        }

        if let Some(col) = self.soft_delete {
            where_parts.push(format!("{} IS NULL", quoted(col)));
        }

        let where_clause = if where_parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_parts.join(" AND "))
        };
        let order_clause = self.order_clause()?;
        let includes = self.include_plans()?;
        let projection = self.projection(&includes)?;
        let cols = match &projection {
            Some(cols) => cols.iter().map(|c| quoted(c)).collect::<Vec<_>>().join(", "),
            None => select_column_list(self.model),
        };

        let select = QueryBuf {
            sql: format!(
                "SELECT {} FROM {}{}{} LIMIT {} OFFSET {}",
                cols,
                table,
                where_clause,
                order_clause,
                self.params.page_size,
                self.params.offset()
            ),
            params: params.clone(),
        };
        let count = QueryBuf {
            sql: format!("SELECT COUNT(*) FROM {}{}", table, where_clause),
            params,
        };
        Ok(BuiltQuery {
            select,
            count,
            includes,
            projection,
        })
    }

    /// Explicit sort over known columns; else `created_at DESC`; else primary key descending.
    fn order_clause(&self) -> Result<String, AppError> {
        let spec = match self.params.sort.as_deref() {
            Some(s) => SortSpec::parse(s)?,
            None => SortSpec::default(),
        };
        let keys: Vec<String> = if spec.is_empty() {
            let fallback = if self.model.has_column("created_at") {
                Some("created_at")
            } else {
                self.model.primary_key().map(|f| f.column.as_str())
            };
            fallback
                .map(|c| vec![format!("{} DESC", quoted(c))])
                .unwrap_or_default()
        } else {
            spec.keys
                .iter()
                .map(|k| {
                    if !self.model.has_column(&k.column) {
                        return Err(AppError::BadRequest(format!("unknown sort field '{}'", k.column)));
                    }
                    Ok(format!("{} {}", quoted(&k.column), if k.descending { "DESC" } else { "ASC" }))
                })
                .collect::<Result<_, _>>()?
        };
        if keys.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!(" ORDER BY {}", keys.join(", ")))
        }
    }

    fn include_plans(&self) -> Result<Vec<IncludePlan>, AppError> {
        self.params
            .include_list()
            .iter()
            .map(|name| {
                let field = self
                    .model
                    .relation(name)
                    .ok_or_else(|| AppError::BadRequest(format!("unknown include '{}'", name)))?;
                include_plan(field)
            })
            .collect()
    }

    fn projection(&self, includes: &[IncludePlan]) -> Result<Option<Vec<String>>, AppError> {
        let requested = self.params.field_list();
        if requested.is_empty() {
            return Ok(None);
        }
        let mut cols: Vec<String> = Vec::new();
        for name in &requested {
            if !self.model.has_column(name) {
                return Err(AppError::BadRequest(format!("unknown field '{}'", name)));
            }
            if !cols.contains(name) {
                cols.push(name.clone());
            }
        }
        for inc in includes {
            if !cols.contains(&inc.local_key) {
                cols.push(inc.local_key.clone());
            }
        }
        Ok(Some(cols))
    }
}

fn include_plan(field: &FieldDescriptor) -> Result<IncludePlan, AppError> {
    let rel = field
        .relation
        .as_ref()
        .ok_or_else(|| AppError::BadRequest(format!("{} is not a relation", field.name)))?;
    Ok(IncludePlan {
        name: field.column.clone(),
        table: rel.table.clone(),
        kind: rel.kind,
        local_key: rel.local_key().to_string(),
        remote_key: rel.remote_key().to_string(),
    })
}

fn select_column_list(model: &ModelDescriptor) -> String {
    model
        .columns()
        .map(|c| quoted(&c.column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn not_deleted(soft_delete: Option<&str>) -> String {
    soft_delete
        .map(|c| format!(" AND {} IS NULL", quoted(c)))
        .unwrap_or_default()
}

/// SELECT one row where `column = ?`.
pub fn select_by_key(model: &ModelDescriptor, column: &str, key: BindValue, soft_delete: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.push_param(key);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = ?{} LIMIT 1",
        select_column_list(model),
        quoted(&model.table),
        quoted(column),
        not_deleted(soft_delete)
    );
    q
}

/// SELECT * FROM table WHERE column IN (...). Used for batch-fetching related rows.
pub fn select_by_column_in(table: &str, column: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    if values.is_empty() {
        q.sql = format!("SELECT * FROM {} WHERE 1 = 0", quoted(table));
        return q;
    }
    let placeholders: Vec<&str> = values
        .iter()
        .map(|v| {
            q.push_param(BindValue::from_json(v));
            "?"
        })
        .collect();
    q.sql = format!(
        "SELECT * FROM {} WHERE {} IN ({})",
        quoted(table),
        quoted(column),
        placeholders.join(", ")
    );
    q
}

/// INSERT of the body's known columns. Absent auto-timestamp columns get `CURRENT_TIMESTAMP`;
/// other absent columns are left to the table default.
pub fn insert(model: &ModelDescriptor, body: &Map<String, Value>) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut values = Vec::new();
    for field in model.columns() {
        match body.get(&field.column) {
            Some(Value::Null) | None if field.auto_create_time || field.auto_update_time => {
                cols.push(quoted(&field.column));
                values.push("CURRENT_TIMESTAMP".to_string());
            }
            Some(Value::Null) if field.primary_key && field.auto_increment => {}
            Some(v) => {
                q.push_param(BindValue::for_column(field, v)?);
                cols.push(quoted(&field.column));
                values.push("?".to_string());
            }
            None => {}
        }
    }
    if cols.is_empty() {
        q.sql = format!("INSERT INTO {} () VALUES ()", quoted(&model.table));
    } else {
        q.sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted(&model.table),
            cols.join(", "),
            values.join(", ")
        );
    }
    Ok(q)
}

/// UPDATE by key: every supplied column except the primary key, creation time and soft-delete
/// columns; auto-update timestamps are refreshed.
pub fn update(
    model: &ModelDescriptor,
    column: &str,
    key: BindValue,
    body: &Map<String, Value>,
    soft_delete: Option<&str>,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    let mut touched = Vec::new();
    for field in model.columns() {
        if field.primary_key || field.auto_create_time || Some(field.column.as_str()) == soft_delete {
            continue;
        }
        if field.auto_update_time {
            touched.push(format!("{} = CURRENT_TIMESTAMP", quoted(&field.column)));
            continue;
        }
        if let Some(v) = body.get(&field.column) {
            q.push_param(BindValue::for_column(field, v)?);
            sets.push(format!("{} = ?", quoted(&field.column)));
        }
    }
    // auto-update timestamps alone do not make an update
    if sets.is_empty() {
        return Err(AppError::BadRequest(format!("no updatable fields for {}", model.table)));
    }
    sets.extend(touched);
    q.push_param(key);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quoted(&model.table),
        sets.join(", "),
        quoted(column),
        not_deleted(soft_delete)
    );
    Ok(q)
}

/// Physical DELETE by key.
pub fn delete(model: &ModelDescriptor, column: &str, key: BindValue) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.push_param(key);
    q.sql = format!("DELETE FROM {} WHERE {} = ?", quoted(&model.table), quoted(column));
    q
}

/// Mark a live row deleted: `deleted_at = CURRENT_TIMESTAMP` plus the optional actor column.
pub fn soft_delete(
    model: &ModelDescriptor,
    column: &str,
    key: BindValue,
    deleted_at: &str,
    actor: Option<(&str, BindValue)>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = vec![format!("{} = CURRENT_TIMESTAMP", quoted(deleted_at))];
    if let Some((actor_col, actor_id)) = actor {
        q.push_param(actor_id);
        sets.push(format!("{} = ?", quoted(actor_col)));
    }
    q.push_param(key);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        quoted(&model.table),
        sets.join(", "),
        quoted(column),
        not_deleted(Some(deleted_at))
    );
    q
}

/// COUNT of live rows, optionally filtered.
pub fn count(model: &ModelDescriptor, soft_delete: Option<&str>) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = match soft_delete {
        Some(col) => format!("SELECT COUNT(*) FROM {} WHERE {} IS NULL", quoted(&model.table), quoted(col)),
        None => format!("SELECT COUNT(*) FROM {}", quoted(&model.table)),
    };
    q
}
