//! Resolved model descriptor: declared fields flattened, tags parsed, and validated for runtime use.

use crate::case::to_snake_case;
use crate::error::ConfigError;
use crate::model::tags::TagSet;
use crate::model::types::{FieldDef, FieldSpec, ModelDef, RelationKind, SemanticType};
use std::collections::HashSet;

/// Index membership. `name` is the explicit group name from the tag; fields sharing a name form
/// one composite index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: Option<String>,
}

/// Resolved relation: join columns on both sides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub table: String,
    pub kind: RelationKind,
    /// Foreign key column (ours for belongs_to, theirs otherwise).
    pub foreign_key: String,
    /// Referenced column (theirs for belongs_to, ours otherwise).
    pub references: String,
}

impl RelationDescriptor {
    /// Our column used in the join.
    pub fn local_key(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.foreign_key,
            RelationKind::HasOne | RelationKind::HasMany => &self.references,
        }
    }

    /// Their column used in the join.
    pub fn remote_key(&self) -> &str {
        match self.kind {
            RelationKind::BelongsTo => &self.references,
            RelationKind::HasOne | RelationKind::HasMany => &self.foreign_key,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: String,
    pub semantic_type: SemanticType,
    /// Embedded group the field came from; `None` for fields declared on the model itself.
    pub group: Option<String>,
    pub nullable: bool,
    pub max_length: Option<u32>,
    /// Explicit `type:` override, used verbatim.
    pub sql_type: Option<String>,
    pub default_value: Option<String>,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub unique_index: Option<IndexSpec>,
    pub index: Option<IndexSpec>,
    pub searchable: bool,
    pub auto_create_time: bool,
    pub auto_update_time: bool,
    /// Tagged `-`: never a column.
    pub ignored: bool,
    pub relation: Option<RelationDescriptor>,
    pub comment: Option<String>,
}

impl FieldDescriptor {
    /// True when the field is emitted as a table column.
    pub fn is_column(&self) -> bool {
        !self.ignored && self.relation.is_none()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
}

impl ModelDescriptor {
    /// Column fields in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_column())
    }

    pub fn column(&self, name: &str) -> Option<&FieldDescriptor> {
        self.columns().find(|f| f.column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_keys(&self) -> Vec<&FieldDescriptor> {
        self.columns().filter(|f| f.primary_key).collect()
    }

    /// The single primary key column; `None` for composite keys.
    pub fn primary_key(&self) -> Option<&FieldDescriptor> {
        match self.primary_keys().as_slice() {
            [pk] => Some(*pk),
            _ => None,
        }
    }

    pub fn searchable_columns(&self) -> Vec<&str> {
        self.columns()
            .filter(|f| f.searchable)
            .map(|f| f.column.as_str())
            .collect()
    }

    pub fn relations(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.relation.is_some() && !f.ignored)
    }

    /// Relation field by field name or its snake_case form, case-insensitively.
    pub fn relation(&self, name: &str) -> Option<&FieldDescriptor> {
        let wanted = name.trim().to_lowercase();
        self.relations()
            .find(|f| f.name.to_lowercase() == wanted || to_snake_case(&f.name) == wanted)
    }
}

/// Flatten, parse and validate a model definition.
pub fn read_model(def: &ModelDef) -> Result<ModelDescriptor, ConfigError> {
    let mut fields = Vec::new();
    flatten(def, &def.fields, None, &mut fields)?;
    if fields.is_empty() {
        return Err(ConfigError::NoFields {
            model: def.name.clone(),
        });
    }
    validate(def, &fields)?;
    Ok(ModelDescriptor {
        name: def.name.clone(),
        table: def.table_name(),
        fields,
    })
}

fn flatten(
    def: &ModelDef,
    declared: &[FieldDef],
    group: Option<&str>,
    out: &mut Vec<FieldDescriptor>,
) -> Result<(), ConfigError> {
    for field in declared {
        match field {
            FieldDef::Embedded { embed } => flatten(def, &embed.fields, Some(&embed.name), out)?,
            FieldDef::Field(spec) if spec.private => continue,
            FieldDef::Field(spec) => out.push(describe(def, spec, group)?),
        }
    }
    Ok(())
}

fn describe(def: &ModelDef, spec: &FieldSpec, group: Option<&str>) -> Result<FieldDescriptor, ConfigError> {
    let tags = TagSet::parse(&spec.tag);
    let column = tags
        .value("column")
        .map(str::to_string)
        .unwrap_or_else(|| to_snake_case(&spec.name));
    let primary_key = tags.has("primaryKey");
    let max_length = match tags.value("size") {
        Some(s) => Some(s.parse::<u32>().map_err(|_| ConfigError::Unsupported {
            model: def.name.clone(),
            reason: format!("field {} has non-numeric size '{}'", spec.name, s),
        })?),
        None => None,
    };
    let nullable = if primary_key {
        false
    } else {
        spec.semantic_type.is_nullable() || !tags.has("not null")
    };
    let relation = match (&spec.relation, tags.has("foreignKey") || tags.has("references")) {
        (Some(rel), _) => Some(relation_descriptor(def, spec, rel.table.clone(), rel.kind, &tags)),
        (None, true) => {
            return Err(ConfigError::Unsupported {
                model: def.name.clone(),
                reason: format!("relation field {} declares no target table", spec.name),
            })
        }
        (None, false) => None,
    };
    let unique_index = if tags.has("uniqueIndex") || tags.has("unique") {
        Some(IndexSpec {
            name: tags.value("uniqueIndex").map(str::to_string),
        })
    } else {
        None
    };
    let index = if tags.has("index") {
        Some(IndexSpec {
            name: tags.value("index").map(str::to_string),
        })
    } else {
        None
    };
    let searchable = spec.searchable
        || (tags.has("searchable") && !tags.value("searchable").is_some_and(|v| v.eq_ignore_ascii_case("false")));

    Ok(FieldDescriptor {
        name: spec.name.clone(),
        column,
        semantic_type: spec.semantic_type.clone(),
        group: group.map(str::to_string),
        nullable,
        max_length,
        sql_type: tags.value("type").map(str::to_string),
        default_value: tags.value("default").map(str::to_string),
        primary_key,
        auto_increment: tags.has("autoIncrement"),
        unique_index,
        index,
        searchable,
        auto_create_time: tags.has("autoCreateTime"),
        auto_update_time: tags.has("autoUpdateTime"),
        ignored: tags.has("-"),
        relation,
        comment: tags.value("comment").map(str::to_string),
    })
}

fn relation_descriptor(
    def: &ModelDef,
    spec: &FieldSpec,
    table: String,
    kind: RelationKind,
    tags: &TagSet,
) -> RelationDescriptor {
    let default_fk = match kind {
        RelationKind::BelongsTo => format!("{}_id", to_snake_case(&spec.name)),
        RelationKind::HasOne | RelationKind::HasMany => format!("{}_id", to_snake_case(&def.name)),
    };
    RelationDescriptor {
        table,
        kind,
        foreign_key: tags.value("foreignKey").map(column_ref).unwrap_or(default_fk),
        references: tags.value("references").map(column_ref).unwrap_or_else(|| "id".into()),
    }
}

/// Tag references may name a field ("UserID") or a column ("user_id").
fn column_ref(s: &str) -> String {
    if s.chars().any(char::is_uppercase) {
        to_snake_case(s)
    } else {
        s.to_string()
    }
}

fn validate(def: &ModelDef, fields: &[FieldDescriptor]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for f in fields.iter().filter(|f| f.is_column()) {
        if !seen.insert(f.column.as_str()) {
            return Err(ConfigError::DuplicateColumn {
                model: def.name.clone(),
                column: f.column.clone(),
            });
        }
    }

    let mut pk_groups = fields.iter().filter(|f| f.is_column() && f.primary_key).map(|f| f.group.as_deref());
    let first = pk_groups.next().ok_or_else(|| ConfigError::MissingPrimaryKey {
        model: def.name.clone(),
    })?;
    if let Some(other) = pk_groups.find(|g| *g != first) {
        return Err(ConfigError::ConflictingPrimaryKey {
            model: def.name.clone(),
            first: first.unwrap_or(&def.name).to_string(),
            second: other.unwrap_or(&def.name).to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::groups;
    use crate::model::types::{GroupDef, RelationSpec};

    fn user() -> ModelDef {
        ModelDef::new("User")
            .embed(groups::base_model())
            .field(FieldSpec::new("Name", SemanticType::String).tag("size:100;not null").searchable())
            .field(FieldSpec::new("Email", SemanticType::String).tag("uniqueIndex;searchable"))
            .field(FieldSpec::new("Age", SemanticType::Int).tag("default:0"))
            .field(FieldSpec::new("password", SemanticType::String).private())
            .field(FieldSpec::new("Logs", SemanticType::Other("[]ActivityLog".into())).relation(RelationSpec::has_many("activity_logs")))
            .embed(groups::record_model())
            .embed(groups::soft_delete_model())
    }

    #[test]
    fn flattens_embedded_groups_in_declaration_order() {
        let m = read_model(&user()).unwrap();
        let cols: Vec<&str> = m.columns().map(|f| f.column.as_str()).collect();
        assert_eq!(
            cols,
            ["id", "uuid", "name", "email", "age", "created_at", "created_by", "updated_at", "updated_by", "deleted_at", "deleted_by"]
        );
        assert_eq!(m.table, "users");
        assert_eq!(m.primary_key().map(|f| f.column.as_str()), Some("id"));
        assert_eq!(m.fields.iter().find(|f| f.column == "id").and_then(|f| f.group.as_deref()), Some("BaseModel"));
    }

    #[test]
    fn private_fields_are_skipped_and_relations_are_not_columns() {
        let m = read_model(&user()).unwrap();
        assert!(m.fields.iter().all(|f| f.name != "password"));
        let logs = m.relation("logs").unwrap();
        assert!(!logs.is_column());
        let rel = logs.relation.as_ref().unwrap();
        assert_eq!(rel.local_key(), "id");
        assert_eq!(rel.remote_key(), "user_id");
    }

    #[test]
    fn searchable_from_builder_or_tag() {
        let m = read_model(&user()).unwrap();
        assert_eq!(m.searchable_columns(), ["name", "email"]);
    }

    #[test]
    fn nullability_follows_tags_and_primary_key() {
        let m = read_model(&user()).unwrap();
        assert!(!m.column("id").unwrap().nullable);
        assert!(!m.column("name").unwrap().nullable);
        assert!(m.column("age").unwrap().nullable);
        assert!(m.column("deleted_at").unwrap().nullable);
    }

    #[test]
    fn model_without_fields_is_rejected() {
        let err = read_model(&ModelDef::new("Empty")).unwrap_err();
        assert!(matches!(err, ConfigError::NoFields { .. }));
    }

    #[test]
    fn missing_primary_key_is_rejected() {
        let def = ModelDef::new("Note").field(FieldSpec::new("Body", SemanticType::String));
        assert!(matches!(read_model(&def).unwrap_err(), ConfigError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn primary_key_in_two_groups_is_rejected() {
        let other = GroupDef::new("LegacyKey").field(FieldSpec::new("Code", SemanticType::String).tag("primaryKey"));
        let def = ModelDef::new("Item").embed(groups::base_model()).embed(other);
        let err = read_model(&def).unwrap_err();
        assert!(matches!(err, ConfigError::ConflictingPrimaryKey { ref first, ref second, .. } if first == "BaseModel" && second == "LegacyKey"));
    }

    #[test]
    fn duplicate_column_is_rejected() {
        let def = ModelDef::new("Item")
            .embed(groups::base_model())
            .field(FieldSpec::new("Identifier", SemanticType::String).tag("column:uuid"));
        assert!(matches!(read_model(&def).unwrap_err(), ConfigError::DuplicateColumn { ref column, .. } if column == "uuid"));
    }

    #[test]
    fn foreign_key_without_target_is_rejected() {
        let def = ModelDef::new("Log")
            .embed(groups::base_model())
            .field(FieldSpec::new("User", SemanticType::Other("User".into())).tag("foreignKey:UserID"));
        assert!(matches!(read_model(&def).unwrap_err(), ConfigError::Unsupported { .. }));
    }
}
