//! Declarative model tables: the statically declared counterpart of tagged struct fields.
//! Every type here also deserializes from JSON so model sets can be loaded from a file.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Semantic type of a declared field, independent of the SQL dialect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SemanticType {
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
    Float32,
    Float64,
    Timestamp,
    Nullable(Box<SemanticType>),
    /// Anything not recognized; maps to TEXT.
    Other(String),
}

impl SemanticType {
    pub fn nullable(inner: SemanticType) -> Self {
        SemanticType::Nullable(Box::new(inner))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, SemanticType::Nullable(_))
    }

    /// The wrapped type for `Nullable`, else `self`.
    pub fn unwrapped(&self) -> &SemanticType {
        match self {
            SemanticType::Nullable(inner) => inner.unwrapped(),
            other => other,
        }
    }

    pub fn is_integer(&self) -> bool {
        use SemanticType::*;
        matches!(
            self.unwrapped(),
            Int | Int8 | Int16 | Int32 | Int64 | Uint | Uint8 | Uint16 | Uint32 | Uint64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self.unwrapped(), SemanticType::Float32 | SemanticType::Float64)
    }
}

impl FromStr for SemanticType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if let Some(inner) = t.strip_prefix('*').or_else(|| t.strip_prefix('?')) {
            return Ok(SemanticType::nullable(inner.parse()?));
        }
        let lower = t.to_lowercase();
        if let Some(inner) = lower
            .strip_prefix("option<")
            .or_else(|| lower.strip_prefix("nullable<"))
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(SemanticType::nullable(inner.parse()?));
        }
        Ok(match lower.as_str() {
            "string" | "str" | "text" => SemanticType::String,
            "int" | "integer" => SemanticType::Int,
            "int8" | "i8" => SemanticType::Int8,
            "int16" | "i16" => SemanticType::Int16,
            "int32" | "i32" => SemanticType::Int32,
            "int64" | "i64" => SemanticType::Int64,
            "uint" => SemanticType::Uint,
            "uint8" | "u8" => SemanticType::Uint8,
            "uint16" | "u16" => SemanticType::Uint16,
            "uint32" | "u32" => SemanticType::Uint32,
            "uint64" | "u64" => SemanticType::Uint64,
            "bool" | "boolean" => SemanticType::Bool,
            "float32" | "f32" => SemanticType::Float32,
            "float64" | "f64" => SemanticType::Float64,
            "timestamp" | "time" | "datetime" => SemanticType::Timestamp,
            _ => SemanticType::Other(t.to_string()),
        })
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::String => "string",
            SemanticType::Int => "int",
            SemanticType::Int8 => "int8",
            SemanticType::Int16 => "int16",
            SemanticType::Int32 => "int32",
            SemanticType::Int64 => "int64",
            SemanticType::Uint => "uint",
            SemanticType::Uint8 => "uint8",
            SemanticType::Uint16 => "uint16",
            SemanticType::Uint32 => "uint32",
            SemanticType::Uint64 => "uint64",
            SemanticType::Bool => "bool",
            SemanticType::Float32 => "float32",
            SemanticType::Float64 => "float64",
            SemanticType::Timestamp => "timestamp",
            SemanticType::Nullable(inner) => return write!(f, "option<{}>", inner),
            SemanticType::Other(s) => s.as_str(),
        };
        f.write_str(name)
    }
}

impl Serialize for SemanticType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        // FromStr is infallible: unknown names become Other.
        Ok(s.parse().unwrap_or(SemanticType::Other(s)))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// We hold the foreign key (`foreignKey` is our column, `references` theirs).
    #[default]
    BelongsTo,
    /// They hold the foreign key to our `references` column; at most one row.
    HasOne,
    /// They hold the foreign key to our `references` column.
    HasMany,
}

/// Target of a relation field. Join columns come from the `foreignKey`/`references` tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationSpec {
    pub table: String,
    #[serde(default)]
    pub kind: RelationKind,
}

impl RelationSpec {
    pub fn belongs_to(table: impl Into<String>) -> Self {
        RelationSpec {
            table: table.into(),
            kind: RelationKind::BelongsTo,
        }
    }

    pub fn has_one(table: impl Into<String>) -> Self {
        RelationSpec {
            table: table.into(),
            kind: RelationKind::HasOne,
        }
    }

    pub fn has_many(table: impl Into<String>) -> Self {
        RelationSpec {
            table: table.into(),
            kind: RelationKind::HasMany,
        }
    }
}

/// One declared field: name, semantic type and its `key:value;bare` tag string.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub searchable: bool,
    /// Not accessible from outside the model; never becomes a column.
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub relation: Option<RelationSpec>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        FieldSpec {
            name: name.into(),
            semantic_type,
            tag: String::new(),
            searchable: false,
            private: false,
            relation: None,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.relation = Some(relation);
        self
    }
}

/// A named group of fields embedded into a model (flattened in place).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl GroupDef {
    pub fn new(name: impl Into<String>) -> Self {
        GroupDef {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(FieldDef::Field(field));
        self
    }

    pub fn embed(mut self, group: GroupDef) -> Self {
        self.fields.push(FieldDef::Embedded { embed: group });
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldDef {
    Embedded { embed: GroupDef },
    Field(FieldSpec),
}

/// Declared shape of one data model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDef {
    /// Type name, e.g. "ActivityLog". The default table name derives from it.
    pub name: String,
    /// Explicit table name override.
    #[serde(default)]
    pub table: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        ModelDef {
            name: name.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(FieldDef::Field(field));
        self
    }

    pub fn embed(mut self, group: GroupDef) -> Self {
        self.fields.push(FieldDef::Embedded { embed: group });
        self
    }

    /// Table name: explicit override, else pluralized snake_case of the type name.
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| crate::case::table_name_for(&self.name))
    }
}

/// A Rust type with a statically declared model table.
pub trait Model {
    fn definition() -> ModelDef;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn semantic_type_parses_wrappers_and_falls_back() {
        assert_eq!("*timestamp".parse::<SemanticType>().unwrap(), SemanticType::nullable(SemanticType::Timestamp));
        assert_eq!("Option<uint>".parse::<SemanticType>().unwrap(), SemanticType::nullable(SemanticType::Uint));
        assert_eq!("decimal".parse::<SemanticType>().unwrap(), SemanticType::Other("decimal".into()));
    }

    #[test]
    fn model_def_deserializes_with_embedded_groups() {
        let v = json!({
            "name": "User",
            "fields": [
                {"embed": {"name": "BaseModel", "fields": [
                    {"name": "ID", "type": "uint", "tag": "primaryKey;autoIncrement"}
                ]}},
                {"name": "Name", "type": "string", "tag": "size:100", "searchable": true}
            ]
        });
        let def: ModelDef = serde_json::from_value(v).unwrap();
        assert_eq!(def.table_name(), "users");
        assert!(matches!(&def.fields[0], FieldDef::Embedded { embed } if embed.name == "BaseModel"));
        assert!(matches!(&def.fields[1], FieldDef::Field(f) if f.searchable));
    }
}
