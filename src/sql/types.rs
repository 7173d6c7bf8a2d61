//! Semantic type to MySQL column type, plus the column constraint clauses.
//! Clause order is fixed: `<column> <type> [NOT NULL|NULL] [AUTO_INCREMENT] [DEFAULT v] [COMMENT 't']`.

use crate::model::{FieldDescriptor, SemanticType};

pub const DEFAULT_VARCHAR_SIZE: u32 = 255;

/// Tag-derived overrides that influence the column type and its constraints.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeOverrides {
    pub sql_type: Option<String>,
    pub size: Option<u32>,
    pub nullable: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub default_value: Option<String>,
    pub comment: Option<String>,
}

impl TypeOverrides {
    pub fn from_field(field: &FieldDescriptor) -> Self {
        TypeOverrides {
            sql_type: field.sql_type.clone(),
            size: field.max_length,
            nullable: field.nullable,
            primary_key: field.primary_key,
            auto_increment: field.auto_increment,
            default_value: field.default_value.clone(),
            comment: field.comment.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnType {
    pub sql_type: String,
    pub constraints: Vec<String>,
}

/// Pure and total: unrecognized types fall back to TEXT.
pub fn map_type(semantic: &SemanticType, overrides: &TypeOverrides) -> ColumnType {
    let sql_type = overrides
        .sql_type
        .clone()
        .unwrap_or_else(|| default_sql_type(semantic, overrides.size));

    let mut constraints = Vec::new();
    if overrides.primary_key || !overrides.nullable {
        constraints.push("NOT NULL".to_string());
    } else {
        constraints.push("NULL".to_string());
    }
    if overrides.auto_increment {
        constraints.push("AUTO_INCREMENT".to_string());
    }
    if let Some(default) = &overrides.default_value {
        constraints.push(format!("DEFAULT {}", default_literal(default)));
    }
    if let Some(comment) = &overrides.comment {
        constraints.push(format!("COMMENT '{}'", escape_literal(comment)));
    }
    ColumnType {
        sql_type,
        constraints,
    }
}

fn default_sql_type(semantic: &SemanticType, size: Option<u32>) -> String {
    match semantic {
        SemanticType::String => format!("VARCHAR({})", size.unwrap_or(DEFAULT_VARCHAR_SIZE)),
        SemanticType::Int
        | SemanticType::Int8
        | SemanticType::Int16
        | SemanticType::Int32
        | SemanticType::Uint
        | SemanticType::Uint8
        | SemanticType::Uint16
        | SemanticType::Uint32 => "INT".into(),
        SemanticType::Int64 | SemanticType::Uint64 => "BIGINT".into(),
        SemanticType::Bool => "TINYINT(1)".into(),
        SemanticType::Float32 => "FLOAT".into(),
        SemanticType::Float64 => "DOUBLE".into(),
        SemanticType::Timestamp => "DATETIME".into(),
        SemanticType::Nullable(inner) => default_sql_type(inner, size),
        SemanticType::Other(_) => "TEXT".into(),
    }
}

/// `CURRENT_TIMESTAMP` and `NULL` pass through; everything else is quoted.
fn default_literal(value: &str) -> String {
    if value.eq_ignore_ascii_case("CURRENT_TIMESTAMP") || value.eq_ignore_ascii_case("NULL") {
        value.to_uppercase()
    } else {
        let unquoted = value
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .unwrap_or(value);
        format!("'{}'", escape_literal(unquoted))
    }
}

pub(crate) fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "''")
}

/// Full column definition, or `None` for relation and ignored fields.
pub fn column_definition(field: &FieldDescriptor) -> Option<String> {
    if !field.is_column() {
        return None;
    }
    let mapped = map_type(&field.semantic_type, &TypeOverrides::from_field(field));
    Some(format!("{} {} {}", field.column, mapped.sql_type, mapped.constraints.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{read_model, FieldSpec, ModelDef, RelationSpec};

    fn nullable() -> TypeOverrides {
        TypeOverrides {
            nullable: true,
            ..Default::default()
        }
    }

    #[test]
    fn default_mapping_table() {
        let cases = [
            (SemanticType::String, "VARCHAR(255)"),
            (SemanticType::Int16, "INT"),
            (SemanticType::Uint, "INT"),
            (SemanticType::Int64, "BIGINT"),
            (SemanticType::Uint64, "BIGINT"),
            (SemanticType::Bool, "TINYINT(1)"),
            (SemanticType::Float32, "FLOAT"),
            (SemanticType::Float64, "DOUBLE"),
            (SemanticType::Timestamp, "DATETIME"),
            (SemanticType::nullable(SemanticType::Timestamp), "DATETIME"),
            (SemanticType::nullable(SemanticType::Uint), "INT"),
            (SemanticType::Other("map[string]any".into()), "TEXT"),
        ];
        for (semantic, expected) in cases {
            assert_eq!(map_type(&semantic, &nullable()).sql_type, expected, "{semantic}");
        }
    }

    #[test]
    fn size_and_explicit_type_override() {
        let sized = TypeOverrides {
            size: Some(100),
            ..nullable()
        };
        assert_eq!(map_type(&SemanticType::String, &sized).sql_type, "VARCHAR(100)");
        let explicit = TypeOverrides {
            sql_type: Some("int".into()),
            ..nullable()
        };
        assert_eq!(map_type(&SemanticType::String, &explicit).sql_type, "int");
    }

    #[test]
    fn constraint_order_is_fixed() {
        let o = TypeOverrides {
            primary_key: true,
            nullable: true,
            auto_increment: true,
            default_value: Some("1".into()),
            comment: Some("row id".into()),
            ..Default::default()
        };
        let mapped = map_type(&SemanticType::Uint, &o);
        assert_eq!(mapped.constraints, ["NOT NULL", "AUTO_INCREMENT", "DEFAULT '1'", "COMMENT 'row id'"]);
    }

    #[test]
    fn mapping_is_deterministic() {
        let o = TypeOverrides {
            default_value: Some("CURRENT_TIMESTAMP".into()),
            ..nullable()
        };
        assert_eq!(map_type(&SemanticType::Timestamp, &o), map_type(&SemanticType::Timestamp, &o));
        assert_eq!(map_type(&SemanticType::Timestamp, &o).constraints, ["NULL", "DEFAULT CURRENT_TIMESTAMP"]);
    }

    #[test]
    fn comment_quotes_are_escaped() {
        let o = TypeOverrides {
            comment: Some("user's age".into()),
            ..nullable()
        };
        assert_eq!(map_type(&SemanticType::Int, &o).constraints[1], "COMMENT 'user''s age'");
    }

    #[test]
    fn relations_and_ignored_fields_emit_no_column() {
        let def = ModelDef::new("Post")
            .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey"))
            .field(FieldSpec::new("Author", SemanticType::Other("User".into())).relation(RelationSpec::belongs_to("users")))
            .field(FieldSpec::new("Cache", SemanticType::String).tag("-"));
        let m = read_model(&def).unwrap();
        let defs: Vec<String> = m.fields.iter().filter_map(column_definition).collect();
        assert_eq!(defs, ["id INT NOT NULL"]);
    }
}
