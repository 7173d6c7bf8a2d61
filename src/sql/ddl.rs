//! Table and index DDL built from a model descriptor, plus a statement splitter for applying
//! multi-statement migration SQL one statement at a time.

use crate::model::ModelDescriptor;
use crate::sql::types::column_definition;

pub const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

/// `CREATE TABLE IF NOT EXISTS` with every column, then one `PRIMARY KEY (...)` clause.
pub fn create_table(model: &ModelDescriptor) -> String {
    let mut lines: Vec<String> = model.fields.iter().filter_map(column_definition).collect();
    let pks: Vec<&str> = model.primary_keys().iter().map(|f| f.column.as_str()).collect();
    if !pks.is_empty() {
        lines.push(format!("PRIMARY KEY ({})", pks.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n) {};",
        model.table,
        lines.join(",\n  "),
        TABLE_OPTIONS
    )
}

#[derive(Debug)]
struct IndexGroup {
    unique: bool,
    name: String,
    columns: Vec<String>,
}

/// One statement per indexed column; columns sharing an explicit index name form one composite index.
pub fn index_statements(model: &ModelDescriptor) -> Vec<String> {
    let mut groups: Vec<IndexGroup> = Vec::new();
    for field in model.columns() {
        let specs = [(true, &field.unique_index), (false, &field.index)];
        for (unique, spec) in specs {
            let Some(spec) = spec else { continue };
            let prefix = if unique { "uidx" } else { "idx" };
            match &spec.name {
                Some(name) => match groups.iter_mut().find(|g| g.unique == unique && &g.name == name) {
                    Some(group) => group.columns.push(field.column.clone()),
                    None => groups.push(IndexGroup {
                        unique,
                        name: name.clone(),
                        columns: vec![field.column.clone()],
                    }),
                },
                None => groups.push(IndexGroup {
                    unique,
                    name: format!("{}_{}_{}", prefix, model.table, field.column),
                    columns: vec![field.column.clone()],
                }),
            }
        }
    }
    groups
        .into_iter()
        .map(|g| {
            format!(
                "CREATE {}INDEX {} ON {} ({});",
                if g.unique { "UNIQUE " } else { "" },
                g.name,
                model.table,
                g.columns.join(", ")
            )
        })
        .collect()
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", table)
}

/// Split SQL text on `;` outside quotes, backticks and comments. Empty statements are dropped;
/// returned statements carry no trailing `;`.
pub fn split_statements(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            current.push(c);
            if c == '\\' && q != '`' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            } else if c == q {
                if chars.peek() == Some(&q) {
                    // doubled quote is an escaped quote
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '#' => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            ';' => push_statement(&mut out, &mut current),
            _ => current.push(c),
        }
    }
    push_statement(&mut out, &mut current);
    out
}

fn push_statement(out: &mut Vec<String>, current: &mut String) {
    let stmt = current.trim();
    if !stmt.is_empty() {
        out.push(stmt.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{read_model, FieldSpec, ModelDef, SemanticType};

    fn user() -> ModelDescriptor {
        read_model(
            &ModelDef::new("User")
                .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey;autoIncrement"))
                .field(FieldSpec::new("Name", SemanticType::String).tag("size:100;not null"))
                .field(FieldSpec::new("Email", SemanticType::String).tag("uniqueIndex").searchable())
                .field(FieldSpec::new("Age", SemanticType::Int).tag("default:0")),
        )
        .unwrap()
    }

    #[test]
    fn user_table_ddl() {
        let sql = create_table(&user());
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS users (\n  \
             id INT NOT NULL AUTO_INCREMENT,\n  \
             name VARCHAR(100) NOT NULL,\n  \
             email VARCHAR(255) NULL,\n  \
             age INT NULL DEFAULT '0',\n  \
             PRIMARY KEY (id)\n\
             ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;"
        );
        assert_eq!(sql.matches("PRIMARY KEY (id)").count(), 1);
        assert_eq!(index_statements(&user()), ["CREATE UNIQUE INDEX uidx_users_email ON users (email);"]);
    }

    #[test]
    fn named_indexes_group_into_composites() {
        let m = read_model(
            &ModelDef::new("Membership")
                .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey"))
                .field(FieldSpec::new("OrgID", SemanticType::Uint).tag("uniqueIndex:uidx_member"))
                .field(FieldSpec::new("UserID", SemanticType::Uint).tag("uniqueIndex:uidx_member"))
                .field(FieldSpec::new("Role", SemanticType::String).tag("index")),
        )
        .unwrap();
        assert_eq!(
            index_statements(&m),
            [
                "CREATE UNIQUE INDEX uidx_member ON memberships (org_id, user_id);",
                "CREATE INDEX idx_memberships_role ON memberships (role);",
            ]
        );
    }

    #[test]
    fn drop_statement() {
        assert_eq!(drop_table("users"), "DROP TABLE IF EXISTS users;");
    }

    #[test]
    fn split_ignores_separators_in_quotes_and_comments() {
        let sql = "CREATE TABLE a (x VARCHAR(10) DEFAULT 'a;b');\n\
                   -- note; not a statement\n\
                   CREATE INDEX idx ON a (x);;\n\
                   INSERT INTO `we;ird` VALUES ('it''s;', \"q\\\";\");";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CREATE TABLE a (x VARCHAR(10) DEFAULT 'a;b')");
        assert_eq!(parts[1], "CREATE INDEX idx ON a (x)");
        assert!(parts[2].starts_with("INSERT INTO `we;ird`"));
        assert!(parts[2].ends_with("\"q\\\";\")"));
    }
}
