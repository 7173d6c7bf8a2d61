//! Reusable embedded field groups shared by most models.

use crate::model::types::{GroupDef, SemanticType};
use crate::model::FieldSpec;

/// `uuid` column: 36-char unique, assigned on create when absent.
pub fn uuid_model() -> GroupDef {
    GroupDef::new("UUIDModel").field(
        FieldSpec::new("UUID", SemanticType::String).tag("size:36;uniqueIndex;not null;column:uuid"),
    )
}

/// Auto-increment `id` primary key plus `uuid`.
pub fn base_model() -> GroupDef {
    GroupDef::new("BaseModel")
        .field(FieldSpec::new("ID", SemanticType::Uint).tag("primaryKey;autoIncrement;column:id"))
        .embed(uuid_model())
}

pub fn record_created_model() -> GroupDef {
    GroupDef::new("RecordCreatedModel")
        .field(FieldSpec::new("CreatedAt", SemanticType::Timestamp).tag("autoCreateTime"))
        .field(FieldSpec::new("CreatedBy", SemanticType::Uint).tag("column:created_by"))
}

pub fn record_updated_model() -> GroupDef {
    GroupDef::new("RecordUpdatedModel")
        .field(FieldSpec::new("UpdatedAt", SemanticType::Timestamp).tag("autoUpdateTime"))
        .field(FieldSpec::new("UpdatedBy", SemanticType::Uint).tag("column:updated_by"))
}

/// `created_at`/`created_by` and `updated_at`/`updated_by`.
pub fn record_model() -> GroupDef {
    GroupDef::new("RecordModel")
        .embed(record_created_model())
        .embed(record_updated_model())
}

/// Columns a soft-delete repository writes instead of removing rows.
pub fn soft_delete_model() -> GroupDef {
    GroupDef::new("SoftDeleteModel")
        .field(
            FieldSpec::new("DeletedAt", SemanticType::nullable(SemanticType::Timestamp))
                .tag("index;column:deleted_at"),
        )
        .field(FieldSpec::new("DeletedBy", SemanticType::Uint).tag("column:deleted_by"))
}
