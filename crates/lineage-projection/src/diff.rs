//! Generic diff application for `*Updated` events.
//!
//! Updates carry a field name → `{old, new}` map. Rather than hand-writing
//! a field match per entity, the record is round-tripped through its serde
//! representation: known fields take the diff's `new` value, unknown fields
//! are ignored, and store-managed fields are protected.

use chrono::{DateTime, Utc};

use lineage_core::event::ChangeSet;
use lineage_core::read_model::ReadModel;

use crate::projector::ProjectionError;

/// Fields a diff may never touch: identity and version are store-managed,
/// the rest are denormalized or structural and change only through their
/// own events.
pub const PROTECTED_FIELDS: [&str; 8] = [
    "id",
    "version",
    "updated_at",
    "citation_count",
    "children",
    "parent_family_id",
    "source_id",
    "source_title",
];

/// Applies `changes` to `record`, setting the new own-stream version and
/// timestamp. Unknown field names are dropped; protected fields are
/// skipped.
///
/// # Errors
///
/// [`ProjectionError::InvalidDiff`] if a new value does not fit the
/// record field's type.
pub fn apply_changes<R: ReadModel>(
    record: &R,
    changes: &ChangeSet,
    version: i64,
    occurred_at: DateTime<Utc>,
) -> Result<R, ProjectionError> {
    let mut value = serde_json::to_value(record)
        .map_err(|e| ProjectionError::InvalidDiff(e.to_string()))?;
    let Some(object) = value.as_object_mut() else {
        return Err(ProjectionError::InvalidDiff(format!(
            "{} record did not serialize to an object",
            R::STREAM
        )));
    };

    for (field, change) in changes {
        if PROTECTED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        if object.contains_key(field) {
            object.insert(field.clone(), change.new.clone());
        }
    }

    object.insert("version".to_owned(), serde_json::json!(version));
    object.insert(
        "updated_at".to_owned(),
        serde_json::to_value(occurred_at)
            .map_err(|e| ProjectionError::InvalidDiff(e.to_string()))?,
    );

    serde_json::from_value(value).map_err(|e| {
        ProjectionError::InvalidDiff(format!("diff does not fit {} record: {e}", R::STREAM))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::event::FieldChange;
    use lineage_core::read_model::{PersonRecord, SourceRecord};
    use uuid::Uuid;

    fn person() -> PersonRecord {
        PersonRecord {
            id: Uuid::new_v4(),
            given_names: "John".into(),
            surname: "Smith".into(),
            sex: Some("M".into()),
            birth_date: None,
            death_date: None,
            notes: None,
            parent_family_id: None,
            version: 1,
            updated_at: Utc::now(),
        }
    }

    fn change(new: serde_json::Value) -> FieldChange {
        FieldChange {
            old: serde_json::Value::Null,
            new,
        }
    }

    #[test]
    fn applies_changed_fields_and_bumps_version() {
        let record = person();
        let mut changes = ChangeSet::new();
        changes.insert("surname".into(), change(serde_json::json!("Jones")));
        changes.insert("birth_date".into(), change(serde_json::json!("ABT 1850")));

        let now = Utc::now();
        let updated = apply_changes(&record, &changes, 2, now).unwrap();

        assert_eq!(updated.surname, "Jones");
        assert_eq!(updated.birth_date.as_deref(), Some("ABT 1850"));
        assert_eq!(updated.given_names, "John");
        assert_eq!(updated.version, 2);
        assert_eq!(updated.updated_at, now);
    }

    #[test]
    fn can_clear_an_optional_field_with_null() {
        let record = person();
        let mut changes = ChangeSet::new();
        changes.insert("sex".into(), change(serde_json::Value::Null));

        let updated = apply_changes(&record, &changes, 2, Utc::now()).unwrap();
        assert_eq!(updated.sex, None);
    }

    #[test]
    fn ignores_unknown_fields() {
        let record = person();
        let mut changes = ChangeSet::new();
        changes.insert("shoe_size".into(), change(serde_json::json!(42)));

        let updated = apply_changes(&record, &changes, 2, Utc::now()).unwrap();
        assert_eq!(updated.surname, "Smith");
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn protects_store_managed_fields() {
        let source = SourceRecord {
            id: Uuid::new_v4(),
            title: "Parish register".into(),
            author: None,
            publication: None,
            citation_count: 7,
            version: 3,
            updated_at: Utc::now(),
        };
        let mut changes = ChangeSet::new();
        changes.insert("citation_count".into(), change(serde_json::json!(0)));
        changes.insert("id".into(), change(serde_json::json!(Uuid::new_v4())));
        changes.insert("title".into(), change(serde_json::json!("Parish register, vol. 2")));

        let updated = apply_changes(&source, &changes, 4, Utc::now()).unwrap();
        assert_eq!(updated.citation_count, 7);
        assert_eq!(updated.id, source.id);
        assert_eq!(updated.title, "Parish register, vol. 2");
    }

    #[test]
    fn rejects_a_value_of_the_wrong_type() {
        let record = person();
        let mut changes = ChangeSet::new();
        changes.insert("surname".into(), change(serde_json::json!({"bad": true})));

        let err = apply_changes(&record, &changes, 2, Utc::now()).unwrap_err();
        assert!(matches!(err, ProjectionError::InvalidDiff(_)));
    }
}
