//! In-transaction projection plumbing: loading the records a projection
//! asked for and executing the mutations it returned.

use sqlx::{Postgres, Transaction};

use lineage_core::error::StoreError;
use lineage_core::read_model::{
    CitationRecord, FamilyRecord, MediaRecord, PersonRecord, SourceRecord,
};
use lineage_projection::{LoadedRecords, Mutation, RecordRef};

use crate::read_models::{delete_by_id, get_by_id, upsert};

/// Fetches the records named by `refs` from the current transaction.
/// Absent records are simply left out of the result.
pub(crate) async fn load_records(
    tx: &mut Transaction<'_, Postgres>,
    refs: &[RecordRef],
) -> Result<LoadedRecords, StoreError> {
    let mut loaded = LoadedRecords::default();
    for record_ref in refs {
        match *record_ref {
            RecordRef::Person(id) => {
                if let Some(record) = get_by_id::<PersonRecord, _>(&mut **tx, id).await? {
                    loaded.persons.insert(id, record);
                }
            }
            RecordRef::Family(id) => {
                if let Some(record) = get_by_id::<FamilyRecord, _>(&mut **tx, id).await? {
                    loaded.families.insert(id, record);
                }
            }
            RecordRef::Source(id) => {
                if let Some(record) = get_by_id::<SourceRecord, _>(&mut **tx, id).await? {
                    loaded.sources.insert(id, record);
                }
            }
            RecordRef::Citation(id) => {
                if let Some(record) = get_by_id::<CitationRecord, _>(&mut **tx, id).await? {
                    loaded.citations.insert(id, record);
                }
            }
            RecordRef::Media(id) => {
                if let Some(record) = get_by_id::<MediaRecord, _>(&mut **tx, id).await? {
                    loaded.media.insert(id, record);
                }
            }
        }
    }
    Ok(loaded)
}

/// Executes one projection mutation inside the current transaction.
///
/// The conditional variants are plain `UPDATE ... WHERE` statements, so a
/// missing target row means zero rows affected rather than an error.
pub(crate) async fn apply_mutation(
    tx: &mut Transaction<'_, Postgres>,
    mutation: &Mutation,
) -> Result<(), StoreError> {
    match mutation {
        Mutation::SavePerson(record) => upsert(&mut **tx, record).await,
        Mutation::DeletePerson(id) => delete_by_id::<PersonRecord, _>(&mut **tx, *id).await,
        Mutation::SaveFamily(record) => upsert(&mut **tx, record).await,
        Mutation::DeleteFamily(id) => delete_by_id::<FamilyRecord, _>(&mut **tx, *id).await,
        Mutation::SaveSource(record) => upsert(&mut **tx, record).await,
        Mutation::DeleteSource(id) => delete_by_id::<SourceRecord, _>(&mut **tx, *id).await,
        Mutation::SaveCitation(record) => upsert(&mut **tx, record).await,
        Mutation::DeleteCitation(id) => delete_by_id::<CitationRecord, _>(&mut **tx, *id).await,
        Mutation::SaveMedia(record) => upsert(&mut **tx, record).await,
        Mutation::DeleteMedia(id) => delete_by_id::<MediaRecord, _>(&mut **tx, *id).await,
        Mutation::AdjustCitationCount { source_id, delta } => {
            sqlx::query(
                "UPDATE sources SET citation_count = GREATEST(citation_count + $2, 0) \
                 WHERE id = $1",
            )
            .bind(source_id)
            .bind(delta)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::storage)?;
            Ok(())
        }
        Mutation::SetParentFamily {
            person_id,
            family_id,
        } => {
            sqlx::query("UPDATE persons SET parent_family_id = $2 WHERE id = $1")
                .bind(person_id)
                .bind(family_id)
                .execute(&mut **tx)
                .await
                .map_err(StoreError::storage)?;
            Ok(())
        }
        Mutation::ClearParentFamily {
            person_id,
            family_id,
        } => {
            sqlx::query(
                "UPDATE persons SET parent_family_id = NULL \
                 WHERE id = $1 AND parent_family_id = $2",
            )
            .bind(person_id)
            .bind(family_id)
            .execute(&mut **tx)
            .await
            .map_err(StoreError::storage)?;
            Ok(())
        }
    }
}
