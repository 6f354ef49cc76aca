//! In-transaction projection execution: loading the records a projection
//! needs and applying the mutations it returns, all on the same rusqlite
//! transaction as the event insert.

use rusqlite::params;

use lineage_core::read_model::{
    CitationRecord, FamilyRecord, MediaRecord, PersonRecord, SourceRecord,
};
use lineage_projection::{LoadedRecords, Mutation, RecordRef};

use crate::read_models::{delete_in_tx, get_in_tx, save_in_tx};

/// Loads the referenced records into a [`LoadedRecords`] bundle. Refs that
/// do not resolve are simply absent; the projector decides whether that is
/// an error.
pub(crate) fn load_records(
    conn: &rusqlite::Connection,
    refs: &[RecordRef],
) -> Result<LoadedRecords, rusqlite::Error> {
    let mut loaded = LoadedRecords::default();
    for record_ref in refs {
        match *record_ref {
            RecordRef::Person(id) => {
                if let Some(record) = get_in_tx::<PersonRecord>(conn, id)? {
                    loaded.persons.insert(id, record);
                }
            }
            RecordRef::Family(id) => {
                if let Some(record) = get_in_tx::<FamilyRecord>(conn, id)? {
                    loaded.families.insert(id, record);
                }
            }
            RecordRef::Source(id) => {
                if let Some(record) = get_in_tx::<SourceRecord>(conn, id)? {
                    loaded.sources.insert(id, record);
                }
            }
            RecordRef::Citation(id) => {
                if let Some(record) = get_in_tx::<CitationRecord>(conn, id)? {
                    loaded.citations.insert(id, record);
                }
            }
            RecordRef::Media(id) => {
                if let Some(record) = get_in_tx::<MediaRecord>(conn, id)? {
                    loaded.media.insert(id, record);
                }
            }
        }
    }
    Ok(loaded)
}

/// Applies one mutation. The adjust/set/clear variants are conditional
/// UPDATEs that no-op when the target row is gone.
pub(crate) fn apply_mutation(
    conn: &rusqlite::Connection,
    mutation: &Mutation,
) -> Result<(), rusqlite::Error> {
    match mutation {
        Mutation::SavePerson(record) => save_in_tx(conn, record),
        Mutation::DeletePerson(id) => delete_in_tx::<PersonRecord>(conn, *id),
        Mutation::SaveFamily(record) => save_in_tx(conn, record),
        Mutation::DeleteFamily(id) => delete_in_tx::<FamilyRecord>(conn, *id),
        Mutation::SaveSource(record) => save_in_tx(conn, record),
        Mutation::DeleteSource(id) => delete_in_tx::<SourceRecord>(conn, *id),
        Mutation::SaveCitation(record) => save_in_tx(conn, record),
        Mutation::DeleteCitation(id) => delete_in_tx::<CitationRecord>(conn, *id),
        Mutation::SaveMedia(record) => save_in_tx(conn, record),
        Mutation::DeleteMedia(id) => delete_in_tx::<MediaRecord>(conn, *id),
        Mutation::AdjustCitationCount { source_id, delta } => {
            conn.execute(
                "UPDATE sources SET citation_count = MAX(citation_count + ?1, 0) WHERE id = ?2",
                params![delta, source_id.to_string()],
            )?;
            Ok(())
        }
        Mutation::SetParentFamily {
            person_id,
            family_id,
        } => {
            conn.execute(
                "UPDATE persons SET parent_family_id = ?1 WHERE id = ?2",
                params![family_id.to_string(), person_id.to_string()],
            )?;
            Ok(())
        }
        Mutation::ClearParentFamily {
            person_id,
            family_id,
        } => {
            conn.execute(
                "UPDATE persons SET parent_family_id = NULL \
                 WHERE id = ?1 AND parent_family_id = ?2",
                params![person_id.to_string(), family_id.to_string()],
            )?;
            Ok(())
        }
    }
}
