//! JSONL persistence for in-memory storage.
//!
//! Each line is one tagged record:
//!
//! ```text
//! {"record":"counter","next_id":2003}
//! {"record":"tag","id":1,"kind":"root_cause","name":"Bad deploy"}
//! {"record":"user","id":1,"email":"alice@example.com",...}
//! {"record":"incident","id":2000,"title":"Checkout latency",...}
//! ```
//!
//! Records are written counter first, then tags, users, and incidents, but
//! the loader does not depend on that order.

use super::inner::InMemoryStorageInner;
use super::InMemoryStore;
use crate::domain::{Incident, IncidentId, Tag, TagKind, User};
use crate::error::{Error, Result, StorageError};
use crate::id_allocation::IdCounterState;
use crate::storage::{IncidentStorage, StoreSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record {
    Counter(IdCounterState),
    Tag(Tag),
    User(User),
    Incident(Incident),
}

/// Warnings that can occur during JSONL file loading.
///
/// These are non-fatal: the load continues and the offending data is
/// skipped or trimmed. Applications should log or report them, since they
/// point at corruption or manual edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// Line is not valid JSON
    ///
    /// **Effect**: Line is skipped entirely.
    MalformedJson {
        /// 1-based line number
        line_number: usize,
        /// Parser message
        error: String,
    },

    /// Line is JSON but not a valid record, or the record fails validation
    ///
    /// **Effect**: Record is skipped.
    InvalidRecord {
        /// 1-based line number
        line_number: usize,
        /// What was wrong
        error: String,
    },

    /// A record repeats an ID or a unique key already loaded
    ///
    /// **Effect**: The later record is skipped.
    DuplicateRecord {
        /// 1-based line number
        line_number: usize,
        /// Record type
        record: &'static str,
        /// Conflicting key
        key: String,
    },

    /// An incident refers to a user or tag that was not loaded
    ///
    /// **Effect**: The reference is removed; the incident is kept.
    DanglingReference {
        /// Incident holding the reference
        incident: IncidentId,
        /// Description of the missing target
        reference: String,
    },
}

/// Load storage from a JSONL file.
///
/// A file without a counter record loads fine: the counter self-heals on
/// the first create.
///
/// # Errors
///
/// Only IO failures are errors. Bad lines become [`LoadWarning`]s.
///
/// # Returns
///
/// Returns a tuple of `(store, warnings)`.
pub async fn load_from_jsonl(
    path: &Path,
    settings: StoreSettings,
) -> Result<(InMemoryStore, Vec<LoadWarning>)> {
    let file = File::open(path).await.map_err(Error::Io)?;
    let mut lines = BufReader::new(file).lines();

    let mut warnings = Vec::new();
    let mut records = Vec::new();
    let mut line_number = 0;

    // First pass: parse every line
    while let Some(line) = lines.next_line().await.map_err(Error::Io)? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                warnings.push(LoadWarning::MalformedJson {
                    line_number,
                    error: e.to_string(),
                });
                continue;
            }
        };
        match serde_json::from_value::<Record>(value) {
            Ok(record) => records.push((line_number, record)),
            Err(e) => warnings.push(LoadWarning::InvalidRecord {
                line_number,
                error: e.to_string(),
            }),
        }
    }

    let mut inner = InMemoryStorageInner::new();
    let mut incidents = Vec::new();
    let mut users = Vec::new();

    // Second pass: counter and tags, which nothing else depends on
    for (line_number, record) in records {
        match record {
            Record::Counter(counter) => {
                if inner.counter.is_some() {
                    warnings.push(LoadWarning::DuplicateRecord {
                        line_number,
                        record: "counter",
                        key: counter.next_id.to_string(),
                    });
                } else {
                    inner.counter = Some(counter);
                }
            }
            Record::Tag(tag) => {
                let key = tag.name.clone();
                if inner.tags.contains_key(&tag.id) || inner.put_tag(tag).is_err() {
                    warnings.push(LoadWarning::DuplicateRecord {
                        line_number,
                        record: "tag",
                        key,
                    });
                }
            }
            Record::User(user) => users.push((line_number, user)),
            Record::Incident(incident) => incidents.push((line_number, incident)),
        }
    }

    // Third pass: users
    for (line_number, user) in users {
        let id = user.id;
        let user = match InMemoryStorageInner::normalized_user(user) {
            Ok(user) => user,
            Err(e) => {
                warnings.push(LoadWarning::InvalidRecord {
                    line_number,
                    error: format!("user {id}: {e}"),
                });
                continue;
            }
        };
        if inner.users.contains_key(&user.id) || inner.check_user_unique(&user).is_err() {
            warnings.push(LoadWarning::DuplicateRecord {
                line_number,
                record: "user",
                key: user.email,
            });
            continue;
        }
        inner.put_user(user);
    }

    // Fourth pass: incidents, trimming references that did not load
    for (line_number, mut incident) in incidents {
        if inner.incidents.contains_key(&incident.id) {
            warnings.push(LoadWarning::DuplicateRecord {
                line_number,
                record: "incident",
                key: incident.id.to_string(),
            });
            continue;
        }
        if let Err(e) = incident.validate() {
            warnings.push(LoadWarning::InvalidRecord {
                line_number,
                error: format!("incident {}: {e}", incident.id),
            });
            continue;
        }
        drop_dangling_references(&inner, &mut incident, &mut warnings);
        inner.incidents.insert(incident.id, incident);
    }

    Ok((InMemoryStore::with_inner(inner, settings), warnings))
}

fn drop_dangling_references(
    inner: &InMemoryStorageInner,
    incident: &mut Incident,
    warnings: &mut Vec<LoadWarning>,
) {
    let id = incident.id;
    let mut dangling = |reference: String| {
        warnings.push(LoadWarning::DanglingReference {
            incident: id,
            reference,
        });
    };

    if let Some(captain) = incident.captain.filter(|u| !inner.user_exists(*u)) {
        dangling(format!("captain user {captain}"));
        incident.captain = None;
    }
    if let Some(reporter) = incident.reporter.filter(|u| !inner.user_exists(*u)) {
        dangling(format!("reporter user {reporter}"));
        incident.reporter = None;
    }

    let (kept, missing): (BTreeSet<_>, BTreeSet<_>) = std::mem::take(&mut incident.participants)
        .into_iter()
        .partition(|u| inner.user_exists(*u));
    for user in missing {
        dangling(format!("participant user {user}"));
    }
    incident.participants = kept;

    for kind in [TagKind::AffectedService, TagKind::RootCause, TagKind::ImpactType] {
        let tags = incident.tags_mut(kind);
        let (kept, missing): (BTreeSet<_>, BTreeSet<_>) = std::mem::take(tags)
            .into_iter()
            .partition(|t| inner.tags.get(t).is_some_and(|tag| tag.kind == kind));
        for tag in missing {
            dangling(format!("{kind:?} tag {tag}"));
        }
        *tags = kept;
    }
}

/// Save storage to a JSONL file with atomic writes.
///
/// The write goes to a temporary file first, which is then renamed over
/// `path`. If the process is interrupted the original file is unchanged.
pub async fn save_to_jsonl(storage: &dyn IncidentStorage, path: &Path) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let file = File::create(&temp_path).await.map_err(Error::Io)?;
    let mut writer = BufWriter::new(file);

    let snapshot = storage.export_all().await?;
    let records = snapshot
        .counter
        .map(Record::Counter)
        .into_iter()
        .chain(snapshot.tags.into_iter().map(Record::Tag))
        .chain(snapshot.users.into_iter().map(Record::User))
        .chain(snapshot.incidents.into_iter().map(Record::Incident));

    for record in records {
        let json = serde_json::to_string(&record).map_err(StorageError::Serialization)?;
        writer.write_all(json.as_bytes()).await.map_err(Error::Io)?;
        writer.write_all(b"\n").await.map_err(Error::Io)?;
    }

    writer.flush().await.map_err(Error::Io)?;

    // Atomic rename
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(Error::Io)?;

    Ok(())
}
