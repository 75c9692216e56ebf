// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Converging the records of a [`ZoneDirectory`] to a desired set.
//!
//! [`reconcile`] resolves (or creates) the zone, lists its records and
//! computes two differences against the desired records:
//!
//! * the records to delete, which are present but not desired; and
//! * the records to add, which are desired but not present.
//!
//! SOA records are left out of both, since the provider manages the
//! SOA. Deletions are applied first, one call at a time, followed by
//! additions. Each applied change is written to an output as
//! `- record` or `+ record`.
//!
//! Records are compared on all of their fields, so a record that only
//! differs from an existing one in its TTL is added while the old one
//! is deleted. Domain names within records are compared without regard
//! to ASCII case or a trailing dot (see [`Record::canonical`]).
//! Running [`reconcile`] again right after it succeeds makes no
//! changes.
//!
//! [`plan`] computes the same differences without changing anything.

use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};

use log::{debug, info};

use crate::rr::{Record, RecordSet, Type};

pub mod directory;
pub use directory::{DirectoryError, MemoryDirectory, ZoneDirectory, MIN_TTL};

////////////////////////////////////////////////////////////////////////
// RECONCILIATION                                                     //
////////////////////////////////////////////////////////////////////////

/// Converges the zone for `domain` in `directory` to `desired`,
/// writing a diff line to `out` for every change applied.
///
/// Every record that would be added is checked against [`MIN_TTL`]
/// before the directory is contacted at all. Otherwise, the first
/// failure stops the run; the error tells which operation failed and
/// what had already been changed.
pub fn reconcile<D, W>(
    directory: &mut D,
    domain: &str,
    desired: &RecordSet,
    out: &mut W,
) -> Result<Summary, Error>
where
    D: ZoneDirectory + ?Sized,
    W: Write + ?Sized,
{
    check_ttls(desired)?;
    let mut summary = Summary::default();

    let zone = match find_zone(directory, domain, &summary)? {
        Some(zone) => zone,
        None => {
            info!("creating zone {domain}");
            let zone = directory
                .create_zone(domain)
                .map_err(|source| Error::Directory {
                    operation: Operation::CreateZone {
                        domain: domain.to_owned(),
                    },
                    source,
                    applied: summary.clone(),
                })?;
            summary.zone_created = true;
            zone
        }
    };

    let current = directory
        .list_records(&zone)
        .map_err(|source| Error::Directory {
            operation: Operation::ListRecords {
                domain: domain.to_owned(),
            },
            source,
            applied: summary.clone(),
        })?;
    let (to_delete, to_add) = diff(current, desired);
    debug!(
        "{domain}: {} record(s) to delete, {} to add",
        to_delete.len(),
        to_add.len()
    );

    for (record, record_id) in to_delete {
        directory
            .delete_record(&zone, &record_id)
            .map_err(|source| Error::Directory {
                operation: Operation::DeleteRecord {
                    domain: domain.to_owned(),
                    record: record.clone(),
                },
                source,
                applied: summary.clone(),
            })?;
        summary.deleted.push(record.clone());
        writeln!(out, "- {}", record).map_err(|source| Error::Output {
            source,
            applied: summary.clone(),
        })?;
    }

    for record in to_add {
        directory
            .add_record(&zone, &record)
            .map_err(|source| Error::Directory {
                operation: Operation::AddRecord {
                    domain: domain.to_owned(),
                    record: record.clone(),
                },
                source,
                applied: summary.clone(),
            })?;
        summary.added.push(record.clone());
        writeln!(out, "+ {}", record).map_err(|source| Error::Output {
            source,
            applied: summary.clone(),
        })?;
    }

    info!("{domain}: {summary}");
    Ok(summary)
}

/// Computes what [`reconcile`] would do, without changing the
/// directory.
pub fn plan<D>(directory: &mut D, domain: &str, desired: &RecordSet) -> Result<Plan, Error>
where
    D: ZoneDirectory + ?Sized,
{
    check_ttls(desired)?;
    let nothing_applied = Summary::default();
    let Some(zone) = find_zone(directory, domain, &nothing_applied)? else {
        return Ok(Plan {
            zone_exists: false,
            to_delete: Vec::new(),
            to_add: desired_records(desired).cloned().collect(),
        });
    };
    let current = directory
        .list_records(&zone)
        .map_err(|source| Error::Directory {
            operation: Operation::ListRecords {
                domain: domain.to_owned(),
            },
            source,
            applied: nothing_applied,
        })?;
    let (to_delete, to_add) = diff(current, desired);
    Ok(Plan {
        zone_exists: true,
        to_delete: to_delete.into_iter().map(|(record, _)| record).collect(),
        to_add,
    })
}

/// Looks `domain` up in the directory's zone listing.
fn find_zone<D>(
    directory: &mut D,
    domain: &str,
    applied: &Summary,
) -> Result<Option<D::ZoneId>, Error>
where
    D: ZoneDirectory + ?Sized,
{
    let zones = directory.list_zones().map_err(|source| Error::Directory {
        operation: Operation::ListZones,
        source,
        applied: applied.clone(),
    })?;
    Ok(zones
        .into_iter()
        .find(|(listed, _)| directory::same_domain(listed, domain))
        .map(|(_, zone)| zone))
}

/// Fails if any record that could be added has a TTL below
/// [`MIN_TTL`].
fn check_ttls(desired: &RecordSet) -> Result<(), Error> {
    match desired_records(desired).find(|record| record.ttl() < MIN_TTL) {
        Some(record) => Err(Error::TtlTooLow(Box::new(record.clone()))),
        None => Ok(()),
    }
}

/// Returns the desired records that are subject to reconciliation.
fn desired_records(desired: &RecordSet) -> impl Iterator<Item = &Record> {
    desired.iter().filter(|record| record.rr_type() != Type::SOA)
}

/// Splits the current records into those to delete, and returns them
/// with the desired records that are missing.
///
/// Records are matched on their canonical forms, since the directory
/// and the zone text need not agree on trailing dots or case. When the
/// directory holds several records with the same canonical form, all
/// but the first are deleted.
fn diff<R>(current: Vec<(Record, R)>, desired: &RecordSet) -> (Vec<(Record, R)>, Vec<Record>) {
    let wanted: BTreeSet<Record> = desired_records(desired).map(Record::canonical).collect();
    let mut kept = BTreeSet::new();
    let mut to_delete = Vec::new();
    for (record, id) in current {
        if record.rr_type() == Type::SOA {
            continue;
        }
        let canonical = record.canonical();
        if wanted.contains(&canonical) && kept.insert(canonical) {
            continue;
        }
        to_delete.push((record, id));
    }
    let to_add = desired_records(desired)
        .filter(|record| !kept.contains(&record.canonical()))
        .cloned()
        .collect();
    (to_delete, to_add)
}

////////////////////////////////////////////////////////////////////////
// SUMMARIES AND PLANS                                                //
////////////////////////////////////////////////////////////////////////

/// The changes a [`reconcile`] run applied.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub zone_created: bool,
    pub deleted: Vec<Record>,
    pub added: Vec<Record>,
}

impl Summary {
    /// Returns whether nothing was changed.
    pub fn is_empty(&self) -> bool {
        !self.zone_created && self.deleted.is_empty() && self.added.is_empty()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.zone_created {
            f.write_str("created zone, ")?;
        }
        write!(
            f,
            "deleted {} record(s), added {} record(s)",
            self.deleted.len(),
            self.added.len()
        )
    }
}

/// The changes [`plan`] found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Plan {
    /// Whether the zone exists yet. If it does not, [`reconcile`] will
    /// create it.
    pub zone_exists: bool,
    pub to_delete: Vec<Record>,
    pub to_add: Vec<Record>,
}

impl Plan {
    /// Returns whether [`reconcile`] would change nothing.
    pub fn is_empty(&self) -> bool {
        self.zone_exists && self.to_delete.is_empty() && self.to_add.is_empty()
    }

    /// Writes the diff lines [`reconcile`] would write.
    pub fn write_diff<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        for record in &self.to_delete {
            writeln!(out, "- {}", record)?;
        }
        for record in &self.to_add {
            writeln!(out, "+ {}", record)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// A directory call made during reconciliation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operation {
    ListZones,
    CreateZone { domain: String },
    ListRecords { domain: String },
    DeleteRecord { domain: String, record: Record },
    AddRecord { domain: String, record: Record },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ListZones => f.write_str("listing zones"),
            Self::CreateZone { domain } => write!(f, "creating zone {}", domain),
            Self::ListRecords { domain } => write!(f, "listing records of {}", domain),
            Self::DeleteRecord { domain, record } => {
                write!(f, "deleting {} from {}", record, domain)
            }
            Self::AddRecord { domain, record } => write!(f, "adding {} to {}", record, domain),
        }
    }
}

/// An error signaling that reconciliation failed.
///
/// Every variant that can occur after the directory was changed carries
/// a [`Summary`] of the changes applied before the failure.
#[derive(Debug)]
pub enum Error {
    /// A directory call failed.
    Directory {
        operation: Operation,
        source: DirectoryError,
        applied: Summary,
    },

    /// A record to be added has a TTL below [`MIN_TTL`]. Nothing was
    /// changed.
    TtlTooLow(Box<Record>),

    /// A diff line could not be written.
    Output { source: io::Error, applied: Summary },
}

impl Error {
    /// Returns the changes applied before the failure.
    pub fn applied(&self) -> Option<&Summary> {
        match self {
            Self::Directory { applied, .. } | Self::Output { applied, .. } => Some(applied),
            Self::TtlTooLow(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Directory {
                operation, applied, ..
            } => write!(f, "failed {} (after having {})", operation, applied),
            Self::TtlTooLow(record) => write!(
                f,
                "TTL of {} is below the minimum of {} seconds",
                record, MIN_TTL
            ),
            Self::Output { applied, .. } => {
                write!(f, "failed to write the diff (after having {})", applied)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Directory { source, .. } => Some(source),
            Self::TtlTooLow(_) => None,
            Self::Output { source, .. } => Some(source),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::directory::Call;
    use super::*;
    use crate::rr::Rdata;

    fn record(name: &str, ttl: u32, rr_type: Type, data: &str) -> Record {
        Record::new(name, ttl, rr_type, Rdata::Text(data.into())).unwrap()
    }

    fn mx(name: &str, priority: u16, exchange: &str) -> Record {
        let data = Rdata::Mx {
            priority,
            exchange: exchange.into(),
        };
        Record::new(name, 3600, Type::MX, data).unwrap()
    }

    fn soa() -> Record {
        record(
            "example.com.",
            86400,
            Type::SOA,
            "ns1.example.com. hostmaster.example.com. 1 2 3 4 5",
        )
    }

    fn run(directory: &mut MemoryDirectory, desired: &RecordSet) -> (Summary, String) {
        let mut out = Vec::new();
        let summary = reconcile(directory, "example.com.", desired, &mut out).unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    fn contents(directory: &MemoryDirectory) -> RecordSet {
        directory
            .records("example.com.")
            .unwrap()
            .into_iter()
            .cloned()
            .collect()
    }

    #[test]
    fn reconcile_applies_exactly_the_difference() {
        let kept = record("example.com.", 300, Type::A, "1.2.3.4");
        let stale = record("old.example.com.", 300, Type::A, "5.6.7.8");
        let fresh = record("new.example.com.", 300, Type::AAAA, "::1");
        let mut directory = MemoryDirectory::new();
        directory.insert_zone("example.com", [soa(), kept.clone(), stale.clone()]);

        let desired = RecordSet::from([kept.clone(), fresh.clone()]);
        let (summary, diff) = run(&mut directory, &desired);
        assert_eq!(summary.deleted, [stale.clone()]);
        assert_eq!(summary.added, [fresh.clone()]);
        assert!(!summary.zone_created);
        assert_eq!(diff, format!("- {}\n+ {}\n", stale, fresh));

        // The SOA survives, and the untouched record is still there.
        assert_eq!(contents(&directory), RecordSet::from([soa(), kept, fresh]));

        // Deletion happens before addition.
        let mutations: Vec<&Call> = directory.calls().iter().filter(|c| c.is_mutation()).collect();
        assert!(matches!(mutations[0], Call::DeleteRecord(..)));
        assert!(matches!(mutations[1], Call::AddRecord(..)));
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut directory = MemoryDirectory::new();
        let desired = RecordSet::from([
            record("example.com.", 300, Type::A, "1.2.3.4"),
            record("example.com.", 300, Type::TXT, "\"v=spf1 -all\""),
            mx("example.com.", 10, "mail.example.com."),
        ]);
        let (first, _) = run(&mut directory, &desired);
        assert!(first.zone_created);
        assert_eq!(first.added.len(), 3);

        let mutations = directory.mutation_count();
        let (second, diff) = run(&mut directory, &desired);
        assert!(second.is_empty());
        assert!(diff.is_empty());
        assert_eq!(directory.mutation_count(), mutations);
    }

    #[test]
    fn low_ttls_fail_before_any_remote_call() {
        let mut directory = MemoryDirectory::new();
        let desired = RecordSet::from([
            record("example.com.", 300, Type::A, "1.2.3.4"),
            record("www.example.com.", 299, Type::A, "1.2.3.4"),
        ]);
        let mut out = Vec::new();
        match reconcile(&mut directory, "example.com.", &desired, &mut out) {
            Err(Error::TtlTooLow(record)) => assert_eq!(record.ttl(), 299),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(directory.calls().is_empty());
        assert!(out.is_empty());
        assert!(matches!(
            plan(&mut directory, "example.com.", &desired),
            Err(Error::TtlTooLow(_))
        ));
    }

    #[test]
    fn ttl_changes_are_delete_and_add() {
        let old = record("example.com.", 300, Type::A, "1.2.3.4");
        let new = record("example.com.", 600, Type::A, "1.2.3.4");
        let mut directory = MemoryDirectory::new();
        directory.insert_zone("example.com.", [old.clone()]);
        let (summary, diff) = run(&mut directory, &RecordSet::from([new.clone()]));
        assert_eq!(summary.deleted, [old]);
        assert_eq!(summary.added, [new.clone()]);
        assert_eq!(diff, "- example.com. 300 A 1.2.3.4\n+ example.com. 600 A 1.2.3.4\n");
        assert_eq!(contents(&directory), RecordSet::from([new]));
    }

    #[test]
    fn mx_priority_is_part_of_the_comparison() {
        let old = mx("example.com.", 10, "mail.example.com.");
        let new = mx("example.com.", 20, "mail.example.com.");
        let mut directory = MemoryDirectory::new();
        directory.insert_zone("example.com.", [old.clone()]);
        let (_, diff) = run(&mut directory, &RecordSet::from([new]));
        assert_eq!(
            diff,
            "- example.com. 3600 MX 10 mail.example.com.\n\
             + example.com. 3600 MX 20 mail.example.com.\n"
        );
    }

    #[test]
    fn desired_soa_records_are_ignored() {
        let mut directory = MemoryDirectory::new();
        directory.insert_zone("example.com.", [soa()]);
        let other_soa = record("example.com.", 300, Type::SOA, "a. b. 9 9 9 9 9");
        let (summary, _) = run(&mut directory, &RecordSet::from([other_soa]));
        assert!(summary.is_empty());
        assert_eq!(contents(&directory), RecordSet::from([soa()]));
    }

    #[test]
    fn partial_application_is_reported() {
        let stale = record("old.example.com.", 300, Type::A, "5.6.7.8");
        let first = record("a.example.com.", 300, Type::A, "1.1.1.1");
        let second = record("b.example.com.", 300, Type::A, "2.2.2.2");
        let mut directory = MemoryDirectory::new();
        directory.insert_zone("example.com.", [stale.clone()]);
        directory.fail_on(second.clone());

        let desired = RecordSet::from([first.clone(), second.clone()]);
        let mut out = Vec::new();
        let err = reconcile(&mut directory, "example.com.", &desired, &mut out).unwrap_err();
        match &err {
            Error::Directory {
                operation, applied, ..
            } => {
                assert_eq!(
                    *operation,
                    Operation::AddRecord {
                        domain: "example.com.".into(),
                        record: second,
                    }
                );
                assert_eq!(applied.deleted, [stale.clone()]);
                assert_eq!(applied.added, [first.clone()]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("- {}\n+ {}\n", stale, first)
        );
        assert!(err.to_string().contains("b.example.com."));
    }

    #[test]
    fn provider_and_zone_text_names_match() {
        let mut directory = MemoryDirectory::new();
        directory.insert_zone(
            "example.com",
            [
                record("www.example.com", 300, Type::A, "1.2.3.4"),
                record("ftp.example.com", 300, Type::CNAME, "WWW.example.com"),
                mx("example.com", 10, "mail.example.com"),
            ],
        );
        let origin = "example.com.".parse().unwrap();
        let desired = crate::zone_file::parse(
            "www 300 IN A 1.2.3.4\n\
             ftp 300 IN CNAME www\n\
             @ 3600 IN MX 10 mail\n",
            Some(&origin),
        )
        .unwrap();

        let (summary, diff) = run(&mut directory, &desired);
        assert!(summary.is_empty(), "unexpected changes: {}", diff);
        assert_eq!(directory.mutation_count(), 0);
    }

    #[test]
    fn duplicate_spellings_are_collapsed() {
        let dotted = record("www.example.com.", 300, Type::A, "1.2.3.4");
        let bare = record("www.example.com", 300, Type::A, "1.2.3.4");
        let mut directory = MemoryDirectory::new();
        directory.insert_zone("example.com", [dotted.clone(), bare]);

        let (summary, _) = run(&mut directory, &RecordSet::from([dotted]));
        assert_eq!(summary.deleted.len(), 1);
        assert!(summary.added.is_empty());
        assert_eq!(contents(&directory).len(), 1);

        let remaining = contents(&directory);
        let (again, _) = run(&mut directory, &remaining);
        assert!(again.is_empty());
    }

    #[test]
    fn plan_matches_reconcile_without_changes() {
        let stale = record("old.example.com.", 300, Type::A, "5.6.7.8");
        let fresh = record("new.example.com.", 300, Type::A, "1.2.3.4");
        let mut directory = MemoryDirectory::new();
        directory.insert_zone("example.com.", [soa(), stale.clone()]);

        let desired = RecordSet::from([fresh.clone()]);
        let planned = plan(&mut directory, "example.com", &desired).unwrap();
        assert!(planned.zone_exists);
        assert_eq!(planned.to_delete, [stale.clone()]);
        assert_eq!(planned.to_add, [fresh.clone()]);
        assert_eq!(directory.mutation_count(), 0);

        let mut diff = Vec::new();
        planned.write_diff(&mut diff).unwrap();
        let (_, applied_diff) = run(&mut directory, &desired);
        assert_eq!(String::from_utf8(diff).unwrap(), applied_diff);

        let mut empty = MemoryDirectory::new();
        let planned = plan(&mut empty, "example.com.", &desired).unwrap();
        assert!(!planned.zone_exists);
        assert_eq!(planned.to_add, [fresh]);
        assert!(empty.calls().iter().all(|call| !call.is_mutation()));
    }
}
