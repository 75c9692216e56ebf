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

//! The [`ZoneDirectory`] trait and an in-memory implementation of it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::rr::{Rdata, Record, Type};

/// The lowest TTL a provider accepts for a new record.
pub const MIN_TTL: u32 = 300;

////////////////////////////////////////////////////////////////////////
// DIRECTORY TRAIT                                                    //
////////////////////////////////////////////////////////////////////////

/// Trait for the record-management interface of a DNS provider.
///
/// A directory holds zones, each identified by its domain and by an
/// opaque identifier that the provider assigns. Records within a zone
/// likewise carry provider-assigned identifiers, which are needed to
/// delete them. There is no update primitive: changing a record means
/// deleting it and adding the new version.
///
/// Implementations talk to the provider however it requires (scraping
/// a web control panel, for instance). Every method may fail with a
/// [`DirectoryError`].
pub trait ZoneDirectory {
    /// The provider's identifier for a zone.
    type ZoneId: Clone + fmt::Debug;

    /// The provider's identifier for a record.
    type RecordId: Clone + fmt::Debug;

    /// Lists the zones in the directory by domain.
    fn list_zones(&mut self) -> Result<HashMap<String, Self::ZoneId>, DirectoryError>;

    /// Creates an empty zone for `domain`.
    fn create_zone(&mut self, domain: &str) -> Result<Self::ZoneId, DirectoryError>;

    /// Lists the records in a zone, including the provider-managed SOA
    /// record.
    fn list_records(
        &mut self,
        zone: &Self::ZoneId,
    ) -> Result<Vec<(Record, Self::RecordId)>, DirectoryError>;

    /// Adds a record to a zone. Providers reject TTLs below
    /// [`MIN_TTL`].
    fn add_record(&mut self, zone: &Self::ZoneId, record: &Record) -> Result<(), DirectoryError>;

    /// Deletes a record from a zone.
    fn delete_record(
        &mut self,
        zone: &Self::ZoneId,
        record: &Self::RecordId,
    ) -> Result<(), DirectoryError>;
}

/// Returns whether two domains name the same zone. Directories differ
/// on whether they write the trailing dot, so it is ignored, as is
/// ASCII case.
pub fn same_domain(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error returned by a [`ZoneDirectory`].
///
/// Since directories are implemented outside of this crate, this just
/// wraps whatever error the implementation produced.
#[derive(Debug)]
pub struct DirectoryError {
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl DirectoryError {
    pub fn new<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            source: source.into(),
        }
    }
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.source.fmt(f)
    }
}

impl std::error::Error for DirectoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.source()
    }
}

////////////////////////////////////////////////////////////////////////
// IN-MEMORY DIRECTORY                                                //
////////////////////////////////////////////////////////////////////////

/// A [`ZoneDirectory`] kept in memory.
///
/// Identifiers are sequential integers. Like a real provider, the
/// directory gives every new zone an SOA record, and rejects added
/// records whose TTL is below [`MIN_TTL`].
///
/// Every call is recorded (see [`MemoryDirectory::calls`]), and
/// failures can be injected for particular records with
/// [`MemoryDirectory::fail_on`].
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    zones: BTreeMap<u64, MemoryZone>,
    next_id: u64,
    calls: Vec<Call>,
    failing: HashSet<Record>,
}

#[derive(Debug)]
struct MemoryZone {
    domain: String,
    records: BTreeMap<u64, Record>,
}

/// A call made on a [`MemoryDirectory`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    ListZones,
    CreateZone(String),
    ListRecords(u64),
    AddRecord(u64, Record),
    DeleteRecord(u64, u64),
}

impl Call {
    /// Returns whether the call changes the directory.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateZone(_) | Self::AddRecord(..) | Self::DeleteRecord(..)
        )
    }
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a zone with the given records, bypassing the TTL floor
    /// and the call log. No SOA record is added. This is for loading
    /// existing state.
    pub fn insert_zone<I>(&mut self, domain: &str, records: I) -> u64
    where
        I: IntoIterator<Item = Record>,
    {
        let zone_id = self.allocate_id();
        let mut zone = MemoryZone {
            domain: domain.to_owned(),
            records: BTreeMap::new(),
        };
        for record in records {
            let record_id = self.allocate_id();
            zone.records.insert(record_id, record);
        }
        self.zones.insert(zone_id, zone);
        zone_id
    }

    /// Returns an iterator over the zones, giving each domain and its
    /// records.
    pub fn zones(&self) -> impl Iterator<Item = (&str, Vec<&Record>)> {
        self.zones
            .values()
            .map(|zone| (zone.domain.as_str(), zone.records.values().collect()))
    }

    /// Returns the records of the zone for `domain`, if there is one.
    pub fn records(&self, domain: &str) -> Option<Vec<&Record>> {
        self.zones
            .values()
            .find(|zone| same_domain(&zone.domain, domain))
            .map(|zone| zone.records.values().collect())
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Returns the number of calls made so far that changed the
    /// directory.
    pub fn mutation_count(&self) -> usize {
        self.calls.iter().filter(|call| call.is_mutation()).count()
    }

    /// Makes adding or deleting `record` fail from now on.
    pub fn fail_on(&mut self, record: Record) {
        self.failing.insert(record);
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn zone_mut(&mut self, zone: u64) -> Result<&mut MemoryZone, DirectoryError> {
        self.zones
            .get_mut(&zone)
            .ok_or_else(|| DirectoryError::new(format!("no zone with ID {}", zone)))
    }
}

impl ZoneDirectory for MemoryDirectory {
    type ZoneId = u64;
    type RecordId = u64;

    fn list_zones(&mut self) -> Result<HashMap<String, u64>, DirectoryError> {
        self.calls.push(Call::ListZones);
        Ok(self
            .zones
            .iter()
            .map(|(id, zone)| (zone.domain.clone(), *id))
            .collect())
    }

    fn create_zone(&mut self, domain: &str) -> Result<u64, DirectoryError> {
        self.calls.push(Call::CreateZone(domain.to_owned()));
        if self.zones.values().any(|zone| same_domain(&zone.domain, domain)) {
            return Err(DirectoryError::new(format!("zone {} already exists", domain)));
        }
        let apex = format!("{}.", domain.trim_end_matches('.'));
        let soa = Record::new(
            apex.clone(),
            86400,
            Type::SOA,
            Rdata::Text(format!("ns1.{apex} hostmaster.{apex} 1 10800 1800 604800 86400")),
        )
        .map_err(DirectoryError::new)?;
        Ok(self.insert_zone(domain, [soa]))
    }

    fn list_records(&mut self, zone: &u64) -> Result<Vec<(Record, u64)>, DirectoryError> {
        self.calls.push(Call::ListRecords(*zone));
        let zone = self.zone_mut(*zone)?;
        Ok(zone
            .records
            .iter()
            .map(|(id, record)| (record.clone(), *id))
            .collect())
    }

    fn add_record(&mut self, zone: &u64, record: &Record) -> Result<(), DirectoryError> {
        self.calls.push(Call::AddRecord(*zone, record.clone()));
        if self.failing.contains(record) {
            return Err(DirectoryError::new(format!("injected failure adding {}", record)));
        } else if record.ttl() < MIN_TTL {
            return Err(DirectoryError::new(format!(
                "TTL {} is below the minimum of {}",
                record.ttl(),
                MIN_TTL
            )));
        }
        let record_id = self.allocate_id();
        self.zone_mut(*zone)?.records.insert(record_id, record.clone());
        Ok(())
    }

    fn delete_record(&mut self, zone: &u64, record: &u64) -> Result<(), DirectoryError> {
        self.calls.push(Call::DeleteRecord(*zone, *record));
        let failing = &self.failing;
        let zone = self
            .zones
            .get_mut(zone)
            .ok_or_else(|| DirectoryError::new(format!("no zone with ID {}", zone)))?;
        match zone.records.get(record) {
            Some(existing) if failing.contains(existing) => Err(DirectoryError::new(format!(
                "injected failure deleting {}",
                existing
            ))),
            Some(_) => {
                zone.records.remove(record);
                Ok(())
            }
            None => Err(DirectoryError::new(format!("no record with ID {}", record))),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn a(name: &str, ttl: u32, address: &str) -> Record {
        Record::new(name, ttl, Type::A, Rdata::Text(address.into())).unwrap()
    }

    #[test]
    fn created_zones_get_an_soa_record() {
        let mut directory = MemoryDirectory::new();
        let zone = directory.create_zone("example.com").unwrap();
        let records = directory.list_records(&zone).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0.rr_type(), Type::SOA);
        assert_eq!(records[0].0.name(), "example.com.");
        assert!(directory.create_zone("EXAMPLE.com.").is_err());
    }

    #[test]
    fn add_enforces_the_ttl_floor() {
        let mut directory = MemoryDirectory::new();
        let zone = directory.insert_zone("example.com.", []);
        assert!(directory
            .add_record(&zone, &a("example.com.", 299, "1.2.3.4"))
            .is_err());
        directory
            .add_record(&zone, &a("example.com.", 300, "1.2.3.4"))
            .unwrap();
        assert_eq!(directory.records("example.com").unwrap().len(), 1);
    }

    #[test]
    fn injected_failures_apply_to_add_and_delete() {
        let record = a("example.com.", 300, "1.2.3.4");
        let mut directory = MemoryDirectory::new();
        let zone = directory.insert_zone("example.com.", [record.clone()]);
        directory.fail_on(record.clone());
        let (_, id) = directory.list_records(&zone).unwrap()[0].clone();
        assert!(directory.delete_record(&zone, &id).is_err());
        assert!(directory.add_record(&zone, &record).is_err());
        assert_eq!(directory.mutation_count(), 2);
        assert_eq!(directory.calls()[0], Call::ListRecords(zone));
    }

    #[test]
    fn domains_match_without_case_or_trailing_dot() {
        assert!(same_domain("Example.COM.", "example.com"));
        assert!(!same_domain("example.com", "www.example.com"));
    }
}
