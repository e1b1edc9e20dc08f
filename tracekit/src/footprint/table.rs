//! PC-keyed footprint tables
//!
//! A run normally owns exactly one table. Traces of JIT-compiled code can
//! load unrelated code at the same address, so the same PC legitimately
//! carries different opcodes; [`LookupMode::MultiTable`] keeps a small ordered
//! collection of tables and searches it linearly for a PC+opcode match before
//! allocating a new one.
//!
//! Tables are stored newest first: a freshly allocated table goes to index 0.

use std::collections::BTreeMap;

use super::entry::FootprintEntry;

/// How a PC that already has an entry with another opcode is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupMode {
    /// One table; a different opcode is a mismatch
    #[default]
    Single,
    /// Disambiguate across several tables
    MultiTable,
}

/// Outcome of resolving a PC+opcode pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Entry with a matching opcode exists in this table
    Hit(usize),
    /// No entry for the PC in this table; create one there
    Vacant(usize),
    /// Entry exists with another opcode (single-table mode only)
    Mismatch { stored: u32 },
}

/// Ordered mapping from PC to footprint entry
#[derive(Debug, Clone, Default)]
pub struct FootprintTable {
    entries: BTreeMap<u64, FootprintEntry>,
}

impl FootprintTable {
    #[must_use]
    pub fn get(&self, pc: u64) -> Option<&FootprintEntry> {
        self.entries.get(&pc)
    }

    #[must_use]
    pub fn contains(&self, pc: u64) -> bool {
        self.entries.contains_key(&pc)
    }

    /// Entries in ascending PC order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &FootprintEntry)> {
        self.entries.iter().map(|(&pc, entry)| (pc, entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the execution counts of every entry
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.entries.values().map(FootprintEntry::count).sum()
    }

    fn matches(&self, pc: u64, opcode: u32) -> bool {
        self.entries.get(&pc).is_some_and(|entry| entry.opcode_matches(opcode))
    }
}

/// The ordered collection of tables owned by one profiler run
#[derive(Debug, Clone)]
pub struct FootprintTables {
    tables: Vec<FootprintTable>,
    active: usize,
    mode: LookupMode,
}

impl FootprintTables {
    #[must_use]
    pub fn new(mode: LookupMode) -> Self {
        Self { tables: vec![FootprintTable::default()], active: 0, mode }
    }

    /// Find where `pc` executing `opcode` belongs
    ///
    /// In multi-table mode this may switch the active table or allocate a
    /// new table at the front of the collection.
    pub fn resolve(&mut self, pc: u64, opcode: u32) -> Lookup {
        match self.mode {
            LookupMode::Single => match self.tables[0].get(pc) {
                None => Lookup::Vacant(0),
                Some(entry) if entry.opcode_matches(opcode) => Lookup::Hit(0),
                Some(entry) => Lookup::Mismatch { stored: entry.opcode() },
            },
            LookupMode::MultiTable => self.resolve_multi(pc, opcode),
        }
    }

    fn resolve_multi(&mut self, pc: u64, opcode: u32) -> Lookup {
        if self.tables[self.active].matches(pc, opcode) {
            return Lookup::Hit(self.active);
        }

        // Last table lacking the PC is where a new entry can go
        let mut fallback = None;
        for (i, table) in self.tables.iter().enumerate() {
            match table.get(pc) {
                Some(entry) if entry.opcode_matches(opcode) => {
                    self.active = i;
                    return Lookup::Hit(i);
                }
                Some(_) => {}
                None => fallback = Some(i),
            }
        }

        match fallback {
            None => {
                // Every table holds this PC with another opcode
                log::debug!(
                    "pc {pc:#x} opcode {opcode:#010x} conflicts with all {} tables, adding one",
                    self.tables.len()
                );
                self.tables.insert(0, FootprintTable::default());
                self.active = 0;
            }
            Some(free) => {
                if self.tables[self.active].contains(pc) {
                    self.active = free;
                }
            }
        }
        Lookup::Vacant(self.active)
    }

    pub fn entry_mut(&mut self, table: usize, pc: u64) -> Option<&mut FootprintEntry> {
        self.tables.get_mut(table)?.entries.get_mut(&pc)
    }

    /// Insert a new entry; returns a reference to it
    pub fn insert(&mut self, table: usize, pc: u64, entry: FootprintEntry) -> Option<&FootprintEntry> {
        let table = self.tables.get_mut(table)?;
        Some(table.entries.entry(pc).or_insert(entry))
    }

    /// Tables, newest first
    #[must_use]
    pub fn tables(&self) -> &[FootprintTable] {
        &self.tables
    }

    #[must_use]
    pub fn into_tables(self) -> Vec<FootprintTable> {
        self.tables
    }

    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.tables.iter().map(FootprintTable::total_count).sum()
    }
}
