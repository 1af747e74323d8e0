//! Channel bindings and recorded samples.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// What a channel id is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelBinding {
    pub type_name: String,
    /// Instance number for types logged more than once (e.g. two IMUs).
    pub multi_id: u8,
}

/// Maps the numeric ids used by data frames to type names.
///
/// Ids are assigned by the logger and need not be contiguous. Registering an
/// id again rebinds it (last write wins).
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    bindings: HashMap<u16, ChannelBinding>,
}

impl ChannelTable {
    /// Bind `id`, returning the previous binding if there was one.
    pub fn register(&mut self, id: u16, type_name: &str, multi_id: u8) -> Option<ChannelBinding> {
        self.bindings.insert(
            id,
            ChannelBinding {
                type_name: type_name.to_string(),
                multi_id,
            },
        )
    }

    pub fn deregister(&mut self, id: u16) -> Option<ChannelBinding> {
        self.bindings.remove(&id)
    }

    pub fn lookup(&self, id: u16) -> Option<&ChannelBinding> {
        self.bindings.get(&id)
    }

    /// Current bindings, ordered by id.
    pub fn bindings(&self) -> BTreeMap<u16, &ChannelBinding> {
        self.bindings.iter().map(|(id, b)| (*id, b)).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// One logged instance of a type: the raw bytes after the channel id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub multi_id: u8,
    pub payload: Vec<u8>,
}

/// Samples per type name, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    series: HashMap<String, Vec<Sample>>,
}

impl SampleStore {
    pub fn append(&mut self, type_name: &str, multi_id: u8, payload: &[u8]) {
        let sample = Sample {
            multi_id,
            payload: payload.to_vec(),
        };
        match self.series.get_mut(type_name) {
            Some(samples) => samples.push(sample),
            None => {
                self.series.insert(type_name.to_string(), vec![sample]);
            }
        }
    }

    /// All samples for a type. Empty if nothing was logged.
    pub fn samples(&self, type_name: &str) -> &[Sample] {
        self.series.get(type_name).map_or(&[], Vec::as_slice)
    }

    /// Type names that have at least one sample, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.series.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Distinct instance ids seen for a type, sorted.
    pub fn instances(&self, type_name: &str) -> Vec<u8> {
        let mut ids: Vec<u8> = self.samples(type_name).iter().map(|s| s.multi_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn total(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}
