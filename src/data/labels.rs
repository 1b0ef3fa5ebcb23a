use std::collections::HashMap;
use std::fmt;

use log::debug;

// ---------------------------------------------------------------------------
// Change notification
// ---------------------------------------------------------------------------

/// What a mutating call on a [`LabelInfo`] changed. Every successful call
/// emits exactly one event, synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelEvent {
    TypeAdded { label_type: String, index: usize },
    LabelChanged { record: usize, label_type: String },
    Reordered,
    Replaced,
    Cleared,
    ModifiedChanged(bool),
}

pub type LabelListener = Box<dyn FnMut(&LabelEvent) + Send>;

// ---------------------------------------------------------------------------
// Reserved label names
// ---------------------------------------------------------------------------

/// How names that are not explicit label types resolve to a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReservedNames {
    /// Only explicit label types resolve.
    #[default]
    None,
    /// Classic row-label layout: `YORF` and `NAME` fall back to fixed
    /// columns whose position depends on a leading `GID` column.
    RowLabels,
}

/// (name, column without GID, column with GID)
const ROW_RESERVED: &[(&str, usize, usize)] = &[("YORF", 0, 1), ("NAME", 1, 2)];

// ---------------------------------------------------------------------------
// LabelView – read access shared by stores and reordered views
// ---------------------------------------------------------------------------

pub trait LabelView {
    fn label_types(&self) -> &[String];

    fn num_labels(&self) -> usize;

    /// All labels of one record, `None` for an absent record.
    fn labels(&self, record: usize) -> Option<&[String]>;

    /// Column of `label_type` in every record's label array.
    fn index_of(&self, label_type: &str) -> Option<usize>;

    /// Record whose hashed ID equals `id`.
    fn label_index(&self, id: &str) -> Option<usize>;

    fn num_label_types(&self) -> usize {
        self.label_types().len()
    }

    fn label(&self, record: usize, index: usize) -> Option<&str> {
        self.labels(record)?.get(index).map(String::as_str)
    }

    fn label_by_name(&self, record: usize, label_type: &str) -> Option<&str> {
        let index = self.index_of(label_type)?;
        self.label(record, index)
    }
}

// ---------------------------------------------------------------------------
// LabelInfo
// ---------------------------------------------------------------------------

/// Label table for one axis: named label types (the columns of the label
/// block) and one label array per record.
///
/// Every record holds exactly `label_types.len()` labels. The ID index is a
/// snapshot: after adding a label type or reordering, call [`hash_ids`]
/// again before trusting [`label_index`].
///
/// [`hash_ids`]: LabelInfo::hash_ids
/// [`label_index`]: LabelView::label_index
#[derive(Default)]
pub struct LabelInfo {
    label_types: Vec<String>,
    labels: Vec<Vec<String>>,
    id_index: HashMap<String, usize>,
    reserved: ReservedNames,
    modified: bool,
    listeners: Vec<LabelListener>,
}

impl fmt::Debug for LabelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelInfo")
            .field("label_types", &self.label_types)
            .field("num_labels", &self.labels.len())
            .field("reserved", &self.reserved)
            .field("modified", &self.modified)
            .finish()
    }
}

impl LabelInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store using the row-label reserved name table.
    pub fn for_rows() -> Self {
        Self {
            reserved: ReservedNames::RowLabels,
            ..Self::default()
        }
    }

    pub fn from_parts(label_types: Vec<String>, labels: Vec<Vec<String>>) -> Self {
        let mut info = Self::new();
        info.replace(label_types, labels);
        info
    }

    pub fn with_reserved(mut self, reserved: ReservedNames) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn reserved_names(&self) -> ReservedNames {
        self.reserved
    }

    /// Register a listener called after every mutation.
    pub fn subscribe(&mut self, listener: LabelListener) {
        self.listeners.push(listener);
    }

    fn notify(&mut self, event: LabelEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Take over the listeners of the store this one replaces, and tell them
    /// about the new contents.
    pub(crate) fn adopt_listeners(&mut self, previous: &mut LabelInfo) {
        self.listeners.append(&mut previous.listeners);
        self.notify(LabelEvent::Replaced);
    }

    /// Swap in new label types and labels wholesale. Records are padded with
    /// empty labels or truncated to the label-type count. The ID index is
    /// dropped.
    pub fn replace(&mut self, label_types: Vec<String>, mut labels: Vec<Vec<String>>) {
        let width = label_types.len();
        for record in &mut labels {
            record.resize(width, String::new());
        }
        self.label_types = label_types;
        self.labels = labels;
        self.id_index.clear();
        self.notify(LabelEvent::Replaced);
    }

    pub fn clear(&mut self) {
        self.label_types.clear();
        self.labels.clear();
        self.id_index.clear();
        self.modified = false;
        self.notify(LabelEvent::Cleared);
    }

    pub fn label_array(&self) -> &[Vec<String>] {
        &self.labels
    }

    /// Add records at the end, sized to the current label types.
    pub fn append_records(&mut self, records: impl IntoIterator<Item = Vec<String>>) {
        let width = self.label_types.len();
        self.labels.extend(records.into_iter().map(|mut record| {
            record.resize(width, String::new());
            record
        }));
        self.notify(LabelEvent::Replaced);
    }

    /// Keep only the first `len` records.
    pub fn truncate(&mut self, len: usize) {
        self.labels.truncate(len);
        self.id_index.retain(|_, &mut i| i < len);
        self.notify(LabelEvent::Replaced);
    }

    /// Insert a new, empty label type at `index` in every record.
    /// Returns false if the type already exists or `index` is past the end.
    pub fn add_label_type(&mut self, label_type: &str, index: usize) -> bool {
        if self.explicit_index(label_type).is_some() || index > self.label_types.len() {
            return false;
        }
        for record in &mut self.labels {
            record.insert(index, String::new());
        }
        self.label_types.insert(index, label_type.to_string());
        self.modified = true;
        self.notify(LabelEvent::TypeAdded {
            label_type: label_type.to_string(),
            index,
        });
        true
    }

    /// Set one label. Returns false for an unknown record or label type, and
    /// when the label already has this value.
    pub fn set_label(&mut self, record: usize, label_type: &str, value: &str) -> bool {
        let Some(index) = self.index_of(label_type) else {
            return false;
        };
        let Some(cell) = self.labels.get_mut(record).and_then(|r| r.get_mut(index)) else {
            return false;
        };
        if cell.as_str() == value {
            return false;
        }
        *cell = value.to_string();
        self.modified = true;
        self.notify(LabelEvent::LabelChanged {
            record,
            label_type: label_type.to_string(),
        });
        true
    }

    /// Put record `ordering[i]` at position `i`. The ordering must be a
    /// permutation of all records.
    pub fn reorder_labels(&mut self, ordering: &[usize]) -> bool {
        if !is_permutation(ordering, self.labels.len()) {
            debug!(
                "Rejected reordering of {} labels with {} indices",
                self.labels.len(),
                ordering.len()
            );
            return false;
        }
        let mut old: Vec<Option<Vec<String>>> =
            std::mem::take(&mut self.labels).into_iter().map(Some).collect();
        self.labels = ordering
            .iter()
            .map(|&from| old[from].take().unwrap_or_default())
            .collect();
        self.modified = true;
        self.notify(LabelEvent::Reordered);
        true
    }

    /// Rebuild the ID index from the values of `label_type` (the first label
    /// type if it does not exist). Later duplicates win.
    pub fn hash_ids(&mut self, label_type: &str) {
        self.id_index.clear();
        if self.label_types.is_empty() {
            return;
        }
        let column = self.index_of(label_type).unwrap_or(0);
        self.id_index.reserve(self.labels.len());
        for (i, record) in self.labels.iter().enumerate() {
            if let Some(id) = record.get(column) {
                self.id_index.insert(id.clone(), i);
            }
        }
    }

    pub fn id_index(&self) -> &HashMap<String, usize> {
        &self.id_index
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
        self.notify(LabelEvent::ModifiedChanged(modified));
    }

    fn explicit_index(&self, label_type: &str) -> Option<usize> {
        self.label_types
            .iter()
            .position(|t| t.eq_ignore_ascii_case(label_type))
    }

    fn reserved_index(&self, label_type: &str) -> Option<usize> {
        let table = match self.reserved {
            ReservedNames::None => return None,
            ReservedNames::RowLabels => ROW_RESERVED,
        };
        let has_gid = self.explicit_index("GID").is_some();
        table
            .iter()
            .find(|(name, _, _)| name.eq_ignore_ascii_case(label_type))
            .map(|&(_, plain, with_gid)| if has_gid { with_gid } else { plain })
            .filter(|&index| index < self.label_types.len())
    }
}

impl LabelView for LabelInfo {
    fn label_types(&self) -> &[String] {
        &self.label_types
    }

    fn num_labels(&self) -> usize {
        self.labels.len()
    }

    fn labels(&self, record: usize) -> Option<&[String]> {
        self.labels.get(record).map(Vec::as_slice)
    }

    /// Case-insensitive; falls back to the reserved name table.
    fn index_of(&self, label_type: &str) -> Option<usize> {
        self.explicit_index(label_type)
            .or_else(|| self.reserved_index(label_type))
    }

    fn label_index(&self, id: &str) -> Option<usize> {
        self.id_index.get(id).copied()
    }
}

pub(crate) fn is_permutation(ordering: &[usize], len: usize) -> bool {
    if ordering.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in ordering {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn genes() -> LabelInfo {
        LabelInfo::from_parts(
            strings(&["GID", "YORF", "NAME"]),
            vec![
                strings(&["GENE0X", "YAL001C", "alpha"]),
                strings(&["GENE1X", "YAL002W", "beta"]),
                strings(&["GENE2X", "YAL003W", "gamma"]),
            ],
        )
        .with_reserved(ReservedNames::RowLabels)
    }

    #[test]
    fn lookup_by_index_and_name() {
        let info = genes();
        assert_eq!(info.label(1, 2), Some("beta"));
        assert_eq!(info.label_by_name(2, "yorf"), Some("YAL003W"));
        assert_eq!(info.label_by_name(0, "EWEIGHT"), None);
        assert_eq!(info.label(7, 0), None);
    }

    #[test]
    fn add_label_type_widens_every_record() {
        let mut info = genes();
        assert!(info.add_label_type("GWEIGHT", 1));
        assert_eq!(info.label_types(), &strings(&["GID", "GWEIGHT", "YORF", "NAME"])[..]);
        assert!(info.label_array().iter().all(|r| r.len() == 4));
        assert_eq!(info.label(0, 2), Some("YAL001C"));
        assert!(info.is_modified());

        assert!(!info.add_label_type("gweight", 0));
        assert!(!info.add_label_type("OTHER", 9));
    }

    #[test]
    fn set_label_ignores_unchanged_values() {
        let mut info = genes();
        assert!(!info.set_label(0, "NAME", "alpha"));
        assert!(!info.is_modified());
        assert!(info.set_label(0, "NAME", "delta"));
        assert_eq!(info.label_by_name(0, "NAME"), Some("delta"));
        assert!(info.is_modified());
        assert!(!info.set_label(5, "NAME", "x"));
        assert!(!info.set_label(0, "MISSING", "x"));
    }

    #[test]
    fn reorder_requires_full_permutation() {
        let mut info = genes();
        assert!(!info.reorder_labels(&[0, 1]));
        assert!(!info.reorder_labels(&[0, 0, 1]));
        assert!(info.reorder_labels(&[2, 0, 1]));
        assert_eq!(info.label(0, 0), Some("GENE2X"));
        assert_eq!(info.label(1, 0), Some("GENE0X"));
    }

    #[test]
    fn hash_ids_is_a_stale_snapshot_until_rebuilt() {
        let mut info = genes();
        info.hash_ids("GID");
        assert_eq!(info.label_index("GENE2X"), Some(2));
        let first = info.id_index().clone();
        info.hash_ids("GID");
        assert_eq!(&first, info.id_index());

        info.reorder_labels(&[2, 1, 0]);
        assert_eq!(info.label_index("GENE2X"), Some(2));
        info.hash_ids("GID");
        assert_eq!(info.label_index("GENE2X"), Some(0));
    }

    #[test]
    fn reserved_names_resolve_by_gid_presence() {
        let with_gid = genes();
        let info = LabelInfo::from_parts(strings(&["ID", "ORF", "DESC"]), Vec::new())
            .with_reserved(ReservedNames::RowLabels);
        assert_eq!(info.index_of("YORF"), Some(0));
        assert_eq!(info.index_of("NAME"), Some(1));
        assert_eq!(with_gid.index_of("NAME"), Some(2));

        let plain = LabelInfo::from_parts(strings(&["ID"]), Vec::new());
        assert_eq!(plain.index_of("NAME"), None);
    }

    #[test]
    fn listeners_see_one_event_per_call() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut info = genes();
        info.subscribe(Box::new(move |event| sink.lock().unwrap().push(event.clone())));

        info.set_label(1, "NAME", "b");
        info.set_label(1, "NAME", "b");
        info.reorder_labels(&[1, 0, 2]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0],
            LabelEvent::LabelChanged {
                record: 1,
                label_type: "NAME".to_string()
            }
        );
        assert_eq!(seen[1], LabelEvent::Reordered);
    }
}
