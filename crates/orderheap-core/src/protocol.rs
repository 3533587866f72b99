//! Request/response vocabulary shared by every heap implementation.
//!
//! A batch is a `Vec<Request>`; it resolves to a `Vec<Response>` of the same
//! length where `responses[i].kind() == requests[i].kind()`. Write batches are
//! always applied in phase order: deletes, then puts, then adds.

use std::fmt;

/// Protocol revision carried by encoded frames.
pub const PROTOCOL_VERSION: u8 = 1;

/// An (index, item) pair.
pub type Entry<I, T> = (I, T);

/// Stable tag for each request kind.
///
/// Discriminants are part of the encoded format and must never be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestKind {
    Get = 1,
    GetCount = 2,
    GetRange = 3,
    Add = 4,
    Put = 5,
    Delete = 6,
    DeleteRange = 7,
}

impl RequestKind {
    /// Parse a tag read from the wire.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => RequestKind::Get,
            2 => RequestKind::GetCount,
            3 => RequestKind::GetRange,
            4 => RequestKind::Add,
            5 => RequestKind::Put,
            6 => RequestKind::Delete,
            7 => RequestKind::DeleteRange,
            _ => return None,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn is_read(self) -> bool {
        matches!(self, RequestKind::Get | RequestKind::GetCount | RequestKind::GetRange)
    }

    pub fn is_write(self) -> bool {
        !self.is_read()
    }

    /// Position of a write kind in the fixed batch order (deletes first).
    pub fn phase(self) -> Option<u8> {
        match self {
            RequestKind::Delete | RequestKind::DeleteRange => Some(0),
            RequestKind::Put => Some(1),
            RequestKind::Add => Some(2),
            _ => None,
        }
    }
}

/// Optional, possibly exclusive bounds over the index order.
///
/// Bounds are relative to traversal: an ascending scan walks from `from` up
/// to `to`, a descending scan walks from `from` down to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange<I> {
    pub from: Option<I>,
    pub from_exclusive: bool,
    pub to: Option<I>,
    pub to_exclusive: bool,
}

impl<I> KeyRange<I> {
    /// The whole keyspace.
    pub fn all() -> Self {
        Self { from: None, from_exclusive: false, to: None, to_exclusive: false }
    }

    /// `from..=to`
    pub fn inclusive(from: I, to: I) -> Self {
        Self { from: Some(from), from_exclusive: false, to: Some(to), to_exclusive: false }
    }

    /// `from..to`
    pub fn half_open(from: I, to: I) -> Self {
        Self { from: Some(from), from_exclusive: false, to: Some(to), to_exclusive: true }
    }

    pub fn starting_at(from: I) -> Self {
        Self { from: Some(from), ..Self::all() }
    }

    pub fn ending_at(to: I) -> Self {
        Self { to: Some(to), ..Self::all() }
    }

    pub fn exclude_from(mut self) -> Self {
        self.from_exclusive = true;
        self
    }

    pub fn exclude_to(mut self) -> Self {
        self.to_exclusive = true;
        self
    }
}

impl<I> Default for KeyRange<I> {
    fn default() -> Self {
        Self::all()
    }
}

/// What a range scan materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    Entries,
    IndexesOnly,
    ItemsOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<I, T> {
    /// Point lookups; absent indexes resolve to `None`.
    Get { indexes: Vec<I> },
    /// Number of live entries.
    GetCount,
    GetRange {
        range: KeyRange<I>,
        limit: Option<usize>,
        desc: bool,
        projection: Projection,
    },
    /// Insert items under freshly allocated indexes.
    Add { items: Vec<T>, return_indexes: bool },
    /// Upsert. With `require_existing` every index must already be live.
    Put { entries: Vec<Entry<I, T>>, require_existing: bool },
    /// Deleting an absent index is a no-op.
    Delete { indexes: Vec<I> },
    DeleteRange { range: KeyRange<I> },
}

impl<I, T> Request<I, T> {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Get { .. } => RequestKind::Get,
            Request::GetCount => RequestKind::GetCount,
            Request::GetRange { .. } => RequestKind::GetRange,
            Request::Add { .. } => RequestKind::Add,
            Request::Put { .. } => RequestKind::Put,
            Request::Delete { .. } => RequestKind::Delete,
            Request::DeleteRange { .. } => RequestKind::DeleteRange,
        }
    }

    pub fn get(indexes: impl Into<Vec<I>>) -> Self {
        Request::Get { indexes: indexes.into() }
    }

    /// Ascending scan returning full entries.
    pub fn range(range: KeyRange<I>) -> Self {
        Request::GetRange { range, limit: None, desc: false, projection: Projection::Entries }
    }

    pub fn add(items: impl Into<Vec<T>>) -> Self {
        Request::Add { items: items.into(), return_indexes: true }
    }

    pub fn put(entries: impl Into<Vec<Entry<I, T>>>) -> Self {
        Request::Put { entries: entries.into(), require_existing: false }
    }

    pub fn delete(indexes: impl Into<Vec<I>>) -> Self {
        Request::Delete { indexes: indexes.into() }
    }

    pub fn delete_range(range: KeyRange<I>) -> Self {
        Request::DeleteRange { range }
    }

    /// Number of indexes, items or entries carried by the request.
    pub fn entry_count(&self) -> usize {
        match self {
            Request::Get { indexes } | Request::Delete { indexes } => indexes.len(),
            Request::Add { items, .. } => items.len(),
            Request::Put { entries, .. } => entries.len(),
            Request::GetCount | Request::GetRange { .. } | Request::DeleteRange { .. } => 0,
        }
    }
}

/// Materialized output of a range scan, shaped by its `Projection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutput<I, T> {
    Entries(Vec<Entry<I, T>>),
    Indexes(Vec<I>),
    Items(Vec<T>),
}

impl<I, T> RangeOutput<I, T> {
    pub fn len(&self) -> usize {
        match self {
            RangeOutput::Entries(v) => v.len(),
            RangeOutput::Indexes(v) => v.len(),
            RangeOutput::Items(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response<I, T> {
    Get { entries: Vec<Entry<I, Option<T>>> },
    GetCount { count: usize },
    GetRange { output: RangeOutput<I, T> },
    /// `indexes` is `Some` only when the request asked for them.
    Add { indexes: Option<Vec<I>> },
    Put,
    Delete,
    DeleteRange,
}

impl<I, T> Response<I, T> {
    pub fn kind(&self) -> RequestKind {
        match self {
            Response::Get { .. } => RequestKind::Get,
            Response::GetCount { .. } => RequestKind::GetCount,
            Response::GetRange { .. } => RequestKind::GetRange,
            Response::Add { .. } => RequestKind::Add,
            Response::Put => RequestKind::Put,
            Response::Delete => RequestKind::Delete,
            Response::DeleteRange => RequestKind::DeleteRange,
        }
    }

    /// Entries of a `Get` response.
    pub fn into_entries(self) -> Option<Vec<Entry<I, Option<T>>>> {
        match self {
            Response::Get { entries } => Some(entries),
            _ => None,
        }
    }

    /// Allocated indexes of an `Add` response.
    pub fn into_indexes(self) -> Option<Vec<I>> {
        match self {
            Response::Add { indexes } => indexes,
            Response::GetRange { output: RangeOutput::Indexes(indexes) } => Some(indexes),
            _ => None,
        }
    }

    pub fn count(&self) -> Option<usize> {
        match self {
            Response::GetCount { count } => Some(*count),
            _ => None,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Get => "get",
            RequestKind::GetCount => "getCount",
            RequestKind::GetRange => "getRange",
            RequestKind::Add => "add",
            RequestKind::Put => "put",
            RequestKind::Delete => "delete",
            RequestKind::DeleteRange => "deleteRange",
        };
        f.write_str(name)
    }
}
