//! Index allocation for `Add` requests.

use std::fmt::Debug;

/// An orderable heap index that can allocate its own successors.
pub trait HeapIndex: Ord + Clone + Debug {
    /// A value strictly greater than `after`, or the first index when
    /// nothing has been allocated. `None` when the index space is exhausted.
    fn successor(after: Option<&Self>) -> Option<Self>;
}

macro_rules! integer_index {
    ($($ty:ty),*) => {
        $(
            impl HeapIndex for $ty {
                fn successor(after: Option<&Self>) -> Option<Self> {
                    match after {
                        None => Some(1),
                        Some(last) if *last < 1 => Some(1),
                        Some(last) => last.checked_add(1),
                    }
                }
            }
        )*
    };
}

integer_index!(u16, u32, u64, u128, usize, i32, i64);

/// Width of generated string indexes; keeps lexical order equal to numeric order.
const STRING_INDEX_WIDTH: usize = 20;

/// Joins a caller-chosen index to the counter allocated beneath it.
const STRING_INDEX_SEPARATOR: char = '/';

fn padded(counter: u64) -> String {
    format!("{counter:0width$}", width = STRING_INDEX_WIDTH)
}

/// Successor of a generated counter, `None` if `s` is not one or is saturated.
fn next_counter(s: &str) -> Option<u64> {
    if s.len() != STRING_INDEX_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok()?.checked_add(1)
}

impl HeapIndex for String {
    fn successor(after: Option<&Self>) -> Option<Self> {
        let Some(last) = after else {
            return Some(padded(1));
        };
        if let Some(next) = next_counter(last) {
            return Some(padded(next));
        }
        if let Some((prefix, tail)) = last.rsplit_once(STRING_INDEX_SEPARATOR) {
            if let Some(next) = next_counter(tail) {
                return Some(format!("{prefix}{STRING_INDEX_SEPARATOR}{}", padded(next)));
            }
        }
        // A caller-chosen index sorts last; start a counter beneath it.
        Some(format!("{last}{STRING_INDEX_SEPARATOR}{}", padded(1)))
    }
}
