//! Read-request evaluation over any `Store`.
//!
//! Shared by the heap and the change log, which is itself read through the
//! same protocol keyed by sequence number.

use std::ops::Bound;

use crate::error::{HeapError, HeapResult};
use crate::protocol::{KeyRange, Projection, RangeOutput, Request, Response};
use crate::store::Store;

/// Ascending `(lower, upper)` bounds for a range, or `None` when it selects nothing.
///
/// Fails with `InvalidRange` when the bounds run against the traversal direction.
pub fn resolve_bounds<'r, I: Ord + std::fmt::Debug>(
    range: &'r KeyRange<I>,
    desc: bool,
) -> HeapResult<Option<(Bound<&'r I>, Bound<&'r I>)>> {
    let bound = |index: &'r Option<I>, exclusive: bool| match index {
        None => Bound::Unbounded,
        Some(i) if exclusive => Bound::Excluded(i),
        Some(i) => Bound::Included(i),
    };
    let start = bound(&range.from, range.from_exclusive);
    let end = bound(&range.to, range.to_exclusive);

    if let (Some(from), Some(to)) = (&range.from, &range.to) {
        let inverted = if desc { from < to } else { from > to };
        if inverted {
            return Err(HeapError::InvalidRange {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
                direction: if desc { "descending" } else { "ascending" },
            });
        }
        if from == to && (range.from_exclusive || range.to_exclusive) {
            return Ok(None);
        }
    }

    Ok(Some(if desc { (end, start) } else { (start, end) }))
}

/// Evaluate one read request. Write requests are rejected by the caller.
pub(crate) fn read<I, T, S>(store: &S, request: &Request<I, T>, default_limit: Option<usize>) -> HeapResult<Response<I, T>>
where
    I: Ord + Clone + std::fmt::Debug,
    T: Clone,
    S: Store<I, T>,
{
    match request {
        Request::Get { indexes } => Ok(Response::Get {
            entries: indexes.iter().map(|i| (i.clone(), store.get(i).cloned())).collect(),
        }),
        Request::GetCount => Ok(Response::GetCount { count: store.len() }),
        Request::GetRange { range, limit, desc, projection } => {
            let limit = limit.or(default_limit).unwrap_or(usize::MAX);
            let Some((lower, upper)) = resolve_bounds(range, *desc)? else {
                return Ok(Response::GetRange { output: empty_output(*projection) });
            };
            let iter = store.range(lower, upper);
            let iter: Box<dyn Iterator<Item = (&I, &T)> + '_> =
                if *desc { Box::new(iter.rev()) } else { Box::new(iter) };
            let iter = iter.take(limit);

            let output = match projection {
                Projection::Entries => RangeOutput::Entries(iter.map(|(i, t)| (i.clone(), t.clone())).collect()),
                Projection::IndexesOnly => RangeOutput::Indexes(iter.map(|(i, _)| i.clone()).collect()),
                Projection::ItemsOnly => RangeOutput::Items(iter.map(|(_, t)| t.clone()).collect()),
            };
            Ok(Response::GetRange { output })
        }
        other => Err(HeapError::UnexpectedRequest { kind: other.kind(), request: 0, context: "get" }),
    }
}

fn empty_output<I, T>(projection: Projection) -> RangeOutput<I, T> {
    match projection {
        Projection::Entries => RangeOutput::Entries(Vec::new()),
        Projection::IndexesOnly => RangeOutput::Indexes(Vec::new()),
        Projection::ItemsOnly => RangeOutput::Items(Vec::new()),
    }
}

/// Evaluate a read-only batch in order.
pub(crate) fn read_batch<I, T, S>(store: &S, requests: &[Request<I, T>], default_limit: Option<usize>) -> HeapResult<Vec<Response<I, T>>>
where
    I: Ord + Clone + std::fmt::Debug,
    T: Clone,
    S: Store<I, T>,
{
    if let Some((pos, req)) = requests.iter().enumerate().find(|(_, r)| r.kind().is_write()) {
        return Err(HeapError::UnexpectedRequest { kind: req.kind(), request: pos, context: "get" });
    }
    requests.iter().map(|r| read(store, r, default_limit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BTreeStore;

    fn store() -> BTreeStore<u64, String> {
        (1..=6).map(|i| (i, format!("v{}", i))).collect()
    }

    fn range_req(range: KeyRange<u64>, limit: Option<usize>, desc: bool, projection: Projection) -> Request<u64, String> {
        Request::GetRange { range, limit, desc, projection }
    }

    #[test]
    fn test_ascending_range_with_limit() {
        let s = store();
        let resp = read(&s, &range_req(KeyRange::inclusive(2, 5), Some(2), false, Projection::IndexesOnly), None).unwrap();
        assert_eq!(resp, Response::GetRange { output: RangeOutput::Indexes(vec![2, 3]) });
    }

    #[test]
    fn test_descending_range_starts_at_from() {
        let s = store();
        let range = KeyRange::inclusive(5, 2).exclude_to();
        let resp = read(&s, &range_req(range, None, true, Projection::IndexesOnly), None).unwrap();
        assert_eq!(resp, Response::GetRange { output: RangeOutput::Indexes(vec![5, 4, 3]) });
    }

    #[test]
    fn test_inverted_range_rejected() {
        let s = store();
        let err = read(&s, &range_req(KeyRange::inclusive(5, 2), None, false, Projection::Entries), None).unwrap_err();
        assert!(matches!(err, HeapError::InvalidRange { direction: "ascending", .. }));

        let err = read(&s, &range_req(KeyRange::inclusive(2, 5), None, true, Projection::Entries), None).unwrap_err();
        assert!(matches!(err, HeapError::InvalidRange { direction: "descending", .. }));
    }

    #[test]
    fn test_equal_exclusive_bounds_select_nothing() {
        let s = store();
        let range = KeyRange::inclusive(3, 3).exclude_from().exclude_to();
        let resp = read(&s, &range_req(range, None, false, Projection::ItemsOnly), None).unwrap();
        assert_eq!(resp, Response::GetRange { output: RangeOutput::Items(vec![]) });
    }

    #[test]
    fn test_default_limit_applies_when_unset() {
        let s = store();
        let resp = read(&s, &range_req(KeyRange::all(), None, false, Projection::IndexesOnly), Some(4)).unwrap();
        assert_eq!(resp.into_indexes().unwrap().len(), 4);
    }

    #[test]
    fn test_point_get_reports_absent() {
        let s = store();
        let resp = read(&s, &Request::get(vec![1, 99]), None).unwrap();
        assert_eq!(
            resp.into_entries().unwrap(),
            vec![(1, Some("v1".to_string())), (99, None)]
        );
    }

    #[test]
    fn test_write_in_read_batch_rejected() {
        let s = store();
        let err = read_batch(&s, &[Request::GetCount, Request::delete(vec![1])], None).unwrap_err();
        assert!(matches!(err, HeapError::UnexpectedRequest { request: 1, context: "get", .. }));
    }
}
