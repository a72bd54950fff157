use std::cmp::Ordering;

use crate::apis::RunTimes;

/// Order two runs for display: most recently started first.
///
/// Runs that have not started yet go after every started run and are
/// ordered among themselves by creation time (newest first). Remaining ties
/// are broken by name so the order is total.
pub fn compare_runs<T: RunTimes>(a: &T, b: &T) -> Ordering {
    let by_start = match (a.start_time(), b.start_time()) {
        (Some(a_start), Some(b_start)) => b_start.0.cmp(&a_start.0),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => {
            let a_created = a.creation_timestamp().map(|t| t.0);
            let b_created = b.creation_timestamp().map(|t| t.0);
            b_created.cmp(&a_created)
        }
    };
    by_start.then_with(|| a.name().cmp(b.name()))
}

pub fn sort_by_start_time<T: RunTimes>(runs: &mut [T]) {
    runs.sort_by(compare_runs);
}

/// Keep the first `limit` runs; a non-positive limit keeps everything.
pub fn truncate<T>(runs: &mut Vec<T>, limit: i64) {
    if limit > 0 {
        runs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
}
