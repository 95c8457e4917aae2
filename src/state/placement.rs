//! Chronological insertion logic for player timelines.

use std::collections::BTreeSet;

use crate::state::game::Track;

/// Compute every index at which `track` could be inserted into `timeline`
/// while keeping it sorted by release year.
///
/// The timeline may already contain the candidate itself (a just-placed,
/// not-yet-validated entry); entries sharing the candidate's URL are ignored
/// before comparison. An empty timeline admits exactly index 0. Runs of equal
/// years admit every adjacent boundary, so a 1990/2000/2010 timeline accepts a
/// second 2000 both before and after the existing one.
pub fn correct_positions(track: &Track, timeline: &[Track]) -> BTreeSet<usize> {
    let mut rest: Vec<&Track> = timeline
        .iter()
        .filter(|entry| entry.url != track.url)
        .collect();

    if rest.is_empty() {
        return BTreeSet::from([0]);
    }

    // Stable sort: equal years keep their relative order.
    rest.sort_by_key(|entry| entry.release_year);

    let mut positions = BTreeSet::new();
    for index in 0..=rest.len() {
        let prev = match index.checked_sub(1) {
            Some(before) => rest[before].release_year,
            None => i32::MIN,
        };
        let next = rest.get(index).map_or(i32::MAX, |entry| entry.release_year);

        if prev <= track.release_year && track.release_year <= next {
            positions.insert(index);
        }
    }

    positions
}
