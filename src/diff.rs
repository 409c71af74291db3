use smallvec::{SmallVec, smallvec};

/// One step of an edit script transforming an old sibling sequence into a
/// new one.
///
/// Coordinate convention, fixed by the delivery order of
/// [`diff_siblings`]:
///
/// - `Removed` positions index the old sequence (removals are delivered
///   first, in descending position, so old indices stay valid);
/// - `Inserted`, `Changed` and the `to` side of `Moved` index the new
///   sequence;
/// - the `from` side of `Moved` indexes the partially edited sequence at the
///   moment the op is delivered.
///
/// Applying the ops in delivered order to the old sequence reproduces the
/// new sequence exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    /// A run of new items appeared at `position`.
    Inserted {
        /// First inserted index in the new sequence.
        position: usize,
        /// Run length.
        count: usize,
    },
    /// A run of old items disappeared at `position`.
    Removed {
        /// First removed index in the old sequence.
        position: usize,
        /// Run length.
        count: usize,
    },
    /// An item kept its identity but changed position.
    Moved {
        /// Index in the partially edited sequence.
        from: usize,
        /// Index in the new sequence.
        to: usize,
    },
    /// A run of items kept identity and position but changed content.
    Changed {
        /// First changed index in the new sequence.
        position: usize,
        /// Run length.
        count: usize,
    },
}

/// Computes a minimal-ish edit script between two ordered sibling
/// sequences.
///
/// `same_identity` decides whether an old/new pair denotes the same logical
/// item (possibly moved or changed); `same_content` decides whether a
/// matched pair changed content. Both predicates must be deterministic;
/// duplicate identities resolve first-match.
///
/// Near-linear for mostly-stable sequences, worst case quadratic in the
/// sequence length; sibling lists are expected to stay small.
pub fn diff_siblings<A, B>(
    old: &[A],
    new: &[B],
    mut same_identity: impl FnMut(&A, &B) -> bool,
    mut same_content: impl FnMut(&A, &B) -> bool,
) -> Vec<EditOp> {
    // Greedy identity pairing in new order; each old item is claimed once.
    let mut old_for_new: SmallVec<[Option<usize>; 16]> = smallvec![None; new.len()];
    let mut claimed: SmallVec<[bool; 16]> = smallvec![false; old.len()];
    for (j, new_item) in new.iter().enumerate() {
        for (i, old_item) in old.iter().enumerate() {
            if !claimed[i] && same_identity(old_item, new_item) {
                claimed[i] = true;
                old_for_new[j] = Some(i);
                break;
            }
        }
    }

    let mut ops = Vec::new();

    // Unmatched old items leave first, in descending runs, so every emitted
    // position is still an old-sequence index when it is applied.
    let mut i = old.len();
    while i > 0 {
        i -= 1;
        if claimed[i] {
            continue;
        }
        let end = i + 1;
        while i > 0 && !claimed[i - 1] {
            i -= 1;
        }
        ops.push(EditOp::Removed {
            position: i,
            count: end - i,
        });
    }

    // Survivors in old order; walk target positions and fix each one up by
    // a move or an insert. `usize::MAX` marks freshly inserted slots.
    const FRESH: usize = usize::MAX;
    let mut work: Vec<usize> = (0..old.len()).filter(|&i| claimed[i]).collect();
    let mut changed_runs: Vec<(usize, usize)> = Vec::new();
    for j in 0..new.len() {
        match old_for_new[j] {
            None => {
                work.insert(j, FRESH);
                match ops.last_mut() {
                    Some(EditOp::Inserted { position, count }) if *position + *count == j => {
                        *count += 1;
                    }
                    _ => ops.push(EditOp::Inserted {
                        position: j,
                        count: 1,
                    }),
                }
            }
            Some(i) => {
                if work[j] != i {
                    let from = work
                        .iter()
                        .position(|&w| w == i)
                        .expect("matched old item still in working list");
                    work.remove(from);
                    work.insert(j, i);
                    ops.push(EditOp::Moved { from, to: j });
                }
                if !same_content(&old[i], &new[j]) {
                    match changed_runs.last_mut() {
                        Some((position, count)) if *position + *count == j => *count += 1,
                        _ => changed_runs.push((j, 1)),
                    }
                }
            }
        }
    }

    // Content changes never shift positions, so they go last in final
    // coordinates.
    for (position, count) in changed_runs {
        ops.push(EditOp::Changed { position, count });
    }
    ops
}
