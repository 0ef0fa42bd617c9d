/// Split `total` into `parts` non-negative integers that sum exactly to
/// `total`, returning the part at position `index`.
///
/// Each part is either `total / parts` or that plus one; the first
/// `total % parts` indices receive the larger value. The function is pure
/// and deterministic — fairness over time comes from the caller rotating
/// `index` across ticks, which walks the remainder slots through the set.
///
/// # Panics
///
/// Panics when `parts == 0` or `index >= parts`; both are caller bugs.
#[must_use]
pub fn fair_share(total: u64, parts: u64, index: u64) -> u64 {
    assert!(parts > 0, "fair_share: parts must be > 0");
    assert!(
        index < parts,
        "fair_share: index {index} out of range for {parts} parts"
    );
    let base = total / parts;
    if index < total % parts {
        base + 1
    } else {
        base
    }
}
