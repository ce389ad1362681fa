pub(super) fn next_random_u32(state: &mut u32) -> u32 {
    let mut next = state.wrapping_add(0x6d2b79f5);
    *state = next;
    next = (next ^ (next >> 15)).wrapping_mul(next | 1);
    next ^= next.wrapping_add((next ^ (next >> 7)).wrapping_mul(next | 61));
    next ^ (next >> 14)
}

pub(super) fn next_random_bounded(state: &mut u32, bound: u32) -> u32 {
    next_random_bounded_with(state, bound, next_random_u32)
}

pub(super) fn next_random_bounded_with<F>(state: &mut u32, bound: u32, mut next: F) -> u32
where
    F: FnMut(&mut u32) -> u32,
{
    let threshold = (u64::from(u32::MAX) + 1) / u64::from(bound) * u64::from(bound);
    let mut candidate = next(state);
    while u64::from(candidate) >= threshold {
        candidate = next(state);
    }
    candidate % bound
}

/// Sum of `dice` six-sided throws.
pub(super) fn roll_dice(state: &mut u32, dice: u32) -> i32 {
    let mut total = 0i32;
    for _ in 0..dice {
        total += next_random_bounded(state, 6) as i32 + 1;
    }
    total
}
