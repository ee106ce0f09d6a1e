//! Slab size ladder for the arena

use crate::error::{Error, Result};

/// Every slab size, and every chunk address, is a multiple of this.
pub const ALIGNMENT: usize = 8;

/// Fraction of a slab that is guaranteed usable by any request mapped
/// to it. Drives the spacing of the ladder.
pub const MEM_UTILIZATION: f64 = 0.95;

/// Hard ceiling on the capacity of a single arena (1 TiB).
pub const MAX_ARENA_SIZE: u64 = 1024 * 1024 * 1024 * 1024;

/// Round `n` up to the next multiple of `to`.
pub fn round_up(n: usize, to: usize) -> usize {
    n.div_ceil(to) * to
}

/// Next rung above `from`.
///
/// Grows by `from * (1 - MEM_UTILIZATION)`, truncated and then rounded
/// up to [`ALIGNMENT`], never by less than one alignment unit.
fn next_size(from: usize) -> usize {
    let addby = (from as f64 * (1.0 - MEM_UTILIZATION)) as usize;
    from + round_up(addby, ALIGNMENT).max(ALIGNMENT)
}

fn build_ladder(minblock: usize, maxblock: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut current = round_up(minblock, ALIGNMENT).max(ALIGNMENT);

    while current < maxblock {
        sizes.push(current);
        current = next_size(current);
    }
    sizes.push(maxblock);

    sizes
}

/// Calculate the slab sizes between `minblock` and `maxblock`
///
/// Sizes are spaced geometrically so that any request between the two
/// bounds wastes at most `1 - MEM_UTILIZATION` of its slab. The result
/// is strictly ascending and always ends with `maxblock`.
///
/// Returns [`Error::Config`] when `maxblock` is zero, smaller than
/// `minblock`, or not a multiple of [`ALIGNMENT`].
pub fn compute_ladder(minblock: usize, maxblock: usize) -> Result<Vec<usize>> {
    if maxblock == 0 {
        return Err(Error::Config("maxblock must be greater than zero".to_string()));
    } else if maxblock < minblock {
        return Err(Error::Config(format!(
            "maxblock {} is smaller than minblock {}",
            maxblock, minblock
        )));
    } else if maxblock % ALIGNMENT != 0 {
        return Err(Error::Config(format!(
            "maxblock {} is not a multiple of {}",
            maxblock, ALIGNMENT
        )));
    }

    Ok(build_ladder(minblock, maxblock))
}

/// Ladder covering every allocatable size, from [`ALIGNMENT`] up to
/// [`MAX_ARENA_SIZE`].
pub fn default_ladder() -> Vec<usize> {
    build_ladder(ALIGNMENT, MAX_ARENA_SIZE as usize)
}

/// Pick the smallest slab that can hold `size` bytes.
///
/// `slabs` must be sorted ascending.
///
/// # Panics
///
/// Panics if `size` is larger than the last slab. Callers check the
/// bound first, so this only fires on a programming error.
pub fn suitable_size(slabs: &[usize], size: usize) -> usize {
    let idx = slabs.partition_point(|&slab| slab < size);
    match slabs.get(idx) {
        Some(&slab) => slab,
        None => panic!(
            "size {} greater than the largest slab {:?}",
            size,
            slabs.last()
        ),
    }
}
