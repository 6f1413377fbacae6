//! Colors for splitting the global communicator into micro-scale groups.
//!
//! Every macro rank that owns a multiscale element gets its own color; the
//! supporting ranks are spread over those colors. Both functions are pure
//! and evaluated on data every rank already holds, so all ranks agree on
//! the split without further communication.

/// Color of a macro rank, given the gathered list holding each local rank's
/// id if it found multiscale material and a negative value otherwise.
/// `None` for ranks without multiscale material.
pub fn macro_color(found_ranks: &[i64], my_rank: usize) -> Option<usize> {
    if found_ranks.get(my_rank).is_none_or(|&r| r < 0) {
        return None;
    }
    let before = found_ranks[..my_rank].iter().filter(|&&r| r >= 0).count();
    Some(before)
}

/// Number of supporting ranks per group: `num_procs / groups` each, the
/// remainder spread over the first groups.
pub fn support_layout(num_procs: usize, groups: usize) -> Vec<usize> {
    if groups == 0 {
        return Vec::new();
    }
    let per_group = num_procs / groups;
    let remaining = num_procs - per_group * groups;
    (0..groups)
        .map(|k| per_group + usize::from(k < remaining))
        .collect()
}

/// Group of the supporting rank `my_rank` within `layout`.
pub fn support_color(layout: &[usize], my_rank: usize) -> Option<usize> {
    let mut sum = 0;
    for (color, &n) in layout.iter().enumerate() {
        sum += n;
        if my_rank < sum {
            return Some(color);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macro_colors_count_found_ranks() {
        let found = [-1, 1, -1, 3, 4];
        let colors: Vec<_> = (0..5).map(|r| macro_color(&found, r)).collect();
        assert_eq!(colors, vec![None, Some(0), None, Some(1), Some(2)]);
        assert_eq!(macro_color(&found, 9), None);
    }

    #[test]
    fn support_groups_take_the_remainder_first() {
        let layout = support_layout(7, 3);
        assert_eq!(layout, vec![3, 2, 2]);
        let colors: Vec<_> = (0..7).map(|r| support_color(&layout, r)).collect();
        assert_eq!(
            colors,
            vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(2), Some(2)]
        );
        assert_eq!(support_color(&layout, 7), None);
        assert!(support_layout(4, 0).is_empty());
    }
}
