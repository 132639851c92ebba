//! Puzzle selection for practice sessions
//!
//! Selections are scaffolded from easy to hard. Consecutive puzzles avoid
//! opening with the same move whenever the pool allows it, and puzzles solved
//! earlier in the current review cycle are only reused once fresh ones run out.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use super::{Puzzle, Theme};

#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    pub puzzles: Vec<&'a Puzzle>,
    /// Puzzles from the current review cycle were reused to fill the request
    pub relaxed: bool,
}

fn difficulty_order(a: &&Puzzle, b: &&Puzzle) -> Ordering {
    a.rating.cmp(&b.rating).then_with(|| a.id.cmp(&b.id))
}

fn same_opening(a: &Puzzle, b: &Puzzle) -> bool {
    a.first_move().is_some() && a.first_move() == b.first_move()
}

/// Pick `n` items spread evenly over a difficulty-sorted slice, always
/// keeping the easiest and the hardest.
fn spread<'a>(items: &[&'a Puzzle], n: usize) -> Vec<&'a Puzzle> {
    if n >= items.len() {
        return items.to_vec();
    }
    match n {
        0 => Vec::new(),
        1 => vec![items[0]],
        _ => (0..n)
            .map(|i| items[i * (items.len() - 1) / (n - 1)])
            .collect(),
    }
}

/// Count first-move repeats on the pairs touching positions `a` and `b`.
fn repeats_around(chosen: &[&Puzzle], a: usize, b: usize) -> usize {
    let mut pairs = [a, a + 1, b, b + 1];
    pairs.sort_unstable();
    let mut count = 0;
    let mut last = None;
    for k in pairs {
        if k == 0 || k >= chosen.len() || last == Some(k) {
            continue;
        }
        last = Some(k);
        if same_opening(chosen[k - 1], chosen[k]) {
            count += 1;
        }
    }
    count
}

/// Swap two equal-rated puzzles if that removes more repeats than it adds.
fn try_swap(chosen: &mut [&Puzzle], a: usize, b: usize) -> bool {
    let before = repeats_around(chosen, a, b);
    chosen.swap(a, b);
    if repeats_around(chosen, a, b) < before {
        return true;
    }
    chosen.swap(a, b);
    false
}

/// Break up runs of puzzles sharing a first move without breaking the
/// difficulty order. Equal-rated puzzles on either side of a repeat are
/// reordered first; otherwise an unused candidate within the neighbouring
/// ratings is swapped in. When neither works the difficulty order wins and
/// the repeat stays.
fn diversify<'a>(chosen: &mut [&'a Puzzle], candidates: &[&'a Puzzle]) {
    for i in 1..chosen.len() {
        if !same_opening(chosen[i - 1], chosen[i]) {
            continue;
        }

        let rating = chosen[i].rating;
        let tie_end = (i + 1..chosen.len())
            .find(|&j| chosen[j].rating != rating)
            .unwrap_or(chosen.len());
        if (i + 1..tie_end).any(|j| try_swap(chosen, i, j)) {
            continue;
        }

        let prev_rating = chosen[i - 1].rating;
        let tie_start = (0..i - 1)
            .rev()
            .find(|&j| chosen[j].rating != prev_rating)
            .map_or(0, |j| j + 1);
        if (tie_start..i - 1).rev().any(|j| try_swap(chosen, i - 1, j)) {
            continue;
        }

        let prev = chosen[i - 1];
        let high = chosen.get(i + 1).map_or(u32::MAX, |p| p.rating);
        let next_move = chosen.get(i + 1).and_then(|p| p.first_move());
        let replacement = candidates.iter().copied().find(|c| {
            c.rating >= prev.rating
                && c.rating <= high
                && !same_opening(prev, c)
                && (next_move.is_none() || c.first_move() != next_move)
                && !chosen.iter().any(|p| p.id == c.id)
        });
        if let Some(r) = replacement {
            chosen[i] = r;
        }
    }
}

/// Select up to `count` puzzles from a single theme's pool.
///
/// Returns fewer puzzles than requested only when the whole pool is smaller
/// than `count`; running out is never an error.
pub fn select_puzzles<'a>(
    pool: &'a [Puzzle],
    count: usize,
    solved: &HashSet<String>,
) -> Selection<'a> {
    let (mut fresh, mut seen): (Vec<&Puzzle>, Vec<&Puzzle>) =
        pool.iter().partition(|p| !solved.contains(&p.id));
    fresh.sort_by(difficulty_order);
    seen.sort_by(difficulty_order);

    let relaxed = fresh.len() < count && !seen.is_empty();
    let mut candidates = fresh;
    if relaxed {
        let needed = count - candidates.len();
        candidates.extend(spread(&seen, needed));
        candidates.sort_by(difficulty_order);
    }

    let mut puzzles = spread(&candidates, count);
    diversify(&mut puzzles, &candidates);

    tracing::debug!(
        requested = count,
        selected = puzzles.len(),
        relaxed,
        "Selected puzzles"
    );

    Selection { puzzles, relaxed }
}

/// Select `count` puzzles across several themes for interleaved practice.
///
/// The request is split as evenly as the pools allow, each theme's share is
/// scaffolded on its own, and the shares are dealt round-robin so a theme
/// only repeats back to back once every other theme has run dry.
pub fn interleave_themes<'a>(
    themes: &[(&'a Theme, &HashSet<String>)],
    count: usize,
) -> Selection<'a> {
    let mut seen_ids = HashSet::new();
    let themes: Vec<_> = themes
        .iter()
        .filter(|(theme, _)| seen_ids.insert(theme.id.as_str()))
        .collect();

    let mut quotas = vec![0usize; themes.len()];
    let mut remaining = count;
    while remaining > 0 {
        let mut progressed = false;
        for (i, (theme, _)) in themes.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            if quotas[i] < theme.puzzles.len() {
                quotas[i] += 1;
                remaining -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let mut relaxed = false;
    let mut queues: Vec<VecDeque<&Puzzle>> = themes
        .iter()
        .zip(&quotas)
        .map(|((theme, solved), &quota)| {
            let selection = select_puzzles(&theme.puzzles, quota, solved);
            relaxed |= selection.relaxed;
            selection.puzzles.into()
        })
        .collect();

    let mut puzzles = Vec::with_capacity(quotas.iter().sum());
    loop {
        let mut took = false;
        for queue in &mut queues {
            if let Some(p) = queue.pop_front() {
                puzzles.push(p);
                took = true;
            }
        }
        if !took {
            break;
        }
    }

    Selection { puzzles, relaxed }
}
