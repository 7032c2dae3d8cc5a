//! Stepwise (Hyndman–Khandakar) search over (p, q) for a fixed d.
//!
//! Starts from four seed orders, then repeatedly scores the eight
//! neighbours of the incumbent and moves to the best one while AIC improves.
//! Neighbour batches are scored in parallel; the winner is picked with a
//! total order so results do not depend on scheduling.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::debug;

use super::armax::{fit_armax, ArmaxData, ArmaxFit, Rejection};
use super::SearchConfig;

const SEEDS: [(usize, usize); 4] = [(2, 2), (0, 0), (1, 0), (0, 1)];

/// Outcome of a search: the best fit and how many orders were scored.
#[derive(Debug, Clone)]
pub(crate) struct SearchOutcome {
    pub best: Option<ArmaxFit>,
    pub evaluated: usize,
}

fn in_bounds(p: usize, q: usize, config: &SearchConfig) -> bool {
    p <= config.max_p && q <= config.max_q && p + q <= config.max_order
}

/// Lower AIC first, then fewer parameters, then fewer AR terms.
fn rank(a: &ArmaxFit, b: &ArmaxFit) -> Ordering {
    a.aic
        .total_cmp(&b.aic)
        .then((a.p + a.q).cmp(&(b.p + b.q)))
        .then(a.p.cmp(&b.p))
}

fn neighbours(p: usize, q: usize) -> Vec<(usize, usize)> {
    let deltas: [(i64, i64); 8] = [
        (-1, 0),
        (1, 0),
        (0, -1),
        (0, 1),
        (-1, -1),
        (1, 1),
        (-1, 1),
        (1, -1),
    ];
    deltas
        .iter()
        .filter_map(|(dp, dq)| {
            let np = usize::try_from(p as i64 + dp).ok()?;
            let nq = usize::try_from(q as i64 + dq).ok()?;
            Some((np, nq))
        })
        .collect()
}

fn score_batch(
    data: &ArmaxData<'_>,
    orders: &[(usize, usize)],
    parallel: bool,
) -> Vec<(usize, usize, Result<ArmaxFit, Rejection>)> {
    let fit = |&(p, q): &(usize, usize)| (p, q, fit_armax(data, p, q));
    if parallel {
        orders.par_iter().map(fit).collect()
    } else {
        orders.iter().map(fit).collect()
    }
}

fn best_of(
    scored: Vec<(usize, usize, Result<ArmaxFit, Rejection>)>,
    d: usize,
) -> Option<ArmaxFit> {
    scored
        .into_iter()
        .filter_map(|(p, q, result)| match result {
            Ok(fit) => {
                debug!(p, d, q, aic = fit.aic, "candidate scored");
                Some(fit)
            }
            Err(reason) => {
                debug!(p, d, q, ?reason, "candidate rejected");
                None
            }
        })
        .min_by(rank)
}

/// Run the stepwise search.
pub(crate) fn stepwise_search(
    data: &ArmaxData<'_>,
    d: usize,
    config: &SearchConfig,
) -> SearchOutcome {
    let mut visited: BTreeSet<(usize, usize)> = BTreeSet::new();
    let budget = config.max_steps.max(1);

    let seeds: Vec<(usize, usize)> = SEEDS
        .iter()
        .copied()
        .filter(|&(p, q)| in_bounds(p, q, config))
        .take(budget)
        .collect();
    visited.extend(seeds.iter().copied());

    let mut incumbent = best_of(score_batch(data, &seeds, config.parallel), d);

    while let Some(current) = incumbent.as_ref() {
        let remaining = budget.saturating_sub(visited.len());
        if remaining == 0 {
            break;
        }
        let batch: Vec<(usize, usize)> = neighbours(current.p, current.q)
            .into_iter()
            .filter(|&(p, q)| in_bounds(p, q, config) && !visited.contains(&(p, q)))
            .take(remaining)
            .collect();
        if batch.is_empty() {
            break;
        }
        visited.extend(batch.iter().copied());

        match best_of(score_batch(data, &batch, config.parallel), d) {
            Some(challenger) if challenger.aic < current.aic => {
                debug!(
                    p = challenger.p,
                    q = challenger.q,
                    aic = challenger.aic,
                    "search moved"
                );
                incumbent = Some(challenger);
            }
            _ => break,
        }
    }

    SearchOutcome {
        best: incumbent,
        evaluated: visited.len(),
    }
}
