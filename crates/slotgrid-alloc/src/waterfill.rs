//! Water-filling fair-share computation.
//!
//! Progressive-filling over a set of capped, weighted requests:
//! requests first receive their minimum share, then the remaining
//! capacity is poured across unsaturated requests proportionally to
//! weight. A request saturates at `min(demand, max_share)`; its
//! unused proportion is redistributed in later rounds. Each round
//! either distributes everything left or saturates at least one
//! request, so the loop runs at most `n` rounds.

use serde::{Deserialize, Serialize};

/// Weights at or below zero are misconfiguration recovered upstream;
/// the floor here only keeps the proportional math well-defined.
const MIN_WEIGHT: f64 = 1e-6;

const EPS: f64 = 1e-9;

/// One participant in a fair-share allocation round.
///
/// Callers pass *effective* bounds: inverted min/max pairs must be
/// corrected before building the request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShareRequest {
    /// Slots this request could use right now (running + backlog).
    pub demand: u32,
    /// Guaranteed floor, granted before weighted distribution.
    pub min_share: u32,
    /// Hard ceiling (`u32::MAX` for unbounded).
    pub max_share: u32,
    /// Relative weight in proportional distribution.
    pub weight: f64,
}

impl ShareRequest {
    fn cap(&self) -> f64 {
        f64::from(self.demand.min(self.max_share))
    }

    fn weight_or_floor(&self) -> f64 {
        self.weight.max(MIN_WEIGHT)
    }
}

/// Compute fair shares for `requests` over `capacity` slots.
///
/// Returns one share per request, positionally. Guarantees:
/// - a request with zero demand gets share 0 and takes no part;
/// - `share ≤ min(demand, max_share)` for every request;
/// - `share ≥ min(min_share, demand, max_share)` whenever the
///   minimum shares together fit in `capacity`;
/// - Σ shares ≤ max(capacity, Σ granted minimums).
///
/// When the minimum shares alone exceed capacity they stand as
/// granted and nothing further is distributed.
pub fn compute_fair_shares(requests: &[ShareRequest], capacity: f64) -> Vec<f64> {
    let mut shares = vec![0.0; requests.len()];
    let mut eligible: Vec<usize> = Vec::new();

    for (i, req) in requests.iter().enumerate() {
        if req.demand == 0 {
            continue;
        }
        let cap = req.cap();
        shares[i] = f64::from(req.min_share).min(cap);
        if shares[i] + EPS < cap {
            eligible.push(i);
        }
    }

    let mut remaining = capacity - shares.iter().sum::<f64>();

    while remaining > EPS && !eligible.is_empty() {
        let total_weight: f64 = eligible
            .iter()
            .map(|&i| requests[i].weight_or_floor())
            .sum();

        // Scale this round down so the tightest request saturates
        // exactly; a full round (scale 1) distributes everything left.
        let mut scale = 1.0_f64;
        for &i in &eligible {
            let proposed = remaining * requests[i].weight_or_floor() / total_weight;
            if proposed > 0.0 {
                scale = scale.min((requests[i].cap() - shares[i]) / proposed);
            }
        }

        let step = remaining * scale;
        for &i in &eligible {
            let cap = requests[i].cap();
            shares[i] = (shares[i] + step * requests[i].weight_or_floor() / total_weight).min(cap);
        }
        remaining -= step;

        if scale >= 1.0 {
            break;
        }
        eligible.retain(|&i| shares[i] + EPS < requests[i].cap());
    }

    shares
}
