use capstan_instrument::PriceType;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum XrateError {
    #[error("cannot calculate exchange rate for PriceType: {0:?}")]
    InvalidPriceType(PriceType),

    #[error("bid and ask quote tables must contain the same currency pairs")]
    UnequalQuoteKeys,
}

/// Quoted prices keyed by currency pair code, eg/ "EUR/USD" -> 1.105.
pub type QuoteTable = BTreeMap<SmolStr, f64>;

/// Calculates exchange rates through a directed graph of quoted currency pairs.
///
/// The graph is closed under inversion, then relaxed through a single common pivot - not a full
/// transitive closure. Currencies reachable only through two or more intermediate pivots yield
/// `0.0` (insufficient data). Iteration over currency codes is sorted so tie-breaks are
/// reproducible.
#[derive(Debug, Copy, Clone, Default)]
pub struct ExchangeRateCalculator;

impl ExchangeRateCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the `from` -> `to` exchange rate from the given quote tables.
    ///
    /// Returns `0.0` when the rate cannot be inferred from the quotes - insufficient data is
    /// not an error. `PriceType::Last` is not derivable from quote tables and is rejected.
    pub fn rate(
        &self,
        from: &str,
        to: &str,
        price_type: PriceType,
        bid_quotes: &QuoteTable,
        ask_quotes: &QuoteTable,
    ) -> Result<f64, XrateError> {
        if !bid_quotes.keys().eq(ask_quotes.keys()) {
            return Err(XrateError::UnequalQuoteKeys);
        }

        if from == to {
            return Ok(1.0);
        }

        let quotes: BTreeMap<&SmolStr, f64> = match price_type {
            PriceType::Bid => bid_quotes.iter().map(|(pair, bid)| (pair, *bid)).collect(),
            PriceType::Ask => ask_quotes.iter().map(|(pair, ask)| (pair, *ask)).collect(),
            PriceType::Mid => bid_quotes
                .iter()
                .map(|(pair, bid)| (pair, (bid + ask_quotes[pair]) / 2.0))
                .collect(),
            PriceType::Last => return Err(XrateError::InvalidPriceType(price_type)),
        };

        // Build the directed rate graph from the parsed pair codes
        let mut rates: BTreeMap<SmolStr, BTreeMap<SmolStr, f64>> = BTreeMap::new();
        for (pair, quote) in quotes {
            let Some((lhs, rhs)) = pair.split_once('/') else {
                debug!(%pair, "skipping quote key without 'LHS/RHS' shape");
                continue;
            };
            let (lhs, rhs) = (SmolStr::new(lhs), SmolStr::new(rhs));

            rates.entry(lhs.clone()).or_default().insert(rhs.clone(), quote);
            rates.entry(lhs.clone()).or_default().insert(lhs, 1.0);
            rates.entry(rhs.clone()).or_default().insert(rhs, 1.0);
        }

        let codes: Vec<SmolStr> = rates.keys().cloned().collect();

        // Close under inversion
        for a in &codes {
            for b in &codes {
                let Some(forward) = rates[a].get(b).copied() else {
                    continue;
                };
                if forward != 0.0 && !rates[b].contains_key(a) {
                    rates.get_mut(b).expect("code present").insert(a.clone(), 1.0 / forward);
                }
            }
        }

        // Relax through a single common pivot (one pass, no fixpoint)
        let mut discovered: Vec<(SmolStr, SmolStr, f64)> = Vec::new();
        for a in &codes {
            for b in &codes {
                if a == b || rates[a].contains_key(b) {
                    continue;
                }

                for c in &codes {
                    // a -> c and b -> c known: a/b = (a/c) / (b/c)
                    if let (Some(ac), Some(bc)) = (rates[a].get(c), rates[b].get(c)) {
                        if *bc != 0.0 {
                            discovered.push((a.clone(), b.clone(), ac / bc));
                            break;
                        }
                    }
                    // c -> a and c -> b known: a/b = (c/b) / (c/a)
                    if let (Some(ca), Some(cb)) = (rates[c].get(a), rates[c].get(b)) {
                        if *ca != 0.0 {
                            discovered.push((a.clone(), b.clone(), cb / ca));
                            break;
                        }
                    }
                }
            }
        }

        for (a, b, rate) in discovered {
            if rate != 0.0 {
                rates
                    .get_mut(&b)
                    .expect("code present")
                    .entry(a.clone())
                    .or_insert(1.0 / rate);
            }
            rates.get_mut(&a).expect("code present").entry(b).or_insert(rate);
        }

        Ok(rates
            .get(from)
            .and_then(|outgoing| outgoing.get(to))
            .copied()
            .unwrap_or(0.0))
    }
}
