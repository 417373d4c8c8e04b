//! Indicator vocabulary (`+CIND`) and the per-session indicator value map.

use std::str::FromStr;

use strum::{Display, EnumString};

use crate::error::{Error, Result};

/// The fixed indicator vocabulary this engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum IndicatorKind {
    /// Call active (0/1).
    Call,
    /// Call setup in progress (0-3).
    Callsetup,
    /// Network service available (0/1).
    Service,
    /// Signal strength (0-5).
    Signal,
    /// Roaming (0/1).
    Roam,
    /// Battery charge level (0-5).
    Battchg,
    /// Call held (0-2).
    Callheld,
}

/// The canned `+CIND=?` response this engine sends when acting as Audio Gateway.
pub const AG_CIND_TEST_VOCABULARY: &str =
    "(call,(0,1)),(callsetup,(0-3)),(service,(0-1)),(signal,(0-5)),(roam,(0-1)),(battchg,(0-5)),(callheld,(0-2))";

/// Indicator positions (1-based, as advertised by `+CIND=?`) and their current values.
///
/// Populated once from the AG's `+CIND=?` response (HF role) or fixed at construction (AG
/// role, which always advertises [`AG_CIND_TEST_VOCABULARY`]); stable for the rest of the
/// session.
#[derive(Debug, Clone, Default)]
pub struct IndicatorMap {
    order: Vec<IndicatorKind>,
    values: Vec<i32>,
}

impl IndicatorMap {
    /// Parses a `+CIND=?` test-response payload, e.g.
    /// `(call,(0,1)),(callsetup,(0-3)),...`, into indicator order. Values start at zero.
    pub fn parse_vocabulary(value: &str) -> Result<Self> {
        let mut order = Vec::new();
        for entry in value.split("),(") {
            let name = entry.trim_matches(|c: char| c == '(' || c == ')' || c == '"').split(',').next().unwrap_or("");
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let kind = IndicatorKind::from_str(name)
                .map_err(|_| Error::BadMessage(format!("unknown indicator {name:?} in +CIND=?")))?;
            order.push(kind);
        }
        if order.is_empty() {
            return Err(Error::BadMessage("empty +CIND=? vocabulary".to_string()));
        }
        let values = vec![0; order.len()];
        Ok(Self { order, values })
    }

    /// Parses a `+CIND?` get-response payload, a comma-separated list of integers positional
    /// with the vocabulary order, and stores them. Returns the indicators whose value changed.
    pub fn parse_values(&mut self, value: &str) -> Result<Vec<(IndicatorKind, i32, i32)>> {
        let parsed: Vec<i32> = value
            .split(',')
            .map(|s| s.trim().parse().map_err(|_| Error::BadMessage(format!("bad +CIND? value {s:?}"))))
            .collect::<Result<_>>()?;
        if parsed.len() != self.order.len() {
            return Err(Error::BadMessage(format!(
                "+CIND? reported {} values, expected {}",
                parsed.len(),
                self.order.len()
            )));
        }
        let mut changes = Vec::new();
        for (i, new) in parsed.into_iter().enumerate() {
            let old = self.values[i];
            if old != new {
                changes.push((self.order[i], old, new));
            }
            self.values[i] = new;
        }
        Ok(changes)
    }

    /// Updates the indicator at 1-based `position` (as named by `+CIEV: position,value`).
    /// Returns the indicator kind and its previous value if the position is valid.
    pub fn set_by_position(&mut self, position: usize, value: i32) -> Option<(IndicatorKind, i32)> {
        let idx = position.checked_sub(1)?;
        let kind = *self.order.get(idx)?;
        let old = self.values.get(idx).copied()?;
        self.values[idx] = value;
        Some((kind, old))
    }

    /// Current value of `kind`, if the vocabulary contains it.
    pub fn get(&self, kind: IndicatorKind) -> Option<i32> {
        let idx = self.order.iter().position(|&k| k == kind)?;
        self.values.get(idx).copied()
    }

    /// The fixed AG vocabulary order, used to build the `+CIND=?` response when acting as AG.
    pub fn ag_fixed() -> Self {
        Self::parse_vocabulary(AG_CIND_TEST_VOCABULARY).expect("AG_CIND_TEST_VOCABULARY is well-formed")
    }

    /// Whether the vocabulary has been populated yet.
    pub fn is_populated(&self) -> bool {
        !self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ag_vocabulary() {
        let map = IndicatorMap::parse_vocabulary(AG_CIND_TEST_VOCABULARY).unwrap();
        assert_eq!(map.order, vec![
            IndicatorKind::Call,
            IndicatorKind::Callsetup,
            IndicatorKind::Service,
            IndicatorKind::Signal,
            IndicatorKind::Roam,
            IndicatorKind::Battchg,
            IndicatorKind::Callheld,
        ]);
    }

    #[test]
    fn parses_values_positionally() {
        let mut map = IndicatorMap::parse_vocabulary(AG_CIND_TEST_VOCABULARY).unwrap();
        let changes = map.parse_values("0,0,1,4,0,3,0").unwrap();
        assert_eq!(map.get(IndicatorKind::Battchg), Some(3));
        assert_eq!(map.get(IndicatorKind::Signal), Some(4));
        assert!(changes.iter().any(|(k, ..)| *k == IndicatorKind::Battchg));
    }

    #[test]
    fn ciev_updates_by_position() {
        let mut map = IndicatorMap::parse_vocabulary(AG_CIND_TEST_VOCABULARY).unwrap();
        map.parse_values("0,0,1,4,0,3,0").unwrap();
        let (kind, old) = map.set_by_position(6, 5).unwrap();
        assert_eq!(kind, IndicatorKind::Battchg);
        assert_eq!(old, 3);
        assert_eq!(map.get(IndicatorKind::Battchg), Some(5));
    }
}
