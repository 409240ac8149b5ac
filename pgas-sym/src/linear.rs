#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::value::SymbolId;

/// `Σ cᵢ·symᵢ + k` with no zero coefficients stored.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinearForm {
    terms: BTreeMap<SymbolId, i64>,
    constant: i64,
}

impl LinearForm {
    pub fn constant(k: i64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: k,
        }
    }

    pub fn symbol(id: SymbolId) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(id, 1);
        Self { terms, constant: 0 }
    }

    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    pub fn coefficient(&self, id: SymbolId) -> i64 {
        self.terms.get(&id).copied().unwrap_or(0)
    }

    pub fn terms(&self) -> impl Iterator<Item = (SymbolId, i64)> + '_ {
        self.terms.iter().map(|(id, c)| (*id, *c))
    }

    pub fn as_const(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    pub fn checked_add(&self, other: &LinearForm) -> Option<LinearForm> {
        self.combine(other, 1)
    }

    pub fn checked_sub(&self, other: &LinearForm) -> Option<LinearForm> {
        self.combine(other, -1)
    }

    fn combine(&self, other: &LinearForm, sign: i64) -> Option<LinearForm> {
        let mut terms = self.terms.clone();
        for (id, c) in &other.terms {
            let scaled = c.checked_mul(sign)?;
            let entry = terms.entry(*id).or_insert(0);
            *entry = entry.checked_add(scaled)?;
            if *entry == 0 {
                terms.remove(id);
            }
        }
        let constant = self.constant.checked_add(other.constant.checked_mul(sign)?)?;
        Some(LinearForm { terms, constant })
    }
}
