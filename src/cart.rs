use std::collections::HashSet;

use crate::catalog::ProductCatalog;
use crate::matcher::MatchCandidate;
use crate::types::Product;

/// Products picked during one session, in the order they were first pointed at.
///
/// Lives as long as the session; only [`CartState::clear`] removes entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartState {
    entries: Vec<Product>,
    seen: HashSet<String>,
}

impl CartState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every candidate not already in the cart and returns what was added.
    pub fn fold(&mut self, candidates: &[MatchCandidate], catalog: &ProductCatalog) -> Vec<Product> {
        let mut added = Vec::new();
        for candidate in candidates {
            if self.seen.contains(&candidate.product_name) {
                continue;
            }
            let Some(product) = catalog.get(&candidate.product_name) else {
                continue;
            };
            self.seen.insert(product.name.clone());
            self.entries.push(product.clone());
            added.push(product.clone());
        }
        added
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }

    pub fn entries(&self) -> &[Product] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|p| p.price).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn catalog() -> ProductCatalog {
        ProductCatalog::new(vec![
            Product { id: 3, name: "coffee".into(), price: 4.5 },
            Product { id: 7, name: "bottle".into(), price: 1.25 },
        ])
        .unwrap()
    }

    fn hit(name: &str) -> MatchCandidate {
        MatchCandidate {
            product_name: name.into(),
            score: 0.9,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
        }
    }

    #[test]
    fn first_match_adds_full_product() {
        let mut cart = CartState::new();
        let added = cart.fold(&[hit("coffee")], &catalog());
        assert_eq!(added.len(), 1);
        assert_eq!(cart.entries(), &[Product { id: 3, name: "coffee".into(), price: 4.5 }]);
    }

    #[test]
    fn repeated_ticks_add_once() {
        let catalog = catalog();
        let mut cart = CartState::new();
        for _ in 0..10 {
            cart.fold(&[hit("coffee")], &catalog);
        }
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn duplicates_within_one_tick_add_once() {
        let mut cart = CartState::new();
        let added = cart.fold(&[hit("coffee"), hit("coffee"), hit("bottle")], &catalog());
        assert_eq!(added.len(), 2);
        let names: Vec<_> = cart.entries().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["coffee", "bottle"]);
    }

    #[test]
    fn names_stay_pairwise_distinct() {
        let catalog = catalog();
        let mut cart = CartState::new();
        let pattern = ["bottle", "coffee", "coffee", "bottle", "coffee"];
        for name in pattern {
            cart.fold(&[hit(name)], &catalog);
            let unique: HashSet<_> = cart.entries().iter().map(|p| &p.name).collect();
            assert_eq!(unique.len(), cart.len());
        }
        assert_eq!(cart.len(), 2);
        assert!((cart.total() - 5.75).abs() < 1e-9);
    }

    #[test]
    fn unknown_candidates_are_skipped() {
        let mut cart = CartState::new();
        assert!(cart.fold(&[hit("laptop")], &catalog()).is_empty());
        assert!(cart.is_empty());
        assert!(!cart.contains("laptop"));
    }

    #[test]
    fn clear_empties_entries_and_dedup_set() {
        let catalog = catalog();
        let mut cart = CartState::new();
        cart.fold(&[hit("coffee")], &catalog);
        cart.clear();
        assert!(cart.is_empty());
        assert!(!cart.contains("coffee"));
        assert_eq!(cart.fold(&[hit("coffee")], &catalog).len(), 1);
    }
}
