//! Cell dependency tracking for calculation chains

use ahash::{AHashMap, AHashSet};

/// Position of a cell in a workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }
}

/// Precedent/dependent edges between formula cells
///
/// An edge `precedent -> dependent` means the dependent's formula reads the
/// precedent. Both directions are indexed.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    dependents: AHashMap<CellKey, AHashSet<CellKey>>,
    precedents: AHashMap<CellKey, AHashSet<CellKey>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` reads `precedent`
    pub fn add_dependency(&mut self, precedent: CellKey, dependent: CellKey) {
        self.dependents
            .entry(precedent)
            .or_default()
            .insert(dependent);
        self.precedents
            .entry(dependent)
            .or_default()
            .insert(precedent);
    }

    /// Replace every precedent of `dependent`
    pub fn set_precedents<I>(&mut self, dependent: CellKey, precedents: I)
    where
        I: IntoIterator<Item = CellKey>,
    {
        self.clear_precedents(dependent);
        for precedent in precedents {
            self.add_dependency(precedent, dependent);
        }
    }

    fn clear_precedents(&mut self, cell: CellKey) {
        if let Some(precedents) = self.precedents.remove(&cell) {
            for precedent in precedents {
                if let Some(deps) = self.dependents.get_mut(&precedent) {
                    deps.remove(&cell);
                }
            }
        }
    }

    /// Drop every edge touching `cell`
    pub fn clear_dependencies(&mut self, cell: CellKey) {
        self.clear_precedents(cell);
        if let Some(dependents) = self.dependents.remove(&cell) {
            for dependent in dependents {
                if let Some(precs) = self.precedents.get_mut(&dependent) {
                    precs.remove(&cell);
                }
            }
        }
    }

    pub fn get_dependents(&self, cell: CellKey) -> impl Iterator<Item = CellKey> + '_ {
        self.dependents
            .get(&cell)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn get_precedents(&self, cell: CellKey) -> impl Iterator<Item = CellKey> + '_ {
        self.precedents
            .get(&cell)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Cells to recalculate after `changed`, precedents before dependents
    ///
    /// Cycles are cut where they are found; the cells involved still appear
    /// once each.
    pub fn get_recalc_order(&self, changed: &[CellKey]) -> Vec<CellKey> {
        let mut order = Vec::new();
        let mut visited = AHashSet::new();
        let mut in_stack = AHashSet::new();

        let mut roots = changed.to_vec();
        roots.sort_unstable();
        for cell in roots {
            self.visit_dependents(cell, &mut order, &mut visited, &mut in_stack);
        }

        order.reverse();
        order
    }

    fn visit_dependents(
        &self,
        cell: CellKey,
        order: &mut Vec<CellKey>,
        visited: &mut AHashSet<CellKey>,
        in_stack: &mut AHashSet<CellKey>,
    ) {
        if visited.contains(&cell) || in_stack.contains(&cell) {
            return;
        }
        in_stack.insert(cell);

        if let Some(dependents) = self.dependents.get(&cell) {
            let mut next: Vec<_> = dependents.iter().copied().collect();
            next.sort_unstable();
            for dependent in next {
                self.visit_dependents(dependent, order, visited, in_stack);
            }
        }

        in_stack.remove(&cell);
        visited.insert(cell);
        order.push(cell);
    }

    /// True when `cell` sits on a cycle of precedents
    pub fn has_circular_reference(&self, cell: CellKey) -> bool {
        let mut visited = AHashSet::new();
        let mut stack: Vec<CellKey> = self.get_precedents(cell).collect();
        while let Some(next) = stack.pop() {
            if next == cell {
                return true;
            }
            if visited.insert(next) {
                stack.extend(self.get_precedents(next));
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_dependency() {
        let mut graph = DependencyGraph::new();
        let a1 = CellKey::new(0, 0, 0);
        let b1 = CellKey::new(0, 0, 1);

        graph.add_dependency(a1, b1);

        assert!(graph.get_dependents(a1).any(|c| c == b1));
        assert!(graph.get_precedents(b1).any(|c| c == a1));
    }

    #[test]
    fn test_recalc_order_puts_precedents_first() {
        let mut graph = DependencyGraph::new();
        let a1 = CellKey::new(0, 0, 0);
        let a2 = CellKey::new(0, 1, 0);
        let a3 = CellKey::new(0, 2, 0);

        graph.add_dependency(a1, a2);
        graph.add_dependency(a2, a3);
        graph.add_dependency(a1, a3);

        assert_eq!(graph.get_recalc_order(&[a1]), vec![a1, a2, a3]);
    }

    #[test]
    fn test_set_precedents_replaces_edges() {
        let mut graph = DependencyGraph::new();
        let a1 = CellKey::new(0, 0, 0);
        let b1 = CellKey::new(0, 0, 1);
        let c1 = CellKey::new(0, 0, 2);

        graph.add_dependency(a1, c1);
        graph.set_precedents(c1, [b1]);

        assert_eq!(graph.get_dependents(a1).count(), 0);
        assert_eq!(graph.get_precedents(c1).collect::<Vec<_>>(), vec![b1]);
    }

    #[test]
    fn test_circular_reference() {
        let mut graph = DependencyGraph::new();
        let a1 = CellKey::new(0, 0, 0);
        let b1 = CellKey::new(0, 0, 1);
        let c1 = CellKey::new(0, 0, 2);
        let d1 = CellKey::new(0, 0, 3);

        graph.add_dependency(a1, b1);
        graph.add_dependency(b1, c1);
        graph.add_dependency(c1, a1);
        graph.add_dependency(c1, d1);

        assert!(graph.has_circular_reference(a1));
        assert!(graph.has_circular_reference(c1));
        assert!(!graph.has_circular_reference(d1));

        graph.clear_dependencies(b1);
        assert!(!graph.has_circular_reference(a1));
    }
}
