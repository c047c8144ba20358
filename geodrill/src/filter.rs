//! Filtre multi-sélection sur les types d'occupation du sol

use std::collections::BTreeSet;

use tracing::warn;

/// Ensemble des types sélectionnés, parmi l'univers découvert au démarrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    universe: Vec<String>,
    selected: BTreeSet<String>,
}

impl FilterState {
    /// Initialise le filtre avec l'univers complet sélectionné
    pub fn new(universe: Vec<String>) -> Self {
        let mut seen = BTreeSet::new();
        let universe: Vec<String> = universe
            .into_iter()
            .filter(|label| seen.insert(label.clone()))
            .collect();
        let selected = universe.iter().cloned().collect();
        Self { universe, selected }
    }

    /// Types connus, dans l'ordre de découverte
    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    /// Remplace la sélection
    ///
    /// Les libellés hors univers sont ignorés. Un ensemble vide est valide.
    pub fn set_selected<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected = labels
            .into_iter()
            .map(Into::into)
            .filter(|label| {
                let known = self.universe.contains(label);
                if !known {
                    warn!(label = %label, "Ignoring unknown land-cover type");
                }
                known
            })
            .collect();
    }

    pub fn select_all(&mut self) {
        self.selected = self.universe.iter().cloned().collect();
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
    }

    /// Inverse la sélection d'un type; retourne `false` si le type est inconnu
    pub fn toggle(&mut self, label: &str) -> bool {
        if !self.universe.iter().any(|l| l == label) {
            warn!(label = %label, "Ignoring unknown land-cover type");
            return false;
        }
        if !self.selected.remove(label) {
            self.selected.insert(label.to_string());
        }
        true
    }

    pub fn is_selected(&self, label: &str) -> bool {
        self.selected.contains(label)
    }

    pub fn is_all_selected(&self) -> bool {
        self.selected.len() == self.universe.len()
    }

    pub fn is_none_selected(&self) -> bool {
        self.selected.is_empty()
    }

    /// Sélection courante, triée (utilisée comme paramètre des agrégations)
    pub fn selected(&self) -> Vec<String> {
        self.selected.iter().cloned().collect()
    }

    /// Libellé du bouton de filtre
    pub fn summary(&self) -> String {
        if self.is_all_selected() && !self.universe.is_empty() {
            "All types".to_string()
        } else if self.is_none_selected() {
            "None".to_string()
        } else {
            format!("{} types", self.selected.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<String> {
        vec![
            "Prairie permanente".to_string(),
            "Prairie temporaire".to_string(),
            "Estives et landes".to_string(),
        ]
    }

    #[test]
    fn test_starts_with_full_universe() {
        let filter = FilterState::new(universe());
        assert!(filter.is_all_selected());
        assert!(!filter.is_none_selected());
        assert_eq!(filter.summary(), "All types");
    }

    #[test]
    fn test_empty_selection_is_valid() {
        let mut filter = FilterState::new(universe());
        filter.set_selected(Vec::<String>::new());
        assert!(filter.is_none_selected());
        assert!(filter.selected().is_empty());
        assert_eq!(filter.summary(), "None");
    }

    #[test]
    fn test_partial_selection_summary() {
        let mut filter = FilterState::new(universe());
        filter.set_selected(["Prairie permanente", "Estives et landes", "Inconnu"]);
        assert_eq!(filter.selected().len(), 2);
        assert_eq!(filter.summary(), "2 types");
    }

    #[test]
    fn test_toggle() {
        let mut filter = FilterState::new(universe());
        assert!(filter.toggle("Prairie temporaire"));
        assert!(!filter.is_selected("Prairie temporaire"));
        assert!(filter.toggle("Prairie temporaire"));
        assert!(filter.is_all_selected());
        assert!(!filter.toggle("Vigne"));
    }

    #[test]
    fn test_duplicates_in_universe() {
        let filter = FilterState::new(vec!["A".to_string(), "A".to_string()]);
        assert_eq!(filter.universe().len(), 1);
    }
}
