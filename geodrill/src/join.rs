//! Jointure des statistiques sur les zones affichées
//!
//! Chaque zone reçoit les statistiques de son code, ou `None`. Aucune zone
//! n'est retirée faute de ligne d'agrégation, et les zones sont recréées à
//! chaque réponse (jamais modifiées en place).

use std::collections::HashSet;

use crate::types::{Area, StatsByCode};

/// Associe à chaque zone les statistiques de son code
pub fn join_stats(features: &[Area], stats: &StatsByCode) -> Vec<Area> {
    features
        .iter()
        .map(|f| f.clone().with_stats(stats.get(&f.code).cloned()))
        .collect()
}

/// Ne garde que les zones dont le code est dans `members`
pub fn keep_members<'a>(
    features: impl IntoIterator<Item = &'a Area>,
    members: &[String],
) -> Vec<Area> {
    let members: HashSet<&str> = members.iter().map(String::as_str).collect();
    features
        .into_iter()
        .filter(|f| members.contains(f.code.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{build_stats, StatsRow};
    use crate::types::Level;

    fn departments() -> Vec<Area> {
        vec![
            Area::new(Level::Department, "01", "Ain"),
            Area::new(Level::Department, "38", "Isère"),
            Area::new(Level::Department, "75", "Paris"),
        ]
    }

    fn stats() -> StatsByCode {
        build_stats(vec![StatsRow {
            code: "38".to_string(),
            land_cover: "Prairie permanente".to_string(),
            parcel_count: 4,
            surface: 20.0,
            altitude: 900.0,
            slope: 12.0,
        }])
    }

    #[test]
    fn test_join_keeps_every_area() {
        let joined = join_stats(&departments(), &stats());
        assert_eq!(joined.len(), 3);
        assert!(joined[0].stats.is_none());
        assert_eq!(joined[1].stats.as_ref().unwrap().parcel_count(), 4);
        assert!(joined[2].stats.is_none());
    }

    #[test]
    fn test_join_replaces_previous_stats() {
        let first = join_stats(&departments(), &stats());
        let cleared = join_stats(&first, &StatsByCode::new());
        assert!(cleared.iter().all(|a| a.stats.is_none()));
    }

    #[test]
    fn test_keep_members() {
        let members = vec!["01".to_string(), "38".to_string()];
        let kept = keep_members(&departments(), &members);
        let codes: Vec<_> = kept.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["01", "38"]);
    }
}
