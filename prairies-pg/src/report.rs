//! Rapport de session
//!
//! Compte les transitions appliquées, les résultats périmés écartés, les
//! échecs et les effets émis pendant une session de navigation.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use geodrill::{JumpReport, Outcome, RenderEffect};

/// Action en échec
#[derive(Debug, Clone, Serialize)]
pub struct SessionError {
    /// Commande à l'origine de l'échec
    pub action: String,
    pub message: String,
}

/// Rapport complet d'une session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    /// Configuration utilisée (preset ou fichier)
    pub config: String,
    pub duration_secs: f64,

    /// Transitions appliquées (nouvelle couche)
    pub committed: usize,
    /// Actions sans nouvelle couche
    pub unchanged: usize,
    /// Résultats écartés au profit d'une action plus récente
    pub stale_discarded: usize,
    pub failures: usize,

    pub searches: usize,
    pub jumps: usize,
    pub jumps_aborted: usize,

    /// Effets émis par type
    pub effects_by_kind: HashMap<String, usize>,

    pub errors: Vec<SessionError>,
}

impl SessionReport {
    pub fn new(config: &str) -> Self {
        Self {
            config: config.to_string(),
            ..Default::default()
        }
    }

    /// Enregistre les effets émis
    pub fn record_effects(&mut self, effects: &[RenderEffect]) {
        for effect in effects {
            *self
                .effects_by_kind
                .entry(effect.kind().to_string())
                .or_default() += 1;
        }
    }

    /// Enregistre l'issue d'une action et ses effets
    pub fn record_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Committed(commit) => {
                self.committed += 1;
                self.record_effects(&commit.effects);
            }
            Outcome::Unchanged(effects) => {
                self.unchanged += 1;
                self.record_effects(effects);
            }
            Outcome::Stale => self.stale_discarded += 1,
        }
    }

    pub fn record_failure(&mut self, action: &str, message: impl ToString) {
        self.failures += 1;
        self.errors.push(SessionError {
            action: action.to_string(),
            message: message.to_string(),
        });
    }

    pub fn record_search(&mut self) {
        self.searches += 1;
    }

    pub fn record_jump(&mut self, report: &JumpReport) {
        self.jumps += 1;
        self.record_effects(&report.effects);
        if let Some(reason) = &report.aborted {
            self.jumps_aborted += 1;
            self.record_failure("jump", reason);
        }
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Nombre total d'effets émis
    pub fn total_effects(&self) -> usize {
        self.effects_by_kind.values().sum()
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("SESSION REPORT - {}", self.config);
        println!("{}", "=".repeat(60));

        println!("\nDuration: {:.2}s", self.duration_secs);

        println!("\n--- NAVIGATION ---");
        println!(
            "Transitions: {} committed, {} unchanged, {} stale, {} failed",
            self.committed, self.unchanged, self.stale_discarded, self.failures
        );
        println!(
            "Search: {} queries, {} jumps ({} aborted)",
            self.searches, self.jumps, self.jumps_aborted
        );

        if !self.effects_by_kind.is_empty() {
            println!("\n--- EFFECTS ({}) ---", self.total_effects());
            let mut kinds: Vec<_> = self.effects_by_kind.iter().collect();
            kinds.sort_by_key(|(k, _)| k.as_str());
            for (kind, count) in kinds {
                println!("  {}: {}", kind, count);
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                println!("  [{}] {}", e.action, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} committed, {} stale, {} failed, {} effects",
            self.config,
            self.committed,
            self.stale_discarded,
            self.failures,
            self.total_effects()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodrill::{Commit, Level};

    #[test]
    fn test_record_outcomes() {
        let mut report = SessionReport::new("geo-api");
        report.record_outcome(&Outcome::Committed(Commit {
            level: Level::Department,
            features: Vec::new(),
            effects: vec![
                RenderEffect::ClearLayer(Level::Commune),
                RenderEffect::BackButton(Some("Back to regions")),
                RenderEffect::ResetZoom,
            ],
        }));
        report.record_outcome(&Outcome::Stale);
        report.record_outcome(&Outcome::Unchanged(vec![RenderEffect::ResetZoom]));

        assert_eq!(report.committed, 1);
        assert_eq!(report.stale_discarded, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.effects_by_kind.get("reset_zoom"), Some(&2));
        assert_eq!(report.total_effects(), 4);
    }

    #[test]
    fn test_aborted_jump_counts_as_failure() {
        let mut report = SessionReport::new("local");
        report.record_jump(&JumpReport {
            effects: vec![RenderEffect::ResetZoom],
            reached: Some((Level::Region, "84".to_string())),
            aborted: Some("fetch failed".to_string()),
        });

        assert_eq!(report.jumps, 1);
        assert_eq!(report.jumps_aborted, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(report.errors[0].action, "jump");
    }

    #[test]
    fn test_summary() {
        let mut report = SessionReport::new("geo-api");
        report.record_failure("region 84", "timed out");
        let summary = report.summary();
        assert!(summary.contains("geo-api"));
        assert!(summary.contains("1 failed"));
    }

    #[test]
    fn test_save_to_file() {
        let path = std::env::temp_dir().join(format!("prairies-report-{}.json", std::process::id()));
        let mut report = SessionReport::new("local");
        report.record_search();
        report.save_to_file(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["searches"], 1);
        std::fs::remove_file(&path).unwrap();
    }
}
