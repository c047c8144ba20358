//! Définition et implémentation des commandes CLI
//!
//! - `shell` (défaut): navigation interactive, une commande par ligne
//! - `categories`: types d'occupation du sol présents dans les données
//! - `search`: recherche de lieux
//! - `jump`: ouvre la carte directement sur une zone

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use geodrill::{
    AggregationProvider, Candidate, DrillError, GeographyRegistry, InMemoryProvider, Indicator,
    JumpTarget, Level, Outcome, RenderEffect, Renderer, SearchResolver, Viewer,
};
use prairies_pg::config::ViewerConfig;
use prairies_pg::render::ConsoleRenderer;
use prairies_pg::report::SessionReport;
use prairies_pg::sources::{
    create_pool, test_connection, DatabaseConfig, DatabaseOverrides, GeoApiSource,
    PgAggregationProvider,
};

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive drill-down shell (default)
    Shell,

    /// List the land-cover types found in the parcel data
    Categories,

    /// Search regions, departments and communes by name
    Search {
        /// Text to search (at least 2 characters)
        text: String,
    },

    /// Open the map directly on a region, department or commune
    Jump {
        /// Level of the target: region, department or commune
        kind: Level,

        /// INSEE code of the target (e.g. 84, 38, 38185)
        code: String,
    },
}

/// Sources de données et sorties, communes à toutes les commandes
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Config preset name (geo-api/local) or path to a JSON config
    #[arg(long, default_value = "geo-api", global = true)]
    pub config: String,

    /// JSON file of parcel records, aggregated in memory instead of PostgreSQL
    #[arg(long, global = true)]
    pub parcels: Option<PathBuf>,

    /// Write every rendered layer as GeoJSON into this directory
    #[arg(long, global = true)]
    pub export_dir: Option<PathBuf>,

    /// Save the session report as JSON
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / prairies)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long, global = true)]
    pub ssl: Option<String>,
}

impl SourceArgs {
    fn overrides(&self) -> DatabaseOverrides {
        DatabaseOverrides {
            host: self.host.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            port: self.port,
            ssl: self.ssl.clone(),
        }
    }
}

/// Moteur d'agrégation: fichier de parcelles en mémoire ou PostgreSQL
async fn build_provider(
    config: &ViewerConfig,
    args: &SourceArgs,
) -> Result<Arc<dyn AggregationProvider>> {
    if let Some(path) = &args.parcels {
        let text = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read parcels file: {}", path.display()))?;
        let provider = InMemoryProvider::from_json(&text)?;
        info!(parcels = provider.len(), path = %path.display(), "In-memory parcels loaded");
        return Ok(Arc::new(provider));
    }

    let db_config = DatabaseConfig::resolve(args.overrides())?;
    info!(host = %db_config.host, database = %db_config.dbname, "Connecting to PostgreSQL");

    let pool = create_pool(&db_config).await?;
    let version = test_connection(&pool).await?;
    info!(server_version = %version, "Database connection OK");

    Ok(Arc::new(PgAggregationProvider::new(pool, &config.parcels)?))
}

async fn load_registry(config: &ViewerConfig) -> Result<Arc<GeographyRegistry>> {
    let source = Arc::new(GeoApiSource::new(config.geography.clone()));
    let registry = GeographyRegistry::load(source, config.registry_options())
        .await
        .context("Failed to load geography")?;
    Ok(Arc::new(registry))
}

/// Session interactive: carte, rendu et rapport
struct Session {
    viewer: Viewer,
    renderer: ConsoleRenderer<std::io::Stdout>,
    report: SessionReport,
    candidates: Vec<Candidate>,
}

impl Session {
    async fn open(args: &SourceArgs) -> Result<Self> {
        let config = ViewerConfig::resolve(&args.config)?;
        let provider = build_provider(&config, args).await?;
        let registry = load_registry(&config).await?;

        let (viewer, effects) = Viewer::open(registry, provider, config.search.into())
            .await
            .context("Failed to open viewer")?;

        let mut renderer = ConsoleRenderer::stdout();
        if let Some(dir) = &args.export_dir {
            std::fs::create_dir_all(dir)
                .context(format!("Failed to create export dir: {}", dir.display()))?;
            renderer = renderer.with_export_dir(dir);
        }

        let mut session = Self {
            viewer,
            renderer,
            report: SessionReport::new(&args.config),
            candidates: Vec::new(),
        };
        session.show(&effects);
        Ok(session)
    }

    fn show(&mut self, effects: &[RenderEffect]) {
        self.report.record_effects(effects);
        self.renderer.apply_all(effects);
    }

    fn apply(&mut self, action: &str, result: Result<Outcome, DrillError>) {
        match result {
            Ok(outcome) => {
                self.report.record_outcome(&outcome);
                self.renderer.apply_all(&outcome.into_effects());
            }
            Err(e) => {
                println!("error: {}", e);
                self.report.record_failure(action, e);
            }
        }
    }

    async fn jump(&mut self, target: &JumpTarget) {
        let report = self.viewer.jump(target).await;
        self.report.record_jump(&report);
        self.renderer.apply_all(&report.effects);
        if let Some(reason) = &report.aborted {
            println!("jump aborted: {}", reason);
        }
    }

    async fn search(&mut self, text: &str) {
        self.report.record_search();
        if is_too_short(&self.viewer.search, text) {
            return;
        }
        self.candidates = self.viewer.search.search(text).await;
        print_candidates(&self.candidates);
    }

    async fn status(&self) {
        let snapshot = self.viewer.navigator.snapshot().await;
        let filter = self.viewer.navigator.filter_handle().read().await.summary();
        println!("Level: {} ({} areas)", snapshot.level.label(), snapshot.features.len());
        println!(
            "Region: {}  Department: {}  Commune: {}",
            snapshot.active_region.as_deref().unwrap_or("-"),
            snapshot.active_department.as_deref().unwrap_or("-"),
            snapshot.selected_commune.as_deref().unwrap_or("-")
        );
        println!("Indicator: {}  Filter: {}", snapshot.indicator.label(), filter);
        println!(
            "Scatter: {} (depth {})",
            self.viewer.scatter.level().await,
            self.viewer.scatter.depth().await
        );
    }

    /// Exécute une commande; `false` pour quitter
    async fn run(&mut self, command: ShellCommand) -> bool {
        match command {
            ShellCommand::Select(Level::Region, code) => {
                let result = self.viewer.navigator.select_region(&code).await;
                self.apply(&format!("region {}", code), result);
            }
            ShellCommand::Select(Level::Department, code) => {
                let result = self.viewer.navigator.select_department(&code).await;
                self.apply(&format!("department {}", code), result);
            }
            ShellCommand::Select(level, code) => {
                let result = self.viewer.navigator.select_commune(&code).await;
                self.apply(&format!("{} {}", level, code), result);
            }
            ShellCommand::Back => {
                let effects = self.viewer.navigator.back().await;
                self.show(&effects);
            }
            ShellCommand::Filter(FilterChange::All) => {
                let effects = self.viewer.navigator.update_filter(|f| f.select_all()).await;
                self.show(&effects);
            }
            ShellCommand::Filter(FilterChange::None) => {
                let effects = self.viewer.navigator.update_filter(|f| f.select_none()).await;
                self.show(&effects);
            }
            ShellCommand::Filter(FilterChange::Only(labels)) => {
                let effects = self.viewer.navigator.set_filter(labels).await;
                self.show(&effects);
            }
            ShellCommand::Toggle(label) => {
                let effects = self.viewer.navigator.toggle_category(&label).await;
                self.show(&effects);
            }
            ShellCommand::Indicator(indicator) => {
                let effects = self.viewer.navigator.set_indicator(indicator).await;
                self.show(&effects);
            }
            ShellCommand::Search(text) => self.search(&text).await,
            ShellCommand::JumpTo(n) => match n.checked_sub(1).and_then(|i| self.candidates.get(i)) {
                Some(candidate) => {
                    let target = JumpTarget::from(candidate);
                    self.jump(&target).await;
                }
                None => println!("No search result #{}", n),
            },
            ShellCommand::Scatter => {
                let result = self.viewer.scatter.start().await;
                self.apply("scatter", result);
            }
            ShellCommand::Drill(code) => {
                let result = self.viewer.scatter.drill(&code).await;
                self.apply(&format!("drill {}", code), result);
            }
            ShellCommand::Point(code) => {
                let result = self.viewer.scatter.highlight(&code).await;
                self.apply(&format!("point {}", code), result);
            }
            ShellCommand::Up => {
                let outcome = self.viewer.scatter.back().await;
                self.apply("up", Ok(outcome));
            }
            ShellCommand::Status => self.status().await,
            ShellCommand::Help => print_help(),
            ShellCommand::Quit => return false,
        }
        true
    }

    fn finish(mut self, started: Instant, report_path: Option<&PathBuf>) -> Result<()> {
        self.report.set_duration(started.elapsed());
        self.report.display();
        if let Some(path) = report_path {
            self.report.save_to_file(path)?;
            info!(path = %path.display(), "Session report saved");
        }
        info!("{}", self.report.summary());
        Ok(())
    }
}

/// Modification du filtre demandée dans le shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    All,
    None,
    Only(Vec<String>),
}

/// Commande du shell interactif
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Select(Level, String),
    Back,
    Filter(FilterChange),
    Toggle(String),
    Indicator(Indicator),
    Search(String),
    /// Saut vers le n-ième résultat de la dernière recherche (à partir de 1)
    JumpTo(usize),
    Scatter,
    Drill(String),
    /// Mise en évidence d'un point de la vue dispersion
    Point(String),
    Up,
    Status,
    Help,
    Quit,
}

impl std::str::FromStr for ShellCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let required = |what: &str| {
            if rest.is_empty() {
                Err(format!("Missing {} for '{}'", what, word))
            } else {
                Ok(rest.to_string())
            }
        };

        match word.to_lowercase().as_str() {
            "region" | "department" | "commune" => {
                let level: Level = word.parse()?;
                Ok(ShellCommand::Select(level, required("code")?))
            }
            "back" => Ok(ShellCommand::Back),
            "filter" => match rest.to_lowercase().as_str() {
                "" => Err("Missing types for 'filter' (all, none or a;b;c)".to_string()),
                "all" => Ok(ShellCommand::Filter(FilterChange::All)),
                "none" => Ok(ShellCommand::Filter(FilterChange::None)),
                _ => Ok(ShellCommand::Filter(FilterChange::Only(
                    rest.split(';')
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect(),
                ))),
            },
            "toggle" => Ok(ShellCommand::Toggle(required("type")?)),
            "indicator" => Ok(ShellCommand::Indicator(required("indicator")?.parse()?)),
            "search" => Ok(ShellCommand::Search(required("text")?)),
            "jump" => required("result number")?
                .parse()
                .map(ShellCommand::JumpTo)
                .map_err(|_| format!("Invalid result number: {}", rest)),
            "scatter" => Ok(ShellCommand::Scatter),
            "drill" => Ok(ShellCommand::Drill(required("code")?)),
            "point" => Ok(ShellCommand::Point(required("code")?)),
            "up" => Ok(ShellCommand::Up),
            "status" => Ok(ShellCommand::Status),
            "help" | "?" => Ok(ShellCommand::Help),
            "quit" | "exit" | "q" => Ok(ShellCommand::Quit),
            _ => Err(format!("Unknown command: {}. Type 'help'", word)),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  region|department|commune <code>  select an area on the map");
    println!("  back                              go up one level");
    println!("  filter all|none|<type>[;<type>]   set the land-cover filter");
    println!("  toggle <type>                     add or remove one land-cover type");
    println!("  indicator altitude|slope          switch the mapped indicator");
    println!("  search <text>                     find regions, departments, communes");
    println!("  jump <n>                          go to the n-th search result");
    println!("  scatter | drill <code> | up       scatter view navigation");
    println!("  point <code>                      highlight a scatter point");
    println!("  status | help | quit");
}

/// Affiche la longueur minimale si la requête est trop courte
fn is_too_short(resolver: &SearchResolver, text: &str) -> bool {
    let min = resolver.options().min_query_len;
    let short = text.trim().chars().count() < min;
    if short {
        println!("Type at least {} characters", min);
    }
    short
}

fn print_candidates(candidates: &[Candidate]) {
    if candidates.is_empty() {
        println!("No result");
        return;
    }
    for (i, c) in candidates.iter().enumerate() {
        println!("  {}. {:<10} {:<32} {}", i + 1, c.level.label(), c.name, c.code);
    }
}

/// Exécute le shell interactif
pub async fn cmd_shell(args: &SourceArgs) -> Result<()> {
    let started = Instant::now();
    let mut session = Session::open(args).await?;
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ShellCommand>() {
            Ok(command) => {
                if !session.run(command).await {
                    break;
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    session.finish(started, args.report.as_ref())
}

/// Liste les types d'occupation du sol
pub async fn cmd_categories(args: &SourceArgs) -> Result<()> {
    let config = ViewerConfig::resolve(&args.config)?;
    let provider = build_provider(&config, args).await?;
    let categories = provider
        .land_cover_categories()
        .await
        .context("Failed to list land-cover types")?;

    if categories.is_empty() {
        warn!("No land-cover type found");
    }
    for label in &categories {
        println!("{}", label);
    }
    info!(categories = categories.len(), "Land-cover types listed");
    Ok(())
}

/// Recherche de lieux, sans moteur d'agrégation
pub async fn cmd_search(args: &SourceArgs, text: &str) -> Result<()> {
    let config = ViewerConfig::resolve(&args.config)?;
    let registry = load_registry(&config).await?;
    let resolver = SearchResolver::new(registry, config.search.into());
    if !is_too_short(&resolver, text) {
        print_candidates(&resolver.search(text).await);
    }
    Ok(())
}

/// Ouvre la carte puis saute vers la zone demandée
pub async fn cmd_jump(args: &SourceArgs, level: Level, code: &str) -> Result<()> {
    if level == Level::Parcel {
        anyhow::bail!("Cannot jump to a parcel. Use: region, department, commune");
    }
    let started = Instant::now();
    let mut session = Session::open(args).await?;
    session.jump(&JumpTarget::new(level, code)).await;

    let aborted = session.report.jumps_aborted > 0;
    session.finish(started, args.report.as_ref())?;
    if aborted {
        anyhow::bail!("Jump to {} {} did not complete", level, code);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ShellCommand {
        line.parse().unwrap()
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse("region 84"),
            ShellCommand::Select(Level::Region, "84".to_string())
        );
        assert_eq!(
            parse("  Department   2A "),
            ShellCommand::Select(Level::Department, "2A".to_string())
        );
        assert_eq!(
            parse("commune 1004"),
            ShellCommand::Select(Level::Commune, "1004".to_string())
        );
        assert!("region".parse::<ShellCommand>().is_err());
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse("filter all"), ShellCommand::Filter(FilterChange::All));
        assert_eq!(parse("filter NONE"), ShellCommand::Filter(FilterChange::None));
        assert_eq!(
            parse("filter Prairie permanente; Estives et landes ;"),
            ShellCommand::Filter(FilterChange::Only(vec![
                "Prairie permanente".to_string(),
                "Estives et landes".to_string(),
            ]))
        );
        assert_eq!(
            parse("toggle Prairie temporaire"),
            ShellCommand::Toggle("Prairie temporaire".to_string())
        );
    }

    #[test]
    fn test_parse_indicator_and_jump() {
        assert_eq!(
            parse("indicator slope"),
            ShellCommand::Indicator(Indicator::Slope)
        );
        assert!("indicator rainfall".parse::<ShellCommand>().is_err());
        assert_eq!(parse("jump 2"), ShellCommand::JumpTo(2));
        assert!("jump two".parse::<ShellCommand>().is_err());
    }

    #[test]
    fn test_parse_scatter_and_misc() {
        assert_eq!(parse("scatter"), ShellCommand::Scatter);
        assert_eq!(parse("drill 38"), ShellCommand::Drill("38".to_string()));
        assert_eq!(parse("point p1"), ShellCommand::Point("p1".to_string()));
        assert!("point".parse::<ShellCommand>().is_err());
        assert_eq!(parse("up"), ShellCommand::Up);
        assert_eq!(parse("q"), ShellCommand::Quit);
        assert_eq!(
            parse("search saint"),
            ShellCommand::Search("saint".to_string())
        );
        assert!("paint 84".parse::<ShellCommand>().is_err());
    }
}
