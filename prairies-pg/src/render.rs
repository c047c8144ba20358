//! Rendu console et export GeoJSON des couches
//!
//! Les couches dessinées ou recolorées peuvent être écrites en GeoJSON
//! (géométries sérialisées en streaming avec geozero), avec la couleur de
//! remplissage et les statistiques jointes en propriétés.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use geodrill::scale::fill_color;
use geodrill::{Area, Indicator, Level, PanelSummary, RenderEffect, Renderer, ScaleDomain};

/// Affiche les effets sur une sortie texte
pub struct ConsoleRenderer<W: Write> {
    out: W,
    export_dir: Option<PathBuf>,
    applied: usize,
}

impl ConsoleRenderer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            export_dir: None,
            applied: 0,
        }
    }

    /// Écrit chaque couche dessinée dans `dir/<niveau>.geojson`
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }

    /// Nombre d'effets appliqués
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_effect(&mut self, effect: &RenderEffect) -> std::io::Result<()> {
        match effect {
            RenderEffect::RenderLayer {
                level,
                features,
                indicator,
                domain,
            }
            | RenderEffect::Recolor {
                level,
                features,
                indicator,
                domain,
            } => {
                writeln!(
                    self.out,
                    "== {} layer: {} areas, {} ==",
                    level.label(),
                    features.len(),
                    indicator.label()
                )?;
                for area in features {
                    writeln!(
                        self.out,
                        "  {:>6}  {:<32} {:>12}  {:>6} parcels  {}",
                        area.code,
                        area.name,
                        format_value(area.value(*indicator), *indicator),
                        area.stats.as_ref().map(|s| s.parcel_count()).unwrap_or(0),
                        fill_color(area, *indicator, domain.as_ref())
                    )?;
                }
                if let Some(dir) = &self.export_dir {
                    let path = dir.join(export_file_name(*level));
                    if let Err(e) = export_layer(&path, features, *indicator, domain.as_ref()) {
                        warn!(path = %path.display(), error = %e, "Layer export failed");
                    }
                }
            }
            RenderEffect::ClearLayer(level) => {
                writeln!(self.out, "-- {} layer cleared", level.label())?;
            }
            RenderEffect::SetOpacity { level, opacity } => {
                debug!(level = %level, opacity = opacity, "Layer opacity");
            }
            RenderEffect::UpdateLegend {
                indicator, ticks, ..
            } => {
                let ticks: Vec<String> = ticks.iter().map(|t| format!("{:.1}", t)).collect();
                writeln!(
                    self.out,
                    "Legend ({}, {}): {}",
                    indicator.label(),
                    indicator.unit(),
                    ticks.join(" | ")
                )?;
            }
            RenderEffect::UpdatePanel(panel) => self.write_panel(panel)?,
            RenderEffect::ZoomTo { feature, max_zoom } => {
                writeln!(self.out, "Zoom to {} (max zoom {})", feature.name, max_zoom)?;
            }
            RenderEffect::ResetZoom => writeln!(self.out, "Zoom reset")?,
            RenderEffect::Highlight { level, code } => {
                writeln!(self.out, "Highlighted {} {}", level, code)?;
            }
            RenderEffect::BackButton(Some(label)) => writeln!(self.out, "[{}]", label)?,
            RenderEffect::BackButton(None) => {}
            RenderEffect::FilterSummary(summary) => writeln!(self.out, "Filter: {}", summary)?,
            RenderEffect::ScatterPlot { level, points } => {
                writeln!(
                    self.out,
                    "== Scatter {}: {} points (altitude m / slope %) ==",
                    level,
                    points.len()
                )?;
                for point in points {
                    writeln!(
                        self.out,
                        "  {:>14}  {:<32} {:>12} {:>10}",
                        point.code,
                        point.name,
                        format_value(point.value(Indicator::Altitude), Indicator::Altitude),
                        format_value(point.value(Indicator::Slope), Indicator::Slope)
                    )?;
                }
            }
            RenderEffect::ScatterHighlight { code } => {
                writeln!(self.out, "Scatter point {}", code)?;
            }
        }
        Ok(())
    }

    fn write_panel(&mut self, panel: &PanelSummary) -> std::io::Result<()> {
        writeln!(self.out, "+ {} {} ({})", panel.level_label, panel.name, panel.code)?;
        writeln!(
            self.out,
            "| {}: {}",
            panel.indicator.label(),
            format_value(panel.value, panel.indicator)
        )?;
        writeln!(
            self.out,
            "| {} parcels, {:.1} ha",
            panel.parcel_count, panel.total_surface
        )?;
        for category in &panel.top_types {
            writeln!(
                self.out,
                "|   {:<28} {:>10.1} ha",
                category.label, category.surface
            )?;
        }
        Ok(())
    }
}

impl<W: Write> Renderer for ConsoleRenderer<W> {
    fn apply(&mut self, effect: &RenderEffect) {
        self.applied += 1;
        if let Err(e) = self.write_effect(effect) {
            warn!(effect = effect.kind(), error = %e, "Failed to render effect");
        }
    }
}

fn format_value(value: Option<f64>, indicator: Indicator) -> String {
    match value {
        Some(v) => format!("{:.1} {}", v, indicator.unit()),
        None => "no data".to_string(),
    }
}

/// Exporte une couche en FeatureCollection GeoJSON
pub fn export_layer(
    path: &Path,
    features: &[Area],
    indicator: Indicator,
    domain: Option<&ScaleDomain>,
) -> Result<()> {
    let file =
        File::create(path).context(format!("Failed to create file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_layer(&mut writer, features, indicator, domain)?;
    writer.flush()?;
    Ok(())
}

/// Écrit une couche en GeoJSON (streaming)
pub fn write_layer<W: Write>(
    writer: &mut W,
    features: &[Area],
    indicator: Indicator,
    domain: Option<&ScaleDomain>,
) -> Result<()> {
    write!(writer, r#"{{"type":"FeatureCollection","features":["#)?;
    for (i, area) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(writer, area, indicator, domain)?;
    }
    write!(writer, "]}}")?;
    Ok(())
}

fn write_feature<W: Write>(
    writer: &mut W,
    area: &Area,
    indicator: Indicator,
    domain: Option<&ScaleDomain>,
) -> Result<()> {
    write!(writer, r#"{{"type":"Feature","id":"#)?;
    serde_json::to_writer(&mut *writer, &area.code)?;

    write!(writer, r#","geometry":"#)?;
    match area.geometry.as_deref() {
        Some(geometry) => {
            let mut buf = Vec::new();
            geometry.process_geom(&mut GeoJsonWriter::new(&mut buf))?;
            writer.write_all(&buf)?;
        }
        None => write!(writer, "null")?,
    }

    write!(writer, r#","properties":"#)?;
    serde_json::to_writer(&mut *writer, &properties(area, indicator, domain))?;
    write!(writer, "}}")?;
    Ok(())
}

fn properties(area: &Area, indicator: Indicator, domain: Option<&ScaleDomain>) -> Value {
    let mut props = Map::new();
    props.insert("code".into(), json!(area.code));
    props.insert("name".into(), json!(area.name));
    props.insert("level".into(), json!(area.level));
    props.insert("fill".into(), json!(fill_color(area, indicator, domain)));
    props.insert("indicator".into(), json!(indicator));
    if let Some(parent) = &area.parent_code {
        props.insert("parent".into(), json!(parent));
    }
    if let Some(stats) = &area.stats {
        props.insert("parcel_count".into(), json!(stats.parcel_count()));
        props.insert("surface".into(), json!(stats.total_surface()));
        props.insert("altitude".into(), json!(stats.altitude()));
        props.insert("slope".into(), json!(stats.slope()));
    }
    Value::Object(props)
}

/// Nom du fichier d'export d'une couche
pub fn export_file_name(level: Level) -> String {
    format!("{}.geojson", level)
}
