//! Moteur d'agrégation PostgreSQL
//!
//! Une ligne par (zone, type d'occupation): nombre de parcelles, surface et
//! moyennes d'altitude et de pente pondérées par la surface. Le filtre est
//! transmis comme paramètre `text[]`.

use anyhow::Result;
use deadpool_postgres::Pool;
use tokio_postgres::Row;
use tracing::debug;

use geodrill::provider::build_stats;
use geodrill::{
    AggregationLevel, AggregationProvider, BoxFuture, DrillError, ParcelStats, StatsByCode,
    StatsRow,
};

use crate::config::ParcelTable;

/// Requêtes préparées à partir du mapping de table
#[derive(Debug, Clone)]
struct Queries {
    categories: String,
    by_region: String,
    by_department: String,
    by_commune: String,
    communes_in_department: String,
    parcels_in_commune: String,
}

impl Queries {
    fn new(t: &ParcelTable) -> Self {
        let from = t.qualified();
        let commune = format!("lpad({}::text, 5, '0')", t.commune);

        let grouped = |key: &str, extra: &str| {
            format!(
                "SELECT {key} AS code, {lc} AS land_cover, COUNT(*)::bigint AS parcel_count, \
                 COALESCE(SUM({s}::float8), 0) AS surface, \
                 COALESCE(SUM({a}::float8 * {s}::float8) / NULLIF(SUM({s}::float8), 0), AVG({a}::float8)) AS altitude, \
                 COALESCE(SUM({p}::float8 * {s}::float8) / NULLIF(SUM({s}::float8), 0), AVG({p}::float8)) AS slope \
                 FROM {from} WHERE {lc} = ANY($1) AND {key} IS NOT NULL{extra} GROUP BY 1, 2",
                key = key,
                lc = t.land_cover,
                s = t.surface,
                a = t.altitude,
                p = t.slope,
                from = from,
                extra = extra,
            )
        };

        Self {
            categories: format!(
                "SELECT DISTINCT {lc} FROM {from} WHERE {lc} IS NOT NULL ORDER BY 1",
                lc = t.land_cover,
                from = from
            ),
            by_region: grouped(&format!("{}::text", t.region), ""),
            by_department: grouped(&format!("{}::text", t.department), ""),
            by_commune: grouped(&commune, ""),
            communes_in_department: grouped(
                &commune,
                &format!(" AND {}::text = $2", t.department),
            ),
            parcels_in_commune: format!(
                "SELECT {id}::text AS id, {commune} AS commune, {lc} AS land_cover, \
                 {s}::float8 AS surface, {a}::float8 AS altitude, {p}::float8 AS slope \
                 FROM {from} WHERE {lc} = ANY($1) AND {commune} = $2",
                id = t.id,
                commune = commune,
                lc = t.land_cover,
                s = t.surface,
                a = t.altitude,
                p = t.slope,
                from = from,
            ),
        }
    }
}

/// Agrégation des parcelles stockées dans PostgreSQL
pub struct PgAggregationProvider {
    pool: Pool,
    queries: Queries,
}

impl PgAggregationProvider {
    pub fn new(pool: Pool, table: &ParcelTable) -> Result<Self> {
        table.validate()?;
        Ok(Self {
            pool,
            queries: Queries::new(table),
        })
    }

    async fn query(
        &self,
        what: &str,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<Row>, DrillError> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| DrillError::fetch(what, e))?;
        let rows = client
            .query(sql, params)
            .await
            .map_err(|e| DrillError::fetch(what, e))?;
        debug!(what = what, rows = rows.len(), "Query done");
        Ok(rows)
    }

    async fn grouped(
        &self,
        what: &str,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<StatsByCode, DrillError> {
        let rows = self.query(what, sql, params).await?;
        let rows = rows
            .iter()
            .map(|row| stats_row(row).map_err(|e| DrillError::decode(what, e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(build_stats(rows))
    }
}

fn stats_row(row: &Row) -> Result<StatsRow, tokio_postgres::Error> {
    let parcel_count: i64 = row.try_get("parcel_count")?;
    Ok(StatsRow {
        code: row.try_get("code")?,
        land_cover: row.try_get("land_cover")?,
        parcel_count: parcel_count.max(0) as u64,
        surface: row.try_get("surface")?,
        altitude: row.try_get::<_, Option<f64>>("altitude")?.unwrap_or_default(),
        slope: row.try_get::<_, Option<f64>>("slope")?.unwrap_or_default(),
    })
}

fn parcel_row(row: &Row) -> Result<ParcelStats, tokio_postgres::Error> {
    Ok(ParcelStats {
        id: row.try_get("id")?,
        commune: row.try_get("commune")?,
        land_cover: row.try_get("land_cover")?,
        surface: row.try_get::<_, Option<f64>>("surface")?.unwrap_or_default(),
        altitude: row.try_get::<_, Option<f64>>("altitude")?.unwrap_or_default(),
        slope: row.try_get::<_, Option<f64>>("slope")?.unwrap_or_default(),
    })
}

impl AggregationProvider for PgAggregationProvider {
    fn land_cover_categories(&self) -> BoxFuture<'_, Result<Vec<String>, DrillError>> {
        Box::pin(async move {
            let rows = self
                .query("land-cover categories", &self.queries.categories, &[])
                .await?;
            rows.iter()
                .map(|row| row.try_get::<_, String>(0))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DrillError::decode("land-cover categories", e))
        })
    }

    fn aggregate_by_level<'a>(
        &'a self,
        level: AggregationLevel,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<StatsByCode, DrillError>> {
        Box::pin(async move {
            let sql = match level {
                AggregationLevel::Region => &self.queries.by_region,
                AggregationLevel::Department => &self.queries.by_department,
                AggregationLevel::Commune => &self.queries.by_commune,
            };
            self.grouped(&format!("{} aggregation", level.key()), sql, &[&selected])
                .await
        })
    }

    fn aggregate_communes_in_department<'a>(
        &'a self,
        department: &'a str,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<StatsByCode, DrillError>> {
        Box::pin(async move {
            self.grouped(
                "commune aggregation",
                &self.queries.communes_in_department,
                &[&selected, &department],
            )
            .await
        })
    }

    fn parcels_in_commune<'a>(
        &'a self,
        commune: &'a str,
        selected: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ParcelStats>, DrillError>> {
        Box::pin(async move {
            let rows = self
                .query(
                    "commune parcels",
                    &self.queries.parcels_in_commune,
                    &[&selected, &commune],
                )
                .await?;
            rows.iter()
                .map(parcel_row)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DrillError::decode("commune parcels", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_use_mapping() {
        let queries = Queries::new(&ParcelTable::default());

        assert!(queries.by_region.starts_with("SELECT reg_parc::text AS code"));
        assert!(queries.by_region.contains("FROM public.parcelles"));
        assert!(queries.by_region.contains("libelle_group = ANY($1)"));
        assert!(queries.by_region.contains("GROUP BY 1, 2"));
        assert!(queries
            .by_commune
            .starts_with("SELECT lpad(com_parc::text, 5, '0') AS code"));
        assert!(queries
            .communes_in_department
            .contains("AND dep_parc::text = $2"));
        assert!(queries
            .parcels_in_commune
            .contains("lpad(com_parc::text, 5, '0') = $2"));
    }

    #[test]
    fn test_weighted_mean_falls_back_to_average() {
        let queries = Queries::new(&ParcelTable::default());
        assert!(queries.by_department.contains(
            "COALESCE(SUM(alt_mean::float8 * surf_parc::float8) / NULLIF(SUM(surf_parc::float8), 0), AVG(alt_mean::float8))"
        ));
    }
}
