//! The cached analysis pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lending_atlas_analytics_models::{
    AnalysisReport, AnalysisRequest, AreaSummary, ClassificationMetric, Completeness,
    DemographicComposite, GroupBy, IssueSource, SubAreaRecord,
};
use lending_atlas_cache::ResultCache;
use lending_atlas_census::DemographicSource;
use lending_atlas_database::warehouse::Warehouse;
use lending_atlas_geography::GeoidResolver;
use lending_atlas_geography_models::{AreaId, GeographySelection};
use lending_atlas_query::QueryComposer;
use lending_atlas_query_models::{FilterSet, QueryShape};
use serde::Serialize;

use crate::AnalyticsError;
use crate::classify::TractClassifier;
use crate::demographics::composite_demographics;
use crate::distribution::ClassifiedActivity;
use crate::records::{TractRecords, parse_rows};

/// Cache namespace of full analysis reports.
pub const ANALYSIS_NAMESPACE: &str = "analysis";
/// Cache namespace of per-county demographic figures.
pub const DEMOGRAPHICS_NAMESPACE: &str = "demographics";

const ACS_SCOPE: &str = "acs5";

/// Everything besides areas and years that changes a report.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestScope<'a> {
    filters: &'a FilterSet,
    group_by: GroupBy,
    demographics_vintage: Option<u16>,
}

/// Resolves, queries, classifies and aggregates one request at a time.
///
/// Steps run strictly in sequence. Warehouse, hierarchy and demographic
/// failures are recorded in the report's [`Completeness`]; only invalid
/// input fails the call. Partial reports are returned but never cached.
pub struct AnalysisPipeline {
    resolver: GeoidResolver,
    composer: QueryComposer,
    warehouse: Arc<dyn Warehouse>,
    cache: Arc<ResultCache>,
    demographics: Option<Arc<dyn DemographicSource>>,
    group_by: GroupBy,
}

impl AnalysisPipeline {
    /// Creates a pipeline without a demographic source.
    #[must_use]
    pub fn new(
        resolver: GeoidResolver,
        composer: QueryComposer,
        warehouse: Arc<dyn Warehouse>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            resolver,
            composer,
            warehouse,
            cache,
            demographics: None,
            group_by: GroupBy::default(),
        }
    }

    /// Sets the source used for demographic composites.
    #[must_use]
    pub fn with_demographics(mut self, source: Arc<dyn DemographicSource>) -> Self {
        self.demographics = Some(source);
        self
    }

    /// Sets how tracts are grouped for classification.
    #[must_use]
    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    /// The result cache shared by every request.
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Expands every selection and unions the result.
    ///
    /// A selection whose hierarchy lookup fails is skipped and recorded in
    /// `completeness`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Validation`] if any selection is malformed
    /// or resolves to no counties.
    pub async fn resolve(
        &self,
        selections: &[GeographySelection],
        completeness: &mut Completeness,
    ) -> Result<BTreeSet<AreaId>, AnalyticsError> {
        let mut areas = BTreeSet::new();

        for selection in selections {
            match self.resolver.expand(selection).await {
                Ok(expanded) => areas.extend(expanded),
                Err(e) if e.is_validation() => {
                    return Err(AnalyticsError::validation(e.to_string()));
                }
                Err(e) => {
                    log::warn!("Skipping {selection}: {e}");
                    completeness.record(
                        IssueSource::Hierarchy,
                        None,
                        format!("could not resolve {selection}: {e}"),
                    );
                }
            }
        }

        Ok(areas)
    }

    /// Runs the full pipeline for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Validation`] if the request has no
    /// selections, a selection is unresolvable, or the area or year count
    /// exceeds the composer limits.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisReport, AnalyticsError> {
        if request.selections.is_empty() {
            return Err(AnalyticsError::validation(
                "at least one geography selection is required",
            ));
        }

        let mut resolution = Completeness::default();
        let areas = self.resolve(&request.selections, &mut resolution).await?;
        let filters = request.filters.normalized();

        if areas.is_empty() {
            log::warn!("No selection could be resolved; returning an empty report");
            self.composer.check_limits(1, request.years.len())?;
            return Ok(Self::empty_report(&request.years, filters, resolution));
        }

        self.composer.validate(&areas, &request.years, &filters)?;

        let vintage = if request.include_demographics {
            request
                .demographics_vintage
                .or_else(|| request.years.last().copied())
        } else {
            None
        };
        let scope = RequestScope {
            filters: &filters,
            group_by: self.group_by,
            demographics_vintage: vintage,
        };

        log::info!(
            "Analyzing {} areas over {} years",
            areas.len(),
            request.years.len()
        );

        let mut report = self
            .cache
            .get_or_compute_if(
                ANALYSIS_NAMESPACE,
                &areas,
                request.years.iter().copied(),
                &scope,
                |report: &AnalysisReport| report.completeness.is_complete(),
                || self.compute(&areas, &request.years, &filters, vintage),
            )
            .await?;

        if !resolution.is_complete() {
            resolution.issues.append(&mut report.completeness.issues);
            report.completeness = resolution;
        }

        Ok(report)
    }

    async fn compute(
        &self,
        areas: &BTreeSet<AreaId>,
        years: &BTreeSet<u16>,
        filters: &FilterSet,
        vintage: Option<u16>,
    ) -> Result<AnalysisReport, AnalyticsError> {
        let mut completeness = Completeness::default();

        let query = self
            .composer
            .compose(QueryShape::TractActivity, areas, years, filters)?;

        let rows = match self.warehouse.fetch(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Warehouse query failed: {e}");
                completeness.record(IssueSource::Warehouse, None, e.to_string());
                vec![]
            }
        };

        let (records, dropped_records) = parse_rows(&rows);
        log::debug!(
            "Warehouse returned {} rows, {dropped_records} dropped",
            rows.len()
        );

        let minority_records: Vec<SubAreaRecord> =
            records.iter().map(|r| r.minority.clone()).collect();
        let income_records: Vec<SubAreaRecord> = records.iter().map(|r| r.income.clone()).collect();

        let minority = TractClassifier::new(ClassificationMetric::MinorityPct, self.group_by)
            .classify(&minority_records);
        let income = TractClassifier::new(ClassificationMetric::IncomeRatio, self.group_by)
            .classify(&income_records);

        let activity = ClassifiedActivity {
            records: &records,
            minority: &minority,
            income: &income,
        };
        let by_year = years.iter().map(|y| activity.summarize(Some(*y))).collect();
        let overall = activity.summarize(None);

        let demographics = match vintage {
            Some(vintage) => {
                self.demographic_composite(areas, vintage, &mut completeness)
                    .await
            }
            None => None,
        };

        let area_summaries = self.area_summaries(areas, &records, &mut completeness).await;

        let mut groups = minority.groups;
        groups.extend(income.groups);

        Ok(AnalysisReport {
            areas: area_summaries,
            years: years.iter().copied().collect(),
            filters: filters.clone(),
            by_year,
            overall,
            groups,
            demographics,
            dropped_records,
            completeness,
        })
    }

    async fn demographic_composite(
        &self,
        areas: &BTreeSet<AreaId>,
        vintage: u16,
        completeness: &mut Completeness,
    ) -> Option<DemographicComposite> {
        let Some(source) = &self.demographics else {
            log::warn!("Demographics requested but no source is configured");
            completeness.record(
                IssueSource::Demographics,
                None,
                "no demographic source configured",
            );
            return None;
        };

        let mut figures = Vec::with_capacity(areas.len());
        let mut missing = vec![];

        for area in areas {
            let result = self
                .cache
                .get_or_compute(DEMOGRAPHICS_NAMESPACE, [area], [vintage], ACS_SCOPE, || {
                    source.area_demographics(area, vintage)
                })
                .await;

            match result {
                Ok(figure) => figures.push(figure),
                Err(e) => {
                    log::warn!("Demographics unavailable for {area}: {e}");
                    completeness.record(IssueSource::Demographics, Some(area.clone()), e.to_string());
                    missing.push(area.clone());
                }
            }
        }

        Some(composite_demographics(vintage, &figures, missing))
    }

    async fn area_summaries(
        &self,
        areas: &BTreeSet<AreaId>,
        records: &[TractRecords],
        completeness: &mut Completeness,
    ) -> Vec<AreaSummary> {
        let mut totals: BTreeMap<&AreaId, (u64, f64)> = BTreeMap::new();
        for record in records {
            let total = totals.entry(record.minority.area_id()).or_default();
            total.0 += record.minority.activity_count();
            total.1 += record.minority.activity_amount();
        }

        let mut summaries = Vec::with_capacity(areas.len());
        for area in areas {
            let info = match self.resolver.describe(area).await {
                Ok(info) => info,
                Err(e) => {
                    log::warn!("Could not look up county {area}: {e}");
                    completeness.record(IssueSource::Hierarchy, Some(area.clone()), e.to_string());
                    None
                }
            };
            let (activity_count, activity_amount) = totals.get(area).copied().unwrap_or_default();

            summaries.push(AreaSummary {
                area_id: area.clone(),
                name: info.as_ref().map(|i| i.name.clone()),
                state_abbr: info.and_then(|i| i.state_abbr),
                activity_count,
                activity_amount,
            });
        }
        summaries
    }

    fn empty_report(
        years: &BTreeSet<u16>,
        filters: FilterSet,
        completeness: Completeness,
    ) -> AnalysisReport {
        let activity = ClassifiedActivity {
            records: &[],
            minority: &Default::default(),
            income: &Default::default(),
        };

        AnalysisReport {
            areas: vec![],
            years: years.iter().copied().collect(),
            filters,
            by_year: years.iter().map(|y| activity.summarize(Some(*y))).collect(),
            overall: activity.summarize(None),
            groups: vec![],
            demographics: None,
            dropped_records: 0,
            completeness,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use lending_atlas_analytics_models::ClassificationBucket;
    use lending_atlas_cache::CacheSettings;
    use lending_atlas_cache::memory::MemoryCacheStore;
    use lending_atlas_census::{AreaDemographics, DemographicError};
    use lending_atlas_database::WarehouseError;
    use lending_atlas_database::schema::open_in_memory;
    use lending_atlas_database::warehouse::DuckDbWarehouse;
    use lending_atlas_database_models::Row;
    use lending_atlas_geography::memory::MemoryHierarchy;
    use lending_atlas_geography::{AreaHierarchy, GeoError};
    use lending_atlas_geography_models::CountyInfo;
    use lending_atlas_query::ComposerLimits;
    use lending_atlas_query_models::BoundQuery;

    use super::*;

    const SEED: &str = "
        INSERT INTO loan_applications
            (activity_year, lei, county_code, census_tract, loan_purpose, action_taken,
             occupancy_type, loan_type, loan_amount, reverse_mortgage,
             open_end_line_of_credit, business_or_commercial_purpose, total_units)
        VALUES
            (2022, '5493001KJTIIGC8Y1R12', '09001', '09001010100', 1, 1, 1, 1, 300000, 2, 2, 2, 1),
            (2022, '5493001KJTIIGC8Y1R12', '09001', '09001010100', 1, 1, 1, 1, 200000, 2, 2, 2, 1),
            (2022, '5493001KJTIIGC8Y1R12', '09001', '09001010200', 1, 1, 1, 1, 400000, 2, 2, 2, 1),
            (2022, '5493001KJTIIGC8Y1R12', '09001', '09001010300', 1, 1, 1, 1, 500000, 2, 2, 2, 1),
            (2022, '5493001KJTIIGC8Y1R12', '09001', '09001010300', 1, 3, 1, 1, 500000, 2, 2, 2, 1),
            (2022, '5493001KJTIIGC8Y1R12', '09009', '09009140100', 1, 1, 1, 1, 250000, 2, 2, 2, 1);

        INSERT INTO tract_demographics (tract_geoid, year, minority_pct, income_ratio, population)
        VALUES
            ('09001010100', 2022, 10.0, 45.0, 4000),
            ('09001010200', 2022, 50.0, 100.0, 5000),
            ('09001010300', 2022, 90.0, 150.0, 6000),
            ('09009140100', 2022, 30.0, 70.0, 3000);
    ";

    fn warehouse() -> Arc<dyn Warehouse> {
        let conn = open_in_memory().unwrap();
        conn.execute_batch(SEED).unwrap();
        Arc::new(DuckDbWarehouse::new(conn, Duration::from_secs(10)))
    }

    fn hierarchy() -> Arc<dyn AreaHierarchy> {
        Arc::new(MemoryHierarchy::new([
            CountyInfo {
                area_id: AreaId::parse("09001").unwrap(),
                name: "Fairfield County".to_string(),
                state_fips: "09".to_string(),
                state_abbr: Some("CT".to_string()),
                cbsa_code: Some("14860".to_string()),
                cbsa_title: Some("Bridgeport-Stamford-Danbury, CT".to_string()),
            },
            CountyInfo {
                area_id: AreaId::parse("09009").unwrap(),
                name: "New Haven County".to_string(),
                state_fips: "09".to_string(),
                state_abbr: Some("CT".to_string()),
                cbsa_code: Some("35300".to_string()),
                cbsa_title: Some("New Haven-Milford, CT".to_string()),
            },
        ]))
    }

    fn cache() -> Arc<ResultCache> {
        Arc::new(ResultCache::new(
            Arc::new(MemoryCacheStore::new()),
            CacheSettings::default(),
        ))
    }

    fn pipeline(warehouse: Arc<dyn Warehouse>) -> AnalysisPipeline {
        AnalysisPipeline::new(
            GeoidResolver::new(hierarchy()),
            QueryComposer::default(),
            warehouse,
            cache(),
        )
    }

    fn request(selections: Vec<GeographySelection>) -> AnalysisRequest {
        AnalysisRequest {
            selections,
            years: [2022].into(),
            ..AnalysisRequest::default()
        }
    }

    struct CountingWarehouse {
        inner: Arc<dyn Warehouse>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Warehouse for CountingWarehouse {
        async fn fetch(&self, query: &BoundQuery) -> Result<Vec<Row>, WarehouseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(query).await
        }
    }

    struct DownWarehouse;

    #[async_trait]
    impl Warehouse for DownWarehouse {
        async fn fetch(&self, _: &BoundQuery) -> Result<Vec<Row>, WarehouseError> {
            Err(WarehouseError::Timeout { seconds: 30 })
        }
    }

    struct FakeCensus {
        fail: BTreeSet<AreaId>,
    }

    #[async_trait]
    impl DemographicSource for FakeCensus {
        async fn area_demographics(
            &self,
            area: &AreaId,
            vintage: u16,
        ) -> Result<AreaDemographics, DemographicError> {
            if self.fail.contains(area) {
                return Err(DemographicError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(AreaDemographics {
                area_id: area.clone(),
                vintage,
                total_population: Some(957_419),
                minority_population: Some(383_000),
                households: Some(356_000),
                median_household_income: Some(106_000),
                income_brackets: vec![],
            })
        }
    }

    #[tokio::test]
    async fn planning_region_report() {
        let pipeline = pipeline(warehouse());

        let report = pipeline
            .analyze(&request(vec![GeographySelection::planning_region(
                "Greater Bridgeport",
            )]))
            .await
            .unwrap();

        assert!(report.completeness.is_complete());
        assert_eq!(report.areas.len(), 1);
        assert_eq!(report.areas[0].area_id.as_str(), "09001");
        assert_eq!(report.areas[0].name.as_deref(), Some("Fairfield County"));
        // The denied application in tract 010300 is filtered out by default.
        assert_eq!(report.overall.activity_count, 4);
        assert_eq!(report.overall.tract_count, 3);
        assert_eq!(report.by_year.len(), 1);

        let minority = &report.overall.distributions[0];
        assert_eq!(minority.metric, ClassificationMetric::MinorityPct);
        let bucket = |b: ClassificationBucket| {
            minority
                .buckets
                .iter()
                .find(|s| s.bucket == b)
                .unwrap()
                .tract_count
        };
        // 10, 50, 90: μ = 50, σ ≈ 32.7.
        assert_eq!(bucket(ClassificationBucket::Low), 1);
        assert_eq!(bucket(ClassificationBucket::Middle), 1);
        assert_eq!(bucket(ClassificationBucket::Upper), 1);

        // Only tract 010100 (45% of AMI) is LMI: 2 of 4 applications.
        assert_eq!(report.overall.lmi_share.percentage(), Some(50.0));
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let counting = Arc::new(CountingWarehouse {
            inner: warehouse(),
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline(counting.clone());

        let first = pipeline
            .analyze(&request(vec![
                GeographySelection::county("9009"),
                GeographySelection::county("09001"),
            ]))
            .await
            .unwrap();
        let second = pipeline
            .analyze(&request(vec![
                GeographySelection::county("09001"),
                GeographySelection::county("09009"),
            ]))
            .await
            .unwrap();

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.areas, second.areas);
        assert_eq!(first.groups.len(), second.groups.len());
        assert_eq!(first.overall.activity_count, 5);
    }

    #[tokio::test]
    async fn warehouse_outage_is_partial_and_not_cached() {
        let pipeline = pipeline(Arc::new(DownWarehouse));
        let req = request(vec![GeographySelection::county("09001")]);

        let report = pipeline.analyze(&req).await.unwrap();

        assert!(!report.completeness.is_complete());
        assert_eq!(report.completeness.issues[0].source, IssueSource::Warehouse);
        assert_eq!(report.overall.activity_count, 0);
        assert_eq!(report.overall.lmi_share.percentage(), None);

        let key = ResultCache::key(
            [&AreaId::parse("09001").unwrap()],
            [2022],
            &RequestScope {
                filters: &FilterSet::default(),
                group_by: GroupBy::default(),
                demographics_vintage: None,
            },
        )
        .unwrap();
        assert!(pipeline.cache().get(ANALYSIS_NAMESPACE, &key).await.is_none());
    }

    #[tokio::test]
    async fn invalid_input_fails_the_request() {
        let pipeline = pipeline(warehouse());

        let unknown = pipeline
            .analyze(&request(vec![GeographySelection::planning_region("Atlantis")]))
            .await;
        assert!(matches!(unknown, Err(AnalyticsError::Validation { .. })));

        let empty = pipeline.analyze(&request(vec![])).await;
        assert!(matches!(empty, Err(AnalyticsError::Validation { .. })));

        let mut too_many_years = request(vec![GeographySelection::county("09001")]);
        too_many_years.years = (2010..2022).collect();
        let err = pipeline.analyze(&too_many_years).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: too many years: limit is 10, received 12"
        );
    }

    #[tokio::test]
    async fn area_limit_is_enforced() {
        let pipeline = AnalysisPipeline::new(
            GeoidResolver::new(hierarchy()),
            QueryComposer::new(ComposerLimits {
                max_areas: 1,
                max_years: 10,
            }),
            warehouse(),
            cache(),
        );

        let err = pipeline
            .analyze(&request(vec![GeographySelection::planning_region("09140")]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: too many areas: limit is 1, received 3"
        );
    }

    #[tokio::test]
    async fn hierarchy_outage_skips_the_selection() {
        struct DownHierarchy;

        #[async_trait]
        impl AreaHierarchy for DownHierarchy {
            async fn counties_in_state(&self, _: &str) -> Result<BTreeSet<AreaId>, GeoError> {
                Err(GeoError::Hierarchy {
                    message: "connection refused".to_string(),
                })
            }

            async fn counties_in_metro(&self, _: &str) -> Result<BTreeSet<AreaId>, GeoError> {
                Err(GeoError::Hierarchy {
                    message: "connection refused".to_string(),
                })
            }

            async fn county_info(&self, _: &AreaId) -> Result<Option<CountyInfo>, GeoError> {
                Ok(None)
            }
        }

        let pipeline = AnalysisPipeline::new(
            GeoidResolver::new(Arc::new(DownHierarchy)),
            QueryComposer::default(),
            warehouse(),
            cache(),
        );

        let report = pipeline
            .analyze(&request(vec![
                GeographySelection::state("CT"),
                GeographySelection::county("09009"),
            ]))
            .await
            .unwrap();

        assert!(!report.completeness.is_complete());
        assert_eq!(report.completeness.issues.len(), 1);
        assert_eq!(report.completeness.issues[0].source, IssueSource::Hierarchy);
        assert_eq!(report.areas.len(), 1);
        assert_eq!(report.overall.activity_count, 1);

        let none = pipeline
            .analyze(&request(vec![GeographySelection::metro("14860")]))
            .await
            .unwrap();
        assert!(none.areas.is_empty());
        assert!(!none.completeness.is_complete());
    }

    #[tokio::test]
    async fn demographic_failures_are_recorded_per_area() {
        let pipeline = pipeline(warehouse()).with_demographics(Arc::new(FakeCensus {
            fail: [AreaId::parse("09009").unwrap()].into(),
        }));

        let mut req = request(vec![GeographySelection::planning_region("09140")]);
        req.include_demographics = true;

        let report = pipeline.analyze(&req).await.unwrap();

        let composite = report.demographics.as_ref().unwrap();
        assert_eq!(composite.vintage, 2022);
        assert_eq!(composite.areas.len(), 2);
        assert_eq!(composite.missing_areas, vec![AreaId::parse("09009").unwrap()]);
        assert!(!report.completeness.is_complete());
        assert_eq!(
            report.completeness.issues[0].area,
            Some(AreaId::parse("09009").unwrap())
        );
    }

    #[tokio::test]
    async fn single_county_demographics_match_the_county() {
        let pipeline = pipeline(warehouse()).with_demographics(Arc::new(FakeCensus {
            fail: BTreeSet::new(),
        }));

        let mut req = request(vec![GeographySelection::planning_region("09120")]);
        req.include_demographics = true;

        let report = pipeline.analyze(&req).await.unwrap();

        let composite = report.demographics.unwrap();
        assert_eq!(composite.areas, vec![AreaId::parse("09001").unwrap()]);
        assert_eq!(composite.total_population, 957_419);
        assert_eq!(
            composite.minority_share.percentage(),
            Some(383_000.0 / 957_419.0 * 100.0)
        );
        assert_eq!(composite.median_household_income, Some(106_000.0));
        assert!(report.completeness.is_complete());
    }
}
