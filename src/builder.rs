use crate::config::{GroupingOptions, PartitionOrder};
use crate::error::DataError;
use crate::record::{BenchmarkRecord, PartitionKey};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// A point of a series. `samples` counts the measurements averaged into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    #[serde(serialize_with = "finite_or_text")]
    pub x: f64,
    #[serde(serialize_with = "finite_or_text")]
    pub y: f64,
    pub samples: usize,
}

/// JSON has no NaN or infinity; write those as `"NaN"`, `"inf"`, `"-inf"`.
fn finite_or_text<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.collect_str(value)
    }
}

/// Points of one method within a chart, ascending by x.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub points: Vec<Point>,
}

impl Series {
    pub fn has_nan(&self) -> bool {
        self.points.iter().any(|p| p.y.is_nan() || p.x.is_nan())
    }
}

/// All series drawn for one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub partition_columns: Vec<String>,
    pub key: PartitionKey,
    pub series: Vec<Series>,
}

impl Chart {
    pub fn describe(&self) -> String {
        self.key.describe(&self.partition_columns)
    }

    pub fn series_labels(&self) -> Vec<&str> {
        self.series.iter().map(|s| s.label.as_str()).collect()
    }

    /// Replace `{column}` placeholders with this chart's partition values.
    pub fn title(&self, template: &str) -> String {
        self.partition_columns
            .iter()
            .zip(self.key.values())
            .fold(template.to_string(), |title, (column, value)| {
                title.replace(&format!("{{{column}}}"), &value.to_string())
            })
    }

    /// `<prefix>_<value>_<value>...`, or just `<prefix>` without partition columns.
    pub fn file_stem(&self, prefix: &str) -> String {
        let mut stem = prefix.to_string();
        for value in self.key.values() {
            stem.push('_');
            stem.extend(value.to_string().chars().map(|c| {
                if c == '/' || c == '\\' || c == ':' || c.is_whitespace() {
                    '-'
                } else {
                    c
                }
            }));
        }
        stem
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.series.iter().flat_map(|s| s.points.iter())
    }
}

/// Groups benchmark records into one chart per partition.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkChartBuilder {
    options: GroupingOptions,
}

impl BenchmarkChartBuilder {
    pub fn new(options: GroupingOptions) -> Self {
        Self { options }
    }

    /// Build every chart. Partitions are independent; the first error aborts.
    pub fn build(&self, records: &[BenchmarkRecord]) -> Result<Vec<Chart>, DataError> {
        if records.is_empty() {
            return Err(DataError::EmptyTable);
        }

        let charts = self
            .partition(records)
            .into_iter()
            .map(|(key, members)| self.build_chart(key, &members))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            records = records.len(),
            charts = charts.len(),
            aggregate = self.options.aggregate,
            "grouped benchmark records"
        );
        Ok(charts)
    }

    fn partition<'a>(
        &self,
        records: &'a [BenchmarkRecord],
    ) -> Vec<(PartitionKey, Vec<&'a BenchmarkRecord>)> {
        let mut index: BTreeMap<&PartitionKey, usize> = BTreeMap::new();
        let mut groups: Vec<(PartitionKey, Vec<&BenchmarkRecord>)> = Vec::new();

        for record in records {
            match index.get(&record.partition) {
                Some(&idx) => groups[idx].1.push(record),
                None => {
                    index.insert(&record.partition, groups.len());
                    groups.push((record.partition.clone(), vec![record]));
                }
            }
        }

        if self.options.partition_order == PartitionOrder::Sorted {
            // stable: equal keys keep first-seen order
            groups.sort_by(|a, b| a.0.cmp(&b.0));
        }
        groups
    }

    fn build_chart(&self, key: PartitionKey, members: &[&BenchmarkRecord]) -> Result<Chart, DataError> {
        let mut labels: Vec<&str> = Vec::new();
        let mut raw: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
        for &record in members {
            raw.entry(record.series.as_str())
                .or_insert_with(|| {
                    labels.push(record.series.as_str());
                    Vec::new()
                })
                .push((record.x, record.y));
        }

        let mut series = Vec::with_capacity(labels.len());
        for label in self.order_series(labels) {
            let values = raw.remove(label).unwrap_or_default();
            let points = collect_points(label, values, self.options.aggregate)?;
            let series_entry = Series {
                label: label.to_string(),
                points,
            };
            if series_entry.has_nan() {
                warn!(
                    series = label,
                    partition = %key.describe(&self.options.columns.partition_by),
                    "series contains NaN values"
                );
            }
            series.push(series_entry);
        }

        Ok(Chart {
            partition_columns: self.options.columns.partition_by.clone(),
            key,
            series,
        })
    }

    /// Preferred labels first (when present), the rest in first-seen order.
    fn order_series<'a>(&self, first_seen: Vec<&'a str>) -> Vec<&'a str> {
        let preferred = &self.options.series_order;
        if preferred.is_empty() {
            return first_seen;
        }

        let mut ordered: Vec<&str> = Vec::with_capacity(first_seen.len());
        for want in preferred {
            if let Some(label) = first_seen.iter().copied().find(|label| *label == want.as_str()) {
                if !ordered.contains(&label) {
                    ordered.push(label);
                }
            }
        }
        for label in first_seen {
            if !ordered.contains(&label) {
                ordered.push(label);
            }
        }
        ordered
    }
}

fn collect_points(label: &str, mut raw: Vec<(f64, f64)>, aggregate: bool) -> Result<Vec<Point>, DataError> {
    // -0.0 and 0.0 are one x value
    for point in &mut raw {
        if point.0 == 0.0 {
            point.0 = 0.0;
        }
    }
    // stable sort keeps input order among equal x
    raw.sort_by(|a, b| a.0.total_cmp(&b.0));

    if !aggregate {
        return Ok(raw
            .into_iter()
            .map(|(x, y)| Point { x, y, samples: 1 })
            .collect());
    }

    raw.chunk_by(|a, b| a.0.total_cmp(&b.0).is_eq())
        .map(|group| -> Result<Point, DataError> {
            let x = group.first().map_or(f64::NAN, |&(x, _)| x);
            let y = mean(group.iter().map(|&(_, y)| y)).ok_or_else(|| DataError::EmptyGroup {
                series: label.to_string(),
                x,
            })?;
            Ok(Point {
                x,
                y,
                samples: group.len(),
            })
        })
        .collect()
}

/// Arithmetic mean (sum, then divide). `None` for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::KeyValue;
    use crate::table::ColumnRoles;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn record(series: &str, x: f64, y: f64) -> BenchmarkRecord {
        BenchmarkRecord::new(series, Vec::new(), x, y)
    }

    fn sized(series: &str, size: i64, x: f64, y: f64) -> BenchmarkRecord {
        BenchmarkRecord::new(series, vec![KeyValue::Int(size)], x, y)
    }

    fn builder(partition_by: &[&str], aggregate: bool) -> BenchmarkChartBuilder {
        BenchmarkChartBuilder::new(GroupingOptions {
            columns: ColumnRoles {
                partition_by: partition_by.iter().map(|s| s.to_string()).collect(),
                ..ColumnRoles::default()
            },
            aggregate,
            ..GroupingOptions::default()
        })
    }

    fn xy(series: &Series) -> Vec<(f64, f64)> {
        series.points.iter().map(|p| (p.x, p.y)).collect()
    }

    fn scenario() -> Vec<BenchmarkRecord> {
        vec![
            record("Static", 1.0, 2.0),
            record("Static", 2.0, 1.1),
            record("Dynamic", 1.0, 2.5),
            record("Dynamic", 2.0, 1.3),
        ]
    }

    #[test]
    fn test_single_partition_without_aggregation() {
        let charts = builder(&[], false).build(&scenario()).unwrap();
        assert_eq!(charts.len(), 1);

        let chart = &charts[0];
        assert!(chart.key.is_empty());
        assert_eq!(chart.series_labels(), vec!["Static", "Dynamic"]);
        assert_eq!(xy(&chart.series[0]), vec![(1.0, 2.0), (2.0, 1.1)]);
        assert_eq!(xy(&chart.series[1]), vec![(1.0, 2.5), (2.0, 1.3)]);
    }

    #[test]
    fn test_duplicate_is_averaged() {
        let mut records = scenario();
        records.push(record("Static", 1.0, 3.0));

        let charts = builder(&[], true).build(&records).unwrap();
        let static_series = &charts[0].series[0];
        assert_eq!(static_series.label, "Static");
        assert_eq!(xy(static_series), vec![(1.0, 2.5), (2.0, 1.1)]);
        assert_eq!(static_series.points[0].samples, 2);
        assert_eq!(static_series.points[1].samples, 1);
    }

    #[test]
    fn test_signed_zero_is_one_x_value() {
        let records = vec![record("Static", 0.0, 1.0), record("Static", -0.0, 3.0)];

        let charts = builder(&[], true).build(&records).unwrap();
        let points = &charts[0].series[0].points;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].y, 2.0);
        assert_eq!(points[0].samples, 2);
        assert!(points[0].x.is_sign_positive());

        let charts = builder(&[], false).build(&records).unwrap();
        assert_eq!(xy(&charts[0].series[0]), vec![(0.0, 1.0), (0.0, 3.0)]);
    }

    #[test]
    fn test_duplicates_kept_without_aggregation() {
        let mut records = scenario();
        records.push(record("Static", 1.0, 3.0));

        let charts = builder(&[], false).build(&records).unwrap();
        assert_eq!(
            xy(&charts[0].series[0]),
            vec![(1.0, 2.0), (1.0, 3.0), (2.0, 1.1)]
        );
    }

    #[test]
    fn test_mean_of_two() {
        let records = vec![record("Static", 4.0, 1.0), record("Static", 4.0, 3.0)];
        let charts = builder(&[], true).build(&records).unwrap();
        assert_eq!(xy(&charts[0].series[0]), vec![(4.0, 2.0)]);
    }

    #[test]
    fn test_points_sorted_by_x() {
        let records = vec![
            record("Guided", 8.0, 0.4),
            record("Guided", 1.0, 2.0),
            record("Guided", 4.0, 0.6),
            record("Guided", 2.0, 1.1),
        ];
        let charts = builder(&[], false).build(&records).unwrap();
        let xs: Vec<f64> = charts[0].series[0].points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 4.0, 8.0]);
    }

    #[test]
    fn test_partitions_sorted_numerically() {
        let records = vec![
            sized("Static", 2048, 1.0, 4.0),
            sized("Static", 512, 1.0, 1.0),
            sized("Dynamic", 1024, 1.0, 2.0),
            sized("Static", 1024, 1.0, 2.1),
        ];
        let charts = builder(&["size"], false).build(&records).unwrap();
        let keys: Vec<String> = charts.iter().map(|c| c.describe()).collect();
        assert_eq!(keys, vec!["size=512", "size=1024", "size=2048"]);
        assert_eq!(charts[1].series_labels(), vec!["Dynamic", "Static"]);
    }

    #[test]
    fn test_partitions_first_seen() {
        let records = vec![
            sized("Static", 2048, 1.0, 4.0),
            sized("Static", 512, 1.0, 1.0),
            sized("Static", 2048, 2.0, 2.0),
        ];
        let mut b = builder(&["size"], false);
        b.options.partition_order = PartitionOrder::FirstSeen;
        let charts = b.build(&records).unwrap();
        let keys: Vec<String> = charts.iter().map(|c| c.describe()).collect();
        assert_eq!(keys, vec!["size=2048", "size=512"]);
        assert_eq!(charts[0].series[0].points.len(), 2);
    }

    #[test]
    fn test_series_order() {
        let records = vec![
            record("Dynamic", 1.0, 1.0),
            record("UlamBlocks", 1.0, 1.0),
            record("Static", 1.0, 1.0),
        ];
        let mut b = builder(&[], false);
        b.options.series_order = vec!["Static".into(), "Guided".into(), "Dynamic".into()];
        let charts = b.build(&records).unwrap();
        assert_eq!(
            charts[0].series_labels(),
            vec!["Static", "Dynamic", "UlamBlocks"]
        );
    }

    #[test]
    fn test_nan_propagates() {
        let records = vec![record("Static", 1.0, f64::NAN), record("Static", 1.0, 1.0)];
        let charts = builder(&[], true).build(&records).unwrap();
        let series = &charts[0].series[0];
        assert!(series.points[0].y.is_nan());
        assert!(series.has_nan());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(builder(&[], true).build(&[]), Err(DataError::EmptyTable));
    }

    #[test]
    fn test_chart_naming() {
        let chart = Chart {
            partition_columns: vec!["size".into(), "blockSize".into()],
            key: PartitionKey(vec![KeyValue::Int(1024), KeyValue::Text("a/b c".into())]),
            series: Vec::new(),
        };
        assert_eq!(chart.file_stem("mandelbrot"), "mandelbrot_1024_a-b-c");
        assert_eq!(
            chart.title("Size {size}, block {blockSize}"),
            "Size 1024, block a/b c"
        );

        let single = Chart {
            partition_columns: Vec::new(),
            key: PartitionKey::default(),
            series: Vec::new(),
        };
        assert_eq!(single.file_stem("mandelbrot"), "mandelbrot");
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean([1.0, 2.0, 3.0, 6.0]), Some(3.0));
        assert_eq!(mean(std::iter::empty::<f64>()), None);
    }

    fn arb_records() -> impl Strategy<Value = Vec<BenchmarkRecord>> {
        prop::collection::vec(
            (
                prop::sample::select(vec!["Static", "Dynamic", "Guided"]),
                0i64..4,
                prop::sample::select(vec![1.0, 2.0, 4.0, 8.0, 16.0]),
                0.0f64..10.0,
            ),
            1..80,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(series, size, x, y)| sized(series, size, x, y))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_one_chart_per_partition(records in arb_records(), aggregate in any::<bool>()) {
            let charts = builder(&["size"], aggregate).build(&records).unwrap();

            let distinct: BTreeSet<&PartitionKey> = records.iter().map(|r| &r.partition).collect();
            prop_assert_eq!(charts.len(), distinct.len());

            for chart in &charts {
                let expected: BTreeSet<&str> = records
                    .iter()
                    .filter(|r| r.partition == chart.key)
                    .map(|r| r.series.as_str())
                    .collect();
                let actual: BTreeSet<&str> = chart.series_labels().into_iter().collect();
                prop_assert_eq!(actual.len(), chart.series.len());
                prop_assert_eq!(actual, expected);
            }
        }

        #[test]
        fn prop_points_sorted_and_stable(records in arb_records(), aggregate in any::<bool>()) {
            let charts = builder(&["size"], aggregate).build(&records).unwrap();
            let total: usize = charts.iter().flat_map(|c| c.points()).map(|p| p.samples).sum();
            prop_assert_eq!(total, records.len());

            for series in charts.iter().flat_map(|c| c.series.iter()) {
                prop_assert!(series.points.windows(2).all(|w| w[0].x <= w[1].x));

                let mut resorted = series.points.clone();
                resorted.sort_by(|a, b| a.x.total_cmp(&b.x));
                prop_assert_eq!(&resorted, &series.points);
            }
        }

        #[test]
        fn prop_aggregate_is_mean(records in arb_records()) {
            let charts = builder(&["size"], true).build(&records).unwrap();

            for chart in &charts {
                for series in &chart.series {
                    let xs: Vec<f64> = series.points.iter().map(|p| p.x).collect();
                    let mut deduped = xs.clone();
                    deduped.dedup();
                    prop_assert_eq!(&xs, &deduped);

                    for point in &series.points {
                        let ys: Vec<f64> = records
                            .iter()
                            .filter(|r| r.partition == chart.key && r.series == series.label && r.x == point.x)
                            .map(|r| r.y)
                            .collect();
                        prop_assert_eq!(point.samples, ys.len());
                        let expected = ys.iter().sum::<f64>() / ys.len() as f64;
                        prop_assert!((point.y - expected).abs() < 1e-9);
                    }
                }
            }
        }

        #[test]
        fn prop_deterministic(records in arb_records(), aggregate in any::<bool>()) {
            let b = builder(&["size"], aggregate);
            prop_assert_eq!(b.build(&records).unwrap(), b.build(&records).unwrap());
        }
    }
}
