use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// One component of a partition key, typed when the table is loaded.
///
/// Integers and floats compare numerically with each other, numbers sort
/// before text and text sorts lexicographically.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl KeyValue {
    /// Type a (trimmed) CSV cell. Non-finite floats stay text.
    pub fn parse(cell: &str) -> Self {
        if let Ok(v) = cell.parse::<i64>() {
            return KeyValue::Int(v);
        }
        match cell.parse::<f64>() {
            Ok(v) if v.is_finite() => KeyValue::Float(v),
            _ => KeyValue::Text(cell.to_string()),
        }
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use KeyValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => cmp_int_float(*a, *b),
            (Float(a), Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Text(_), _) => Ordering::Greater,
            (_, Text(_)) => Ordering::Less,
        }
    }
}

/// Exact comparison of an integer with a float, without rounding the integer.
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // i64 covers [-2^63, 2^63)
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        // matches where total_cmp puts NaN among floats
        return if float.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }

    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0f64.total_cmp(&(float - whole)),
        unequal => unequal,
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{v}"),
            KeyValue::Float(v) => write!(f, "{v}"),
            KeyValue::Text(s) => f.write_str(s),
        }
    }
}

/// Values of the partition columns for one record, in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PartitionKey(pub Vec<KeyValue>);

impl PartitionKey {
    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Human readable `column=value` pairs, e.g. `size=1024, blockSize=16`.
    pub fn describe(&self, columns: &[String]) -> String {
        if self.0.is_empty() {
            return "(all records)".to_string();
        }
        columns
            .iter()
            .zip(&self.0)
            .map(|(column, value)| format!("{column}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A single benchmark measurement resolved against the configured column roles.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRecord {
    /// 1-based line in the source file (header is line 1)
    pub line: u64,
    /// Series label, e.g. the scheduling method
    pub series: String,
    pub partition: PartitionKey,
    pub x: f64,
    pub y: f64,
}

impl BenchmarkRecord {
    pub fn new(series: impl Into<String>, partition: Vec<KeyValue>, x: f64, y: f64) -> Self {
        Self {
            line: 0,
            series: series.into(),
            partition: PartitionKey(partition),
            x,
            y,
        }
    }
}
