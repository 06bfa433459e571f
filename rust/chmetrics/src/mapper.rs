//! Turns query result rows into metric samples.
//!
//! A [`RowShape`] lists the result fields in column order. Every field except
//! the reserved `UsageTime`, `Usage` and `Metric` names becomes an attribute,
//! keyed by its lower-cased name.

use crate::{
    error::{Result, ServiceError},
    model::{AttributeSet, MetricSample, MetricSeries},
    query::QuerySpec,
    rows::{FieldKind, RowSource, Value},
};
use tracing::debug;

pub const USAGE_TIME_FIELD: &str = "UsageTime";
pub const USAGE_FIELD: &str = "Usage";
pub const METRIC_FIELD: &str = "Metric";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Attribute,
    Timestamp,
    Value,
    Ignored,
}

impl FieldRole {
    pub fn for_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case(USAGE_TIME_FIELD) {
            FieldRole::Timestamp
        } else if name.eq_ignore_ascii_case(USAGE_FIELD) {
            FieldRole::Value
        } else if name.eq_ignore_ascii_case(METRIC_FIELD) {
            FieldRole::Ignored
        } else {
            FieldRole::Attribute
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeField {
    pub name: String,
    pub kind: FieldKind,
    pub role: FieldRole,
}

impl ShapeField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        let role = FieldRole::for_name(&name);
        Self { name, kind, role }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowShape {
    fields: Vec<ShapeField>,
}

impl RowShape {
    pub fn new(fields: Vec<ShapeField>) -> Self {
        Self { fields }
    }

    /// Text attributes in order, then `UsageTime` and `Usage`.
    pub fn with_attributes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: Vec<ShapeField> = names
            .into_iter()
            .map(|name| ShapeField::new(name, FieldKind::Text))
            .collect();
        fields.push(ShapeField::new(USAGE_TIME_FIELD, FieldKind::Timestamp));
        fields.push(ShapeField::new(USAGE_FIELD, FieldKind::Float));
        Self { fields }
    }

    /// The shape of the rows a built query returns.
    pub fn for_spec(spec: &QuerySpec) -> Self {
        Self::with_attributes(spec.output_columns().iter().cloned())
    }

    pub fn fields(&self) -> &[ShapeField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn position(&self, role: FieldRole) -> Option<usize> {
        self.fields.iter().position(|field| field.role == role)
    }

    fn timestamp_slot(&self) -> Result<usize> {
        match self.position(FieldRole::Timestamp) {
            Some(idx) if self.fields[idx].kind == FieldKind::Timestamp => Ok(idx),
            Some(idx) => Err(ServiceError::Mapping(format!(
                "{} must be a timestamp field, found {}",
                USAGE_TIME_FIELD, self.fields[idx].kind
            ))),
            None => Err(ServiceError::Mapping(format!(
                "row shape has no {USAGE_TIME_FIELD} field"
            ))),
        }
    }
}

/// Decodes every row of `source` into one sample. Fails without partial output.
pub fn map_rows(source: &mut dyn RowSource, shape: &RowShape) -> Result<Vec<MetricSample>> {
    let time_slot = shape.timestamp_slot()?;
    let value_slot = shape.position(FieldRole::Value);

    let column_count = source.columns().len();
    if column_count > shape.len() {
        return Err(ServiceError::Mapping(format!(
            "result has {column_count} columns but the row shape declares {} fields",
            shape.len()
        )));
    }

    for (column, field) in source.columns().iter().zip(shape.fields()) {
        if !column.eq_ignore_ascii_case(&field.name) {
            debug!(column = %column, field = %field.name, "column name differs from row shape field");
        }
    }

    let kinds: Vec<FieldKind> = shape.fields()[..column_count]
        .iter()
        .map(|field| field.kind)
        .collect();
    let mut slots = vec![Value::Null; shape.len()];
    let mut samples = Vec::new();

    while source.next_row(&kinds, &mut slots[..column_count])? {
        let timestamp = slots[time_slot].as_timestamp().ok_or_else(|| {
            ServiceError::Mapping(format!(
                "{USAGE_TIME_FIELD} is missing in row {}",
                samples.len()
            ))
        })?;
        let value = value_slot
            .and_then(|idx| slots[idx].as_f64())
            .unwrap_or(0.0);

        let attributes: AttributeSet = shape
            .fields()
            .iter()
            .zip(&slots)
            .filter(|(field, _)| field.role == FieldRole::Attribute)
            .map(|(field, value)| (field.name.to_lowercase(), value.to_string()))
            .collect();

        samples.push(MetricSample::new(timestamp, value, attributes));
    }

    Ok(samples)
}

/// Maps the whole stream and wraps it as the single series named `metric_name`.
pub fn map_series(
    source: &mut dyn RowSource,
    shape: &RowShape,
    metric_name: &str,
) -> Result<MetricSeries> {
    let samples = map_rows(source, shape)?;
    Ok(MetricSeries::cumulative_sum(metric_name, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::JsonRows;
    use serde_json::json;

    fn rows(columns: &[&str], data: Vec<Vec<serde_json::Value>>) -> JsonRows {
        JsonRows::new(columns.iter().map(|c| c.to_string()).collect(), data)
    }

    #[test]
    fn roles_follow_reserved_names() {
        assert_eq!(FieldRole::for_name("UsageTime"), FieldRole::Timestamp);
        assert_eq!(FieldRole::for_name("usagetime"), FieldRole::Timestamp);
        assert_eq!(FieldRole::for_name("Usage"), FieldRole::Value);
        assert_eq!(FieldRole::for_name("metric"), FieldRole::Ignored);
        assert_eq!(FieldRole::for_name("Attr1"), FieldRole::Attribute);
    }

    #[test]
    fn maps_each_row_to_a_sample() {
        let shape = RowShape::new(vec![
            ShapeField::new("Attr1", FieldKind::Text),
            ShapeField::new("Core", FieldKind::UInt),
            ShapeField::new("Metric", FieldKind::Text),
            ShapeField::new("UsageTime", FieldKind::Timestamp),
            ShapeField::new("Usage", FieldKind::Float),
        ]);
        let mut source = rows(
            &["attr_1", "core", "metric", "UsageTime", "Usage"],
            vec![
                vec![json!("a"), json!("3"), json!("m"), json!("2024-05-01 00:00:00"), json!(1.5)],
                vec![json!("b"), json!(4), json!("m"), json!("2024-05-01 00:05:00"), json!(2)],
            ],
        );

        let samples = map_rows(&mut source, &shape).expect("rows should map");
        assert_eq!(samples.len(), 2);

        let first = &samples[0];
        assert_eq!(first.value, 1.5);
        assert_eq!(first.timestamp, first.start_timestamp);
        assert_eq!(first.attributes.len(), 2);
        assert_eq!(first.attributes.get("attr1"), Some("a"));
        assert_eq!(first.attributes.get("core"), Some("3"));
        assert_eq!(first.attributes.get("metric"), None);
        assert_eq!(samples[1].value, 2.0);
    }

    #[test]
    fn non_numeric_usage_defaults_to_zero() {
        let shape = RowShape::new(vec![
            ShapeField::new("UsageTime", FieldKind::Timestamp),
            ShapeField::new("Usage", FieldKind::Text),
        ]);
        let mut source = rows(
            &["UsageTime", "Usage"],
            vec![vec![json!("2024-05-01 00:00:00"), json!("12")]],
        );
        let samples = map_rows(&mut source, &shape).unwrap();
        assert_eq!(samples[0].value, 0.0);
        assert!(samples[0].attributes.is_empty());

        let shape = RowShape::new(vec![ShapeField::new("UsageTime", FieldKind::Timestamp)]);
        let mut source = rows(&["UsageTime"], vec![vec![json!("2024-05-01 00:00:00")]]);
        assert_eq!(map_rows(&mut source, &shape).unwrap()[0].value, 0.0);
    }

    #[test]
    fn missing_or_mistyped_usage_time_is_fatal() {
        let missing = RowShape::new(vec![
            ShapeField::new("attr_1", FieldKind::Text),
            ShapeField::new("Usage", FieldKind::Float),
        ]);
        let mistyped = RowShape::new(vec![
            ShapeField::new("attr_1", FieldKind::Text),
            ShapeField::new("UsageTime", FieldKind::Text),
            ShapeField::new("Usage", FieldKind::Float),
        ]);

        for shape in [missing, mistyped] {
            let mut source = rows(&[], Vec::new());
            let err = map_rows(&mut source, &shape).expect_err("shape must be rejected");
            assert!(matches!(err, ServiceError::Mapping(_)), "got {err:?}");
        }
    }

    #[test]
    fn null_usage_time_in_a_row_is_fatal() {
        let shape = RowShape::with_attributes(["attr_1"]);
        let mut source = rows(
            &["attr_1", "UsageTime", "Usage"],
            vec![
                vec![json!("a"), json!("2024-05-01 00:00:00"), json!(1.0)],
                vec![json!("b"), serde_json::Value::Null, json!(1.0)],
            ],
        );
        let err = map_rows(&mut source, &shape).expect_err("null timestamp must fail");
        assert!(err.to_string().contains("row 1"), "got {err}");
    }

    #[test]
    fn rejects_more_columns_than_fields() {
        let shape = RowShape::with_attributes(Vec::<String>::new());
        let mut source = rows(&["a", "UsageTime", "Usage"], Vec::new());
        assert!(matches!(
            map_rows(&mut source, &shape),
            Err(ServiceError::Mapping(_))
        ));
    }

    #[test]
    fn unfilled_attribute_fields_render_empty() {
        let shape = RowShape::new(vec![
            ShapeField::new("UsageTime", FieldKind::Timestamp),
            ShapeField::new("Usage", FieldKind::Float),
            ShapeField::new("Region", FieldKind::Text),
        ]);
        let mut source = rows(
            &["UsageTime", "Usage"],
            vec![vec![json!("2024-05-01 00:00:00"), json!(4.0)]],
        );
        let samples = map_rows(&mut source, &shape).unwrap();
        assert_eq!(samples[0].attributes.get("region"), Some(""));
    }

    #[test]
    fn shape_for_spec_uses_group_columns_when_grouped() {
        let mut spec = QuerySpec {
            select_columns: vec!["attr_1".into(), "attr_2".into()],
            ..QuerySpec::default()
        };
        let names = |shape: &RowShape| {
            shape
                .fields()
                .iter()
                .map(|f| f.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(
            names(&RowShape::for_spec(&spec)),
            vec!["attr_1", "attr_2", "UsageTime", "Usage"]
        );

        spec.group_columns = vec!["attr_2".into()];
        assert_eq!(
            names(&RowShape::for_spec(&spec)),
            vec!["attr_2", "UsageTime", "Usage"]
        );
    }

    #[test]
    fn series_wraps_all_samples() {
        let shape = RowShape::with_attributes(["attr_1"]);
        let mut source = rows(
            &["attr_1", "UsageTime", "Usage"],
            vec![vec![json!("a"), json!("2024-05-01T00:00:00Z"), json!(3.0)]],
        );
        let series = map_series(&mut source, &shape, "metric_name").unwrap();
        assert_eq!(series.name, "metric_name");
        assert_eq!(series.unit, "by");
        assert!(series.monotonic);
        assert_eq!(series.samples.len(), 1);
    }
}
