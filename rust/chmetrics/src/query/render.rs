//! SQL text for the two query shapes.
//!
//! The inner stage buckets rows by `interval` seconds: the rate shape rebuilds
//! counter increases per attribute combination, the gauge shape averages raw
//! values. When group columns are present an outer stage re-groups the inner
//! rows by those columns and the bucket, summing `Usage`. Whitespace matches
//! the statements already stored by existing callers byte for byte.

use super::{validate::BucketWindow, QuerySpec, TemplateVariant};
use crate::time::format_sql_time;
use std::fmt::Write as _;

/// Rows this far before `start` are read so the first bucket has a predecessor.
pub const LOOKBACK_PADDING_SECS: u32 = 300;

pub(super) fn render(variant: TemplateVariant, spec: &QuerySpec, window: &BucketWindow) -> String {
    let mut sql = String::with_capacity(2048);
    sql.push_str("\n\n\n");

    if spec.is_grouped() {
        push_outer_head(&mut sql, &spec.group_columns);
    }

    match variant {
        TemplateVariant::Rate => push_rate_stage(&mut sql, spec, window),
        TemplateVariant::Gauge => push_gauge_stage(&mut sql, spec, window),
    }

    if spec.is_grouped() {
        push_outer_tail(&mut sql, &spec.group_columns);
    }

    sql
}

fn push_rate_stage(sql: &mut String, spec: &QuerySpec, window: &BucketWindow) {
    let columns = &spec.select_columns;

    sql.push_str("\n\nSELECT ");
    for (index, column) in columns.iter().enumerate() {
        let _ = write!(
            sql,
            " arrayElement(splitByString(':', increaseKey), {}) AS {column},",
            one_based(index)
        );
    }
    let _ = write!(
        sql,
        "\n  {},\n  sum(IncreaseValue) as Usage\nFROM (\n    SELECT concat(",
        bucket_expr(window.interval)
    );

    for (index, column) in columns.iter().enumerate() {
        let _ = write!(sql, "{} ", attribute_ref(column));
        if !is_last(index, columns.len()) {
            sql.push_str(",':', ");
        }
        sql.push(' ');
    }

    sql.push_str(concat!(
        ") as increaseKey,\n",
        "    TimeUnix,\n",
        "\tMetricName,\n",
        "    lagInFrame(Value) OVER (PARTITION BY increaseKey ORDER BY TimeUnix ASC ROWS BETWEEN 1 PRECEDING AND UNBOUNDED FOLLOWING) AS prevValue,\n",
        "\t0 Mark,\n",
        "\tCOUNT(Mark) OVER (PARTITION BY increaseKey ORDER BY\tTimeUnix ROWS 1 PRECEDING)-1 = 1 PrevExists,\n",
        "\tif(PrevExists,\n",
        "\t    if( prevValue > Value,\n",
        "\t\t\tif(prevValue = 0,\n",
        "\t\t\t    0,\n",
        "\t\t\t    Value),\n",
        "\t\tValue - prevValue),\n",
        "\t0) as IncreaseValue\n",
    ));

    let _ = write!(
        sql,
        "    FROM {}\n    WHERE {}\n\t    AND NOT isNaN(Value)\n        ",
        spec.from_table,
        metric_filter(&spec.metric_name)
    );
    push_filters(sql, &spec.where_clauses);
    let _ = write!(sql, "\n        {} ) AS data\n", time_window(window));

    sql.push_str(concat!(
        "GROUP BY\n",
        "\tincreaseKey,\n",
        "\tUsageTime\n",
        "ORDER BY\n",
        "\tincreaseKey,\n",
        "\tUsageTime\n\n",
    ));
}

fn push_gauge_stage(sql: &mut String, spec: &QuerySpec, window: &BucketWindow) {
    let columns = &spec.select_columns;

    sql.push_str("\nSELECT ");
    for column in columns {
        let _ = write!(sql, "{} as {column}, ", attribute_ref(column));
    }
    let _ = write!(
        sql,
        "\n{},\navg(Value)/1e6 as Usage\nFROM {}\nWHERE {}\n\tAND NOT isNaN(Value)\n    ",
        bucket_expr(window.interval),
        spec.from_table,
        metric_filter(&spec.metric_name)
    );
    push_filters(sql, &spec.where_clauses);
    let _ = write!(sql, "\n    {}\nGROUP BY UsageTime, ", time_window(window));
    push_comma_list(sql, columns);
    sql.push_str("\nORDER BY UsageTime\n\n");
}

fn push_outer_head(sql: &mut String, groups: &[String]) {
    sql.push_str("\nSELECT ");
    for group in groups {
        let _ = write!(sql, "{group},");
    }
    sql.push_str("\nUsageTime, sum(Usage) Usage\nFROM ( ");
}

fn push_outer_tail(sql: &mut String, groups: &[String]) {
    sql.push_str("\n) as grouped \nGROUP BY UsageTime,\n    ");
    for (index, group) in groups.iter().enumerate() {
        let _ = write!(sql, "\n        {group}");
        if !is_last(index, groups.len()) {
            sql.push(',');
        }
    }
    sql.push_str("  \nORDER BY ");
    for group in groups {
        let _ = write!(sql, "{group},");
    }
    sql.push_str("\nUsageTime");
}

fn push_filters(sql: &mut String, clauses: &[String]) {
    for clause in clauses {
        let _ = write!(sql, " {clause} ");
    }
}

fn push_comma_list(sql: &mut String, items: &[String]) {
    for (index, item) in items.iter().enumerate() {
        sql.push_str(item);
        if !is_last(index, items.len()) {
            sql.push(',');
        }
    }
}

fn bucket_expr(interval: u32) -> String {
    format!("toDateTime(intDiv(toUInt32(TimeUnix), {interval}) * {interval}) AS UsageTime")
}

fn metric_filter(metric_name: &str) -> String {
    format!("MetricName = '{metric_name}'")
}

fn attribute_ref(column: &str) -> String {
    format!("Attributes['{column}']")
}

fn time_window(window: &BucketWindow) -> String {
    format!(
        "AND TimeUnix BETWEEN (toDateTime('{}') - INTERVAL {LOOKBACK_PADDING_SECS} SECOND) AND toDateTime('{}')",
        format_sql_time(&window.range.start),
        format_sql_time(&window.range.end),
    )
}

/// ClickHouse arrays are 1-indexed.
fn one_based(index: usize) -> usize {
    index + 1
}

fn is_last(index: usize, len: usize) -> bool {
    index + 1 >= len
}
