use chrono::NaiveDate;
use flaresheet_api::MetricRecord;

use crate::types::DailyGroup;

pub(crate) fn group_to_record(group: DailyGroup) -> MetricRecord {
    let mut measures = serde_json::Map::new();
    measures.insert("sum".to_string(), serde_json::Value::Object(group.sum));
    measures.insert("uniq".to_string(), serde_json::Value::Object(group.uniq));
    MetricRecord::new(group.dimensions, measures)
}

/// Date a group was aggregated for, if it carries a parseable one
pub(crate) fn group_date(group: &DailyGroup) -> Option<NaiveDate> {
    group
        .dimensions
        .get("date")
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn group(value: serde_json::Value) -> DailyGroup {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_group_to_record_nests_measures() {
        let record = group_to_record(group(json!({
            "dimensions": {"date": "2024-03-02"},
            "sum": {"requests": 5},
            "uniq": {"uniques": 2}
        })));

        assert_eq!(record.dimension("date"), Some(&json!("2024-03-02")));
        assert_eq!(record.measures()["sum"]["requests"], 5);
        assert_eq!(record.measures()["uniq"]["uniques"], 2);
    }

    #[test]
    fn test_group_date() {
        let dated = group(json!({"dimensions": {"date": "2024-03-02"}}));
        assert_eq!(group_date(&dated), NaiveDate::from_ymd_opt(2024, 3, 2));

        let undated = group(json!({"dimensions": {}}));
        assert_eq!(group_date(&undated), None);
    }
}
