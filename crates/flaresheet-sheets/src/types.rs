use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

/// `spreadsheets.values.get` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

/// `spreadsheets.values.update` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: Option<u64>,
    #[serde(default)]
    pub updated_cells: Option<u64>,
}

/// The subset of `spreadsheets.get` used to resolve tab ids
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Spreadsheet {
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sheet {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
}

/// `spreadsheets.batchUpdate` response; only the replies are inspected
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchUpdateResponse {
    #[serde(default)]
    pub replies: Vec<Value>,
}

impl BatchUpdateResponse {
    /// Sheet id created by an `addSheet` reply, if any
    pub fn added_sheet_id(&self) -> Option<i64> {
        self.replies
            .iter()
            .find_map(|reply| reply.pointer("/addSheet/properties/sheetId"))
            .and_then(Value::as_i64)
    }
}

/// One `batchUpdate` request, in the wire shape Google expects
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SheetRequest {
    AddSheet { properties: NewSheet },
    RepeatCell(RepeatCell),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSheet {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatCell {
    pub range: GridRange,
    pub cell: Value,
    pub fields: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRange {
    pub sheet_id: i64,
    pub start_row_index: u32,
    pub start_column_index: u32,
    pub end_column_index: u32,
}

impl SheetRequest {
    pub fn add_sheet(title: &str) -> Self {
        Self::AddSheet {
            properties: NewSheet {
                title: title.to_string(),
            },
        }
    }

    /// Applies a date number format to one column below the header
    pub fn date_format(sheet_id: i64, column: u32, pattern: &str) -> Self {
        Self::RepeatCell(RepeatCell {
            range: GridRange {
                sheet_id,
                start_row_index: 1,
                start_column_index: column,
                end_column_index: column + 1,
            },
            cell: serde_json::json!({
                "userEnteredFormat": {
                    "numberFormat": { "type": "DATE", "pattern": pattern }
                }
            }),
            fields: "userEnteredFormat.numberFormat".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let add = serde_json::to_value(SheetRequest::add_sheet("Analytics")).unwrap();
        assert_eq!(add["addSheet"]["properties"]["title"], "Analytics");

        let format = serde_json::to_value(SheetRequest::date_format(7, 0, "yyyy-mm-dd")).unwrap();
        assert_eq!(format["repeatCell"]["range"]["sheetId"], 7);
        assert_eq!(format["repeatCell"]["range"]["startRowIndex"], 1);
        assert_eq!(format["repeatCell"]["range"]["endColumnIndex"], 1);
        assert_eq!(
            format["repeatCell"]["cell"]["userEnteredFormat"]["numberFormat"]["pattern"],
            "yyyy-mm-dd"
        );
    }

    #[test]
    fn test_added_sheet_id() {
        let response: BatchUpdateResponse = serde_json::from_str(
            r#"{"replies": [{"addSheet": {"properties": {"sheetId": 42, "title": "x"}}}]}"#,
        )
        .unwrap();
        assert_eq!(response.added_sheet_id(), Some(42));
        assert_eq!(BatchUpdateResponse::default().added_sheet_id(), None);
    }

    #[test]
    fn test_value_range_without_values() {
        let range: ValueRange = serde_json::from_str(r#"{"range": "'Sheet1'!A1:Z"}"#).unwrap();
        assert!(range.values.is_empty());
    }
}
