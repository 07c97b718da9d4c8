use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One entry of a portal dropdown (district or police station).
///
/// `value` is the portal's internal option value and is what gets persisted
/// in checkpoints; `label` is the human-readable text shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// A FIR row extracted from the search results grid.
///
/// `print_token` is the opaque token behind the row's print link; rows
/// without one have no downloadable artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredFir {
    pub fir_no: String,
    pub fir_date: String,
    #[serde(default)]
    pub brief: String,
    #[serde(default)]
    pub fir_status: String,
    pub print_token: Option<String>,
}

/// Format a date the way the portal's search form expects it (DD/MM/YYYY).
pub fn portal_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_date_is_day_first() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(portal_date(d), "07/03/2024");
    }

    #[test]
    fn discovered_fir_uses_camel_case_wire_names() {
        let fir = DiscoveredFir {
            fir_no: "0123/2024".to_string(),
            fir_date: "07/03/2024".to_string(),
            brief: "theft".to_string(),
            fir_status: "Under Investigation".to_string(),
            print_token: Some("abc123".to_string()),
        };
        let json = serde_json::to_value(&fir).unwrap();
        assert_eq!(json["firNo"], "0123/2024");
        assert_eq!(json["printToken"], "abc123");
    }

    #[test]
    fn discovered_fir_tolerates_missing_optional_fields() {
        let fir: DiscoveredFir =
            serde_json::from_str(r#"{"firNo":"1/2024","firDate":"01/01/2024","printToken":null}"#)
                .unwrap();
        assert!(fir.brief.is_empty());
        assert!(fir.print_token.is_none());
    }
}
