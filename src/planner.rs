//! Query planner: turns raw path parameters into typed index queries.
//!
//! A field query's value is classified by parse attempt, in order: float,
//! integer (widened to float, since the index stores all numerics as f64),
//! boolean, then text. Classification looks only at the value itself, not
//! at the field's sampled type.

use crate::search_index::SearchQuery;

/// Plan a `{field, value}` query.
pub fn plan_field_query(field: &str, raw_value: &str) -> SearchQuery {
    if let Ok(f) = raw_value.parse::<f64>() {
        return SearchQuery::NumericRange {
            field: field.to_string(),
            min: f,
            max: f,
        };
    }
    if let Ok(i) = raw_value.parse::<i64>() {
        let f = i as f64;
        return SearchQuery::NumericRange {
            field: field.to_string(),
            min: f,
            max: f,
        };
    }
    if let Ok(b) = raw_value.parse::<bool>() {
        return SearchQuery::Boolean {
            field: field.to_string(),
            value: b,
        };
    }
    SearchQuery::FieldText {
        field: field.to_string(),
        value: raw_value.to_string(),
    }
}

/// Plan a free-text query as a phrase match over the whole document.
pub fn plan_text_query(text: &str) -> SearchQuery {
    SearchQuery::Phrase(text.to_string())
}
