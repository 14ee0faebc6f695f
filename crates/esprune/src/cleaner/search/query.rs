use serde_json::{Value, json};

/// Query matching every document of the index.
pub fn match_all() -> Value {
    json!({ "match_all": {} })
}

/// Filter matching documents whose `field` lies more than `years` years in
/// the past, relative to the cluster clock.
pub fn older_than(field: &str, years: u32) -> Value {
    json!({
        "bool": {
            "filter": [
                { "range": { field: { "lt": format!("now-{years}y") } } }
            ]
        }
    })
}
