use serde_json::{Map, Value};

/// Identifier of the entity a task filters on.
/// Example: `57th Street - Eastbound - 6th Ave to 5th Ave`
pub type EntityId = String;
/// Base URL of a tabular JSON endpoint.
/// Example: `https://data.cityofnewyork.us/resource/6a2s-2t65.json`
pub type Endpoint = String;
/// Column name used inside filter predicates.
/// Examples: `link_name`, `median_calculation_timestamp`, `n_samples`
pub type FieldName = String;
/// One row object returned by the endpoint.
/// Example: `{"link_name": "...", "median_calculation_timestamp": "2024-08-01T00:03:00.000", "median_speed_fps": "31.8"}`
pub type Row = Map<String, Value>;
/// Rendered filter expression.
/// Example: `link_name = 'A' AND n_samples > 5`
pub type FilterExpr = String;
/// Cache key built from the endpoint and its sorted query parameters.
/// Example: `(https://host/resource.json, [("$limit", "50000"), ("$where", "...")])`
pub type CacheKey = (Endpoint, Vec<(String, String)>);
