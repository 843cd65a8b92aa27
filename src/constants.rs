/// Constants used by range partitioning and task expansion.
pub mod partition {
    /// Default window size in days used when splitting a requested range.
    pub const DEFAULT_STEP_DAYS: i64 = 7;
}

/// Constants used by the concurrent executor.
pub mod executor {
    /// Default ceiling on simultaneously outstanding requests.
    pub const DEFAULT_MAX_WORKERS: usize = 10;
    /// Default number of attempts per task (one attempt means no retries).
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
    /// Default pause between attempts when retries are enabled, in milliseconds.
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
}

/// Constants describing the remote query surface.
pub mod query {
    /// Query parameter carrying the filter expression.
    pub const PARAM_WHERE: &str = "$where";
    /// Query parameter carrying the row ceiling.
    pub const PARAM_LIMIT: &str = "$limit";
    /// Default row ceiling per request (implicit server-side page size).
    pub const DEFAULT_ROW_LIMIT: usize = 50_000;
    /// Timestamp layout used inside filter expressions.
    pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
    /// Separator used between predicates of a filter expression.
    pub const PREDICATE_JOINER: &str = " AND ";
}

/// Constants used by the HTTP row source.
pub mod client {
    /// Default global timeout for one request, in seconds.
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
    /// Maximum response body size accepted, in bytes.
    ///
    /// A full 50k-row page of traffic-speed rows with encoded polylines runs
    /// well past the HTTP client's 10 MB default.
    pub const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;
}

/// Constants used by the response cache.
pub mod cache {
    /// Default time-to-live for cached responses, in seconds.
    pub const DEFAULT_TTL_SECS: u64 = 3600;
}

/// Constants used by traffic-speed bucketing.
pub mod bucketing {
    /// Conversion factor from feet per second to miles per hour.
    pub const FPS_TO_MPH: f64 = 0.681818;
    /// Observations before this instant are classified as pre-policy.
    pub const DEFAULT_POLICY_CUTOFF: (i32, u32, u32) = (2024, 12, 31);
    /// Period label for observations before the cutoff.
    pub const PERIOD_LABEL_PRE: &str = "Pre-CP";
    /// Period label for observations at or after the cutoff.
    pub const PERIOD_LABEL_IN_EFFECT: &str = "CP in Effect";
}

/// Defaults for the traffic-speed dataset used by the command-line runner.
pub mod speeds {
    /// Environment variable overriding the endpoint URL.
    pub const ENDPOINT_ENV: &str = "WINDOWED_FETCH_ENDPOINT";
    /// NYC DOT real-time traffic speed endpoint.
    pub const DEFAULT_ENDPOINT: &str = "https://data.cityofnewyork.us/resource/6a2s-2t65.json";
    /// Field holding the monitored link name.
    pub const ENTITY_FIELD: &str = "link_name";
    /// Field holding the observation timestamp.
    pub const TIMESTAMP_FIELD: &str = "median_calculation_timestamp";
    /// Field holding the median speed in feet per second.
    pub const SPEED_FIELD: &str = "median_speed_fps";
    /// Field holding the sample count behind each median.
    pub const SAMPLES_FIELD: &str = "n_samples";
    /// Minimum sample count a row needs to be returned.
    pub const DEFAULT_MIN_SAMPLES: f64 = 5.0;
    /// Inclusive start of the historical baseline range.
    pub const BASELINE_START: (i32, u32, u32) = (2024, 8, 1);
    /// Exclusive end of the historical baseline range.
    pub const BASELINE_END: (i32, u32, u32) = (2024, 10, 1);
    /// Number of trailing weeks fetched as the "recent" range.
    pub const RECENT_WEEKS: i64 = 6;
    /// Links monitored by the commute-speed page.
    pub const DEFAULT_LINKS: [&str; 9] = [
        "3rd Avenue - Northbound - 49th St to 57th St",
        "8th Avenue - Northbound - 23rd St to 34th St",
        "2nd Avenue - Southbound - 34th St to 23rd St",
        "5th Avenue - Southbound - 49th St to 42th St",
        "Lexington Ave - Southbound - 96 St to 86 St",
        "57th Street - Eastbound - 6th Ave to 5th Ave",
        "Williamsburg Bridge - Westbound - Brooklyn @ Bedford Ave to Manhattan @ Delancey",
        "23rd Street - Westbound - 6th Ave to 7th Ave",
        "34th Street - Westbound - 3rd Ave to Madison Ave",
    ];
}
