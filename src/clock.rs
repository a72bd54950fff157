use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::Time,
    chrono::{DateTime, Utc},
};

/// Source of the current time for rendering ages.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// Render how long ago `then` was, e.g. `"3 minutes ago"`; `"---"` when unset.
pub fn age(then: Option<&Time>, clock: &dyn Clock) -> String {
    let Some(Time(then)) = then else {
        return String::from("---");
    };
    let secs = (clock.now() - *then).num_seconds();
    match secs {
        i64::MIN..1 => String::from("just now"),
        1..MINUTE => plural(secs, "second"),
        MINUTE..HOUR => plural(secs / MINUTE, "minute"),
        HOUR..DAY => plural(secs / HOUR, "hour"),
        DAY..WEEK => plural(secs / DAY, "day"),
        WEEK..MONTH => plural(secs / WEEK, "week"),
        MONTH..YEAR => plural(secs / MONTH, "month"),
        _ => plural(secs / YEAR, "year"),
    }
}
