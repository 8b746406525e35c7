use chrono::{DateTime, SecondsFormat, Utc};

pub type Timestamp = DateTime<Utc>;

pub fn unix_millis_to_timestamp(millis: i64) -> Timestamp {
    const NANOS_PER_MILLISECOND: u32 = 1_000_000;
    // div_euclid/rem_euclid, not / and %: millis can be negative (pre-epoch)
    let secs = millis.div_euclid(1000);
    let nanos = millis.rem_euclid(1000) as u32 * NANOS_PER_MILLISECOND;
    DateTime::from_timestamp(secs, nanos).expect("millisecond epoch value out of chrono's range")
}

pub trait TimestampFormat {
    fn to_timestamp_string(&self) -> String;
}

impl TimestampFormat for Timestamp {
    fn to_timestamp_string(&self) -> String {
        self.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
