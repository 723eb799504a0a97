use prost_types::Timestamp;

/// Convert a `jiff` timestamp to its protobuf form.
pub fn to_proto(ts: jiff::Timestamp) -> Timestamp {
    Timestamp {
        seconds: ts.as_second(),
        nanos: ts.subsec_nanosecond(),
    }
}

/// Convert a protobuf timestamp, rejecting out-of-range values.
pub fn from_proto(ts: &Timestamp) -> Option<jiff::Timestamp> {
    jiff::Timestamp::new(ts.seconds, ts.nanos).ok()
}

/// Current time in protobuf form.
pub fn now() -> Timestamp {
    to_proto(jiff::Timestamp::now())
}
