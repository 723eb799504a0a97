use sensa_core::DataPoint;
use sensa_core::proto::data_point::ValOneof;

use crate::StoreError;

/// Limits mirrored by the SQL `CHECK` constraints.
pub(crate) const MAX_ATTR_LEN: usize = 40;
pub(crate) const MAX_VALUE_LEN: usize = 4096;

pub(crate) fn check_point(point: &DataPoint) -> Result<(), StoreError> {
    let attr_len = point.attr.chars().count();
    if attr_len == 0 || attr_len > MAX_ATTR_LEN {
        return Err(StoreError::InvalidFormat(format!(
            "attribute length {attr_len} outside 1..={MAX_ATTR_LEN}"
        )));
    }

    let value_len = match &point.val_oneof {
        Some(ValOneof::StrVal(s)) => s.chars().count(),
        Some(ValOneof::BytesVal(b)) => b.len(),
        Some(_) => 0,
        None => return Err(StoreError::InvalidFormat("point has no value".into())),
    };
    if value_len > MAX_VALUE_LEN {
        return Err(StoreError::InvalidFormat(format!(
            "value length {value_len} exceeds {MAX_VALUE_LEN}"
        )));
    }

    Ok(())
}

/// Microseconds since the epoch, the precision points and events are keyed
/// at.
pub(crate) fn micros(ts: jiff::Timestamp) -> i64 {
    ts.as_microsecond()
}
