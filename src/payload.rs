//! Binary payload stored for each device
//!
//! The value is a protobuf `UserApps` message with fixed tags:
//!
//! ```text
//! message UserApps {
//!     optional double lat = 1;
//!     optional double lon = 2;
//!     repeated int64 apps = 3;
//! }
//! ```
//!
//! Coordinates are always written, even when zero, so `0.0` and `-0.0`
//! survive the round trip and stay distinct from a missing field.
//!
//! Decoders skip unknown tags, so fields can be appended without breaking
//! existing readers.

use anyhow::{anyhow, Context, Result};
use prost::Message;

use crate::record::{parse_record, AppsInstalled};

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserApps {
    #[prost(double, optional, tag = "1")]
    pub lat: Option<f64>,
    #[prost(double, optional, tag = "2")]
    pub lon: Option<f64>,
    #[prost(int64, repeated, tag = "3")]
    pub apps: Vec<i64>,
}

/// Store key and serialized value for one record
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    pub key: String,
    pub bytes: Vec<u8>,
}

/// Build the store key `"{dev_type}:{dev_id}"`.
pub fn record_key(record: &AppsInstalled) -> String {
    format!("{}:{}", record.dev_type, record.dev_id)
}

pub fn encode(record: &AppsInstalled) -> EncodedPayload {
    let message = UserApps {
        lat: Some(record.lat),
        lon: Some(record.lon),
        apps: record.apps.clone(),
    };
    EncodedPayload {
        key: record_key(record),
        bytes: message.encode_to_vec(),
    }
}

pub fn decode(bytes: &[u8]) -> Result<UserApps> {
    UserApps::decode(bytes).context("Failed to decode UserApps payload")
}

impl UserApps {
    /// Bit-exact field comparison; any two NaN coordinates count as equal.
    pub fn same_as(&self, record: &AppsInstalled) -> bool {
        fn same(a: Option<f64>, b: f64) -> bool {
            a.is_some_and(|a| a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan()))
        }
        same(self.lat, record.lat) && same(self.lon, record.lon) && self.apps == record.apps
    }
}

const SELF_TEST_SAMPLE: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424";

/// Round-trip the built-in sample through parse, encode and decode.
pub fn self_test() -> Result<()> {
    for line in SELF_TEST_SAMPLE.lines() {
        let parsed = parse_record(line).map_err(|e| anyhow!("Sample line rejected: {}", e))?;
        let payload = encode(&parsed.record);
        let unpacked = decode(&payload.bytes)?;
        if !unpacked.same_as(&parsed.record) {
            return Err(anyhow!(
                "Round trip mismatch for {}: {:?} != {:?}",
                payload.key,
                unpacked,
                parsed.record
            ));
        }
    }
    Ok(())
}
