//! Telemetry records and their wire encoding.
//!
//! A [`Telemetry`] is composed by the acquisition worker once per valid
//! cycle, buffered in a [`queue::TelemetryQueue`], and eventually
//! published as part of a JSON batch by the delivery worker.

pub mod latest;
pub mod queue;

use crate::error::Error;
use core::fmt::Write;
use heapless::String;

/// One acquisition sample. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    /// Seconds since the Unix epoch (or since boot before time sync).
    pub timestamp: i64,
    /// °C
    pub temperature: f32,
    /// %RH
    pub humidity: f32,
    /// hPa
    pub pressure: f32,
    /// Presence detections since the previous sample.
    pub detections: u32,
}

/// Append one sample as a JSON object.
///
/// Keys appear in wire order; floats carry one decimal.
pub fn write_json<const N: usize>(out: &mut String<N>, t: &Telemetry) -> Result<(), Error> {
    write!(
        out,
        "{{\"timestamp\":{},\"temperature\":{:.1},\"humidity\":{:.1},\"pressure\":{:.1},\"personCount\":{}}}",
        t.timestamp, t.temperature, t.humidity, t.pressure, t.detections
    )
    .map_err(|_| Error::BufferOverflow)
}

/// Encode a batch as a JSON array of objects, oldest first.
pub fn encode_batch<const N: usize>(batch: &[Telemetry]) -> Result<String<N>, Error> {
    let mut out = String::new();
    out.push('[').map_err(|_| Error::BufferOverflow)?;
    for (i, t) in batch.iter().enumerate() {
        if i > 0 {
            out.push(',').map_err(|_| Error::BufferOverflow)?;
        }
        write_json(&mut out, t)?;
    }
    out.push(']').map_err(|_| Error::BufferOverflow)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DELIVERY_BATCH_SIZE;
    use crate::config::DELIVERY_PAYLOAD_CAPACITY;

    fn sample(ts: i64) -> Telemetry {
        Telemetry {
            timestamp: ts,
            temperature: 21.54,
            humidity: 48.96,
            pressure: 1009.8,
            detections: 3,
        }
    }

    #[test]
    fn object_keys_in_wire_order() {
        let mut s: String<128> = String::new();
        write_json(&mut s, &sample(1_700_000_000)).unwrap();
        assert_eq!(
            s.as_str(),
            "{\"timestamp\":1700000000,\"temperature\":21.5,\"humidity\":49.0,\"pressure\":1009.8,\"personCount\":3}"
        );
    }

    #[test]
    fn negative_temperature() {
        let mut t = sample(5);
        t.temperature = -5.12;
        let mut s: String<128> = String::new();
        write_json(&mut s, &t).unwrap();
        assert!(s.contains("\"temperature\":-5.1,"));
    }

    #[test]
    fn empty_batch_is_empty_array() {
        let s: String<8> = encode_batch(&[]).unwrap();
        assert_eq!(s.as_str(), "[]");
    }

    #[test]
    fn batch_is_comma_separated_in_order() {
        let s: String<512> = encode_batch(&[sample(1), sample(2)]).unwrap();
        assert!(s.starts_with("[{\"timestamp\":1,"));
        assert!(s.contains("},{\"timestamp\":2,"));
        assert!(s.ends_with("}]"));
    }

    #[test]
    fn full_batch_fits_payload_budget() {
        let mut t = sample(i64::from(u32::MAX));
        t.temperature = -40.0;
        t.humidity = 100.0;
        t.pressure = 1100.0;
        t.detections = u32::MAX;
        let batch = [t; DELIVERY_BATCH_SIZE];
        let s: Result<String<DELIVERY_PAYLOAD_CAPACITY>, _> = encode_batch(&batch);
        assert!(s.is_ok());
    }

    #[test]
    fn overflow_is_reported() {
        let s: Result<String<32>, _> = encode_batch(&[sample(1)]);
        assert_eq!(s, Err(Error::BufferOverflow));
    }
}
