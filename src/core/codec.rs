//! Genial T31 frame decoding and handshake packets
//! This module turns raw notification frames into typed readings. It never fails:
//! anything it does not recognise decodes to `None`.

use serde::{Deserialize, Serialize};

/// Length of a temperature frame
pub const TEMPERATURE_FRAME_LEN: usize = 13;

/// Length of a battery frame
pub const BATTERY_FRAME_LEN: usize = 9;

/// Accepted temperature range in °C, both ends inclusive
pub const MIN_TEMPERATURE_C: f64 = 20.0;
pub const MAX_TEMPERATURE_C: f64 = 45.0;

/// Battery voltage mapped to 0% and 100%
pub const MIN_BATTERY_VOLTAGE: f64 = 2.0;
pub const MAX_BATTERY_VOLTAGE: f64 = 2.45;

/// Packets that switch the device into reporting mode, in send order.
pub const HANDSHAKE_PACKETS: [&[u8]; 5] = [
    &[0xA6, 0x02, 0xB1, 0x00, 0xB3, 0x6A],
    &[0xA6, 0x02, 0xA5, 0x00, 0xA7, 0x6A],
    &[0xA6, 0x02, 0x1D, 0x00, 0x1F, 0x6A],
    &[0xA6, 0x05, 0x37, 0x03, 0x0B, 0x06, 0x24, 0x74, 0x6A],
    &[0xA6, 0x05, 0x37, 0x03, 0x0B, 0x06, 0x25, 0x75, 0x6A],
];

/// A decoded measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    /// Temperature in °C
    Temperature(f64),
    /// Battery level in percent, 0..=100
    Battery(u8),
}

/// Decodes one notification frame.
pub fn decode(frame: &[u8]) -> Option<Reading> {
    match frame.len() {
        TEMPERATURE_FRAME_LEN => decode_temperature(frame),
        BATTERY_FRAME_LEN => Some(decode_battery(frame)),
        _ => None,
    }
}

/// The handshake sequence sent right after notifications are enabled.
pub fn handshake_packets() -> &'static [&'static [u8]] {
    &HANDSHAKE_PACKETS
}

fn decode_temperature(frame: &[u8]) -> Option<Reading> {
    let raw = u16::from_be_bytes([frame[3], frame[4]]);
    let celsius = f64::from(raw) / 100.0;

    (MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C)
        .contains(&celsius)
        .then_some(Reading::Temperature(celsius))
}

fn decode_battery(frame: &[u8]) -> Reading {
    let raw = u16::from_be_bytes([frame[5], frame[6]]);
    let voltage = f64::from(raw) / 100.0;

    let span = MAX_BATTERY_VOLTAGE - MIN_BATTERY_VOLTAGE;
    let percent = (voltage - MIN_BATTERY_VOLTAGE) / span * 100.0;
    // Truncates toward zero.
    Reading::Battery(percent.clamp(0.0, 100.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature_frame(raw: u16) -> Vec<u8> {
        let mut frame = vec![
            0xA6, 0x0A, 0x31, 0, 0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x6A,
        ];
        frame[3..5].copy_from_slice(&raw.to_be_bytes());
        frame
    }

    fn battery_frame(raw: u16) -> Vec<u8> {
        let mut frame = vec![0xA6, 0x06, 0x33, 0x00, 0x01, 0, 0, 0x00, 0x6A];
        frame[5..7].copy_from_slice(&raw.to_be_bytes());
        frame
    }

    #[test]
    fn test_decode_temperature() {
        assert_eq!(decode(&temperature_frame(0x0834)), Some(Reading::Temperature(21.0)));
        assert_eq!(decode(&temperature_frame(3671)), Some(Reading::Temperature(36.71)));
    }

    #[test]
    fn test_temperature_range_is_inclusive() {
        assert_eq!(decode(&temperature_frame(2000)), Some(Reading::Temperature(20.0)));
        assert_eq!(decode(&temperature_frame(4500)), Some(Reading::Temperature(45.0)));
        assert_eq!(decode(&temperature_frame(1999)), None);
        assert_eq!(decode(&temperature_frame(4501)), None);
        assert_eq!(decode(&temperature_frame(0)), None);
        assert_eq!(decode(&temperature_frame(u16::MAX)), None);
    }

    #[test]
    fn test_decode_battery_truncates() {
        // 2.30 V is 66.67% of the range
        assert_eq!(decode(&battery_frame(0x00E6)), Some(Reading::Battery(66)));
        assert_eq!(decode(&battery_frame(220)), Some(Reading::Battery(44)));
    }

    #[test]
    fn test_battery_is_clamped() {
        assert_eq!(decode(&battery_frame(200)), Some(Reading::Battery(0)));
        assert_eq!(decode(&battery_frame(245)), Some(Reading::Battery(100)));
        assert_eq!(decode(&battery_frame(150)), Some(Reading::Battery(0)));
        assert_eq!(decode(&battery_frame(330)), Some(Reading::Battery(100)));
        assert_eq!(decode(&battery_frame(0)), Some(Reading::Battery(0)));
    }

    #[test]
    fn test_other_lengths_decode_to_nothing() {
        for len in [0, 1, 5, 8, 10, 12, 14, 20] {
            assert_eq!(decode(&vec![0x42; len]), None, "length {len}");
        }
    }

    #[test]
    fn test_handshake_packets() {
        let packets = handshake_packets();
        assert_eq!(packets.len(), 5);
        assert_eq!(packets[0], &[0xA6, 0x02, 0xB1, 0x00, 0xB3, 0x6A]);
        assert_eq!(packets[4], &[0xA6, 0x05, 0x37, 0x03, 0x0B, 0x06, 0x25, 0x75, 0x6A]);
        for packet in packets {
            assert_eq!(packet.first(), Some(&0xA6));
            assert_eq!(packet.last(), Some(&0x6A));
        }
    }
}
