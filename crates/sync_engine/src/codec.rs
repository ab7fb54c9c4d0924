//! NTP timestamp codec.
//!
//! An NTP timestamp is 64 bits big-endian: 32-bit seconds since
//! 1900-01-01T00:00:00Z followed by a 32-bit binary fraction of a second.

use contracts::NANOS_PER_SECOND;

/// Seconds between 1900-01-01 (NTP epoch) and 1970-01-01 (Unix epoch)
pub const NTP_UNIX_EPOCH_DELTA: i64 = 2_208_988_800;

const FRACTION_SCALE: u64 = 1 << 32;

/// Convert an NTP (seconds, fraction) pair into Unix nanoseconds
#[inline]
pub fn ntp_to_unix_nanos(seconds: u32, fraction: u32) -> i64 {
    let fraction_nanos = (fraction as u64 * NANOS_PER_SECOND as u64) >> 32;
    (seconds as i64 - NTP_UNIX_EPOCH_DELTA) * NANOS_PER_SECOND + fraction_nanos as i64
}

/// Convert Unix nanoseconds into an NTP (seconds, fraction) pair
///
/// The fraction is rounded to the nearest 2^-32 s step. Instants outside the
/// 1900-2036 era wrap modulo 2^32 seconds like the wire format does.
#[inline]
pub fn unix_nanos_to_ntp(nanos: i64) -> (u32, u32) {
    let seconds = nanos.div_euclid(NANOS_PER_SECOND) + NTP_UNIX_EPOCH_DELTA;
    let rem = nanos.rem_euclid(NANOS_PER_SECOND) as u64;
    let mut fraction = ((rem << 32) + NANOS_PER_SECOND as u64 / 2) / NANOS_PER_SECOND as u64;
    let mut seconds = seconds as u64;
    if fraction >= FRACTION_SCALE {
        fraction -= FRACTION_SCALE;
        seconds += 1;
    }
    (seconds as u32, fraction as u32)
}

/// Read a big-endian timestamp at `offset`
///
/// The caller guarantees `buf.len() >= offset + 8`.
#[inline]
pub fn read_timestamp(buf: &[u8], offset: usize) -> (u32, u32) {
    let seconds = u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]);
    let fraction = u32::from_be_bytes([
        buf[offset + 4],
        buf[offset + 5],
        buf[offset + 6],
        buf[offset + 7],
    ]);
    (seconds, fraction)
}

/// Write a big-endian timestamp at `offset`
#[inline]
pub fn write_timestamp(buf: &mut [u8], offset: usize, seconds: u32, fraction: u32) {
    buf[offset..offset + 4].copy_from_slice(&seconds.to_be_bytes());
    buf[offset + 4..offset + 8].copy_from_slice(&fraction.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        assert_eq!(ntp_to_unix_nanos(NTP_UNIX_EPOCH_DELTA as u32, 0), 0);
    }

    #[test]
    fn test_half_second_fraction() {
        let nanos = ntp_to_unix_nanos(NTP_UNIX_EPOCH_DELTA as u32 + 10, 0x8000_0000);
        assert_eq!(nanos, 10_500_000_000);
    }

    #[test]
    fn test_max_fraction_stays_below_one_second() {
        let nanos = ntp_to_unix_nanos(NTP_UNIX_EPOCH_DELTA as u32, u32::MAX);
        assert_eq!(nanos, 999_999_999);
    }

    #[test]
    fn test_before_unix_epoch_is_negative() {
        assert_eq!(ntp_to_unix_nanos(0, 0), -NTP_UNIX_EPOCH_DELTA * NANOS_PER_SECOND);
    }

    #[test]
    fn test_round_trip_within_resolution() {
        let seconds_cases = [
            NTP_UNIX_EPOCH_DELTA as u32,
            3_900_000_000u32,
            3_913_056_000,
            u32::MAX - 1,
        ];
        let fraction_cases = [0u32, 1, 3, 0x1234_5678, 0x8000_0000, u32::MAX - 7, u32::MAX];

        for &seconds in &seconds_cases {
            for &fraction in &fraction_cases {
                let nanos = ntp_to_unix_nanos(seconds, fraction);
                let (s2, f2) = unix_nanos_to_ntp(nanos);
                let nanos2 = ntp_to_unix_nanos(s2, f2);
                assert!(
                    (nanos2 - nanos).abs() <= 1,
                    "({seconds}, {fraction}) -> {nanos} -> ({s2}, {f2}) -> {nanos2}"
                );
            }
        }
    }

    #[test]
    fn test_encode_near_second_boundary() {
        // Largest sub-second value still maps back within one nanosecond
        let (seconds, fraction) = unix_nanos_to_ntp(999_999_999);
        let back = ntp_to_unix_nanos(seconds, fraction);
        assert!((back - 999_999_999).abs() <= 1);
    }

    #[test]
    fn test_read_write_timestamp() {
        let mut buf = [0u8; 48];
        write_timestamp(&mut buf, 40, 0xDEAD_BEEF, 0x0102_0304);
        assert_eq!(&buf[40..44], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(read_timestamp(&buf, 40), (0xDEAD_BEEF, 0x0102_0304));
    }
}
