//! SNTP packet layout (RFC 4330).
//!
//! Only the fields a client needs are touched: the LI/VN/Mode byte of the
//! request and the mode + transmit timestamp of the response.

use crate::codec::{ntp_to_unix_nanos, read_timestamp, unix_nanos_to_ntp, write_timestamp};
use crate::error::AttemptError;

/// Size of an SNTP packet without extensions
pub const PACKET_LEN: usize = 48;

/// LI = 0, VN = 3, Mode = 3 (client)
pub const CLIENT_MODE_V3: u8 = 0x1B;

/// Byte offset of the transmit timestamp (seconds at 40, fraction at 44)
pub const TRANSMIT_TIMESTAMP_OFFSET: usize = 40;

const MODE_MASK: u8 = 0x07;
const MODE_SERVER: u8 = 4;
const MODE_BROADCAST: u8 = 5;

/// Build a client request: all zero except the mode/version byte
#[inline]
pub fn build_request() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = CLIENT_MODE_V3;
    packet
}

/// Parse the server transmit timestamp (Unix nanoseconds) out of a response
pub fn parse_transmit_timestamp(response: &[u8]) -> Result<i64, AttemptError> {
    if response.len() != PACKET_LEN {
        return Err(AttemptError::malformed(format!(
            "expected {} bytes, got {}",
            PACKET_LEN,
            response.len()
        )));
    }

    let mode = response[0] & MODE_MASK;
    if mode != MODE_SERVER && mode != MODE_BROADCAST {
        return Err(AttemptError::malformed(format!(
            "unexpected mode {}",
            mode
        )));
    }

    let (seconds, fraction) = read_timestamp(response, TRANSMIT_TIMESTAMP_OFFSET);
    if seconds == 0 && fraction == 0 {
        return Err(AttemptError::malformed("zero transmit timestamp"));
    }

    Ok(ntp_to_unix_nanos(seconds, fraction))
}

/// Build a server response carrying `transmit_unix_nanos`
///
/// Used by the loopback responder and test transports.
pub fn build_response(transmit_unix_nanos: i64) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    // LI = 0, VN = 3, Mode = 4 (server)
    packet[0] = 0x1C;
    // Stratum 1
    packet[1] = 1;
    let (seconds, fraction) = unix_nanos_to_ntp(transmit_unix_nanos);
    write_timestamp(&mut packet, TRANSMIT_TIMESTAMP_OFFSET, seconds, fraction);
    packet
}
