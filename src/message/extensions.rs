use std::io;
use std::io::Write;

use nom::{be_u8, IResult};

/// Number of bytes that the extension protocol takes.
pub const NUM_EXTENSION_BYTES: usize = 8;

// Bit positions from the wild: azureus style reserved bytes.
const LTEP_BYTE: usize = 5;
const LTEP_BIT: u8 = 0x10;
const FEXT_BYTE: usize = 7;
const FEXT_BIT: u8 = 0x04;
const DHT_BYTE: usize = 7;
const DHT_BIT: u8 = 0x01;

/// Extensions supported by either end of a handshake.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct Extensions {
    bytes: [u8; NUM_EXTENSION_BYTES],
}

impl Extensions {
    /// Create a new `Extensions` with zero extensions.
    pub fn new() -> Extensions {
        Extensions::with_bytes([0u8; NUM_EXTENSION_BYTES])
    }

    /// Create a new `Extensions` by parsing the given bytes.
    pub fn from_bytes(bytes: &[u8]) -> IResult<&[u8], Extensions> {
        parse_extension_bits(bytes)
    }

    /// Write the `Extensions` to the given writer.
    pub fn write_bytes<W>(&self, mut writer: W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_all(&self.bytes[..])
    }

    /// Whether the extension protocol (BEP 10) bit is set.
    pub fn has_ltep(&self) -> bool {
        self.bytes[LTEP_BYTE] & LTEP_BIT != 0
    }

    pub fn set_ltep(&mut self, on: bool) {
        self.set_bit(LTEP_BYTE, LTEP_BIT, on);
    }

    /// Whether the fast extension (BEP 6) bit is set.
    pub fn has_fext(&self) -> bool {
        self.bytes[FEXT_BYTE] & FEXT_BIT != 0
    }

    pub fn set_fext(&mut self, on: bool) {
        self.set_bit(FEXT_BYTE, FEXT_BIT, on);
    }

    /// Whether the DHT (BEP 5) bit is set.
    pub fn has_dht(&self) -> bool {
        self.bytes[DHT_BYTE] & DHT_BIT != 0
    }

    pub fn set_dht(&mut self, on: bool) {
        self.set_bit(DHT_BYTE, DHT_BIT, on);
    }

    /// Create an intersection of the two extensions.
    ///
    /// This is useful for getting the extensions that both clients support.
    pub fn intersection(&self, ext: &Extensions) -> Extensions {
        let mut result_ext = Extensions::new();

        for index in 0..NUM_EXTENSION_BYTES {
            result_ext.bytes[index] = self.bytes[index] & ext.bytes[index];
        }

        result_ext
    }

    /// Create a new `Extensions` using the given bytes directly.
    fn with_bytes(bytes: [u8; NUM_EXTENSION_BYTES]) -> Extensions {
        Extensions { bytes }
    }

    fn set_bit(&mut self, byte: usize, bit: u8, on: bool) {
        if on {
            self.bytes[byte] |= bit;
        } else {
            self.bytes[byte] &= !bit;
        }
    }
}

impl From<[u8; NUM_EXTENSION_BYTES]> for Extensions {
    fn from(bytes: [u8; NUM_EXTENSION_BYTES]) -> Extensions {
        Extensions::with_bytes(bytes)
    }
}

/// Parse the given bytes for extension bits.
fn parse_extension_bits(bytes: &[u8]) -> IResult<&[u8], Extensions> {
    do_parse!(bytes,
        bytes: count_fixed!(u8, be_u8, NUM_EXTENSION_BYTES) >>
        (Extensions::with_bytes(bytes))
    )
}

#[cfg(test)]
mod tests {
    use super::Extensions;

    #[test]
    fn positive_bit_positions_match_wire_format() {
        let mut ext = Extensions::new();
        ext.set_ltep(true);
        ext.set_fext(true);
        ext.set_dht(true);

        let mut buffer = Vec::new();
        ext.write_bytes(&mut buffer).unwrap();

        assert_eq!(&[0, 0, 0, 0, 0, 0x10, 0, 0x05], &buffer[..]);
    }

    #[test]
    fn positive_parse_round_trip() {
        let bytes = [0u8, 0, 0, 0, 0, 0x10, 0, 0x01];

        let (rest, ext) = Extensions::from_bytes(&bytes).unwrap();

        assert!(rest.is_empty());
        assert!(ext.has_ltep());
        assert!(ext.has_dht());
        assert!(!ext.has_fext());
    }

    #[test]
    fn positive_clear_bit() {
        let mut ext = Extensions::from([0xFFu8; 8]);
        ext.set_dht(false);

        assert!(!ext.has_dht());
        assert!(ext.has_fext());
        assert!(ext.has_ltep());
    }

    #[test]
    fn positive_intersection() {
        let mut ours = Extensions::new();
        ours.set_ltep(true);
        ours.set_fext(true);

        let mut theirs = Extensions::new();
        theirs.set_fext(true);
        theirs.set_dht(true);

        let both = ours.intersection(&theirs);

        assert!(both.has_fext());
        assert!(!both.has_ltep());
        assert!(!both.has_dht());
    }
}
