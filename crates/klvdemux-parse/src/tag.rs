//! Item tag encodings inside a local set.

/// How item tags are laid out inside a packet value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagForm {
    /// Every tag is exactly this many bytes.
    Fixed(usize),
    /// Variable-length tag: 7 bits per byte, high bit set on all but the last.
    BerOid,
}

impl TagForm {
    /// Length of the tag at the start of `data`, or `None` if `data` ends
    /// inside it.
    pub(crate) fn tag_len(self, data: &[u8]) -> Option<usize> {
        match self {
            TagForm::Fixed(n) => (n > 0 && data.len() >= n).then_some(n),
            TagForm::BerOid => decode_ber_oid(data).map(|(_, consumed)| consumed),
        }
    }

    /// Numeric tag value, when the tag fits in a `u64`.
    pub(crate) fn tag_number(self, tag: &[u8]) -> Option<u64> {
        match self {
            TagForm::Fixed(n) if n <= 8 => Some(
                tag.iter()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)),
            ),
            TagForm::Fixed(_) => None,
            TagForm::BerOid => decode_ber_oid(tag).map(|(value, _)| value),
        }
    }
}

/// Decode a BER-OID encoded number from the start of `data`.
///
/// Returns `(value, bytes consumed)`, or `None` if the encoding does not
/// terminate within `data`. Values past `u64::MAX` saturate.
pub fn decode_ber_oid(data: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (index, &byte) in data.iter().enumerate() {
        value = value
            .checked_mul(128)
            .map(|shifted| shifted | u64::from(byte & 0x7F))
            .unwrap_or(u64::MAX);
        if byte & 0x80 == 0 {
            return Some((value, index + 1));
        }
    }
    None
}

/// BER-OID encoding of `value`.
pub fn encode_ber_oid(value: u64) -> Vec<u8> {
    let mut groups = vec![(value & 0x7F) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        groups.push(0x80 | (rest & 0x7F) as u8);
        rest >>= 7;
    }
    groups.reverse();
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ber_oid_single_byte_values_are_identity() {
        for value in 0..128u64 {
            assert_eq!(encode_ber_oid(value), vec![value as u8]);
            assert_eq!(decode_ber_oid(&[value as u8]), Some((value, 1)));
        }
    }

    #[test]
    fn ber_oid_multi_byte() {
        assert_eq!(encode_ber_oid(128), vec![0x81, 0x00]);
        assert_eq!(encode_ber_oid(300), vec![0x82, 0x2C]);
        assert_eq!(decode_ber_oid(&[0x82, 0x2C, 0xFF]), Some((300, 2)));
    }

    #[test]
    fn ber_oid_unterminated_is_none() {
        assert_eq!(decode_ber_oid(&[0x81, 0x82]), None);
        assert_eq!(decode_ber_oid(&[]), None);
    }

    #[test]
    fn fixed_tag_len_needs_enough_bytes() {
        assert_eq!(TagForm::Fixed(2).tag_len(&[1, 2, 3]), Some(2));
        assert_eq!(TagForm::Fixed(2).tag_len(&[1]), None);
        assert_eq!(TagForm::Fixed(0).tag_len(&[1]), None);
    }

    #[test]
    fn tag_numbers() {
        assert_eq!(TagForm::Fixed(1).tag_number(&[13]), Some(13));
        assert_eq!(TagForm::Fixed(2).tag_number(&[0x01, 0x02]), Some(0x0102));
        assert_eq!(TagForm::Fixed(16).tag_number(&[0; 16]), None);
        assert_eq!(TagForm::BerOid.tag_number(&[0x81, 0x00]), Some(128));
    }
}
